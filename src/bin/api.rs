use relocation_agent_orchestrator::{
    api::start_server, logging::init_tracing, Orchestrator, SimulationConfig,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();
    init_tracing("info");

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Relocation Agent Orchestrator - API Server");
    info!("Port: {}", api_port);

    let config = SimulationConfig::from_env()?;
    info!(
        max_concurrency = config.max_concurrency,
        compliance_uses_expense = config.compliance_uses_expense,
        "Configuration loaded"
    );

    let orchestrator = Arc::new(Orchestrator::from_config(config)?);

    info!(stages = ?orchestrator.registry().order(), "Orchestrator initialized");

    start_server(orchestrator, api_port).await?;

    Ok(())
}
