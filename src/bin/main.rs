use relocation_agent_orchestrator::{
    logging::init_tracing,
    models::{RelocationRequest, UserProfile},
    Orchestrator, SimulationConfig,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_tracing("debug");

    info!("Relocation simulator starting");

    let config = SimulationConfig::from_env()?;
    let orchestrator = Orchestrator::from_config(config)?;

    // Sample scenario: San Francisco to Lisbon
    let request = RelocationRequest {
        origin: "San Francisco".to_string(),
        targets: vec!["Lisbon".to_string()],
        currency: Some("USD".to_string()),
        profile: UserProfile {
            annual_income: Some(120_000.0),
            monthly_expenses: Some(4_000.0),
            current_net_worth: Some(50_000.0),
            ..Default::default()
        },
    };

    info!(
        origin = %request.origin,
        targets = ?request.targets,
        "Running simulation"
    );

    match orchestrator.run(&request).await {
        Ok(report) => {
            info!("Simulation successful");
            println!("\n=== RELOCATION REPORT ===");
            println!("{} -> {}", report.origin, report.primary_target);
            println!(
                "Net annual savings: {:.2} {}",
                report.net_annual_savings, report.currency
            );
            println!("Quality of life risk: {}", report.quality_of_life_score);
            println!("\nWealth projection:");
            for entry in &report.wealth_projection {
                println!("  {} year {}: {:.2}", entry.location, entry.year, entry.wealth);
            }
            println!("\nRecommendations:");
            for (i, line) in report.recommendations.iter().enumerate() {
                println!("  {}: {}", i + 1, line);
            }
            println!("\n{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("Simulation failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
