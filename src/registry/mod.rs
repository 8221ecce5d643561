//! Stage registry
//!
//! Declares which stages run, what each depends on, whether it may share
//! the pool, and whether its failure blocks aggregation. The registry is
//! the single source of truth for dependency edges; cycles are rejected
//! when it is built.

use crate::config::SimulationConfig;
use crate::error::OrchestrationError;
use crate::models::StageId;
use crate::providers::ProviderSet;
use crate::stages::{AnalysisStage, ComplianceStage, ExpenseStage, RiskStage};
use crate::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyClass {
    /// Shares the bounded pool with other parallel stages
    Parallel,
    /// Takes the whole pool; never overlaps another stage
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Failure makes the run non-viable
    Required,
    /// Failure is recorded; aggregation substitutes a default
    BestEffort,
}

pub struct StageSpec {
    pub stage: Arc<dyn AnalysisStage>,
    pub dependencies: BTreeSet<StageId>,
    pub concurrency: ConcurrencyClass,
    pub policy: FailurePolicy,
}

impl StageSpec {
    pub fn new(stage: Arc<dyn AnalysisStage>) -> Self {
        Self {
            stage,
            dependencies: BTreeSet::new(),
            concurrency: ConcurrencyClass::Parallel,
            policy: FailurePolicy::Required,
        }
    }

    pub fn depends_on(mut self, stage: StageId) -> Self {
        self.dependencies.insert(stage);
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.concurrency = ConcurrencyClass::Exclusive;
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.policy = FailurePolicy::BestEffort;
        self
    }

    pub fn id(&self) -> StageId {
        self.stage.id()
    }
}

/// Serializable view of one registered stage
#[derive(Debug, Clone, Serialize)]
pub struct StageDescription {
    pub stage: StageId,
    pub description: &'static str,
    pub dependencies: Vec<StageId>,
    pub concurrency: ConcurrencyClass,
    pub policy: FailurePolicy,
}

/// Validated, acyclic set of stages
pub struct StageRegistry {
    specs: BTreeMap<StageId, StageSpec>,
    order: Vec<StageId>,
    dependents: BTreeMap<StageId, Vec<StageId>>,
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("order", &self.order)
            .field("dependents", &self.dependents)
            .finish()
    }
}

impl StageRegistry {
    /// Build the registry, rejecting duplicates, unknown dependencies and cycles
    pub fn new(specs: Vec<StageSpec>) -> Result<Self> {
        let mut registration_order = Vec::with_capacity(specs.len());
        let mut by_id: BTreeMap<StageId, StageSpec> = BTreeMap::new();

        for spec in specs {
            let id = spec.id();
            if by_id.contains_key(&id) {
                return Err(OrchestrationError::Configuration(format!(
                    "stage '{}' registered twice",
                    id
                )));
            }
            registration_order.push(id);
            by_id.insert(id, spec);
        }

        if by_id.is_empty() {
            return Err(OrchestrationError::Configuration(
                "registry has no stages".to_string(),
            ));
        }

        let mut dependents: BTreeMap<StageId, Vec<StageId>> =
            by_id.keys().map(|id| (*id, Vec::new())).collect();

        for id in &registration_order {
            for dep in &by_id[id].dependencies {
                if dep == id {
                    return Err(OrchestrationError::Configuration(format!(
                        "stage '{}' depends on itself",
                        id
                    )));
                }
                match dependents.get_mut(dep) {
                    Some(list) => list.push(*id),
                    None => {
                        return Err(OrchestrationError::Configuration(format!(
                            "stage '{}' depends on unregistered stage '{}'",
                            id, dep
                        )))
                    }
                }
            }
        }

        let order = topological_order(&registration_order, &by_id, &dependents)?;

        Ok(Self {
            specs: by_id,
            order,
            dependents,
        })
    }

    /// Stages in dependency order; ties keep registration order
    pub fn order(&self) -> &[StageId] {
        &self.order
    }

    pub fn spec(&self, stage: StageId) -> Option<&StageSpec> {
        self.specs.get(&stage)
    }

    pub fn dependents(&self, stage: StageId) -> &[StageId] {
        self.dependents
            .get(&stage)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn describe(&self) -> Vec<StageDescription> {
        self.order
            .iter()
            .filter_map(|id| self.specs.get(id))
            .map(|spec| StageDescription {
                stage: spec.id(),
                description: spec.stage.description(),
                dependencies: spec.dependencies.iter().copied().collect(),
                concurrency: spec.concurrency,
                policy: spec.policy,
            })
            .collect()
    }
}

/// Kahn's algorithm; anything left unsorted sits on or behind a cycle
fn topological_order(
    registration_order: &[StageId],
    specs: &BTreeMap<StageId, StageSpec>,
    dependents: &BTreeMap<StageId, Vec<StageId>>,
) -> Result<Vec<StageId>> {
    let mut in_degree: BTreeMap<StageId, usize> = specs
        .iter()
        .map(|(id, spec)| (*id, spec.dependencies.len()))
        .collect();

    let mut queue: VecDeque<StageId> = registration_order
        .iter()
        .filter(|id| in_degree[*id] == 0)
        .copied()
        .collect();

    let mut sorted = Vec::with_capacity(specs.len());

    while let Some(id) = queue.pop_front() {
        sorted.push(id);
        for dependent in &dependents[&id] {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    if sorted.len() != specs.len() {
        let stuck: Vec<&str> = registration_order
            .iter()
            .filter(|id| !sorted.contains(id))
            .map(|id| id.as_str())
            .collect();
        return Err(OrchestrationError::Configuration(format!(
            "dependency cycle among stages: {}",
            stuck.join(", ")
        )));
    }

    Ok(sorted)
}

/// Risk, expense and compliance, all required
pub fn create_default_registry(
    providers: &ProviderSet,
    config: &SimulationConfig,
) -> Result<StageRegistry> {
    let risk = StageSpec::new(Arc::new(RiskStage::new(providers.life_quality.clone())));
    let expense = StageSpec::new(Arc::new(ExpenseStage::new(
        providers.pricing.clone(),
        providers.exchange.clone(),
    )));
    let mut compliance = StageSpec::new(Arc::new(ComplianceStage::new(providers.tax.clone())));

    if config.compliance_uses_expense {
        compliance = compliance.depends_on(StageId::EXPENSE);
    }

    StageRegistry::new(vec![risk, expense, compliance])
}
