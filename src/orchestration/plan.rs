//! Execution planning: group required domains into dependency-ordered stages.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::analysis::{ContextAnalysis, DomainRules};
use crate::error::{PlanningError, PlanningResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageState {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStage {
    /// `stage_1`, `stage_2`, ...
    pub name: String,
    pub domains: Vec<String>,
    /// Earlier stages holding this stage's dependencies
    pub prerequisites: Vec<String>,
    pub estimated_time: Duration,
    pub state: StageState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub stages: Vec<ExecutionStage>,
    pub dependencies: BTreeMap<String, Vec<String>>,
    /// Domains sharing a stage, which may run side by side
    pub parallel_groups: Vec<Vec<String>>,
    pub estimated_duration: Duration,
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// First domain of every stage
    pub fn critical_path(&self) -> Vec<String> {
        self.stages
            .iter()
            .filter_map(|s| s.domains.first().cloned())
            .collect()
    }

    pub fn stage_of(&self, domain: &str) -> Option<&ExecutionStage> {
        self.stages
            .iter()
            .find(|s| s.domains.iter().any(|d| d == domain))
    }

    /// All domains in execution order
    pub fn domain_order(&self) -> Vec<String> {
        self.stages
            .iter()
            .flat_map(|s| s.domains.iter().cloned())
            .collect()
    }
}

fn deps_of<'a>(analysis: &'a ContextAnalysis, domain: &str) -> &'a [String] {
    analysis
        .dependencies
        .get(domain)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Kahn-style rounds: each stage holds every remaining domain whose
/// dependencies are already scheduled, sorted by name.
pub fn build_plan(
    analysis: &ContextAnalysis,
    rules: &DomainRules,
    stage_base_duration: Duration,
) -> PlanningResult<ExecutionPlan> {
    let required: BTreeSet<&str> = analysis.required_domains.iter().map(String::as_str).collect();

    for domain in &required {
        if let Some(missing) = deps_of(analysis, domain)
            .iter()
            .find(|d| !required.contains(d.as_str()))
        {
            return Err(PlanningError::UnknownDependency {
                domain: domain.to_string(),
                dependency: missing.clone(),
            });
        }
    }

    let mut remaining = required.clone();
    let mut stage_by_domain: BTreeMap<&str, String> = BTreeMap::new();
    let mut stages = Vec::new();
    let mut parallel_groups = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|d| {
                deps_of(analysis, d)
                    .iter()
                    .all(|dep| stage_by_domain.contains_key(dep.as_str()))
            })
            .collect();

        if ready.is_empty() {
            let stuck: Vec<String> = remaining.iter().map(|d| d.to_string()).collect();
            debug!(domains = ?stuck, "planning stalled on a dependency cycle");
            return Err(PlanningError::CircularDependency { remaining: stuck });
        }

        let name = format!("stage_{}", stages.len() + 1);
        let prerequisites: BTreeSet<String> = ready
            .iter()
            .flat_map(|d| deps_of(analysis, d))
            .filter_map(|dep| stage_by_domain.get(dep.as_str()).cloned())
            .collect();
        let weight = ready
            .iter()
            .map(|d| rules.complexity_of(d))
            .fold(1.0_f64, f64::max);

        for &domain in &ready {
            remaining.remove(domain);
            stage_by_domain.insert(domain, name.clone());
        }
        let domains: Vec<String> = ready.iter().map(|d| d.to_string()).collect();
        if domains.len() > 1 {
            parallel_groups.push(domains.clone());
        }

        stages.push(ExecutionStage {
            name,
            domains,
            prerequisites: prerequisites.into_iter().collect(),
            estimated_time: stage_base_duration.mul_f64(weight),
            state: StageState::Pending,
        });
    }

    let estimated_duration = stages.iter().map(|s| s.estimated_time).sum();
    debug!(stages = stages.len(), "execution plan built");

    Ok(ExecutionPlan {
        stages,
        dependencies: analysis.dependencies.clone(),
        parallel_groups,
        estimated_duration,
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::analysis::Complexity;
    use pretty_assertions::assert_eq;

    /// `deps` holds `(domain, must_run_after)` pairs
    fn analysis(domains: &[&str], deps: &[(&str, &str)]) -> ContextAnalysis {
        let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (domain, on) in deps {
            dependencies
                .entry(domain.to_string())
                .or_default()
                .push(on.to_string());
        }
        ContextAnalysis {
            primary_domain: domains[0].to_string(),
            required_domains: domains.iter().map(|d| d.to_string()).collect(),
            entity_types: Vec::new(),
            products: Vec::new(),
            compliance_tier: "STANDARD".to_string(),
            dependencies,
            estimated_complexity: Complexity::Low,
        }
    }

    #[test]
    fn test_chain_plans_one_domain_per_stage() {
        let a = analysis(&["A", "B", "C"], &[("B", "A"), ("C", "B")]);
        let plan = build_plan(&a, &DomainRules::default(), Duration::from_secs(30)).unwrap();

        let names: Vec<_> = plan.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["stage_1", "stage_2", "stage_3"]);
        assert_eq!(plan.domain_order(), vec!["A", "B", "C"]);
        assert_eq!(plan.stages[2].prerequisites, vec!["stage_2"]);
        assert!(plan.parallel_groups.is_empty());
        assert_eq!(plan.critical_path(), vec!["A", "B", "C"]);
        assert_eq!(plan.estimated_duration, Duration::from_secs(90));
    }

    #[test]
    fn test_cycle_reports_remaining_domains() {
        let a = analysis(&["A", "B", "C"], &[("B", "C"), ("C", "B")]);
        let err = build_plan(&a, &DomainRules::default(), Duration::from_secs(30)).unwrap_err();
        assert_eq!(
            err,
            PlanningError::CircularDependency {
                remaining: vec!["B".to_string(), "C".to_string()]
            }
        );
    }

    #[test]
    fn test_unknown_dependency() {
        let a = analysis(&["A"], &[("A", "Z")]);
        assert!(matches!(
            build_plan(&a, &DomainRules::default(), Duration::from_secs(1)),
            Err(PlanningError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_standard_corporate_plan() {
        let rules = DomainRules::default();
        let request = crate::orchestration::OrchestrationRequest {
            entity_type: Some("CORPORATE".to_string()),
            products: vec!["CUSTODY".to_string()],
            ..Default::default()
        };
        let plan = build_plan(&rules.analyze(&request), &rules, Duration::from_secs(30)).unwrap();

        assert_eq!(plan.stages.len(), 2);
        assert_eq!(plan.stages[0].domains, vec!["custody", "kyc", "onboarding"]);
        assert_eq!(plan.stages[1].domains, vec!["ubo"]);
        assert_eq!(plan.stages[1].prerequisites, vec!["stage_1"]);
        assert_eq!(plan.parallel_groups, vec![vec!["custody", "kyc", "onboarding"]]);
        // stage_1 weighs 2.0 (kyc, custody), stage_2 weighs 3.0 (ubo)
        assert_eq!(plan.stages[0].estimated_time, Duration::from_secs(60));
        assert_eq!(plan.estimated_duration, Duration::from_secs(150));
        assert_eq!(plan.stage_of("ubo").map(|s| s.name.as_str()), Some("stage_2"));
    }
}
