use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

use super::{
    driver::{ConclusionHeuristic, DEFAULT_MAX_TURNS_PER_ROUND},
    scenario::{RoundPlan, Scenario, ScenarioFilter},
    subject::SubjectKind,
};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Settings for one batch run. Every field has a default, so a YAML file only
/// needs the keys it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub batch_size: usize,
    pub max_turns_per_round: usize,
    pub output_dir: PathBuf,
    pub subject: SubjectKind,
    pub model: String,
    pub judge_model: Option<String>,
    pub patient_model: Option<String>,
    /// Round numbers to run; all rounds when unset.
    pub rounds: Option<Vec<u32>>,
    pub num_scenarios: Option<usize>,
    pub min_rounds: Option<usize>,
    pub max_rounds: Option<usize>,
    pub patient_template: Option<PathBuf>,
    pub conclusion: ConclusionHeuristic,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            max_turns_per_round: DEFAULT_MAX_TURNS_PER_ROUND,
            output_dir: PathBuf::from("results"),
            subject: SubjectKind::Titration,
            model: DEFAULT_MODEL.to_string(),
            judge_model: None,
            patient_model: None,
            rounds: None,
            num_scenarios: None,
            min_rounds: None,
            max_rounds: None,
            patient_template: None,
            conclusion: ConclusionHeuristic::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SimulationError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns_per_round = max_turns;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_subject(mut self, subject: SubjectKind) -> Self {
        self.subject = subject;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_judge_model(mut self, model: impl Into<String>) -> Self {
        self.judge_model = Some(model.into());
        self
    }

    pub fn with_patient_model(mut self, model: impl Into<String>) -> Self {
        self.patient_model = Some(model.into());
        self
    }

    pub fn with_rounds(mut self, rounds: Vec<u32>) -> Self {
        self.rounds = Some(rounds);
        self
    }

    pub fn with_conclusion(mut self, conclusion: ConclusionHeuristic) -> Self {
        self.conclusion = conclusion;
        self
    }

    pub fn judge_model(&self) -> &str {
        self.judge_model.as_deref().unwrap_or(&self.model)
    }

    pub fn patient_model(&self) -> &str {
        self.patient_model.as_deref().unwrap_or(&self.model)
    }

    pub fn scenario_filter(&self) -> ScenarioFilter {
        ScenarioFilter {
            limit: self.num_scenarios,
            min_rounds: self.min_rounds,
            max_rounds: self.max_rounds,
        }
    }

    /// The scenario's rounds restricted to the configured round numbers.
    pub fn selected_rounds(&self, scenario: &Scenario) -> Vec<RoundPlan> {
        let mut plans = scenario.round_plans();
        if let Some(selected) = &self.rounds {
            plans.retain(|plan| selected.contains(&plan.round));
        }
        plans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::scenario::parse_scenarios_json;

    #[test]
    fn yaml_overrides_only_given_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.yaml");
        fs::write(
            &path,
            "batch_size: 2\nsubject: intake\nconclusion:\n  max_message_chars: 120\n",
        )
        .unwrap();

        let config = SimulationConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.subject, SubjectKind::Intake);
        assert_eq!(config.conclusion.max_message_chars, 120);
        assert_eq!(config.conclusion.window, 4);
        assert_eq!(config.max_turns_per_round, DEFAULT_MAX_TURNS_PER_ROUND);
        assert_eq!(config.judge_model(), DEFAULT_MODEL);
    }

    #[test]
    fn round_selection_filters_plans() {
        let scenario = parse_scenarios_json(
            r#"[{"id": "r", "clinical_scenario": {"medications": []},
                "rounds": [{"round": 1, "week": 0}, {"round": 2, "week": 2}, {"round": 3, "week": 4}]}]"#,
        )
        .unwrap()
        .remove(0);

        let config = SimulationConfig::default().with_rounds(vec![1, 3]);
        let rounds: Vec<u32> = config.selected_rounds(&scenario).iter().map(|p| p.round).collect();
        assert_eq!(rounds, vec![1, 3]);
        assert_eq!(SimulationConfig::default().selected_rounds(&scenario).len(), 3);
    }
}
