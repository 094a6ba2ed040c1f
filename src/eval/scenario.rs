use std::{fs, path::Path};

use serde::{de, Deserialize, Serialize};

use crate::error::SimulationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(default)]
    pub patient_profile: PatientProfile,
    #[serde(default)]
    pub clinical_scenario: ClinicalScenario,
    #[serde(default)]
    pub conversation_goal: Option<String>,
    #[serde(default)]
    pub rounds: Vec<RoundPlan>,
    #[serde(default)]
    pub hidden_eval: Option<HiddenEval>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub education_level: Option<String>,
    #[serde(default)]
    pub medical_literacy: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicalScenario {
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub therapy_complexity: Option<String>,
    #[serde(default, alias = "titration_state")]
    pub titration_stage: Option<String>,
    #[serde(default, alias = "baseline_vitals")]
    pub vitals: Vitals,
    #[serde(default)]
    pub adherence: Vec<AdherenceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    #[serde(rename = "type", alias = "class", default)]
    pub class: String,
    #[serde(default)]
    pub current: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub stage: Option<String>,
}

/// Vital signs for one encounter. Every reading is optional so a round can
/// override only what changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    #[serde(default, alias = "sbp", alias = "SBP", alias = "systolic")]
    pub bp_systolic: Option<f64>,
    #[serde(default, alias = "dbp", alias = "DBP", alias = "diastolic")]
    pub bp_diastolic: Option<f64>,
    #[serde(default, alias = "hr", alias = "heart_rate_bpm")]
    pub heart_rate: Option<f64>,
    #[serde(
        default,
        alias = "oxygen_saturation",
        alias = "o2_saturation",
        alias = "spo2"
    )]
    pub oxygen_saturation_pct: Option<f64>,
    #[serde(default, alias = "weight")]
    pub weight_lbs: Option<f64>,
    #[serde(default, alias = "weight_change")]
    pub weight_change_lbs: Option<f64>,
}

impl Vitals {
    /// Readings from `self`, falling back to `base` where absent.
    pub fn overlay(&self, base: &Vitals) -> Vitals {
        Vitals {
            bp_systolic: self.bp_systolic.or(base.bp_systolic),
            bp_diastolic: self.bp_diastolic.or(base.bp_diastolic),
            heart_rate: self.heart_rate.or(base.heart_rate),
            oxygen_saturation_pct: self.oxygen_saturation_pct.or(base.oxygen_saturation_pct),
            weight_lbs: self.weight_lbs.or(base.weight_lbs),
            weight_change_lbs: self.weight_change_lbs,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Vitals::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdherenceEntry {
    pub medication: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub missed_doses: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundPlan {
    pub round: u32,
    #[serde(default)]
    pub week: u32,
    #[serde(default)]
    pub conversation_goal: String,
    #[serde(default)]
    pub vitals: Option<Vitals>,
    #[serde(default)]
    pub adherence: Option<Vec<AdherenceEntry>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HiddenEval {
    #[serde(default)]
    pub forbidden_actions: Vec<String>,
    #[serde(default)]
    pub expected_actions: Vec<String>,
    #[serde(default)]
    pub escalation_thresholds: Option<EscalationThresholds>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscalationThresholds {
    #[serde(default)]
    pub bp_systolic_limit: Option<f64>,
    #[serde(default)]
    pub o2_saturation_limit: Option<f64>,
    #[serde(default)]
    pub weight_gain_limit_lbs: Option<f64>,
}

impl Scenario {
    pub fn patient_name(&self) -> &str {
        self.clinical_scenario
            .patient_name
            .as_deref()
            .or(self.patient_profile.name.as_deref())
            .unwrap_or("Patient")
    }

    /// Rounds to run. A scenario without a schedule runs one implicit round
    /// built from its top-level goal.
    pub fn round_plans(&self) -> Vec<RoundPlan> {
        if !self.rounds.is_empty() {
            return self.rounds.clone();
        }
        vec![RoundPlan {
            round: 1,
            week: 0,
            conversation_goal: self.conversation_goal.clone().unwrap_or_default(),
            vitals: None,
            adherence: None,
        }]
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len().max(1)
    }

    pub fn baseline_vitals(&self) -> &Vitals {
        &self.clinical_scenario.vitals
    }

    pub fn vitals_for(&self, plan: &RoundPlan) -> Vitals {
        match &plan.vitals {
            Some(vitals) => vitals.overlay(self.baseline_vitals()),
            None => self.baseline_vitals().clone(),
        }
    }

    /// Adherence reported at the most recent encounter: the round's own entries
    /// when present, otherwise the baseline.
    pub fn adherence_for<'a>(&'a self, plan: &'a RoundPlan) -> &'a [AdherenceEntry] {
        plan.adherence
            .as_deref()
            .unwrap_or(&self.clinical_scenario.adherence)
    }
}

const DOCUMENT_SHAPE: &str = "expected a list of scenarios or an object with a `conversations` list";

/// The top level is inspected before any scenario is decoded, so a bad entry
/// reports its own field error instead of a generic shape mismatch.
pub fn parse_scenarios_json(raw: &str) -> Result<Vec<Scenario>, serde_json::Error> {
    match serde_json::from_str::<serde_json::Value>(raw)? {
        list @ serde_json::Value::Array(_) => serde_json::from_value(list),
        serde_json::Value::Object(mut map) => match map.remove("conversations") {
            Some(list) => serde_json::from_value(list),
            None => Err(de::Error::custom(DOCUMENT_SHAPE)),
        },
        _ => Err(de::Error::custom(DOCUMENT_SHAPE)),
    }
}

pub fn parse_scenarios_yaml(raw: &str) -> Result<Vec<Scenario>, serde_yaml::Error> {
    match serde_yaml::from_str::<serde_yaml::Value>(raw)? {
        list @ serde_yaml::Value::Sequence(_) => serde_yaml::from_value(list),
        serde_yaml::Value::Mapping(mut map) => match map.remove("conversations") {
            Some(list) => serde_yaml::from_value(list),
            None => Err(de::Error::custom(DOCUMENT_SHAPE)),
        },
        _ => Err(de::Error::custom(DOCUMENT_SHAPE)),
    }
}

/// Loads a scenario file: either a list of scenarios or an object with a
/// `conversations` list. `.yaml`/`.yml` files are read as YAML, everything
/// else as JSON.
pub fn load_scenarios(path: impl AsRef<Path>) -> Result<Vec<Scenario>, SimulationError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Err(SimulationError::InvalidScenarioFile {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    }

    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let parsed = if matches!(ext, "yaml" | "yml") {
        parse_scenarios_yaml(&raw).map_err(|e| e.to_string())
    } else {
        parse_scenarios_json(&raw).map_err(|e| e.to_string())
    };

    parsed.map_err(|reason| SimulationError::InvalidScenarioFile {
        path: path.to_path_buf(),
        reason,
    })
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioFilter {
    pub limit: Option<usize>,
    pub min_rounds: Option<usize>,
    pub max_rounds: Option<usize>,
}

impl ScenarioFilter {
    pub fn apply(&self, mut scenarios: Vec<Scenario>) -> Vec<Scenario> {
        scenarios.retain(|s| {
            let count = s.round_count();
            self.min_rounds.map_or(true, |min| count >= min)
                && self.max_rounds.map_or(true, |max| count <= max)
        });
        if let Some(limit) = self.limit {
            scenarios.truncate(limit);
        }
        scenarios
    }
}
