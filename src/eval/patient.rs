use std::sync::Arc;

use serde::Serialize;

use crate::{
    agents::{Agent, AgentError},
    types::ChatMessage,
    LLMProvider,
};

use super::{
    prompts::{PATIENT_OPENING_CUE, PATIENT_TEMPLATE},
    scenario::{RoundPlan, Scenario, Vitals},
};

/// What the simulated patient is responding to.
#[derive(Debug, Clone, Copy)]
pub enum PatientPrompt<'a> {
    /// First turn of the first round.
    Opening,
    /// First turn of a later round.
    FollowUp { week: u32 },
    /// The agent's last reply in the current round.
    Reply(&'a str),
}

impl PatientPrompt<'_> {
    pub fn text(&self) -> String {
        match self {
            PatientPrompt::Opening => PATIENT_OPENING_CUE.to_string(),
            PatientPrompt::FollowUp { week } => format!(
                "It is now week {week}. Begin this follow-up check-in with your care assistant as the patient."
            ),
            PatientPrompt::Reply(text) => text.to_string(),
        }
    }
}

#[derive(Serialize)]
struct MedicationView<'a> {
    name: &'a str,
    class: &'a str,
    current: &'a str,
    target: &'a str,
}

#[derive(Serialize)]
struct PatientTemplateData<'a> {
    patient_name: &'a str,
    education_level: &'a str,
    medical_literacy: &'a str,
    description: &'a str,
    medications: Vec<MedicationView<'a>>,
    therapy_complexity: &'a str,
    titration_stage: &'a str,
    week: u32,
    vitals: Option<String>,
    goal: &'a str,
}

pub fn describe_vitals(vitals: &Vitals) -> Option<String> {
    let mut parts = Vec::new();
    match (vitals.bp_systolic, vitals.bp_diastolic) {
        (Some(sbp), Some(dbp)) => parts.push(format!("blood pressure {sbp}/{dbp} mmHg")),
        (Some(sbp), None) => parts.push(format!("systolic blood pressure {sbp} mmHg")),
        _ => {}
    }
    if let Some(hr) = vitals.heart_rate {
        parts.push(format!("heart rate {hr} bpm"));
    }
    if let Some(spo2) = vitals.oxygen_saturation_pct {
        parts.push(format!("oxygen saturation {spo2}%"));
    }
    if let Some(weight) = vitals.weight_lbs {
        parts.push(format!("weight {weight} lbs"));
    }
    if let Some(change) = vitals.weight_change_lbs {
        parts.push(format!("weight change {change:+} lbs"));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Renders the patient role for one round of a scenario. `template` replaces
/// the built-in role text when given.
pub fn build_patient_agent(
    scenario: &Scenario,
    plan: &RoundPlan,
    template: Option<&str>,
) -> Result<Agent, AgentError> {
    let profile = &scenario.patient_profile;
    let clinical = &scenario.clinical_scenario;
    let vitals = scenario.vitals_for(plan);

    let data = PatientTemplateData {
        patient_name: scenario.patient_name(),
        education_level: profile.education_level.as_deref().unwrap_or("Unknown"),
        medical_literacy: profile.medical_literacy.as_deref().unwrap_or("Unknown"),
        description: profile.description.as_deref().unwrap_or(""),
        medications: clinical
            .medications
            .iter()
            .map(|med| MedicationView {
                name: &med.name,
                class: &med.class,
                current: &med.current,
                target: &med.target,
            })
            .collect(),
        therapy_complexity: clinical.therapy_complexity.as_deref().unwrap_or("Unknown"),
        titration_stage: clinical.titration_stage.as_deref().unwrap_or("Unknown"),
        week: plan.week,
        vitals: describe_vitals(&vitals),
        goal: &plan.conversation_goal,
    };

    Agent::from_handlebars_str(
        "Patient Simulator",
        template.unwrap_or(PATIENT_TEMPLATE),
        &data,
    )
}

/// Simulated patient for one (scenario, round) pair.
pub struct PatientSimulator {
    agent: Agent,
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl PatientSimulator {
    pub fn new(agent: Agent, provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            agent,
            provider,
            model: model.into(),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// One model call; the output is returned as-is, empty when the model
    /// produced nothing. Errors propagate without retry.
    pub async fn next_utterance(&self, prompt: PatientPrompt<'_>) -> Result<String, AgentError> {
        let history = [ChatMessage::user(prompt.text())];
        self.agent
            .complete(self.provider.as_ref(), &self.model, &history)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{eval::scenario::parse_scenarios_json, providers::scripted::ScriptedProvider};

    fn scenario() -> Scenario {
        parse_scenarios_json(
            r#"[{
                "id": "p1",
                "patient_profile": {"education_level": "High school", "medical_literacy": "Low"},
                "clinical_scenario": {
                    "patient_name": "Ethan Bailey",
                    "medications": [{"name": "Losartan", "type": "ARB", "current": "25mg daily", "target": "100mg daily"}],
                    "vitals": {"sbp": 112, "dbp": 70, "hr": 64}
                },
                "rounds": [{"round": 1, "week": 2, "conversation_goal": "Mention ankle swelling"}]
            }]"#,
        )
        .unwrap()
        .remove(0)
    }

    #[test]
    fn renders_profile_medications_and_goal() {
        let scenario = scenario();
        let plan = &scenario.round_plans()[0];
        let agent = build_patient_agent(&scenario, plan, None).unwrap();
        let text = agent.instructions();
        assert!(text.contains("Ethan Bailey"));
        assert!(text.contains("Losartan (ARB): currently 25mg daily, target 100mg daily"));
        assert!(text.contains("Mention ankle swelling"));
        assert!(text.contains("blood pressure 112/70 mmHg"));
        assert!(text.contains("Week of follow-up: 2"));
    }

    #[test]
    fn custom_template_replaces_default() {
        let scenario = scenario();
        let plan = &scenario.round_plans()[0];
        let agent = build_patient_agent(&scenario, plan, Some("I am {{patient_name}}.")).unwrap();
        assert_eq!(agent.instructions(), "I am Ethan Bailey.");
    }

    #[test]
    fn follow_up_prompt_names_week() {
        assert!(PatientPrompt::FollowUp { week: 4 }.text().contains("week 4"));
        assert_eq!(PatientPrompt::Reply("How are you?").text(), "How are you?");
    }

    #[tokio::test]
    async fn empty_model_output_becomes_empty_string() {
        let scenario = scenario();
        let plan = &scenario.round_plans()[0];
        let agent = build_patient_agent(&scenario, plan, None).unwrap();
        let provider: Arc<dyn LLMProvider> =
            Arc::new(ScriptedProvider::new().with_fixed("roleplaying as the patient", ""));
        let simulator = PatientSimulator::new(agent, provider, "m");
        let utterance = simulator.next_utterance(PatientPrompt::Opening).await.unwrap();
        assert_eq!(utterance, "");
    }
}
