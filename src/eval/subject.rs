use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    agents::{Agent, AgentError},
    ChatMessage, LLMProvider,
};

use super::{
    prompts::{
        COORDINATOR_INSTRUCTIONS, HANDOFF_MARKER, INTAKE_INSTRUCTIONS, RECOMMENDATION_INSTRUCTIONS,
        TITRATION_INSTRUCTIONS, VERIFICATION_INSTRUCTIONS, VERIFIED_PLAN_CUE,
    },
    scenario::Scenario,
    transcript::Transcript,
};

/// The assistant under evaluation. It sees the whole conversation so far,
/// across rounds, and returns one reply.
#[async_trait]
pub trait SubjectAgent: Send + Sync {
    async fn respond(&self, transcript: &Transcript) -> Result<String, AgentError>;

    fn name(&self) -> &str;
}

/// Subject backed by a single prompted model role.
pub struct PromptedSubject {
    agent: Agent,
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl PromptedSubject {
    pub fn new(agent: Agent, provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            agent,
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl SubjectAgent for PromptedSubject {
    async fn respond(&self, transcript: &Transcript) -> Result<String, AgentError> {
        let history = transcript.to_chat_messages();
        self.agent
            .complete(self.provider.as_ref(), &self.model, &history)
            .await
    }

    fn name(&self) -> &str {
        self.agent.name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    /// Fixed four-step intake assistant.
    Intake,
    /// Titration assistant primed with the scenario's medications.
    Titration,
    /// Coordinator that hands a patient summary to a recommendation step and
    /// a verification step before answering.
    Verified,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Intake => "intake",
            SubjectKind::Titration => "titration",
            SubjectKind::Verified => "verified",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrated subject. The coordinator talks with the patient until it
/// emits a summary; the summary then goes through a recommendation agent and
/// a verification agent, and the coordinator relays the verified plan.
pub struct VerifiedSubject {
    coordinator: Agent,
    recommender: Agent,
    verifier: Agent,
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl VerifiedSubject {
    pub fn new(scenario: &Scenario, provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            coordinator: Agent::from_string(
                "Verified Titration Assistant",
                format!("{}\n\n{}", scenario_brief(scenario), COORDINATOR_INSTRUCTIONS),
            ),
            recommender: Agent::from_string("Recommendation Agent", RECOMMENDATION_INSTRUCTIONS),
            verifier: Agent::from_string("Verification Agent", VERIFICATION_INSTRUCTIONS)
                .with_temperature(0.0),
            provider,
            model: model.into(),
        }
    }
}

fn handoff_summary(reply: &str) -> Option<&str> {
    let rest = reply.trim_start().strip_prefix(HANDOFF_MARKER)?;
    Some(rest.trim_start_matches(':').trim())
}

#[async_trait]
impl SubjectAgent for VerifiedSubject {
    async fn respond(&self, transcript: &Transcript) -> Result<String, AgentError> {
        let provider = self.provider.as_ref();
        let mut history = transcript.to_chat_messages();

        let draft = self.coordinator.complete(provider, &self.model, &history).await?;
        let Some(summary) = handoff_summary(&draft) else {
            return Ok(draft);
        };

        let recommendation = self
            .recommender
            .complete(provider, &self.model, &[ChatMessage::user(summary)])
            .await?;
        let verified = self
            .verifier
            .complete(
                provider,
                &self.model,
                &[ChatMessage::user(format!(
                    "PATIENT SUMMARY:\n{summary}\n\nPROPOSED RECOMMENDATION:\n{recommendation}"
                ))],
            )
            .await?;
        tracing::debug!(
            recommendation = %recommendation,
            verified = %verified,
            "recommendation verified"
        );

        history.push(ChatMessage::assistant(draft.as_str()));
        history.push(ChatMessage::user(format!("{VERIFIED_PLAN_CUE}\n{verified}")));
        self.coordinator.complete(provider, &self.model, &history).await
    }

    fn name(&self) -> &str {
        self.coordinator.name()
    }
}

/// Scenario context the titration assistant starts from.
pub fn scenario_brief(scenario: &Scenario) -> String {
    let mut brief = format!("PATIENT: {}\nCURRENT MEDICATIONS:\n", scenario.patient_name());
    for med in &scenario.clinical_scenario.medications {
        brief.push_str(&format!(
            "- {} ({}) | current {} | target {}\n",
            med.name, med.class, med.current, med.target
        ));
    }
    if let Some(stage) = &scenario.clinical_scenario.titration_stage {
        brief.push_str(&format!("TITRATION STAGE: {stage}\n"));
    }
    brief
}

/// Factory for subject agents, keyed by [`SubjectKind`].
pub fn build_subject(
    kind: SubjectKind,
    scenario: &Scenario,
    provider: Arc<dyn LLMProvider>,
    model: &str,
) -> Arc<dyn SubjectAgent> {
    let agent = match kind {
        SubjectKind::Intake => Agent::from_string("Patient Intake Agent", INTAKE_INSTRUCTIONS),
        SubjectKind::Titration => Agent::from_string(
            "Titration Assistant",
            format!("{}\n\n{}", scenario_brief(scenario), TITRATION_INSTRUCTIONS),
        ),
        SubjectKind::Verified => {
            return Arc::new(VerifiedSubject::new(scenario, provider, model));
        }
    };
    Arc::new(PromptedSubject::new(agent, provider, model))
}
