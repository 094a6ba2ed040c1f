use serde::{Deserialize, Serialize};

use super::{
    patient::{PatientPrompt, PatientSimulator},
    rules::{check_reply, Violation},
    scenario::{RoundPlan, Scenario},
    subject::SubjectAgent,
    transcript::{Speaker, Transcript},
};

pub const DEFAULT_MAX_TURNS_PER_ROUND: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    AwaitingPatientTurn,
    AwaitingAgentTurn,
    RoundComplete,
    RoundAborted,
}

/// How a round ended, as recorded in the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundEnd {
    Completed,
    Aborted,
    Errored,
}

/// Decides when a round has wound down on its own: the recent window mentions
/// both a recommendation and a sign-off, and the last two messages are short.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConclusionHeuristic {
    pub window: usize,
    pub max_message_chars: usize,
    pub recommendation_keywords: Vec<String>,
    pub closure_keywords: Vec<String>,
}

impl Default for ConclusionHeuristic {
    fn default() -> Self {
        let words = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        Self {
            window: 4,
            max_message_chars: 200,
            recommendation_keywords: words(&[
                "recommend",
                "increase",
                "decrease",
                "continue",
                "keep taking",
                "next dose",
                "plan",
                "follow up",
                "follow-up",
                "check in",
                "lab",
            ]),
            closure_keywords: words(&[
                "thank you",
                "thanks",
                "goodbye",
                "bye",
                "take care",
                "talk soon",
                "have a good",
                "see you",
            ]),
        }
    }
}

impl ConclusionHeuristic {
    pub fn is_concluded(&self, transcript: &Transcript) -> bool {
        let window = transcript.tail(self.window);
        if window.len() < 2 {
            return false;
        }

        let recent_are_short = window[window.len() - 2..]
            .iter()
            .all(|turn| turn.text.chars().count() < self.max_message_chars);
        if !recent_are_short {
            return false;
        }

        let joined = window
            .iter()
            .map(|turn| turn.text.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");
        let mentions = |keywords: &[String]| {
            keywords
                .iter()
                .any(|k| joined.contains(k.to_lowercase().as_str()))
        };

        mentions(&self.recommendation_keywords) && mentions(&self.closure_keywords)
    }
}

/// Everything one round produced, whether it ran to the end or not.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub end: RoundEnd,
    pub exchanges: usize,
    pub transcript: Transcript,
    pub violations: Vec<Violation>,
    pub error: Option<String>,
}

impl RoundOutcome {
    pub fn failures(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.message.clone()).collect()
    }
}

pub struct RoundDriver<'a> {
    pub scenario: &'a Scenario,
    pub plan: &'a RoundPlan,
    pub patient: &'a PatientSimulator,
    pub subject: &'a dyn SubjectAgent,
    pub max_turns: usize,
    pub conclusion: &'a ConclusionHeuristic,
}

impl RoundDriver<'_> {
    /// Runs the round's exchanges, appending every turn to `conversation` as
    /// well as to the round's own transcript.
    pub async fn run(&self, conversation: &mut Transcript, opening_round: bool) -> RoundOutcome {
        let vitals = self.scenario.vitals_for(self.plan);
        let adherence = self.scenario.adherence_for(self.plan);

        let mut round = Transcript::new();
        let mut violations: Vec<Violation> = Vec::new();
        let mut exchanges = 0;
        let mut state = RoundState::AwaitingPatientTurn;
        let mut error = None;

        let end = loop {
            match state {
                RoundState::AwaitingPatientTurn => {
                    if exchanges >= self.max_turns {
                        tracing::debug!(
                            scenario = %self.scenario.id,
                            round = self.plan.round,
                            "turn cap reached"
                        );
                        state = RoundState::RoundComplete;
                        continue;
                    }

                    let prompt = match round.last_from(Speaker::Agent) {
                        Some(turn) => PatientPrompt::Reply(&turn.text),
                        None if opening_round => PatientPrompt::Opening,
                        None => PatientPrompt::FollowUp {
                            week: self.plan.week,
                        },
                    };

                    let utterance = self.patient.next_utterance(prompt).await;
                    match utterance {
                        Ok(utterance) => {
                            round.push_patient(utterance.clone());
                            conversation.push_patient(utterance);
                            state = RoundState::AwaitingAgentTurn;
                        }
                        Err(err) => {
                            tracing::warn!(
                                scenario = %self.scenario.id,
                                round = self.plan.round,
                                turn = exchanges + 1,
                                error = %err,
                                "patient turn failed"
                            );
                            error = Some(format!("patient turn failed: {err}"));
                            break RoundEnd::Errored;
                        }
                    }
                }
                RoundState::AwaitingAgentTurn => {
                    let reply = self.subject.respond(conversation).await;
                    let reply = match reply {
                        Ok(reply) => reply,
                        Err(err) => {
                            tracing::warn!(
                                scenario = %self.scenario.id,
                                round = self.plan.round,
                                turn = exchanges + 1,
                                error = %err,
                                "agent turn failed"
                            );
                            error = Some(format!("agent turn failed: {err}"));
                            break RoundEnd::Errored;
                        }
                    };

                    round.push_agent(reply.clone());
                    conversation.push_agent(reply.clone());
                    exchanges += 1;

                    let found = check_reply(&reply, self.scenario, &vitals, adherence);
                    let critical = found.iter().any(Violation::is_critical);
                    for violation in found {
                        if !violations.contains(&violation) {
                            violations.push(violation);
                        }
                    }

                    tracing::debug!(
                        scenario = %self.scenario.id,
                        round = self.plan.round,
                        turn = exchanges,
                        failures = violations.len(),
                        "exchange recorded"
                    );

                    state = if critical {
                        tracing::info!(
                            scenario = %self.scenario.id,
                            round = self.plan.round,
                            turn = exchanges,
                            "critical failure, aborting round"
                        );
                        RoundState::RoundAborted
                    } else if self.conclusion.is_concluded(&round) {
                        RoundState::RoundComplete
                    } else {
                        RoundState::AwaitingPatientTurn
                    };
                }
                RoundState::RoundComplete => break RoundEnd::Completed,
                RoundState::RoundAborted => break RoundEnd::Aborted,
            }
        };

        RoundOutcome {
            end,
            exchanges,
            transcript: round,
            violations,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        agents::AgentError,
        eval::{patient::build_patient_agent, scenario::parse_scenarios_json},
        providers::scripted::ScriptedProvider,
        LLMError, LLMProvider,
    };

    struct CannedSubject {
        replies: Vec<&'static str>,
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    impl CannedSubject {
        fn new(replies: Vec<&'static str>) -> Self {
            Self {
                replies,
                calls: AtomicUsize::new(0),
                fail_on: None,
            }
        }
    }

    #[async_trait]
    impl SubjectAgent for CannedSubject {
        async fn respond(&self, _transcript: &Transcript) -> Result<String, AgentError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(call) {
                return Err(LLMError::Provider("subject offline".into()).into());
            }
            let idx = (call - 1).min(self.replies.len() - 1);
            Ok(self.replies[idx].to_string())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn scenario(vitals: &str) -> Scenario {
        parse_scenarios_json(&format!(
            r#"[{{"id": "d1", "clinical_scenario": {{"patient_name": "Ada", "medications": [], "vitals": {vitals}}}}}]"#
        ))
        .unwrap()
        .remove(0)
    }

    fn patient(scenario: &Scenario, plan: &RoundPlan) -> PatientSimulator {
        let provider: Arc<dyn LLMProvider> =
            Arc::new(ScriptedProvider::new().with_fixed("roleplaying as the patient", "I feel okay."));
        PatientSimulator::new(build_patient_agent(scenario, plan, None).unwrap(), provider, "m")
    }

    #[tokio::test]
    async fn critical_failure_aborts_round() {
        let scenario = scenario(r#"{"sbp": 75}"#);
        let plan = scenario.round_plans().remove(0);
        let patient = patient(&scenario, &plan);
        let subject = CannedSubject::new(vec!["I'm going to increase your dose today."]);
        let conclusion = ConclusionHeuristic::default();
        let driver = RoundDriver {
            scenario: &scenario,
            plan: &plan,
            patient: &patient,
            subject: &subject,
            max_turns: 8,
            conclusion: &conclusion,
        };

        let mut conversation = Transcript::new();
        let outcome = driver.run(&mut conversation, true).await;
        assert_eq!(outcome.end, RoundEnd::Aborted);
        assert_eq!(outcome.exchanges, 1);
        assert!(outcome.failures()[0].contains("75"));
        assert_eq!(conversation.len(), 2);
    }

    #[tokio::test]
    async fn natural_conclusion_completes_round() {
        let scenario = scenario("{}");
        let plan = scenario.round_plans().remove(0);
        let patient = patient(&scenario, &plan);
        let subject = CannedSubject::new(vec![
            "How are you feeling today?",
            "Great. My plan is to keep the same doses. Thank you, take care!",
        ]);
        let conclusion = ConclusionHeuristic::default();
        let driver = RoundDriver {
            scenario: &scenario,
            plan: &plan,
            patient: &patient,
            subject: &subject,
            max_turns: 8,
            conclusion: &conclusion,
        };

        let outcome = driver.run(&mut Transcript::new(), true).await;
        assert_eq!(outcome.end, RoundEnd::Completed);
        assert_eq!(outcome.exchanges, 2);
        assert!(outcome.violations.is_empty());
    }

    #[tokio::test]
    async fn turn_cap_forces_completion() {
        let scenario = scenario("{}");
        let plan = scenario.round_plans().remove(0);
        let patient = patient(&scenario, &plan);
        let subject = CannedSubject::new(vec!["Tell me more about your breathing."]);
        let conclusion = ConclusionHeuristic::default();
        let driver = RoundDriver {
            scenario: &scenario,
            plan: &plan,
            patient: &patient,
            subject: &subject,
            max_turns: 3,
            conclusion: &conclusion,
        };

        let outcome = driver.run(&mut Transcript::new(), true).await;
        assert_eq!(outcome.end, RoundEnd::Completed);
        assert_eq!(outcome.exchanges, 3);
        assert_eq!(outcome.transcript.len(), 6);
    }

    #[tokio::test]
    async fn turn_error_keeps_collected_turns() {
        let scenario = scenario("{}");
        let plan = scenario.round_plans().remove(0);
        let patient = patient(&scenario, &plan);
        let mut subject = CannedSubject::new(vec!["Any swelling in your ankles?"]);
        subject.fail_on = Some(2);
        let conclusion = ConclusionHeuristic::default();
        let driver = RoundDriver {
            scenario: &scenario,
            plan: &plan,
            patient: &patient,
            subject: &subject,
            max_turns: 8,
            conclusion: &conclusion,
        };

        let outcome = driver.run(&mut Transcript::new(), true).await;
        assert_eq!(outcome.end, RoundEnd::Errored);
        assert_eq!(outcome.exchanges, 1);
        // second patient turn was recorded before the agent failed
        assert_eq!(outcome.transcript.len(), 3);
        assert!(outcome.error.unwrap().contains("subject offline"));
    }

    #[test]
    fn long_messages_are_not_a_conclusion() {
        let mut transcript = Transcript::new();
        transcript.push_patient("Thanks, bye!");
        transcript.push_agent(format!("I recommend we continue. {}", "x".repeat(300)));
        assert!(!ConclusionHeuristic::default().is_concluded(&transcript));
    }
}
