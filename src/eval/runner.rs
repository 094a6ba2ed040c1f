use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use futures_util::future::join_all;

use crate::{error::SimulationError, LLMProvider};

use super::{
    config::SimulationConfig,
    driver::{RoundDriver, RoundEnd},
    judge::{OutcomeExtractor, RoundEvaluator},
    patient::{build_patient_agent, PatientSimulator},
    report::{BatchSummary, ConversationResult, ConversationStatus, RoundRecord},
    scenario::Scenario,
    subject::{build_subject, SubjectAgent},
    transcript::Transcript,
};

pub type SubjectFactory =
    Arc<dyn Fn(&Scenario) -> Result<Arc<dyn SubjectAgent>, SimulationError> + Send + Sync>;

/// Runs scenario batches end to end: dialogue, round evaluation, outcome
/// extraction and persistence. Provider, judge and extractor are shared by
/// every conversation.
pub struct BatchRunner {
    config: SimulationConfig,
    provider: Arc<dyn LLMProvider>,
    evaluator: Arc<RoundEvaluator>,
    extractor: Arc<OutcomeExtractor>,
    subject_factory: SubjectFactory,
    patient_template: Option<String>,
}

impl BatchRunner {
    pub fn new(config: SimulationConfig, provider: Arc<dyn LLMProvider>) -> Self {
        let evaluator = Arc::new(RoundEvaluator::new(provider.clone(), config.judge_model()));
        let extractor = Arc::new(OutcomeExtractor::new(provider.clone(), config.judge_model()));

        let kind = config.subject;
        let subject_provider = provider.clone();
        let model = config.model.clone();
        let subject_factory: SubjectFactory = Arc::new(
            move |scenario: &Scenario| -> Result<Arc<dyn SubjectAgent>, SimulationError> {
                Ok(build_subject(kind, scenario, subject_provider.clone(), &model))
            },
        );

        Self {
            config,
            provider,
            evaluator,
            extractor,
            subject_factory,
            patient_template: None,
        }
    }

    /// Loads the patient template named in the config, if any.
    pub fn with_configured_template(mut self) -> Result<Self, SimulationError> {
        if let Some(path) = &self.config.patient_template {
            self.patient_template = Some(fs::read_to_string(path)?);
        }
        Ok(self)
    }

    pub fn with_subject_factory(mut self, factory: SubjectFactory) -> Self {
        self.subject_factory = factory;
        self
    }

    pub async fn run(&self, scenarios: &[Scenario]) -> Result<BatchSummary, SimulationError> {
        fs::create_dir_all(&self.config.output_dir)?;

        let batch_size = self.config.batch_size.max(1);
        let mut results = Vec::with_capacity(scenarios.len());
        let paths = result_paths(
            &self.config.output_dir,
            scenarios.iter().map(|scenario| scenario.id.as_str()),
        );
        let jobs: Vec<(&Scenario, PathBuf)> = scenarios.iter().zip(paths).collect();

        for (index, chunk) in jobs.chunks(batch_size).enumerate() {
            tracing::info!(batch = index + 1, size = chunk.len(), "starting batch");
            let finished = join_all(
                chunk
                    .iter()
                    .map(|(scenario, path)| self.run_and_persist(scenario, path)),
            )
            .await;
            results.extend(finished);
        }

        let subject = results
            .first()
            .map(|r| r.subject.clone())
            .unwrap_or_else(|| self.config.subject.to_string());
        let generated_at = Utc::now();
        let summary = BatchSummary::from_results(subject, &results, generated_at);

        let path = self.config.output_dir.join(format!(
            "summary_{}.json",
            generated_at.format("%Y%m%dT%H%M%SZ")
        ));
        fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
        tracing::info!(
            path = %path.display(),
            conversations = summary.conversations,
            completed = summary.completed,
            "batch summary written"
        );

        Ok(summary)
    }

    async fn run_and_persist(&self, scenario: &Scenario, path: &Path) -> ConversationResult {
        let result = self.run_conversation(scenario).await;
        match persist(path, &result) {
            Ok(()) => tracing::debug!(scenario = %scenario.id, path = %path.display(), "result saved"),
            Err(err) => tracing::error!(scenario = %scenario.id, error = %err, "failed to save result"),
        }
        result
    }

    /// Drives every selected round of one scenario, evaluating each round as
    /// soon as its turns finish. Never fails; problems end up in the result.
    pub async fn run_conversation(&self, scenario: &Scenario) -> ConversationResult {
        let started_at = Utc::now();
        tracing::info!(scenario = %scenario.id, "conversation started");

        let subject = match (self.subject_factory)(scenario) {
            Ok(subject) => subject,
            Err(err) => {
                tracing::error!(scenario = %scenario.id, error = %err, "could not build subject agent");
                return ConversationResult {
                    scenario_id: scenario.id.clone(),
                    subject: self.config.subject.to_string(),
                    status: ConversationStatus::Failed,
                    success: false,
                    error: Some(err.to_string()),
                    transcript: Transcript::new(),
                    rounds: Vec::new(),
                    protocol_outcome: None,
                    started_at,
                    finished_at: Utc::now(),
                };
            }
        };

        let mut transcript = Transcript::new();
        let mut rounds: Vec<RoundRecord> = Vec::new();
        let mut error = None;

        for (index, plan) in self.config.selected_rounds(scenario).iter().enumerate() {
            let agent = match build_patient_agent(scenario, plan, self.patient_template.as_deref()) {
                Ok(agent) => agent,
                Err(err) => {
                    error = Some(format!("patient setup failed: {err}"));
                    break;
                }
            };
            let patient =
                PatientSimulator::new(agent, self.provider.clone(), self.config.patient_model());

            let driver = RoundDriver {
                scenario,
                plan,
                patient: &patient,
                subject: subject.as_ref(),
                max_turns: self.config.max_turns_per_round,
                conclusion: &self.config.conclusion,
            };
            let outcome = driver.run(&mut transcript, index == 0).await;

            let evaluation = if outcome.exchanges == 0 {
                None
            } else {
                let vitals = scenario.vitals_for(plan);
                match self
                    .evaluator
                    .evaluate(&outcome.transcript, scenario, &vitals, &outcome.failures())
                    .await
                {
                    Ok(evaluation) => Some(evaluation),
                    Err(err) => {
                        tracing::warn!(scenario = %scenario.id, round = plan.round, error = %err, "round evaluation failed");
                        None
                    }
                }
            };

            tracing::info!(
                scenario = %scenario.id,
                round = plan.round,
                end = ?outcome.end,
                exchanges = outcome.exchanges,
                score = evaluation.as_ref().map(|e| e.weighted_score),
                "round finished"
            );

            let errored = outcome.end == RoundEnd::Errored;
            rounds.push(RoundRecord {
                round: plan.round,
                week: plan.week,
                end: outcome.end,
                exchanges: outcome.exchanges,
                transcript: outcome.transcript,
                violations: outcome.violations,
                error: outcome.error.clone(),
                evaluation,
            });

            if errored {
                error = outcome.error;
                break;
            }
        }

        let protocol_outcome = if transcript.is_empty() {
            None
        } else {
            match self.extractor.extract(&transcript, scenario).await {
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    tracing::warn!(scenario = %scenario.id, error = %err, "outcome extraction failed");
                    None
                }
            }
        };

        let status = match &error {
            None => ConversationStatus::Completed,
            Some(_) if rounds.iter().any(|r| r.exchanges > 0) => ConversationStatus::Partial,
            Some(_) => ConversationStatus::Failed,
        };

        tracing::info!(scenario = %scenario.id, status = ?status, rounds = rounds.len(), "conversation finished");

        ConversationResult {
            scenario_id: scenario.id.clone(),
            subject: subject.name().to_string(),
            status,
            success: status == ConversationStatus::Completed,
            error,
            transcript,
            rounds,
            protocol_outcome,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// File name safe form of a scenario id.
pub fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "conversation".to_string()
    } else {
        cleaned
    }
}

/// One result file per scenario. Ids that sanitize to the same name (compared
/// case-insensitively) get `_2`, `_3`, ... suffixes in input order.
pub fn result_paths<'a>(
    output_dir: &Path,
    scenario_ids: impl IntoIterator<Item = &'a str>,
) -> Vec<PathBuf> {
    let mut taken = HashSet::new();
    scenario_ids
        .into_iter()
        .map(|id| {
            let base = sanitize_id(id);
            let mut name = base.clone();
            let mut n = 1;
            while !taken.insert(name.to_ascii_lowercase()) {
                n += 1;
                name = format!("{base}_{n}");
            }
            output_dir.join(format!("{name}.json"))
        })
        .collect()
}

fn persist(path: &Path, result: &ConversationResult) -> Result<(), SimulationError> {
    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_ids_for_file_names() {
        assert_eq!(sanitize_id("hf-001"), "hf-001");
        assert_eq!(sanitize_id("case 7/round:2"), "case_7_round_2");
        assert_eq!(sanitize_id("../etc"), "_etc");
        assert_eq!(sanitize_id(""), "conversation");
    }

    #[test]
    fn colliding_ids_get_distinct_files() {
        let out = Path::new("out");
        let paths = result_paths(out, ["hf/1", "hf_1", "HF_1", "a b", "hf_1_2"]);
        assert_eq!(
            paths,
            vec![
                out.join("hf_1.json"),
                out.join("hf_1_2.json"),
                out.join("HF_1_3.json"),
                out.join("a_b.json"),
                out.join("hf_1_2_2.json"),
            ]
        );
    }
}
