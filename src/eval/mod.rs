pub mod config;
pub mod driver;
pub mod judge;
pub mod patient;
pub mod prompts;
pub mod report;
pub mod rules;
pub mod runner;
pub mod scenario;
pub mod subject;
pub mod transcript;

pub use config::SimulationConfig;
pub use driver::{ConclusionHeuristic, RoundDriver, RoundEnd, RoundOutcome, RoundState};
pub use judge::{OutcomeExtractor, ProtocolOutcome, RoundEvaluation, RoundEvaluator};
pub use report::{Assessment, BatchSummary, ConversationResult, ConversationStatus, RoundRecord};
pub use rules::{RuleKind, Violation};
pub use runner::BatchRunner;
pub use scenario::{load_scenarios, Scenario, ScenarioFilter};
pub use subject::{build_subject, PromptedSubject, SubjectAgent, SubjectKind, VerifiedSubject};
pub use transcript::{Speaker, Transcript, Turn};
