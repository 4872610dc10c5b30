pub mod llm;
pub mod rules;

pub use llm::LlmThesisClient;
pub use rules::{detect_red_flags, RuleBasedThesis};
