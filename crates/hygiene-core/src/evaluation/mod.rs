//! Rule-driven cleanliness evaluation.

pub mod evaluator;
pub mod rules;

pub use evaluator::{overall_confidence, CleanlinessEvaluator, TOP_LABELS_FOR_CONFIDENCE};
pub use rules::{CleanlinessRules, RulesConfig, DEFAULT_NEGATIVE_VOCABULARY};
