//! Transcript rewrite rules
//!
//! - `normalize`: text normalization used on both sides of a match
//! - `schema`: YAML rule file model
//! - `engine`: ordered matcher and hot-reloading rule engine

pub mod engine;
pub mod normalize;
pub mod schema;

pub use engine::{Rule, RuleEngine, RuleSet, Trigger};
pub use normalize::{normalize_basic, normalize_compact};
pub use schema::{RuleEntry, RuleFile};
