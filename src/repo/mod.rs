pub mod engine;

pub use engine::{Engine, RevisionState, TagOutcome};
