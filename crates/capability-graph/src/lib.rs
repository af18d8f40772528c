//! The typed capability dependency graph, its evidence-weighted confidence model, and the
//! intent-matching retrieval path (spec §4.5). Operates entirely against the
//! `CapabilityPersistence` trait seam (spec §6) -- this crate owns no storage of its own.

pub mod dependency;
pub mod matcher;
pub mod reliability;

pub use dependency::DependencyGraph;
pub use matcher::{MatchDecision, MatchResult, Matcher};
pub use reliability::TransitiveReliability;
