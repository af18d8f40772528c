//! The Semantic Hasher and the capability save/search pipeline (spec §4.4): the only crate that
//! actually persists anything, via an in-memory reference `CapabilityPersistence` (the database
//! engine itself is a non-goal, per spec §1).

pub mod hasher;
pub mod memory;
pub mod pipeline;
pub mod schema;

pub use hasher::{canonicalize, semantic_hash, topological_order};
pub use memory::{CapabilityRegistration, InMemoryResolver, InMemoryStore};
pub use pipeline::{CapabilityPipeline, SaveCapabilityInput, SaveCapabilityOutput, TraceInput};
