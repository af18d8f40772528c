//! Embedding providers and intent-similarity search (spec §6 "Embedding interface"; SPEC_FULL.md
//! §0: "an in-process mock provider and an HTTP-based provider, for testability, since the
//! embedding model itself is a non-goal"). `EmbeddingProvider` itself lives in
//! `capability-core::traits` so the store and graph crates can depend on the trait without
//! depending on any concrete provider.

pub mod mock;
pub mod similarity;

#[cfg(feature = "http-provider")]
pub mod http;

pub use mock::HashEmbeddingProvider;
pub use similarity::cosine_similarity;
