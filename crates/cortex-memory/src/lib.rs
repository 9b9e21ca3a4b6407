//! Cortex Memory - scoped memory entries with semantic recall
//!
//! Five scopes share one orchestrator:
//! - **personal**: visible only to the persona that discovered it
//! - **task** / **project**: visible to active participants of a context
//! - **team** / **global**: visible to every persona
//!
//! Entries are append-only. Only access metadata and the archive flag ever
//! change, so concurrent writers never race on content.

pub mod backend;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod participants;
pub mod store;

pub use backend::{InMemoryVectorStore, MemoryFilter, VectorStore};
pub use cache::{RecallCache, RecallKey};
pub use config::MemoryConfig;
pub use embedding::{cosine_similarity, Embedder, HashingEmbedder};
pub use participants::{MemoryNotice, ParticipantRegistry};
pub use store::{CleanupReport, MemoryStore};
