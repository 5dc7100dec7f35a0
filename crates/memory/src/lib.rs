//! Storage implementations for NeonChat personalization.
//!
//! - [`InMemoryMemoryStore`]: capped long-term memory with importance-based eviction
//! - [`InMemorySettingsStore`]: user settings and custom modes
//! - [`InMemorySemanticIndex`]: embedding-backed semantic recall
//! - [`NoopSemanticRecall`]: recall disabled

pub mod in_memory;
pub mod noop;
pub mod semantic;
pub mod settings;
pub mod vector;

pub use in_memory::InMemoryMemoryStore;
pub use noop::NoopSemanticRecall;
pub use semantic::InMemorySemanticIndex;
pub use settings::InMemorySettingsStore;
pub use vector::{cosine_similarity, rank_hits};
