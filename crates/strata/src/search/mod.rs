//! Fusion search
//!
//! Combines an external lexical engine and an external vector engine into one
//! ranked result list. See [`FusionSearchEngine`] for the pipeline.

pub mod adjust;
pub mod cache;
pub mod engine;
pub mod fallback;
pub mod fusion;
pub mod pipeline;
pub mod types;

pub use engine::{
    LexicalEngine, LexicalHit, LexicalQuery, RecordLookup, VectorEngine, VectorHit, VectorQuery,
};
pub use pipeline::{FusionSearchEngine, SearchStats};
pub use types::{FusionMethod, MatchMethod, SearchMode, SearchOptions, SearchResult};
