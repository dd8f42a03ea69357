//! nanshe-engine - Adaptive course generation
//!
//! Turns a free-text topic into a course tree (Capsule → Granule →
//! Molecule → Atom), distributes XP over it, and tracks learner progress,
//! spaced repetition and coaching. Everything is persisted in CozoDB,
//! including the vector entries used for classification and retrieval.
//!
//! # Architecture
//!
//! ```text
//!  topic ──► TaxonomyClassifier ──► Planner ──► CapsuleBuilder ──► AtomFactory
//!                 │                    │             │                  │
//!                 └──────────┬─────────┴─────────────┴──────────────────┘
//!                            ▼
//!            CozoStore (tree, vectors, progress, coach, usage)
//!                            ▲
//!            ProgressService / CoachService / xp
//! ```

pub mod atoms;
pub mod builder;
pub mod classifier;
pub mod coach;
pub mod config;
pub mod content;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generator;
pub mod llm;
pub mod planner;
pub mod progress;
pub mod store;
pub mod types;
pub mod worker;
pub mod xp;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use store::{CozoStore, VectorStore};
pub use types::*;
