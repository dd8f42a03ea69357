//! Persistence layer backed by CozoDB.

mod coach;
mod cozo;
mod progress;
mod records;
pub mod schema;
mod tree;
mod users;
mod vectors;

pub use cozo::CozoStore;
pub use records::{NewFeedback, NewUsage};
pub use tree::{MoleculeOutline, NewCapsule};
pub use vectors::VectorStore;
