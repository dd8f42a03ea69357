//! Language model gateway
//!
//! Typed JSON completions on top of `nanshe-models` providers: strict JSON
//! prompting, reply repair and retry, and token/cost accounting per user.

mod gateway;
pub mod json;

pub use gateway::{JsonCompletion, LlmGateway};
