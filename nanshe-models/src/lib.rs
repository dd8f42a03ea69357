//! Model providers for nanshe.
//!
//! The engine only ever talks to a [`ModelProvider`]: chat completions that
//! must come back as one JSON object, and embeddings. A model is chosen by a
//! `provider:model` id (`openai:gpt-4o-mini`, `ollama:llama3`,
//! `gemini:gemini-1.5-flash`); [`ProviderRegistry`] resolves the prefix to a
//! provider built from the keys in [`auth::CredentialStore`].
//!
//! Cost accounting lives here too: [`PricingTable`] prices a call per
//! million tokens and [`tokens`] estimates counts when a provider reports
//! none.

mod error;
mod pricing;

pub mod auth;
pub mod providers;
pub mod registry;
pub mod tokens;

pub use error::{Error, Result};
pub use providers::{Backend, ModelProvider};
pub use registry::ProviderRegistry;
pub use pricing::{Pricing, PricingTable};
