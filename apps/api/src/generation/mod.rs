// Résumé generation: prompt construction and the provider fallback chain.
// All provider calls go through llm_client; nothing here speaks HTTP.

pub mod chain;
pub mod prompts;

pub use chain::{GenerationChain, Provider};
