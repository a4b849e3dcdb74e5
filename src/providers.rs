//! Upstream provider implementations.

pub mod agent_api;
pub mod openrouter;

// Re-export for convenience
pub use agent_api::AgentApiProvider;
pub use openrouter::OpenRouterProvider;
