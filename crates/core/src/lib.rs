//! # Braid Core
//!
//! Domain types, traits, and error definitions for the Braid chat service.
//! This crate has **zero framework dependencies** — it defines the domain
//! model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The two external collaborators — persistence (`ChatStore`) and the LLM
//! completion endpoint (`Provider`) — are defined as traits here and
//! injected into the context-assembly core. This enables:
//! - Swapping backends via configuration
//! - Deterministic testing with in-memory / scripted implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod facts;
pub mod message;
pub mod provider;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{ContextError, Error, ProviderError, Result, StoreError};
pub use facts::FactMap;
pub use message::{Branch, BranchId, ChatMessage, Role, Session, SessionId, StoredMessage, Summary};
pub use provider::{CompletionRequest, CompletionResponse, Provider, Usage};
pub use store::{ChatStore, MessageScope};
