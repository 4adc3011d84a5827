//! Model providers for braid.
//!
//! `OpenAiCompatProvider` speaks the `/v1/chat/completions` dialect shared
//! by OpenAI, OpenRouter, and most self-hosted gateways. `ScriptedProvider`
//! replays canned responses for tests.

pub mod openai_compat;
pub mod scripted;

pub use openai_compat::OpenAiCompatProvider;
pub use scripted::ScriptedProvider;
