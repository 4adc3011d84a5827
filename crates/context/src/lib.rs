//! Context assembly — the core of Braid.
//!
//! Given a potentially unbounded history of exchanged messages, this crate
//! decides exactly which prior content is forwarded to the model for each
//! turn:
//!
//! 1. **Branch resolution** — flatten a session + optional branch into the
//!    effective ordered history (shared prefix + branch tail).
//! 2. **Strategy dispatch** — one of four interchangeable policies turns
//!    (system prompt, history, auxiliary state) into the final bounded
//!    message list.
//! 3. **Chunked summarization** — full chunks of 10 old messages are
//!    compressed into cached, write-once natural-language summaries; only
//!    the trailing partial chunk is ever sent verbatim.
//! 4. **Fact memory** — a best-effort extractor keeps a small key-value
//!    map of durable facts up to date across turns.
//!
//! Persistence and the completion endpoint are injected capabilities
//! (`ChatStore`, `Provider` from `braid-core`); nothing here owns their
//! lifecycle.

pub mod facts;
pub mod history;
pub mod strategy;
pub mod summarizer;

pub use facts::FactExtractor;
pub use history::resolve_history;
pub use strategy::{ContextBuilder, ContextOptions, Strategy, sliding_window};
pub use summarizer::Summarizer;

/// Messages are summarized in full blocks of this many; the remainder
/// (0–9) is always kept verbatim.
pub const CHUNK_SIZE: usize = 10;

/// Default sliding-window width for the windowed strategies.
pub const DEFAULT_WINDOW_SIZE: usize = 20;
