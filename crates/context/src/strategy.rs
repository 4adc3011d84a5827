//! Context strategy selection and dispatch.
//!
//! Four interchangeable policies turn (system prompt, effective history,
//! auxiliary state) into the final bounded message list. Dispatch is a
//! pure function of the strategy tag and its inputs — no state is shared
//! between variants beyond what the Summarization path reads and writes
//! through the store.

use crate::summarizer::Summarizer;
use crate::DEFAULT_WINDOW_SIZE;
use braid_core::error::ContextError;
use braid_core::facts::FactMap;
use braid_core::message::{ChatMessage, Role, SessionId};
use braid_core::provider::Provider;
use braid_core::store::ChatStore;
use tracing::debug;

/// How history is turned into a bounded prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Last `window_size` messages verbatim; older ones dropped outright.
    SlidingWindow,
    /// Sliding window plus the rendered fact block on the system prompt.
    StickyFacts,
    /// Cached chunk summaries of everything beyond the trailing partial
    /// chunk. The default.
    Summarization,
    /// Alias of SlidingWindow — history arrives pre-resolved by the
    /// branch resolver; this variant only keeps the tag set exhaustive.
    Branching,
}

impl Strategy {
    /// Map a caller-supplied tag to a strategy. Unknown or absent tags
    /// fall back to Summarization.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some("sliding_window") => Strategy::SlidingWindow,
            Some("sticky_facts") => Strategy::StickyFacts,
            Some("branching") => Strategy::Branching,
            // "summarization" and every unknown tag
            _ => Strategy::Summarization,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Strategy::SlidingWindow => "sliding_window",
            Strategy::StickyFacts => "sticky_facts",
            Strategy::Summarization => "summarization",
            Strategy::Branching => "branching",
        }
    }
}

/// Per-request options consumed by the windowed strategies.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Window width for SlidingWindow / StickyFacts / Branching.
    pub window_size: usize,
    /// The session's current fact memory (StickyFacts only).
    pub facts: FactMap,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            facts: FactMap::new(),
        }
    }
}

/// Take the last `window_size` non-system messages verbatim, prefixed by
/// exactly one system message. Fewer messages than the window → all kept.
pub fn sliding_window(
    system_prompt: &str,
    history: &[ChatMessage],
    window_size: usize,
) -> Vec<ChatMessage> {
    let non_system: Vec<&ChatMessage> = history
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();
    let start = non_system.len().saturating_sub(window_size);

    let mut out = Vec::with_capacity(non_system.len() - start + 1);
    out.push(ChatMessage::system(system_prompt));
    out.extend(non_system[start..].iter().map(|m| (*m).clone()));
    out
}

/// Executes the selected strategy against injected collaborators.
pub struct ContextBuilder<'a> {
    store: &'a dyn ChatStore,
    provider: &'a dyn Provider,
    summary_model: String,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(
        store: &'a dyn ChatStore,
        provider: &'a dyn Provider,
        summary_model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provider,
            summary_model: summary_model.into(),
        }
    }

    /// Turn the effective history into the finalized message list.
    ///
    /// The result always begins with exactly one system message. Only the
    /// Summarization path touches the store or the provider; the windowed
    /// variants are pure.
    pub async fn build(
        &self,
        strategy: Strategy,
        session: &SessionId,
        history: &[ChatMessage],
        system_prompt: &str,
        opts: &ContextOptions,
    ) -> Result<Vec<ChatMessage>, ContextError> {
        debug!(
            session = %session,
            strategy = strategy.as_tag(),
            history_len = history.len(),
            "Building context"
        );

        match strategy {
            Strategy::SlidingWindow | Strategy::Branching => {
                Ok(sliding_window(system_prompt, history, opts.window_size))
            }
            Strategy::StickyFacts => {
                let prompt = match opts.facts.render_block() {
                    Some(block) => {
                        format!("{system_prompt}\n\nKnown facts about this conversation:\n{block}")
                    }
                    None => system_prompt.to_string(),
                };
                Ok(sliding_window(&prompt, history, opts.window_size))
            }
            Strategy::Summarization => {
                let summarizer =
                    Summarizer::new(self.store, self.provider, &self.summary_model);
                summarizer
                    .build_with_summaries(session, history, system_prompt)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_providers::ScriptedProvider;
    use braid_store::InMemoryStore;

    fn turns(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("question {i}"))
                } else {
                    ChatMessage::assistant(format!("answer {i}"))
                }
            })
            .collect()
    }

    #[test]
    fn tag_mapping_is_total() {
        assert_eq!(Strategy::from_tag(Some("sliding_window")), Strategy::SlidingWindow);
        assert_eq!(Strategy::from_tag(Some("sticky_facts")), Strategy::StickyFacts);
        assert_eq!(Strategy::from_tag(Some("branching")), Strategy::Branching);
        assert_eq!(Strategy::from_tag(Some("summarization")), Strategy::Summarization);
        // Unknown and absent tags fall back to summarization
        assert_eq!(Strategy::from_tag(Some("vector_recall")), Strategy::Summarization);
        assert_eq!(Strategy::from_tag(None), Strategy::Summarization);
    }

    #[test]
    fn tag_round_trip() {
        for s in [
            Strategy::SlidingWindow,
            Strategy::StickyFacts,
            Strategy::Summarization,
            Strategy::Branching,
        ] {
            assert_eq!(Strategy::from_tag(Some(s.as_tag())), s);
        }
    }

    #[test]
    fn window_keeps_everything_when_short() {
        let history = turns(5);
        let out = sliding_window("You are helpful.", &history, 20);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0].role, Role::System);
        assert_eq!(out[1..], history[..]);
    }

    #[test]
    fn window_drops_oldest_when_long() {
        let history = turns(30);
        let out = sliding_window("sys", &history, 20);
        assert_eq!(out.len(), 21);
        // The first windowed message is history[10]
        assert_eq!(out[1].content, "question 10");
        assert_eq!(out[20].content, "answer 29");
    }

    #[test]
    fn window_filters_stray_system_messages() {
        let mut history = turns(4);
        history.insert(0, ChatMessage::system("stray"));
        let out = sliding_window("sys", &history, 20);
        assert_eq!(out.len(), 5);
        assert!(out[1..].iter().all(|m| m.role != Role::System));
    }

    #[tokio::test]
    async fn sticky_facts_renders_non_empty_entries() {
        let store = InMemoryStore::new();
        let provider = ScriptedProvider::new();
        let builder = ContextBuilder::new(&store, &provider, "gpt-4o-mini");

        let mut facts = FactMap::new();
        facts.insert("goal", "ship v1");
        facts.insert("deadline", "");
        let opts = ContextOptions {
            window_size: 20,
            facts,
        };

        let out = builder
            .build(
                Strategy::StickyFacts,
                &SessionId::from("s1"),
                &turns(3),
                "You are helpful.",
                &opts,
            )
            .await
            .unwrap();

        assert_eq!(out[0].role, Role::System);
        assert!(out[0].content.contains("- goal: ship v1"));
        assert!(!out[0].content.contains("deadline"));
        assert_eq!(out.len(), 4);
    }

    #[tokio::test]
    async fn sticky_facts_without_facts_leaves_prompt_unmodified() {
        let store = InMemoryStore::new();
        let provider = ScriptedProvider::new();
        let builder = ContextBuilder::new(&store, &provider, "gpt-4o-mini");

        let out = builder
            .build(
                Strategy::StickyFacts,
                &SessionId::from("s1"),
                &turns(2),
                "You are helpful.",
                &ContextOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(out[0].content, "You are helpful.");
    }

    #[tokio::test]
    async fn branching_behaves_like_sliding_window() {
        let store = InMemoryStore::new();
        let provider = ScriptedProvider::new();
        let builder = ContextBuilder::new(&store, &provider, "gpt-4o-mini");
        let history = turns(30);
        let sid = SessionId::from("s1");

        let windowed = builder
            .build(Strategy::SlidingWindow, &sid, &history, "sys", &ContextOptions::default())
            .await
            .unwrap();
        let branched = builder
            .build(Strategy::Branching, &sid, &history, "sys", &ContextOptions::default())
            .await
            .unwrap();
        assert_eq!(windowed, branched);
    }
}
