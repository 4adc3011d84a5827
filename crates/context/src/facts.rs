//! Fact extraction — best-effort maintenance of the per-session fact
//! memory.
//!
//! After each turn the extractor shows the model the tail of the
//! conversation plus the current facts and asks for a JSON object of
//! updated or added entries. The parse is a strict parse-or-fallback
//! boundary: the only recovery action is "return the prior facts
//! unchanged". A malformed payload is never partially merged, and no
//! failure here ever reaches the caller.

use braid_core::facts::FactMap;
use braid_core::message::{ChatMessage, Role};
use braid_core::provider::{CompletionRequest, Provider};
use std::collections::BTreeMap;
use tracing::debug;

/// Instruction prompt for the fact extractor.
const FACTS_INSTRUCTIONS: &str = "\
You maintain a compact key-value memory of durable facts about a \
conversation (user preferences, goals, names, decisions).

Given the recent dialogue and the current facts, reply with ONLY a JSON \
object containing facts to add or update. Keys must be short snake_case \
identifiers (letters, digits, underscores); values must be short strings. \
Do not repeat facts that are unchanged. Do not include any text outside \
the JSON object.";

/// Rendered-conversation tail cap, in characters. Keeps the extraction
/// prompt small no matter how long the turn ran.
const TAIL_CHAR_LIMIT: usize = 3000;

/// Cap on the extractor's completion length.
const FACTS_MAX_TOKENS: u32 = 300;

/// Distills durable facts from recent dialogue.
pub struct FactExtractor<'a> {
    provider: &'a dyn Provider,
    model: &'a str,
}

impl<'a> FactExtractor<'a> {
    pub fn new(provider: &'a dyn Provider, model: &'a str) -> Self {
        Self { provider, model }
    }

    /// Produce the updated fact map for a completed turn.
    ///
    /// `history` is the effective history including the just-produced
    /// user and assistant messages. Total function: on any failure the
    /// input facts come back unchanged.
    pub async fn update(&self, history: &[ChatMessage], current: &FactMap) -> FactMap {
        match self.try_update(history, current).await {
            Ok(updated) => updated,
            Err(reason) => {
                debug!(reason, "Fact extraction failed — keeping facts unchanged");
                current.clone()
            }
        }
    }

    async fn try_update(
        &self,
        history: &[ChatMessage],
        current: &FactMap,
    ) -> Result<FactMap, String> {
        let tail = render_tail(history, TAIL_CHAR_LIMIT);
        if tail.is_empty() {
            return Err("empty conversation tail".into());
        }

        let current_json =
            serde_json::to_string(current).map_err(|e| format!("facts serialization: {e}"))?;
        let user_prompt = format!(
            "Current facts:\n{current_json}\n\nRecent dialogue:\n{tail}"
        );

        let request = CompletionRequest::new(
            self.model,
            vec![
                ChatMessage::system(FACTS_INSTRUCTIONS),
                ChatMessage::user(user_prompt),
            ],
        )
        .with_max_tokens(FACTS_MAX_TOKENS);

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| format!("completion: {e}"))?;

        let payload = strip_code_fences(&response.message.content);
        // Strict parse: anything that is not an object of string values
        // rejects the whole payload.
        let parsed: BTreeMap<String, String> =
            serde_json::from_str(payload).map_err(|e| format!("parse: {e}"))?;

        let overlay: FactMap = parsed.into_iter().collect();
        Ok(current.merged(&overlay))
    }
}

/// Render the conversation as speaker-labeled lines and keep only the
/// trailing `limit` characters (aligned to a char boundary).
fn render_tail(history: &[ChatMessage], limit: usize) -> String {
    let rendered = history
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let speaker = match m.role {
                Role::User => "User",
                _ => "Assistant",
            };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    if rendered.chars().count() <= limit {
        return rendered;
    }
    let skip = rendered.chars().count() - limit;
    rendered.chars().skip(skip).collect()
}

/// Strip surrounding Markdown code fences (``` or ```json) from model
/// output, leaving the payload untouched otherwise.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag after the opening fence
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}
