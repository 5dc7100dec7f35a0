//! Long-term memory extraction from recent conversation turns.
//!
//! The provider is asked for at most three persistent facts about the user.
//! Facts that repeat an existing memory only raise its importance; new ones
//! go through the store's capacity-guarded insert.

use std::sync::Arc;

use neonchat_core::error::{Error, MemoryError};
use neonchat_core::memory::{clamp_importance, MemoryCategory, MemoryItem, MemoryStore, NewMemory};
use neonchat_core::message::{Message, Role};
use neonchat_core::provider::{Provider, ProviderRequest};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Most memories accepted from one extraction.
pub const MAX_EXTRACTED: usize = 3;

/// Characters of new content compared against existing memories.
const DEDUP_PREFIX_CHARS: usize = 30;

const EXTRACTION_TEMPERATURE: f32 = 0.2;

const EXTRACTION_PROMPT: &str = r#"You are a strategic memory extractor. Extract ONLY persistent, relevant facts about the USER from the conversation below.

Categories:
- project: projects the user is building or working on
- tech_stack: technologies, languages and tools the user uses
- goal: professional or personal goals
- learning_style: how the user prefers to learn
- response_preference: how the user prefers answers (format, length, tone)
- technical_profile: the user's technical level and expertise
- general: other relevant persistent facts

Rules:
- Ignore greetings, small talk and ephemeral content.
- Each memory is one concise, self-contained sentence.
- importance_score goes from 1 (trivia) to 5 (defining).
- Return at most 3 memories. If there is nothing worth keeping, return [].

Respond with JSON only, no prose:
[{"category": "...", "content": "...", "importance_score": 3}]"#;

#[derive(Debug, Deserialize)]
struct ExtractedMemory {
    #[serde(default)]
    category: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    importance_score: serde_json::Value,
}

pub struct MemoryExtractor {
    provider: Arc<dyn Provider>,
    store: Arc<dyn MemoryStore>,
    model: String,
    window: usize,
}

impl MemoryExtractor {
    pub fn new(provider: Arc<dyn Provider>, store: Arc<dyn MemoryStore>, model: impl Into<String>, window: usize) -> Self {
        Self {
            provider,
            store,
            model: model.into(),
            window,
        }
    }

    /// Extract memories from the last messages of a conversation and store
    /// them for `user_id`. Returns the newly inserted memories.
    pub async fn extract(&self, user_id: &str, messages: &[Message]) -> Result<Vec<MemoryItem>, Error> {
        let transcript = transcript(messages, self.window);
        if transcript.is_empty() {
            return Ok(Vec::new());
        }

        let request = ProviderRequest::new(
            &self.model,
            vec![Message::system(EXTRACTION_PROMPT), Message::user(transcript)],
        )
        .with_temperature(EXTRACTION_TEMPERATURE);
        let response = self.provider.complete(request).await?;

        let extracted = parse_extraction(&response.message.content.text());
        if extracted.is_empty() {
            debug!(user_id, "No memories extracted");
            return Ok(Vec::new());
        }

        let mut known = self.store.list(user_id).await?;
        let mut saved = Vec::new();

        for candidate in extracted {
            if let Some(existing) = find_duplicate(&known, &candidate) {
                if candidate.importance_score > existing.importance_score {
                    let id = existing.id.clone();
                    self.store.update_importance(&id, candidate.importance_score).await?;
                    if let Some(m) = known.iter_mut().find(|m| m.id == id) {
                        m.importance_score = candidate.importance_score;
                    }
                    debug!(user_id, memory_id = %id, "Raised importance of existing memory");
                }
                continue;
            }

            match self.store.insert(user_id, candidate).await {
                Ok(item) => {
                    known.push(item.clone());
                    saved.push(item);
                }
                Err(e @ MemoryError::AtCapacity { .. }) => {
                    warn!(user_id, error = %e, "Memory not saved");
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(user_id, saved = saved.len(), "Memory extraction finished");
        Ok(saved)
    }
}

/// Render the last `window` user/assistant messages as a transcript.
fn transcript(messages: &[Message], window: usize) -> String {
    let start = messages.len().saturating_sub(window);
    messages[start..]
        .iter()
        .filter_map(|m| {
            let speaker = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System | Role::Tool => return None,
            };
            let text = m.content.text();
            (!text.trim().is_empty()).then(|| format!("{speaker}: {text}"))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parse model output into at most [`MAX_EXTRACTED`] valid memories.
/// Code fences are stripped; anything unparseable yields nothing.
fn parse_extraction(raw: &str) -> Vec<NewMemory> {
    let cleaned = raw.trim().replace("```json", "").replace("```", "");
    let entries: Vec<ExtractedMemory> = match serde_json::from_str(cleaned.trim()) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Extractor returned unparseable output");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter(|e| !e.category.trim().is_empty() && !e.content.trim().is_empty())
        .take(MAX_EXTRACTED)
        .map(|e| {
            NewMemory::new(
                MemoryCategory::parse_lenient(&e.category),
                e.content.trim(),
                importance(&e.importance_score),
            )
        })
        .collect()
}

fn importance(value: &serde_json::Value) -> u8 {
    let score = match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(3.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(3.0),
        _ => 3.0,
    };
    clamp_importance(score.round() as i64)
}

/// An existing memory of the same category containing the new content's
/// leading characters, case-insensitively.
fn find_duplicate<'a>(known: &'a [MemoryItem], candidate: &NewMemory) -> Option<&'a MemoryItem> {
    let prefix: String = candidate
        .content
        .to_lowercase()
        .chars()
        .take(DEDUP_PREFIX_CHARS)
        .collect();
    known
        .iter()
        .find(|m| m.category == candidate.category && m.content.to_lowercase().contains(&prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{make_text_response, ScriptedProvider};
    use neonchat_memory::InMemoryMemoryStore;

    fn extractor(output: &str, store: Arc<InMemoryMemoryStore>) -> (Arc<ScriptedProvider>, MemoryExtractor) {
        let provider = Arc::new(ScriptedProvider::new().complete_with(Ok(make_text_response(output))));
        let extractor = MemoryExtractor::new(provider.clone(), store, "extract-model", 6);
        (provider, extractor)
    }

    fn conversation() -> Vec<Message> {
        vec![
            Message::user("I'm building a SaaS for dental clinics in Rust"),
            Message::assistant("Great, what's the architecture so far?"),
        ]
    }

    #[test]
    fn transcript_uses_window_and_labels() {
        let messages: Vec<Message> = (0..8)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("q{i}"))
                } else {
                    Message::assistant(format!("a{i}"))
                }
            })
            .collect();
        let text = transcript(&messages, 6);
        assert!(text.starts_with("User: q2"));
        assert!(text.ends_with("Assistant: a7"));
        assert_eq!(text.split("\n\n").count(), 6);
    }

    #[test]
    fn parse_strips_fences_and_caps() {
        let raw = "```json\n[\
            {\"category\":\"project\",\"content\":\"a\",\"importance_score\":4},\
            {\"category\":\"goal\",\"content\":\"b\",\"importance_score\":\"9\"},\
            {\"category\":\"\",\"content\":\"skipped\",\"importance_score\":2},\
            {\"category\":\"weird\",\"content\":\"c\"},\
            {\"category\":\"general\",\"content\":\"d\",\"importance_score\":1}\
        ]\n```";
        let parsed = parse_extraction(raw);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].category, MemoryCategory::Project);
        assert_eq!(parsed[1].importance_score, 5);
        assert_eq!(parsed[2].category, MemoryCategory::General);
        assert_eq!(parsed[2].importance_score, 3);
    }

    #[test]
    fn parse_garbage_yields_nothing() {
        assert!(parse_extraction("Sure! Here are the memories.").is_empty());
        assert!(parse_extraction("[]").is_empty());
    }

    #[tokio::test]
    async fn extracts_and_stores_new_memories() {
        let store = Arc::new(InMemoryMemoryStore::new(100));
        let (provider, extractor) = extractor(
            r#"[{"category":"project","content":"Building a SaaS for dental clinics","importance_score":5},
               {"category":"tech_stack","content":"Uses Rust","importance_score":4}]"#,
            store.clone(),
        );

        let saved = extractor.extract("u1", &conversation()).await.unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(store.count("u1").await.unwrap(), 2);

        let request = &provider.requests()[0];
        assert_eq!(request.model, "extract-model");
        assert_eq!(request.temperature, Some(0.2));
        assert!(request.messages[1].content.text().starts_with("User: I'm building"));
    }

    #[tokio::test]
    async fn duplicates_only_raise_importance() {
        let store = Arc::new(InMemoryMemoryStore::new(100));
        store
            .insert(
                "u1",
                NewMemory::new(MemoryCategory::Project, "Building a SaaS for dental clinics in Lisbon", 2),
            )
            .await
            .unwrap();
        let (_, extractor) = extractor(
            r#"[{"category":"project","content":"building a saas for dental clinics","importance_score":4}]"#,
            store.clone(),
        );

        let saved = extractor.extract("u1", &conversation()).await.unwrap();
        assert!(saved.is_empty());
        let all = store.list("u1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].importance_score, 4);
    }

    #[tokio::test]
    async fn same_content_in_other_category_is_new() {
        let store = Arc::new(InMemoryMemoryStore::new(100));
        store
            .insert("u1", NewMemory::new(MemoryCategory::Goal, "Uses Rust", 3))
            .await
            .unwrap();
        let (_, extractor) = extractor(
            r#"[{"category":"tech_stack","content":"Uses Rust","importance_score":3}]"#,
            store.clone(),
        );
        assert_eq!(extractor.extract("u1", &conversation()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_conversation_skips_provider() {
        let store = Arc::new(InMemoryMemoryStore::new(100));
        let (provider, extractor) = extractor("[]", store);
        assert!(extractor.extract("u1", &[]).await.unwrap().is_empty());
        assert!(provider.requests().is_empty());
    }
}
