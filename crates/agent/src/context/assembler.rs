//! Context assembly: one system prompt and one temperature per turn.
//!
//! Every layer has its own source (settings store, memory store, semantic
//! recall, request fields). Each source yields a
//! `Result<Option<Layer>, ContextError>`; the fold keeps `Ok(Some(_))`,
//! skips `Ok(None)` and logs `Err` without failing the turn.
//!
//! # Determinism
//!
//! Identical inputs and identical store contents always produce a
//! byte-identical prompt. Layers are emitted in a fixed order and nothing
//! time-dependent is rendered.

use std::sync::Arc;

use neonchat_config::ContextConfig;
use neonchat_core::error::ContextError;
use neonchat_core::memory::{MemoryStore, SemanticRecall};
use neonchat_core::settings::{SettingsStore, UserSettings, MAX_TEMPERATURE, MIN_TEMPERATURE};
use serde::Serialize;
use tracing::{debug, warn};

use super::modes;

// ── Types ─────────────────────────────────────────────────────────────────

/// Which source a prompt layer came from, in prompt order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    BasePersonality,
    Personality,
    ResponseStyle,
    Mode,
    GlobalMemory,
    LongTermMemory,
    SemanticRecall,
    ToolNotice,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasePersonality => "base_personality",
            Self::Personality => "personality",
            Self::ResponseStyle => "response_style",
            Self::Mode => "mode",
            Self::GlobalMemory => "global_memory",
            Self::LongTermMemory => "long_term_memory",
            Self::SemanticRecall => "semantic_recall",
            Self::ToolNotice => "tool_notice",
        }
    }
}

/// One fragment of the system prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub kind: LayerKind,
    pub text: String,
}

impl Layer {
    fn new(kind: LayerKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

type LayerOutcome = Result<Option<Layer>, ContextError>;

/// Per-turn inputs of the assembler.
#[derive(Debug, Clone, Default)]
pub struct AssemblyInput<'a> {
    /// Authenticated user; anonymous turns get no personalized layers.
    pub user_id: Option<&'a str>,
    pub workspace_id: Option<&'a str>,
    /// Built-in mode key, or a custom mode id.
    pub mode: Option<&'a str>,
    pub custom_mode_id: Option<&'a str>,
    /// Prompt produced by the client's global memory profile.
    pub global_memory_prompt: Option<&'a str>,
    /// Text of the latest user message, used for semantic recall.
    pub latest_query: Option<&'a str>,
    /// Tool names offered to the model; empty when tools are disabled.
    pub tool_names: &'a [String],
}

/// The assembled system prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub system_prompt: String,
    pub temperature: f32,
    /// Kinds of the layers that made it into the prompt, in order.
    pub layers: Vec<LayerKind>,
}

// ── Assembler ─────────────────────────────────────────────────────────────

pub struct ContextAssembler {
    settings: Arc<dyn SettingsStore>,
    memory: Arc<dyn MemoryStore>,
    semantic: Arc<dyn SemanticRecall>,
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        memory: Arc<dyn MemoryStore>,
        semantic: Arc<dyn SemanticRecall>,
        config: ContextConfig,
    ) -> Self {
        Self {
            settings,
            memory,
            semantic,
            config,
        }
    }

    /// Build the system prompt for one turn. Never fails.
    pub async fn assemble(&self, input: &AssemblyInput<'_>) -> AssembledContext {
        let settings = match input.user_id {
            Some(user_id) => self.settings.settings(user_id).await,
            None => Ok(None),
        };

        let temperature = match &settings {
            Ok(Some(s)) => s.effective_temperature(),
            _ => self.default_temperature(),
        };

        let outcomes: Vec<(LayerKind, LayerOutcome)> = vec![
            (
                LayerKind::BasePersonality,
                Ok(Some(Layer::new(LayerKind::BasePersonality, modes::BASE_PERSONALITY))),
            ),
            (LayerKind::Personality, personality_layer(&settings)),
            (LayerKind::ResponseStyle, style_layer(&settings)),
            (LayerKind::Mode, self.mode_layer(input).await),
            (LayerKind::GlobalMemory, global_memory_layer(input.global_memory_prompt)),
            (LayerKind::LongTermMemory, self.memory_layer(input.user_id).await),
            (LayerKind::SemanticRecall, self.semantic_layer(input).await),
            (LayerKind::ToolNotice, tool_notice_layer(input.tool_names)),
        ];

        let layers = fold_layers(outcomes);
        debug!(
            layers = ?layers.iter().map(|l| l.kind.as_str()).collect::<Vec<_>>(),
            temperature,
            "Assembled system prompt"
        );

        AssembledContext {
            system_prompt: layers.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join("\n\n"),
            temperature,
            layers: layers.iter().map(|l| l.kind).collect(),
        }
    }

    fn default_temperature(&self) -> f32 {
        self.config.default_temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
    }

    async fn mode_layer(&self, input: &AssemblyInput<'_>) -> LayerOutcome {
        let mode = input.mode.filter(|m| *m != modes::DEFAULT_MODE);

        if let Some(instructions) = mode.and_then(modes::builtin_instructions) {
            return Ok(Some(Layer::new(LayerKind::Mode, instructions)));
        }

        // A non-built-in mode key doubles as a custom mode id.
        let Some(mode_id) = input.custom_mode_id.or(mode) else {
            return Ok(None);
        };
        let Some(user_id) = input.user_id else {
            debug!(mode_id, "Custom mode requested anonymously, ignoring");
            return Ok(None);
        };

        let custom = self
            .settings
            .custom_mode(user_id, mode_id)
            .await
            .map_err(|e| ContextError::CustomMode(e.to_string()))?;

        match custom {
            Some(m) if !m.instructions.trim().is_empty() => Ok(Some(Layer::new(
                LayerKind::Mode,
                format!("Custom mode \"{}\":\n{}", m.name, m.instructions.trim()),
            ))),
            Some(_) => Ok(None),
            None => {
                debug!(user_id, mode_id, "Custom mode not found for user");
                Ok(None)
            }
        }
    }

    async fn memory_layer(&self, user_id: Option<&str>) -> LayerOutcome {
        let Some(user_id) = user_id else {
            return Ok(None);
        };
        let memories = self
            .memory
            .top_for_user(user_id, self.config.memory_digest_limit)
            .await?;
        if memories.is_empty() {
            return Ok(None);
        }

        let mut text = String::from("What you know about the user (long-term memory):");
        for m in &memories {
            text.push_str(&format!("\n- [{}] {}", m.category, m.content));
        }
        Ok(Some(Layer::new(LayerKind::LongTermMemory, text)))
    }

    async fn semantic_layer(&self, input: &AssemblyInput<'_>) -> LayerOutcome {
        let (Some(user_id), Some(workspace_id), Some(query)) = (input.user_id, input.workspace_id, input.latest_query)
        else {
            return Ok(None);
        };
        if query.trim().chars().count() < self.config.semantic_min_query_chars {
            return Ok(None);
        }

        let hits = self
            .semantic
            .recall(user_id, workspace_id, query, self.config.semantic_top_k)
            .await
            .map_err(|e| ContextError::Semantic(e.to_string()))?;
        if hits.is_empty() {
            return Ok(None);
        }

        let mut text = String::from("Related context from earlier in this workspace:");
        for hit in &hits {
            text.push_str(&format!("\n- {}", hit.content));
        }
        Ok(Some(Layer::new(LayerKind::SemanticRecall, text)))
    }
}

// ── Layer sources ─────────────────────────────────────────────────────────

/// Settings lookup failures are reported once, through this layer.
fn personality_layer(settings: &Result<Option<UserSettings>, ContextError>) -> LayerOutcome {
    match settings {
        Err(e) => Err(ContextError::Settings(e.to_string())),
        Ok(settings) => Ok(settings
            .as_ref()
            .and_then(|s| s.personality_prompt.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| Layer::new(LayerKind::Personality, format!("Personality preferences from the user:\n{p}")))),
    }
}

fn style_layer(settings: &Result<Option<UserSettings>, ContextError>) -> LayerOutcome {
    Ok(settings
        .as_ref()
        .ok()
        .and_then(Option::as_ref)
        .and_then(|s| s.response_style.directive())
        .map(|d| Layer::new(LayerKind::ResponseStyle, d)))
}

fn global_memory_layer(prompt: Option<&str>) -> LayerOutcome {
    Ok(prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| Layer::new(LayerKind::GlobalMemory, p)))
}

fn tool_notice_layer(tool_names: &[String]) -> LayerOutcome {
    if tool_names.is_empty() {
        return Ok(None);
    }
    Ok(Some(Layer::new(LayerKind::ToolNotice, modes::tool_notice(tool_names))))
}

/// Keep successful layers in order; log and drop failed ones.
fn fold_layers(outcomes: Vec<(LayerKind, LayerOutcome)>) -> Vec<Layer> {
    outcomes
        .into_iter()
        .fold(Vec::new(), |mut layers, (kind, outcome)| {
            match outcome {
                Ok(Some(layer)) => layers.push(layer),
                Ok(None) => {}
                Err(e) => warn!(layer = kind.as_str(), error = %e, "Context layer omitted"),
            }
            layers
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use neonchat_core::error::MemoryError;
    use neonchat_core::memory::{MemoryCategory, NewMemory, RecallHit, RecallSource};
    use neonchat_core::settings::{CustomMode, ResponseStyle};
    use neonchat_memory::{InMemoryMemoryStore, InMemorySettingsStore, NoopSemanticRecall};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSettings;

    #[async_trait]
    impl SettingsStore for FailingSettings {
        async fn settings(&self, _user_id: &str) -> Result<Option<UserSettings>, ContextError> {
            Err(ContextError::Settings("database offline".into()))
        }
        async fn save_settings(&self, _settings: UserSettings) -> Result<(), ContextError> {
            Ok(())
        }
        async fn custom_mode(&self, _user_id: &str, _mode_id: &str) -> Result<Option<CustomMode>, ContextError> {
            Err(ContextError::CustomMode("database offline".into()))
        }
        async fn save_custom_mode(&self, _mode: CustomMode) -> Result<(), ContextError> {
            Ok(())
        }
        async fn list_custom_modes(&self, _user_id: &str) -> Result<Vec<CustomMode>, ContextError> {
            Ok(Vec::new())
        }
    }

    struct FixedRecall {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SemanticRecall for FixedRecall {
        async fn recall(
            &self,
            _user_id: &str,
            _workspace_id: &str,
            _query: &str,
            top_k: usize,
        ) -> Result<Vec<RecallHit>, MemoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MemoryError::EmbeddingFailed("embedding endpoint down".into()));
            }
            let mut hits = vec![RecallHit {
                source: RecallSource::Message,
                content: "[user] We picked Postgres for billing".into(),
                score: 0.8,
            }];
            hits.truncate(top_k);
            Ok(hits)
        }

    }

    struct Fixture {
        settings: Arc<InMemorySettingsStore>,
        memory: Arc<InMemoryMemoryStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                settings: Arc::new(InMemorySettingsStore::new()),
                memory: Arc::new(InMemoryMemoryStore::new(100)),
            }
        }

        fn assembler(&self, semantic: Arc<dyn SemanticRecall>) -> ContextAssembler {
            ContextAssembler::new(
                self.settings.clone(),
                self.memory.clone(),
                semantic,
                ContextConfig::default(),
            )
        }

        fn plain(&self) -> ContextAssembler {
            self.assembler(Arc::new(NoopSemanticRecall))
        }
    }

    fn tools() -> Vec<String> {
        vec!["math".into(), "web_search".into()]
    }

    #[tokio::test]
    async fn anonymous_turn_gets_base_and_tool_notice() {
        let fx = Fixture::new();
        let names = tools();
        let ctx = fx
            .plain()
            .assemble(&AssemblyInput {
                tool_names: &names,
                ..Default::default()
            })
            .await;

        assert_eq!(ctx.layers, vec![LayerKind::BasePersonality, LayerKind::ToolNotice]);
        assert!(ctx.system_prompt.starts_with(modes::BASE_PERSONALITY));
        assert!((ctx.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn tool_notice_absent_when_tools_disabled() {
        let fx = Fixture::new();
        let ctx = fx.plain().assemble(&AssemblyInput::default()).await;
        assert_eq!(ctx.layers, vec![LayerKind::BasePersonality]);
        assert_eq!(ctx.system_prompt, modes::BASE_PERSONALITY);
    }

    #[tokio::test]
    async fn settings_drive_personality_style_and_temperature() {
        let fx = Fixture::new();
        let mut settings = UserSettings::new("u1");
        settings.personality_prompt = Some("  Call me Captain.  ".into());
        settings.response_style = ResponseStyle::Concise;
        settings.temperature_preference = 3.0;
        fx.settings.save_settings(settings).await.unwrap();

        let ctx = fx
            .plain()
            .assemble(&AssemblyInput {
                user_id: Some("u1"),
                ..Default::default()
            })
            .await;

        assert_eq!(
            ctx.layers,
            vec![LayerKind::BasePersonality, LayerKind::Personality, LayerKind::ResponseStyle]
        );
        assert!(ctx.system_prompt.contains("Call me Captain."));
        assert!(ctx.system_prompt.contains("Keep answers short"));
        assert!((ctx.temperature - MAX_TEMPERATURE).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn balanced_style_adds_nothing() {
        let fx = Fixture::new();
        fx.settings.save_settings(UserSettings::new("u1")).await.unwrap();
        let ctx = fx
            .plain()
            .assemble(&AssemblyInput {
                user_id: Some("u1"),
                ..Default::default()
            })
            .await;
        assert_eq!(ctx.layers, vec![LayerKind::BasePersonality]);
    }

    #[tokio::test]
    async fn builtin_mode_layer() {
        let fx = Fixture::new();
        let ctx = fx
            .plain()
            .assemble(&AssemblyInput {
                mode: Some("ask"),
                ..Default::default()
            })
            .await;
        assert_eq!(ctx.layers, vec![LayerKind::BasePersonality, LayerKind::Mode]);
        assert!(ctx.system_prompt.contains("Socratic"));
    }

    #[tokio::test]
    async fn default_mode_adds_nothing() {
        let fx = Fixture::new();
        let ctx = fx
            .plain()
            .assemble(&AssemblyInput {
                mode: Some("default"),
                ..Default::default()
            })
            .await;
        assert_eq!(ctx.layers, vec![LayerKind::BasePersonality]);
    }

    #[tokio::test]
    async fn custom_mode_resolved_for_owner_only() {
        let fx = Fixture::new();
        fx.settings
            .save_custom_mode(CustomMode {
                id: "cm-1".into(),
                user_id: "u1".into(),
                name: "Pirate".into(),
                instructions: "Answer like a pirate.".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let assembler = fx.plain();

        let owner = assembler
            .assemble(&AssemblyInput {
                user_id: Some("u1"),
                mode: Some("cm-1"),
                custom_mode_id: Some("cm-1"),
                ..Default::default()
            })
            .await;
        assert!(owner.system_prompt.contains("Answer like a pirate."));

        let stranger = assembler
            .assemble(&AssemblyInput {
                user_id: Some("u2"),
                custom_mode_id: Some("cm-1"),
                ..Default::default()
            })
            .await;
        assert!(!stranger.layers.contains(&LayerKind::Mode));
    }

    #[tokio::test]
    async fn builtin_mode_wins_over_custom_id() {
        let fx = Fixture::new();
        let ctx = fx
            .plain()
            .assemble(&AssemblyInput {
                user_id: Some("u1"),
                mode: Some("study"),
                custom_mode_id: Some("cm-1"),
                ..Default::default()
            })
            .await;
        assert!(ctx.system_prompt.contains("tutor"));
    }

    #[tokio::test]
    async fn memory_digest_lists_top_memories() {
        let fx = Fixture::new();
        for i in 0..12 {
            fx.memory
                .insert("u1", NewMemory::new(MemoryCategory::Project, format!("fact {i}"), 3))
                .await
                .unwrap();
        }
        fx.memory
            .insert("u1", NewMemory::new(MemoryCategory::TechStack, "Writes Rust daily", 5))
            .await
            .unwrap();

        let ctx = fx
            .plain()
            .assemble(&AssemblyInput {
                user_id: Some("u1"),
                ..Default::default()
            })
            .await;

        assert!(ctx.layers.contains(&LayerKind::LongTermMemory));
        let digest_lines = ctx.system_prompt.lines().filter(|l| l.starts_with("- [")).count();
        assert_eq!(digest_lines, 10);
        assert!(ctx.system_prompt.contains("- [tech_stack] Writes Rust daily"));
    }

    #[tokio::test]
    async fn zero_memories_means_no_memory_layer() {
        let fx = Fixture::new();
        let ctx = fx
            .plain()
            .assemble(&AssemblyInput {
                user_id: Some("u1"),
                ..Default::default()
            })
            .await;
        assert!(!ctx.layers.contains(&LayerKind::LongTermMemory));
    }

    #[tokio::test]
    async fn semantic_layer_needs_user_workspace_and_long_query() {
        let fx = Fixture::new();
        let recall = Arc::new(FixedRecall {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let assembler = fx.assembler(recall.clone());

        let short = assembler
            .assemble(&AssemblyInput {
                user_id: Some("u1"),
                workspace_id: Some("ws"),
                latest_query: Some("db?"),
                ..Default::default()
            })
            .await;
        assert!(!short.layers.contains(&LayerKind::SemanticRecall));
        assert_eq!(recall.calls.load(Ordering::SeqCst), 0);

        let anonymous = assembler
            .assemble(&AssemblyInput {
                workspace_id: Some("ws"),
                latest_query: Some("which database did we choose?"),
                ..Default::default()
            })
            .await;
        assert!(!anonymous.layers.contains(&LayerKind::SemanticRecall));
        assert_eq!(recall.calls.load(Ordering::SeqCst), 0);

        let long = assembler
            .assemble(&AssemblyInput {
                user_id: Some("u1"),
                workspace_id: Some("ws"),
                latest_query: Some("which database did we choose?"),
                ..Default::default()
            })
            .await;
        assert!(long.system_prompt.contains("We picked Postgres"));
        assert_eq!(recall.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_sources_are_omitted() {
        let memory = Arc::new(InMemoryMemoryStore::new(10));
        let assembler = ContextAssembler::new(
            Arc::new(FailingSettings),
            memory,
            Arc::new(FixedRecall {
                calls: AtomicUsize::new(0),
                fail: true,
            }),
            ContextConfig::default(),
        );
        let names = tools();

        let ctx = assembler
            .assemble(&AssemblyInput {
                user_id: Some("u1"),
                workspace_id: Some("ws"),
                custom_mode_id: Some("cm-1"),
                latest_query: Some("which database did we choose?"),
                tool_names: &names,
                ..Default::default()
            })
            .await;

        assert_eq!(ctx.layers, vec![LayerKind::BasePersonality, LayerKind::ToolNotice]);
        assert!((ctx.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn layer_order_is_fixed() {
        let fx = Fixture::new();
        let mut settings = UserSettings::new("u1");
        settings.personality_prompt = Some("Be warm.".into());
        settings.response_style = ResponseStyle::Detailed;
        fx.settings.save_settings(settings).await.unwrap();
        fx.memory
            .insert("u1", NewMemory::new(MemoryCategory::Goal, "Launch an MVP in March", 4))
            .await
            .unwrap();
        let names = tools();
        let recall = Arc::new(FixedRecall {
            calls: AtomicUsize::new(0),
            fail: false,
        });

        let ctx = fx
            .assembler(recall)
            .assemble(&AssemblyInput {
                user_id: Some("u1"),
                workspace_id: Some("ws"),
                mode: Some("plan"),
                global_memory_prompt: Some("Tone: strategic."),
                latest_query: Some("plan the billing migration"),
                tool_names: &names,
                ..Default::default()
            })
            .await;

        assert_eq!(
            ctx.layers,
            vec![
                LayerKind::BasePersonality,
                LayerKind::Personality,
                LayerKind::ResponseStyle,
                LayerKind::Mode,
                LayerKind::GlobalMemory,
                LayerKind::LongTermMemory,
                LayerKind::SemanticRecall,
                LayerKind::ToolNotice,
            ]
        );
        assert_eq!(ctx.system_prompt.split("\n\n").count(), 8);
    }

    #[tokio::test]
    async fn assembly_is_deterministic() {
        let fx = Fixture::new();
        fx.memory
            .insert("u1", NewMemory::new(MemoryCategory::Goal, "Ship v2", 4))
            .await
            .unwrap();
        let assembler = fx.plain();
        let names = tools();
        let input = AssemblyInput {
            user_id: Some("u1"),
            mode: Some("agent"),
            tool_names: &names,
            ..Default::default()
        };

        let first = assembler.assemble(&input).await;
        let second = assembler.assemble(&input).await;
        assert_eq!(first.system_prompt, second.system_prompt);
        assert_eq!(first, second);
    }
}
