//! Client-side global memory: an implicit style profile plus long-term
//! goals, turned into a prompt for planning and architecture questions.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ClientError;

/// Messages shorter than this never get the memory prompt.
pub const MIN_MESSAGE_CHARS: usize = 20;

/// Most goals or flags kept; older entries fall off.
pub const MAX_ENTRIES: usize = 10;

const FILE_NAME: &str = "global_memory.json";

const TRIGGERS: &[&str] = &[
    "planning",
    "plan",
    "roadmap",
    "architecture",
    "system structure",
    "system design",
    "build product",
    "digital product",
    "mvp",
    "saas",
    "technical decision",
    "which stack",
    "which technology",
    "choose between",
    "organization",
    "organize system",
    "modules",
    "microservice",
    "technical strategy",
    "product strategy",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Strategic,
    Casual,
    Technical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Structure {
    Loose,
    #[default]
    Organized,
    Structured,
}

macro_rules! label {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }
    };
}

label!(Tone { Strategic => "strategic", Casual => "casual", Technical => "technical" });
label!(Verbosity { Low => "low", Medium => "medium", High => "high" });
label!(Structure { Loose => "loose", Organized => "organized", Structured => "structured" });

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleProfile {
    pub tone: Tone,
    pub verbosity: Verbosity,
    pub structure: Structure,
}

/// The user's implicit profile, kept on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalMemory {
    #[serde(default)]
    pub style_profile: StyleProfile,
    #[serde(default)]
    pub long_term_goals: Vec<String>,
    #[serde(default)]
    pub behavioral_flags: Vec<String>,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Default for GlobalMemory {
    fn default() -> Self {
        Self {
            style_profile: StyleProfile::default(),
            long_term_goals: Vec::new(),
            behavioral_flags: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

impl GlobalMemory {
    pub fn set_style(&mut self, style: StyleProfile) {
        self.style_profile = style;
        self.touch();
    }

    /// Add a goal unless already present. Returns whether it was added.
    pub fn add_goal(&mut self, goal: impl Into<String>) -> bool {
        let added = push_bounded(&mut self.long_term_goals, goal.into());
        if added {
            self.touch();
        }
        added
    }

    pub fn remove_goal(&mut self, goal: &str) {
        self.long_term_goals.retain(|g| g != goal);
        self.touch();
    }

    /// Add a behavioral flag unless already present.
    pub fn add_flag(&mut self, flag: impl Into<String>) -> bool {
        let added = push_bounded(&mut self.behavioral_flags, flag.into());
        if added {
            self.touch();
        }
        added
    }

    pub fn remove_flag(&mut self, flag: &str) {
        self.behavioral_flags.retain(|f| f != flag);
        self.touch();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The prompt to send with `message`, if the message calls for it.
    pub fn prompt_for(&self, message: &str) -> Option<String> {
        should_inject_memory(message).then(|| build_memory_prompt(self))
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

fn push_bounded(list: &mut Vec<String>, entry: String) -> bool {
    if list.contains(&entry) {
        return false;
    }
    list.push(entry);
    if list.len() > MAX_ENTRIES {
        let excess = list.len() - MAX_ENTRIES;
        list.drain(..excess);
    }
    true
}

/// Whether `message` is long enough and mentions planning, architecture or
/// a technical decision.
pub fn should_inject_memory(message: &str) -> bool {
    if message.chars().count() < MIN_MESSAGE_CHARS {
        return false;
    }
    let lower = message.to_lowercase();
    TRIGGERS.iter().any(|t| lower.contains(t))
}

pub fn build_memory_prompt(memory: &GlobalMemory) -> String {
    let style = &memory.style_profile;
    let mut lines = vec![
        "This question involves planning, architecture or technical decisions.".to_string(),
        "Subtly adjust the style based on the user's implicit profile.".to_string(),
        String::new(),
        "Strict rules:".to_string(),
        "- Do not mention the profile or the memory.".to_string(),
        "- Do not expand unnecessarily.".to_string(),
        "- For direct questions within the topic, be objective.".to_string(),
        "- Vary format and rhythm between responses.".to_string(),
        "- Be natural, never robotic.".to_string(),
        String::new(),
        format!(
            "Tone: {}. Detail: {}. Structure: {}.",
            style.tone.as_str(),
            style.verbosity.as_str(),
            style.structure.as_str()
        ),
    ];
    if !memory.long_term_goals.is_empty() {
        lines.push("Subtly consider the user's long-term interests.".to_string());
    }
    lines.join("\n")
}

// ── Persistence ───────────────────────────────────────────────────────────

/// JSON file holding one [`GlobalMemory`].
#[derive(Debug, Clone)]
pub struct ProfileFile {
    path: PathBuf,
}

impl ProfileFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.neonchat/global_memory.json`
    pub fn default_location() -> Self {
        Self::new(neonchat_config::AppConfig::config_dir().join(FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored profile. A missing or unreadable file gives the
    /// default profile.
    pub fn load(&self) -> GlobalMemory {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored profile, using defaults");
                return GlobalMemory::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not read profile");
                return GlobalMemory::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Stored profile is corrupt, using defaults");
            GlobalMemory::default()
        })
    }

    pub fn save(&self, memory: &GlobalMemory) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(memory)?)?;
        Ok(())
    }
}
