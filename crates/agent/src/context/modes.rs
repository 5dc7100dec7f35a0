//! Fixed prompt text: the base personality, the built-in modes and the
//! tool-availability notice.

/// Mode key meaning "no mode instructions".
pub const DEFAULT_MODE: &str = "default";

/// Base personality, always the first layer of the system prompt.
pub const BASE_PERSONALITY: &str = "You are NeonChat, an advanced assistant: precise, elegant and strategically intelligent. \
Keep a sophisticated, professional tone with a touch of subtle wit. Value clarity, technical mastery and structured reasoning. \
Format answers with Markdown (headings, lists, tables and code blocks) when it helps readability. \
When the user shares images, analyze them in detail and refer to what you actually see.";

/// Built-in modes as `(key, instructions)`.
pub const BUILTIN_MODES: [(&str, &str); 4] = [
    (
        "study",
        "Study mode: act as a patient tutor. Explain concepts step by step, build from fundamentals, \
use concrete examples and analogies, and check understanding with a short question or exercise at the end.",
    ),
    (
        "agent",
        "Agent mode: be proactive and results-oriented. Break the request into actions, carry out what you can, \
state assumptions explicitly and finish with concrete next steps.",
    ),
    (
        "plan",
        "Plan mode: produce a structured plan. Cover goals, phases, a realistic timeline, milestones, \
dependencies and the main risks with mitigations.",
    ),
    (
        "ask",
        "Ask mode: before answering, ask the clarifying questions that would change your answer. \
Explore the different angles of the problem and guide the user with the Socratic method rather than handing over conclusions.",
    ),
];

/// Instructions of a built-in mode, `None` for unknown keys and for `default`.
pub fn builtin_instructions(mode: &str) -> Option<&'static str> {
    BUILTIN_MODES
        .iter()
        .find(|(key, _)| *key == mode)
        .map(|(_, instructions)| *instructions)
}

/// Whether `mode` names a built-in mode (including `default`).
pub fn is_builtin(mode: &str) -> bool {
    mode == DEFAULT_MODE || builtin_instructions(mode).is_some()
}

/// Notice appended when tools are enabled for the turn.
pub fn tool_notice(tool_names: &[String]) -> String {
    format!(
        "You can call these tools when they would improve your answer: {}. \
Use math for any non-trivial calculation and web_search for recent or factual information you are unsure about. \
Tool results are returned to you before you answer; use them naturally and never invent tool output.",
        tool_names.join(", ")
    )
}
