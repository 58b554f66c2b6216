//! Structured events extracted from session output.
//!
//! The output parser turns clean terminal lines (and a few raw control
//! sequences) into these typed events. Events are immutable once created and
//! are consumed by UI stores and by plugin structured-event handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SessionId;

/// Which agent family a provider-specific pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentFamily {
    Claude,
    OpenAi,
    Gemini,
    Cursor,
    /// Matched a provider-agnostic pattern (bare HTTP 429, Retry-After, ...).
    Generic,
}

/// Sub-kind of an awaiting-input signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AwaitingKind {
    Question,
    Error,
    Confirmation,
}

/// Progress state from an OSC 9;4 sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressState {
    Remove,
    Normal,
    Error,
    Indeterminate,
}

impl ProgressState {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Normal,
            2 => Self::Error,
            3 => Self::Indeterminate,
            _ => Self::Remove,
        }
    }
}

/// A structured event extracted from one session's output stream.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedEvent {
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ParsedEvent {
    pub fn new(session_id: SessionId, kind: EventKind) -> Self {
        Self {
            session_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// The wire name of this event's type, used to key plugin handlers.
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

/// The payload variants of a [`ParsedEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventKind {
    /// An AI provider reported a rate limit.
    RateLimit {
        /// Name of the pattern-table entry that matched (e.g. "claude-http-429").
        pattern: String,
        agent: AgentFamily,
        /// Suggested wait before retrying, when the output included one.
        retry_after_ms: Option<u64>,
    },

    /// The process appears to be waiting for interactive input.
    AwaitingInput {
        kind: AwaitingKind,
        /// The prompt line, ANSI-stripped. Empty for idle-timer signals.
        prompt: String,
    },

    /// The agent declared what it is about to do.
    DeclaredIntent { text: String },

    /// A plan file path appeared in the output.
    PlanFile { path: String },

    /// An agent status/progress line (spinner line with task name).
    StatusLine {
        task: String,
        time_info: Option<String>,
        token_info: Option<String>,
    },

    /// A pull/merge request URL appeared in the output.
    PrUrl {
        number: u64,
        url: String,
        platform: String,
    },

    /// Terminal progress report (OSC 9;4).
    Progress { state: ProgressState, value: u8 },

    /// Claude Code reported usage-limit consumption.
    UsageLimit { percentage: u8, limit_type: String },

    /// The child changed the terminal title (OSC 0/2).
    TitleChange { title: String },
}

impl EventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::RateLimit { .. } => "rate-limit",
            EventKind::AwaitingInput { .. } => "awaiting-input",
            EventKind::DeclaredIntent { .. } => "declared-intent",
            EventKind::PlanFile { .. } => "plan-file",
            EventKind::StatusLine { .. } => "status-line",
            EventKind::PrUrl { .. } => "pr-url",
            EventKind::Progress { .. } => "progress",
            EventKind::UsageLimit { .. } => "usage-limit",
            EventKind::TitleChange { .. } => "title-change",
        }
    }
}
