//! Output pattern tables.
//!
//! Every entry here must be anchored to the literal, stable output of a
//! specific tool in a specific context. Plain natural-language sentences
//! must never match: the prose corpus test at the bottom of this file is the
//! regression gate for that rule, and any new pattern has to pass it.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{AgentFamily, AwaitingKind, EventKind};

// ========== Rate limits ==========

pub struct RateLimitPattern {
    pub name: &'static str,
    pub family: AgentFamily,
    pub regex: Regex,
}

/// Ordered table: provider-specific entries first, generic fallbacks last.
/// The first match wins, so one line never counts as two agents' limits.
pub static RATE_LIMIT_PATTERNS: Lazy<Vec<RateLimitPattern>> = Lazy::new(|| {
    let entry = |name, family, pattern: &str| RateLimitPattern {
        name,
        family,
        regex: Regex::new(pattern).expect("invalid rate-limit pattern"),
    };
    vec![
        // Claude Code prints "API Error: 429 ..." and the raw error type
        // token "overloaded_error" on 529s.
        entry("claude-http-429", AgentFamily::Claude, r"\bAPI Error: 429\b"),
        entry(
            "claude-overloaded",
            AgentFamily::Claude,
            r"\boverloaded_error\b",
        ),
        // OpenAI-compatible CLIs surface the error code token or the
        // canonical status line.
        entry(
            "openai-rate-limit",
            AgentFamily::OpenAi,
            r"\brate_limit_exceeded\b",
        ),
        entry(
            "openai-http-429",
            AgentFamily::OpenAi,
            r"\b429 Too Many Requests\b",
        ),
        entry(
            "gemini-resource-exhausted",
            AgentFamily::Gemini,
            r"\bRESOURCE_EXHAUSTED\b",
        ),
        // Cursor's agent prints this bare phrase at line start. Anchored so
        // a mid-sentence mention in prose does not trigger it.
        entry(
            "cursor-rate-limit",
            AgentFamily::Cursor,
            r"(?i)^\s*(?:⚠\s*)?rate limit exceeded\b",
        ),
        entry(
            "http-429",
            AgentFamily::Generic,
            r"\bHTTP(?:/\d(?:\.\d)?)?\s+429\b",
        ),
        entry(
            "retry-after-header",
            AgentFamily::Generic,
            r"(?i)^\s*retry-after:\s*\d+\b",
        ),
    ]
});

static RETRY_AFTER_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bretry(?:ing)?\s+(?:in|after)\s+(\d+(?:\.\d+)?)\s*(ms|milliseconds?|s|secs?|seconds?|m|mins?|minutes?)\b")
        .expect("invalid retry-after pattern")
});

static RETRY_AFTER_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bretry-after:\s*(\d+)\b").expect("invalid header pattern"));

/// Match a rate-limit pattern against one line. First table entry wins.
pub fn match_rate_limit(line: &str) -> Option<EventKind> {
    let hit = RATE_LIMIT_PATTERNS.iter().find(|p| p.regex.is_match(line))?;
    Some(EventKind::RateLimit {
        pattern: hit.name.to_string(),
        agent: hit.family,
        retry_after_ms: extract_retry_after_ms(line),
    })
}

/// Pull a suggested wait duration out of the line, if the tool printed one.
pub fn extract_retry_after_ms(line: &str) -> Option<u64> {
    if let Some(caps) = RETRY_AFTER_DURATION.captures(line) {
        let value: f64 = caps[1].parse().ok()?;
        let unit = caps[2].to_ascii_lowercase();
        let ms = match unit.as_str() {
            "ms" | "millisecond" | "milliseconds" => value,
            u if u.starts_with('m') => value * 60_000.0,
            _ => value * 1_000.0,
        };
        return Some(ms as u64);
    }
    if let Some(caps) = RETRY_AFTER_HEADER.captures(line) {
        let secs: u64 = caps[1].parse().ok()?;
        return Some(secs * 1_000);
    }
    None
}

// ========== Awaiting input ==========

struct AwaitingPattern {
    kind: AwaitingKind,
    regex: Regex,
}

static AWAITING_PATTERNS: Lazy<Vec<AwaitingPattern>> = Lazy::new(|| {
    let entry = |kind, pattern: &str| AwaitingPattern {
        kind,
        regex: Regex::new(pattern).expect("invalid awaiting-input pattern"),
    };
    vec![
        // Question: explicit yes/no bracket prompts and inquirer-style lines
        entry(AwaitingKind::Question, r"\[[yY]/[nN]\]|\([yY]/[nN]\)"),
        entry(AwaitingKind::Question, r"^\?\s+\S"),
        entry(AwaitingKind::Question, r"^Would you like\b.*\?\s*$"),
        // Confirmation: agent TUI dialogs before an action
        entry(
            AwaitingKind::Confirmation,
            r"(?i)^do you want to (?:proceed|continue|make this edit)\b",
        ),
        entry(AwaitingKind::Confirmation, r"(?i)\bproceed\?\s*$"),
        entry(
            AwaitingKind::Confirmation,
            r"(?i)^press enter to continue\b",
        ),
        // Error: the tool stopped on a failure and is asking what to do
        entry(
            AwaitingKind::Error,
            r"(?i)^(?:error|fatal)\b.*\b(?:retry|continue|abort)\b.*\?\s*$",
        ),
        entry(AwaitingKind::Error, r"(?i)\bfailed\b.*\bretry\?\s*$"),
    ]
});

/// Classify an awaiting-input line.
///
/// The three pattern sets are disjoint by construction; if a line still
/// matches more than one kind, the conservative classification (question)
/// wins rather than dropping the signal.
pub fn classify_awaiting(line: &str) -> Option<AwaitingKind> {
    let mut matched: Option<AwaitingKind> = None;
    for pattern in AWAITING_PATTERNS.iter() {
        if pattern.regex.is_match(line) {
            match matched {
                None => matched = Some(pattern.kind),
                Some(kind) if kind != pattern.kind => return Some(AwaitingKind::Question),
                Some(_) => {}
            }
        }
    }
    matched
}

// ========== Declared intent ==========

static INTENT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^⏺\s+(\S.*)$").expect("invalid intent pattern"));

static INTENT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:plan|intent):\s+(\S.*)$").expect("invalid intent pattern"));

/// Extract a declared intent from the agent's own action marker.
///
/// `⏺` is Claude Code's literal assistant-action prefix; lines with a call
/// form (`Tool(args)`) are tool invocations, not declared intents.
pub fn match_intent(line: &str) -> Option<String> {
    if let Some(caps) = INTENT_MARKER.captures(line.trim_end()) {
        let text = caps[1].trim().to_string();
        if !text.contains('(') {
            return Some(text);
        }
        return None;
    }
    INTENT_PREFIX
        .captures(line.trim_end())
        .map(|caps| caps[1].trim().to_string())
}

// ========== Plan files ==========

static PLAN_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[\s('"\[`])((?:[\w.~-]+/)*(?:plans|\.claude/plans)/[\w.-]+\.md)\b"#)
        .expect("invalid plan-file pattern")
});

pub fn match_plan_file(line: &str) -> Option<String> {
    PLAN_FILE.captures(line).map(|caps| caps[1].to_string())
}

// ========== Status lines ==========

static STATUS_LINE: Lazy<Regex> = Lazy::new(|| {
    // Spinner glyphs Claude Code cycles through, then "Task name…" and an
    // optional "(12s · 2.4k tokens · esc to interrupt)" suffix.
    Regex::new(r"^[·✻✽✶✳✢]\s*([A-Za-z][\w -]{2,60}?)(?:…|\.{3})\s*(?:\(([^)]*)\))?\s*$")
        .expect("invalid status-line pattern")
});

static STATUS_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+[smh])\b").expect("invalid time pattern"));

static STATUS_TOKENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([\d.]+k?\s*tokens)\b").expect("invalid token pattern"));

pub fn match_status_line(line: &str) -> Option<(String, Option<String>, Option<String>)> {
    let caps = STATUS_LINE.captures(line.trim_end())?;
    let task = caps[1].trim().to_string();
    let detail = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    let time_info = STATUS_TIME.captures(detail).map(|c| c[1].to_string());
    let token_info = STATUS_TOKENS.captures(detail).map(|c| c[1].to_string());
    Some((task, time_info, token_info))
}

// ========== PR / MR URLs ==========

static PR_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(https://(?:www\.)?(github|gitlab)\.com/[\w./-]+?/(?:pull|merge_requests)/(\d+))\b")
        .expect("invalid pr-url pattern")
});

pub fn match_pr_url(line: &str) -> Option<(u64, String, String)> {
    let caps = PR_URL.captures(line)?;
    let number: u64 = caps[3].parse().ok()?;
    Some((number, caps[1].to_string(), caps[2].to_string()))
}

// ========== Usage limits ==========

static USAGE_PERCENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})%\s+of\s+(?:your\s+)?(weekly|session)\s+(?:usage\s+)?limit\b")
        .expect("invalid usage pattern")
});

static USAGE_REACHED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^claude\s+(?:(weekly|session)\s+)?usage limit reached\b")
        .expect("invalid usage pattern")
});

pub fn match_usage_limit(line: &str) -> Option<(u8, String)> {
    if let Some(caps) = USAGE_PERCENT.captures(line) {
        let pct: u8 = caps[1].parse::<u16>().ok()?.min(100) as u8;
        return Some((pct, caps[2].to_ascii_lowercase()));
    }
    if let Some(caps) = USAGE_REACHED.captures(line) {
        let limit_type = caps
            .get(1)
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_else(|| "session".to_string());
        return Some((100, limit_type));
    }
    None
}
