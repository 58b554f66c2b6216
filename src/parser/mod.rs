//! Structured-event extraction from session output.
//!
//! [`parse_line`] is applied to every ANSI-stripped line the reassembler
//! produces; [`control::ControlScanner`] handles the few raw control
//! sequences that are not line-oriented (kitty keyboard negotiation, title
//! changes, OSC progress). Pattern tables live in [`patterns`] and are
//! treated as configuration data - see the negative prose tests there.

pub mod control;
pub mod patterns;

use crate::domain::{EventKind, ParsedEvent, SessionId};

/// Extract structured events from one clean line.
///
/// Each category (rate limit, awaiting-input, intent, plan file, status,
/// PR URL, usage limit) yields at most one event per line; the categories
/// are independent, so a single line can still produce several events.
/// This function never panics on ordinary input; the reader thread
/// additionally guards the call so a pattern bug cannot take the pipeline
/// down.
pub fn parse_line(session_id: &SessionId, clean: &str) -> Vec<ParsedEvent> {
    let mut events = Vec::new();
    let line = clean.trim_end();
    if line.trim().is_empty() {
        return events;
    }

    if let Some(kind) = patterns::match_rate_limit(line) {
        events.push(ParsedEvent::new(session_id.clone(), kind));
    }

    if let Some((percentage, limit_type)) = patterns::match_usage_limit(line) {
        events.push(ParsedEvent::new(
            session_id.clone(),
            EventKind::UsageLimit {
                percentage,
                limit_type,
            },
        ));
    }

    if let Some(kind) = patterns::classify_awaiting(line) {
        events.push(ParsedEvent::new(
            session_id.clone(),
            EventKind::AwaitingInput {
                kind,
                prompt: line.trim().to_string(),
            },
        ));
    }

    if let Some(text) = patterns::match_intent(line) {
        events.push(ParsedEvent::new(
            session_id.clone(),
            EventKind::DeclaredIntent { text },
        ));
    }

    if let Some(path) = patterns::match_plan_file(line) {
        events.push(ParsedEvent::new(
            session_id.clone(),
            EventKind::PlanFile { path },
        ));
    }

    if let Some((task, time_info, token_info)) = patterns::match_status_line(line) {
        events.push(ParsedEvent::new(
            session_id.clone(),
            EventKind::StatusLine {
                task,
                time_info,
                token_info,
            },
        ));
    }

    if let Some((number, url, platform)) = patterns::match_pr_url(line) {
        events.push(ParsedEvent::new(
            session_id.clone(),
            EventKind::PrUrl {
                number,
                url,
                platform,
            },
        ));
    }

    events
}
