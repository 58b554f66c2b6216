//! Raw control-sequence scanning.
//!
//! A few signals are not line-oriented and must be detected on the raw byte
//! stream: the kitty keyboard-protocol handshake (`CSI > / < / = ... u`),
//! terminal title changes (OSC 0/2) and progress reports (OSC 9;4). The
//! scanner is a small per-session state machine fed chunk by chunk, so a
//! sequence split across two reads is still recognized.

use crate::domain::ProgressState;

/// Longest CSI parameter string / OSC payload we are willing to buffer.
/// Anything longer is not one of the sequences we care about.
const MAX_CSI_PARAMS: usize = 64;
const MAX_OSC_PAYLOAD: usize = 4096;

/// Events surfaced by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    KittyPush(u8),
    KittyPop(usize),
    KittySet { flags: u8, mode: u8 },
    Title(String),
    Progress { state: ProgressState, value: u8 },
}

#[derive(Debug)]
enum State {
    Ground,
    Escape,
    Csi { params: Vec<u8> },
    Osc { payload: Vec<u8>, esc_pending: bool },
}

#[derive(Debug)]
pub struct ControlScanner {
    state: State,
}

impl Default for ControlScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlScanner {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
        }
    }

    /// Feed one chunk, returning the control events it completed.
    pub fn scan(&mut self, chunk: &[u8]) -> Vec<ControlEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            self.step(byte, &mut events);
        }
        events
    }

    fn step(&mut self, byte: u8, events: &mut Vec<ControlEvent>) {
        let state = std::mem::replace(&mut self.state, State::Ground);
        self.state = match state {
            State::Ground => {
                if byte == 0x1b {
                    State::Escape
                } else {
                    State::Ground
                }
            }
            State::Escape => match byte {
                b'[' => State::Csi { params: Vec::new() },
                b']' => State::Osc {
                    payload: Vec::new(),
                    esc_pending: false,
                },
                0x1b => State::Escape,
                _ => State::Ground,
            },
            State::Csi { mut params } => {
                match byte {
                    // Parameter and intermediate bytes
                    0x20..=0x3f => {
                        if params.len() >= MAX_CSI_PARAMS {
                            State::Ground
                        } else {
                            params.push(byte);
                            State::Csi { params }
                        }
                    }
                    // Final byte
                    0x40..=0x7e => {
                        if byte == b'u' {
                            if let Some(event) = parse_kitty(&params) {
                                events.push(event);
                            }
                        }
                        State::Ground
                    }
                    0x1b => State::Escape,
                    _ => State::Ground,
                }
            }
            State::Osc {
                mut payload,
                esc_pending,
            } => {
                if esc_pending {
                    // ESC \ is the ST terminator; anything else aborts the OSC
                    if byte == b'\\' {
                        if let Some(event) = parse_osc(&payload) {
                            events.push(event);
                        }
                        State::Ground
                    } else if byte == b'[' {
                        State::Csi { params: Vec::new() }
                    } else {
                        State::Ground
                    }
                } else {
                    match byte {
                        0x07 => {
                            if let Some(event) = parse_osc(&payload) {
                                events.push(event);
                            }
                            State::Ground
                        }
                        0x1b => State::Osc {
                            payload,
                            esc_pending: true,
                        },
                        _ => {
                            if payload.len() >= MAX_OSC_PAYLOAD {
                                State::Ground
                            } else {
                                payload.push(byte);
                                State::Osc {
                                    payload,
                                    esc_pending: false,
                                }
                            }
                        }
                    }
                }
            }
        };
    }
}

/// Interpret the parameter bytes of a `CSI ... u` sequence.
fn parse_kitty(params: &[u8]) -> Option<ControlEvent> {
    let params = std::str::from_utf8(params).ok()?;
    if let Some(rest) = params.strip_prefix('>') {
        let flags: u8 = if rest.is_empty() { 1 } else { rest.parse().ok()? };
        return Some(ControlEvent::KittyPush(flags));
    }
    if let Some(rest) = params.strip_prefix('<') {
        let count: usize = if rest.is_empty() { 1 } else { rest.parse().ok()? };
        return Some(ControlEvent::KittyPop(count));
    }
    if let Some(rest) = params.strip_prefix('=') {
        let (flags, mode) = match rest.split_once(';') {
            Some((f, m)) => (f.parse().ok()?, m.parse().ok()?),
            None => (rest.parse().ok()?, 1),
        };
        return Some(ControlEvent::KittySet { flags, mode });
    }
    None
}

/// Interpret an OSC payload: title changes and progress reports.
fn parse_osc(payload: &[u8]) -> Option<ControlEvent> {
    let text = String::from_utf8_lossy(payload);
    if let Some(title) = text.strip_prefix("0;").or_else(|| text.strip_prefix("2;")) {
        return Some(ControlEvent::Title(title.to_string()));
    }
    if let Some(rest) = text.strip_prefix("9;4") {
        let mut parts = rest.trim_start_matches(';').split(';');
        let state: u8 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let value: u8 = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .map(|v| v.min(100) as u8)
            .unwrap_or(0);
        return Some(ControlEvent::Progress {
            state: ProgressState::from_code(state),
            value,
        });
    }
    None
}
