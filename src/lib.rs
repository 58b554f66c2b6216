//! TermDock - terminal dock for AI coding agents
//!
//! TermDock owns a fleet of pseudo-terminal sessions (shells running AI
//! coding CLIs like Claude Code or Codex), streams their raw output to
//! renderer subscribers, and extracts structured events (rate limits,
//! interactive prompts, declared intents, plan-file mentions) that plugins
//! can react to without touching the terminal byte stream.
//!
//! ## Architecture
//!
//! One blocking reader thread per live session feeds three consumers:
//!
//! 1. A per-session ring buffer (scrollback for late-attaching renderers)
//! 2. Raw-data broadcast to renderer subscribers (gated by the pause flag)
//! 3. The line reassembler -> output parser -> plugin dispatch pipeline
//!
//! The [`terminal::SessionOrchestrator`] is the control-plane front door;
//! the [`plugin::PluginRegistry`] is the capability-gated extension host.

pub mod config;
pub mod domain;
pub mod git;
pub mod parser;
pub mod plugin;
pub mod terminal;

pub use domain::*;
