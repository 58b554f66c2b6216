//! Per-session reader thread.
//!
//! One blocking thread per live session is the sole consumer of the PTY
//! master's output. Each chunk is written to the scrollback ring verbatim,
//! forwarded to renderer subscribers unless the session is paused, and fed
//! through the control-sequence scanner and the line-reassembly/parse
//! pipeline - pattern detection keeps running while rendering is paused,
//! so a backgrounded tab can still raise rate-limit or question signals.
//!
//! There is no polling flag: the loop ends when the read returns EOF or an
//! error, which `close` forces by terminating the child.

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, trace};

use crate::domain::{EventKind, ParsedEvent};
use crate::parser;
use crate::parser::control::{ControlEvent, ControlScanner};
use crate::plugin::PluginRegistry;

use super::ansi::strip_ansi;
use super::line_buffer::LineBuffer;
use super::registry::SessionRegistry;
use super::session::{SessionEvent, SessionHandle};

const READ_BUF_SIZE: usize = 4096;

pub(crate) fn spawn(
    handle: Arc<SessionHandle>,
    mut output: Box<dyn Read + Send>,
    registry: Arc<SessionRegistry>,
    plugins: Arc<PluginRegistry>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut buf = [0u8; READ_BUF_SIZE];
        let mut lines = LineBuffer::new();
        let mut scanner = ControlScanner::new();

        loop {
            let n = match output.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    // EIO is the normal Linux signature of a vanished child.
                    trace!(session_id = %handle.id, error = %e, "pty read ended");
                    break;
                }
            };
            let chunk = &buf[..n];

            handle.note_output();
            handle.ring_write(chunk);

            // Control sequences first, so the keyboard-protocol state is
            // already current when subscribers react to this chunk.
            for event in scanner.scan(chunk) {
                apply_control(&handle, &plugins, event);
            }

            if !handle.is_paused() {
                handle.emit(SessionEvent::Data(chunk.to_vec()));
            }

            for line in lines.push(chunk) {
                process_line(&handle, &plugins, &line);
            }
        }

        // EOF: the last unterminated line still goes through the parser.
        if let Some(line) = lines.flush() {
            process_line(&handle, &plugins, &line);
        }

        // Natural-exit teardown. Loses to a concurrent explicit close, in
        // which case the closer waits on the child and notifies instead.
        if let Some((handle, mut child)) = registry.finish(&handle.id) {
            let code = child.wait().map(|s| s.exit_code() as i32).unwrap_or(-1);
            debug!(session_id = %handle.id, code, "session exited");
            handle.emit(SessionEvent::Exit(code));
        }
    })
}

/// Run one reassembled line through event extraction and plugin dispatch.
///
/// The parser is additionally guarded here: a panic on one line is logged
/// and the pipeline continues with the next. Watcher and handler isolation
/// happens inside the plugin registry.
fn process_line(handle: &SessionHandle, plugins: &PluginRegistry, line: &str) {
    let clean = strip_ansi(line);

    let events = match catch_unwind(AssertUnwindSafe(|| parser::parse_line(&handle.id, &clean))) {
        Ok(events) => events,
        Err(_) => {
            debug!(session_id = %handle.id, "parser panicked on a line; skipping it");
            Vec::new()
        }
    };
    for event in events {
        handle.emit(SessionEvent::Parsed(event.clone()));
        plugins.dispatch_event(&event);
    }

    plugins.dispatch_line(&clean, &handle.id);
}

fn apply_control(handle: &SessionHandle, plugins: &PluginRegistry, event: ControlEvent) {
    match event {
        ControlEvent::KittyPush(flags) => handle.with_keyboard(|kb| kb.push(flags)),
        ControlEvent::KittyPop(count) => handle.with_keyboard(|kb| kb.pop(count)),
        ControlEvent::KittySet { flags, mode } => handle.with_keyboard(|kb| kb.set(flags, mode)),
        ControlEvent::Title(title) => {
            publish(handle, plugins, EventKind::TitleChange { title });
        }
        ControlEvent::Progress { state, value } => {
            publish(handle, plugins, EventKind::Progress { state, value });
        }
    }
}

fn publish(handle: &SessionHandle, plugins: &PluginRegistry, kind: EventKind) {
    let event = ParsedEvent::new(handle.id.clone(), kind);
    handle.emit(SessionEvent::Parsed(event.clone()));
    plugins.dispatch_event(&event);
}
