//! ANSI escape sequence stripping.
//!
//! Produces the "clean" text view of a line that pattern matching operates
//! on. The raw bytes sent to renderer subscribers are never modified; this
//! is a separate, derived view.

/// Strip ANSI escape sequences and non-printing control characters.
///
/// Handles CSI sequences (`ESC [ ... final`), OSC sequences (`ESC ] ... BEL`
/// or `ESC ] ... ESC \`), two-character escapes (`ESC (`, `ESC =`, ...), and
/// drops remaining C0 control characters except tab. Carriage returns are
/// dropped; line feeds are kept so multi-line input stays multi-line.
pub fn strip_ansi(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameter and intermediate bytes, then one final byte
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if ('\x40'..='\x7e').contains(&next) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    // OSC: terminated by BEL or ST (ESC \)
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if next == '\x07' {
                            break;
                        }
                        if next == '\x1b' {
                            if chars.peek() == Some(&'\\') {
                                chars.next();
                            }
                            break;
                        }
                    }
                }
                Some(_) => {
                    // Two-character escape (charset selection, keypad mode, ...)
                    chars.next();
                }
                None => {}
            }
        } else if c == '\r' {
            // Skip carriage return
        } else if c.is_ascii_control() && c != '\n' && c != '\t' {
            // Skip other control characters
        } else {
            result.push(c);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(strip_ansi("hello world"), "hello world");
    }

    #[test]
    fn test_strips_sgr_colors() {
        assert_eq!(strip_ansi("\x1b[1;31merror\x1b[0m done"), "error done");
    }

    #[test]
    fn test_strips_cursor_movement() {
        assert_eq!(strip_ansi("\x1b[2J\x1b[Hcleared"), "cleared");
    }

    #[test]
    fn test_strips_osc_title_bel() {
        assert_eq!(strip_ansi("\x1b]0;my title\x07text"), "text");
    }

    #[test]
    fn test_strips_osc_title_st() {
        assert_eq!(strip_ansi("\x1b]2;my title\x1b\\text"), "text");
    }

    #[test]
    fn test_drops_carriage_returns() {
        assert_eq!(strip_ansi("progress\rdone"), "progressdone");
    }

    #[test]
    fn test_keeps_tabs_and_newlines() {
        assert_eq!(strip_ansi("a\tb\nc"), "a\tb\nc");
    }

    #[test]
    fn test_unicode_preserved() {
        assert_eq!(strip_ansi("\x1b[32m✓\x1b[0m 完了"), "✓ 完了");
    }

    #[test]
    fn test_private_mode_sequences() {
        assert_eq!(strip_ansi("\x1b[?25lhidden\x1b[?25h"), "hidden");
    }
}
