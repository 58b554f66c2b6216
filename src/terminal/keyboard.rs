//! Kitty keyboard protocol state tracking and key encoding.
//!
//! TUI agents (Claude Code among them) negotiate the kitty keyboard protocol
//! by pushing a flag bitmask with `CSI > flags u` and popping it with
//! `CSI < count u`. The UI needs the currently negotiated flags to know how
//! to encode key combinations (shift+enter in particular) when writing them
//! back into the session.

use std::collections::HashMap;

/// Disambiguate-escape-codes flag: the only bit that changes how we encode
/// the keys TermDock writes back.
pub const FLAG_DISAMBIGUATE: u8 = 0b0000_0001;

/// All flag bits defined by the protocol; anything else is masked off.
const FLAG_MASK: u8 = 0b0001_1111;

/// Per-session kitty keyboard protocol state machine.
///
/// Mutated only by control sequences observed in that session's output
/// stream. Flags default to 0 (protocol not negotiated).
#[derive(Debug, Default)]
pub struct KeyboardProtocol {
    stack: Vec<u8>,
}

impl KeyboardProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently negotiated flags: top of the stack, or 0 when empty.
    pub fn flags(&self) -> u8 {
        self.stack.last().copied().unwrap_or(0)
    }

    /// `CSI > flags u`
    pub fn push(&mut self, flags: u8) {
        self.stack.push(flags & FLAG_MASK);
    }

    /// `CSI < count u` - pops `count` entries (default 1), saturating at
    /// empty so an unbalanced pop cannot underflow.
    pub fn pop(&mut self, count: usize) {
        let n = count.max(1).min(self.stack.len());
        self.stack.truncate(self.stack.len() - n);
    }

    /// `CSI = flags ; mode u` - mode 1 replaces, 2 sets bits, 3 clears bits.
    pub fn set(&mut self, flags: u8, mode: u8) {
        let flags = flags & FLAG_MASK;
        let current = self.stack.last_mut();
        match (mode, current) {
            (2, Some(top)) => *top |= flags,
            (3, Some(top)) => *top &= !flags,
            (_, Some(top)) => *top = flags,
            (2, None) | (1, None) | (0, None) => self.stack.push(flags),
            (_, None) => {}
        }
    }
}

/// Encode a named key for writing into a session.
///
/// Per-repository remap overrides (from the settings collaborator) win over
/// the default encoding; the default encoding respects the session's
/// negotiated kitty flags for the keys where the protocols differ.
pub fn encode_key(key: &str, flags: u8, remaps: &HashMap<String, String>) -> Option<Vec<u8>> {
    if let Some(seq) = remaps.get(key) {
        return Some(seq.clone().into_bytes());
    }

    let disambiguate = flags & FLAG_DISAMBIGUATE != 0;
    let seq: &[u8] = match key {
        "enter" => b"\r",
        // Legacy terminals cannot distinguish shift+enter from enter;
        // under the kitty protocol it has its own CSI-u encoding.
        "shift+enter" => {
            if disambiguate {
                b"\x1b[13;2u"
            } else {
                b"\r"
            }
        }
        "escape" => {
            if disambiguate {
                b"\x1b[27u"
            } else {
                b"\x1b"
            }
        }
        "tab" => b"\t",
        "shift+tab" => b"\x1b[Z",
        "ctrl+c" => b"\x03",
        "ctrl+d" => b"\x04",
        "up" => b"\x1b[A",
        "down" => b"\x1b[B",
        "right" => b"\x1b[C",
        "left" => b"\x1b[D",
        _ => return None,
    };
    Some(seq.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags_zero() {
        let kb = KeyboardProtocol::new();
        assert_eq!(kb.flags(), 0);
    }

    #[test]
    fn test_push_pop() {
        let mut kb = KeyboardProtocol::new();
        kb.push(1);
        assert_eq!(kb.flags(), 1);
        kb.push(5);
        assert_eq!(kb.flags(), 5);
        kb.pop(1);
        assert_eq!(kb.flags(), 1);
        kb.pop(1);
        assert_eq!(kb.flags(), 0);
    }

    #[test]
    fn test_pop_underflow_is_safe() {
        let mut kb = KeyboardProtocol::new();
        kb.pop(3);
        assert_eq!(kb.flags(), 0);
        kb.push(1);
        kb.pop(10);
        assert_eq!(kb.flags(), 0);
    }

    #[test]
    fn test_set_modes() {
        let mut kb = KeyboardProtocol::new();
        kb.push(0b00001);
        kb.set(0b00100, 2);
        assert_eq!(kb.flags(), 0b00101);
        kb.set(0b00001, 3);
        assert_eq!(kb.flags(), 0b00100);
        kb.set(0b00010, 1);
        assert_eq!(kb.flags(), 0b00010);
    }

    #[test]
    fn test_undefined_bits_masked() {
        let mut kb = KeyboardProtocol::new();
        kb.push(0xff);
        assert_eq!(kb.flags(), FLAG_MASK);
    }

    #[test]
    fn test_shift_enter_encoding_depends_on_flags() {
        let remaps = HashMap::new();
        assert_eq!(encode_key("shift+enter", 0, &remaps).unwrap(), b"\r");
        assert_eq!(
            encode_key("shift+enter", FLAG_DISAMBIGUATE, &remaps).unwrap(),
            b"\x1b[13;2u"
        );
    }

    #[test]
    fn test_remap_override_wins() {
        let mut remaps = HashMap::new();
        remaps.insert("shift+enter".to_string(), "\\\r".to_string());
        assert_eq!(
            encode_key("shift+enter", FLAG_DISAMBIGUATE, &remaps).unwrap(),
            b"\\\r"
        );
    }

    #[test]
    fn test_unknown_key() {
        assert!(encode_key("hyper+q", 0, &HashMap::new()).is_none());
    }
}
