//! Keycode to text translation for the input dialog

use anyhow::{Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt, Keycode, Keysym};
use x11rb::rust_connection::RustConnection;

use crate::constants::x11::{LOCK_MASK, SHIFT_MASK};

const XK_BACKSPACE: Keysym = 0xff08;
const XK_RETURN: Keysym = 0xff0d;
const XK_ESCAPE: Keysym = 0xff1b;
const XK_KP_ENTER: Keysym = 0xff8d;
/// Keysyms at or above this encode a Unicode code point directly
const UNICODE_KEYSYM_BASE: Keysym = 0x0100_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Return,
    Escape,
    BackSpace,
    Other,
}

pub struct KeyMap {
    min_keycode: Keycode,
    per_keycode: usize,
    keysyms: Vec<Keysym>,
}

impl KeyMap {
    pub fn new(min_keycode: Keycode, per_keycode: u8, keysyms: Vec<Keysym>) -> Self {
        Self {
            min_keycode,
            per_keycode: usize::from(per_keycode),
            keysyms,
        }
    }

    pub fn fetch(conn: &RustConnection) -> Result<Self> {
        let setup = conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let reply = conn
            .get_keyboard_mapping(min, max - min + 1)
            .context("Failed to request keyboard mapping")?
            .reply()
            .context("Failed to get keyboard mapping reply")?;
        Ok(Self::new(min, reply.keysyms_per_keycode, reply.keysyms))
    }

    fn keysym(&self, keycode: Keycode, index: usize) -> Keysym {
        if keycode < self.min_keycode || index >= self.per_keycode {
            return 0;
        }
        let base = usize::from(keycode - self.min_keycode) * self.per_keycode;
        self.keysyms.get(base + index).copied().unwrap_or(0)
    }

    /// Translate a key press; `state` is the event's modifier mask
    pub fn lookup(&self, keycode: Keycode, state: u16) -> Key {
        let lower = self.keysym(keycode, 0);
        let upper = match self.keysym(keycode, 1) {
            0 => lower,
            sym => sym,
        };
        let shifted = state & SHIFT_MASK != 0;
        let caps = state & LOCK_MASK != 0;

        let sym = match keysym_char(lower) {
            // Caps lock only affects letters
            Some(c) if c.is_alphabetic() => {
                if shifted ^ caps {
                    upper
                } else {
                    lower
                }
            }
            _ if shifted => upper,
            _ => lower,
        };

        match sym {
            XK_RETURN | XK_KP_ENTER => Key::Return,
            XK_ESCAPE => Key::Escape,
            XK_BACKSPACE => Key::BackSpace,
            _ => keysym_char(sym).map_or(Key::Other, Key::Char),
        }
    }
}

fn keysym_char(sym: Keysym) -> Option<char> {
    match sym {
        0x20..=0x7e | 0xa0..=0xff => char::from_u32(sym),
        s if s >= UNICODE_KEYSYM_BASE => char::from_u32(s - UNICODE_KEYSYM_BASE).filter(|c| !c.is_control()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // keycodes 8.. : 'a'/'A', '1'/'!', Return, Escape, BackSpace, 'ö' via unicode keysym
    fn keymap() -> KeyMap {
        KeyMap::new(
            8,
            2,
            vec![
                0x61, 0x41, //
                0x31, 0x21, //
                XK_RETURN, 0, //
                XK_ESCAPE, 0, //
                XK_BACKSPACE, 0, //
                0x0100_00f6, 0x0100_00d6, //
            ],
        )
    }

    #[test]
    fn test_plain_and_shifted_characters() {
        let map = keymap();
        assert_eq!(map.lookup(8, 0), Key::Char('a'));
        assert_eq!(map.lookup(8, SHIFT_MASK), Key::Char('A'));
        assert_eq!(map.lookup(9, 0), Key::Char('1'));
        assert_eq!(map.lookup(9, SHIFT_MASK), Key::Char('!'));
        assert_eq!(map.lookup(13, SHIFT_MASK), Key::Char('Ö'));
    }

    #[test]
    fn test_caps_lock_only_affects_letters() {
        let map = keymap();
        assert_eq!(map.lookup(8, LOCK_MASK), Key::Char('A'));
        assert_eq!(map.lookup(8, LOCK_MASK | SHIFT_MASK), Key::Char('a'));
        assert_eq!(map.lookup(9, LOCK_MASK), Key::Char('1'));
    }

    #[test]
    fn test_special_keys() {
        let map = keymap();
        assert_eq!(map.lookup(10, 0), Key::Return);
        assert_eq!(map.lookup(10, SHIFT_MASK), Key::Return);
        assert_eq!(map.lookup(11, 0), Key::Escape);
        assert_eq!(map.lookup(12, 0), Key::BackSpace);
    }

    #[test]
    fn test_unknown_keycodes() {
        let map = keymap();
        assert_eq!(map.lookup(3, 0), Key::Other);
        assert_eq!(map.lookup(200, 0), Key::Other);
    }
}
