//! Hotkey binding strings such as `ctrl+shift+end`

use evdev::KeyCode;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    /// Modifier state from the set of currently held keys
    pub fn from_held(held: impl Fn(KeyCode) -> bool) -> Self {
        Self {
            ctrl: held(KeyCode::KEY_LEFTCTRL) || held(KeyCode::KEY_RIGHTCTRL),
            shift: held(KeyCode::KEY_LEFTSHIFT) || held(KeyCode::KEY_RIGHTSHIFT),
            alt: held(KeyCode::KEY_LEFTALT) || held(KeyCode::KEY_RIGHTALT),
            meta: held(KeyCode::KEY_LEFTMETA) || held(KeyCode::KEY_RIGHTMETA),
        }
    }
}

/// A key plus the exact set of modifiers that must be held with it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HotkeyBinding {
    pub modifiers: Modifiers,
    pub key: KeyCode,
}

impl HotkeyBinding {
    /// Parse `modifier+...+key`, case-insensitive
    pub fn parse(raw: &str) -> Result<Self, String> {
        let parts: Vec<String> = raw
            .split('+')
            .map(|p| p.trim().to_ascii_lowercase())
            .collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(format!("'{raw}' has an empty key name"));
        }
        let Some((key_name, modifier_names)) = parts.split_last() else {
            return Err("binding is empty".to_string());
        };

        let mut modifiers = Modifiers::default();
        for name in modifier_names {
            let flag = match name.as_str() {
                "ctrl" | "control" => &mut modifiers.ctrl,
                "shift" => &mut modifiers.shift,
                "alt" => &mut modifiers.alt,
                "super" | "meta" | "win" => &mut modifiers.meta,
                other => return Err(format!("'{other}' is not a modifier (ctrl, shift, alt, super)")),
            };
            if *flag {
                return Err(format!("modifier '{name}' repeated in '{raw}'"));
            }
            *flag = true;
        }

        let key = key_code(key_name).ok_or_else(|| format!("unknown key '{key_name}' in '{raw}'"))?;
        Ok(Self { modifiers, key })
    }

    pub fn matches(&self, key: KeyCode, held: Modifiers) -> bool {
        self.key == key && self.modifiers == held
    }
}

impl fmt::Display for HotkeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.modifiers;
        for (on, name) in [(m.ctrl, "ctrl"), (m.shift, "shift"), (m.alt, "alt"), (m.meta, "super")] {
            if on {
                write!(f, "{name}+")?;
            }
        }
        write!(f, "{:?}", self.key)
    }
}

fn key_code(name: &str) -> Option<KeyCode> {
    let code = match name {
        "a" => KeyCode::KEY_A,
        "b" => KeyCode::KEY_B,
        "c" => KeyCode::KEY_C,
        "d" => KeyCode::KEY_D,
        "e" => KeyCode::KEY_E,
        "f" => KeyCode::KEY_F,
        "g" => KeyCode::KEY_G,
        "h" => KeyCode::KEY_H,
        "i" => KeyCode::KEY_I,
        "j" => KeyCode::KEY_J,
        "k" => KeyCode::KEY_K,
        "l" => KeyCode::KEY_L,
        "m" => KeyCode::KEY_M,
        "n" => KeyCode::KEY_N,
        "o" => KeyCode::KEY_O,
        "p" => KeyCode::KEY_P,
        "q" => KeyCode::KEY_Q,
        "r" => KeyCode::KEY_R,
        "s" => KeyCode::KEY_S,
        "t" => KeyCode::KEY_T,
        "u" => KeyCode::KEY_U,
        "v" => KeyCode::KEY_V,
        "w" => KeyCode::KEY_W,
        "x" => KeyCode::KEY_X,
        "y" => KeyCode::KEY_Y,
        "z" => KeyCode::KEY_Z,
        "0" => KeyCode::KEY_0,
        "1" => KeyCode::KEY_1,
        "2" => KeyCode::KEY_2,
        "3" => KeyCode::KEY_3,
        "4" => KeyCode::KEY_4,
        "5" => KeyCode::KEY_5,
        "6" => KeyCode::KEY_6,
        "7" => KeyCode::KEY_7,
        "8" => KeyCode::KEY_8,
        "9" => KeyCode::KEY_9,
        "f1" => KeyCode::KEY_F1,
        "f2" => KeyCode::KEY_F2,
        "f3" => KeyCode::KEY_F3,
        "f4" => KeyCode::KEY_F4,
        "f5" => KeyCode::KEY_F5,
        "f6" => KeyCode::KEY_F6,
        "f7" => KeyCode::KEY_F7,
        "f8" => KeyCode::KEY_F8,
        "f9" => KeyCode::KEY_F9,
        "f10" => KeyCode::KEY_F10,
        "f11" => KeyCode::KEY_F11,
        "f12" => KeyCode::KEY_F12,
        "end" => KeyCode::KEY_END,
        "home" => KeyCode::KEY_HOME,
        "enter" | "return" => KeyCode::KEY_ENTER,
        "insert" => KeyCode::KEY_INSERT,
        "delete" | "del" => KeyCode::KEY_DELETE,
        "pageup" | "pgup" => KeyCode::KEY_PAGEUP,
        "pagedown" | "pgdn" => KeyCode::KEY_PAGEDOWN,
        "up" => KeyCode::KEY_UP,
        "down" => KeyCode::KEY_DOWN,
        "left" => KeyCode::KEY_LEFT,
        "right" => KeyCode::KEY_RIGHT,
        "space" => KeyCode::KEY_SPACE,
        "tab" => KeyCode::KEY_TAB,
        "escape" | "esc" => KeyCode::KEY_ESC,
        "backspace" => KeyCode::KEY_BACKSPACE,
        "grave" | "backtick" => KeyCode::KEY_GRAVE,
        "minus" => KeyCode::KEY_MINUS,
        "equal" => KeyCode::KEY_EQUAL,
        "pause" => KeyCode::KEY_PAUSE,
        "scrolllock" => KeyCode::KEY_SCROLLLOCK,
        "print" | "printscreen" => KeyCode::KEY_SYSRQ,
        _ => return None,
    };
    Some(code)
}
