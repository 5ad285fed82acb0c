//! Application-wide constants
//!
//! Magic numbers and string literals used across the overlay, kept in one place.

/// Configuration file location
pub mod config {
    /// Directory under the user config dir
    pub const APP_DIR: &str = "game-partner";

    /// Config file name
    pub const FILENAME: &str = "config.toml";

    /// Log file name (written next to the config file when file logging is enabled)
    pub const LOG_FILENAME: &str = "game-partner.log";

    /// Environment variables checked (in order) for the provider credential
    pub const API_KEY_ENV_VARS: &[&str] = &["GAME_PARTNER_API_KEY", "ANTHROPIC_API_KEY"];

    /// Environment variable overriding the model identifier
    pub const MODEL_ENV_VAR: &str = "GAME_PARTNER_MODEL";
}

/// X11 protocol constants
pub mod x11 {
    /// Override redirect flag for unmanaged windows
    pub const OVERRIDE_REDIRECT: u32 = 1;

    /// Bits per pixel of Z_PIXMAP images on 24/32-bit visuals
    pub const BITS_PER_PIXEL: usize = 32;

    /// Upper bound on bytes sent in a single PutImage request
    pub const MAX_PUT_IMAGE_BYTES: usize = 192 * 1024;

    /// WM_CLASS value for our windows (instance\0class\0)
    pub const WM_CLASS: &[u8] = b"game-partner\0game-partner\0";

    /// ShiftMask bit in key event state
    pub const SHIFT_MASK: u16 = 1 << 0;

    /// LockMask (caps lock) bit in key event state
    pub const LOCK_MASK: u16 = 1 << 1;
}

/// Input event constants (from evdev)
pub mod input {
    /// Key press event value
    pub const KEY_PRESS: i32 = 1;
}

/// Linux input device paths and permissions
pub mod paths {
    /// Directory scanned for keyboard devices
    pub const DEV_INPUT: &str = "/dev/input";
}

pub mod permissions {
    /// Group granting read access to /dev/input
    pub const INPUT_GROUP: &str = "input";

    /// Command hint printed when access is denied
    pub const ADD_TO_INPUT_GROUP: &str = "sudo usermod -aG input $USER";
}

/// Overlay placement
pub mod positioning {
    /// Gap between the overlay and the screen edges
    pub const EDGE_PADDING: i32 = 40;

    /// Vertical gap between the overlay and the input dialog
    pub const DIALOG_GAP: i32 = 8;

    /// Input dialog height in pixels
    pub const DIALOG_HEIGHT: u16 = 36;
}

/// Overlay painting
pub mod render {
    use std::time::Duration;

    /// Renderer poll interval (~60 Hz)
    pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

    /// Inner padding around overlay text
    pub const TEXT_PADDING: usize = 12;

    /// Extra pixels between text lines
    pub const LINE_SPACING: usize = 4;

    /// How long a busy notice stays on screen
    pub const NOTICE_DURATION: Duration = Duration::from_secs(3);

    /// Line shown while a request is in flight
    pub const PENDING_LINE: &str = "Thinking...";

    /// Dialog prompt label
    pub const DIALOG_LABEL: &str = "Prompt: ";

    /// Dialog hint shown on the right
    pub const DIALOG_HINT: &str = "SEND (enter)";

    /// How long shutdown waits for the renderer to tear down its windows
    pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
}

/// Anthropic Messages API
pub mod api {
    /// Messages endpoint path appended to the configured base URL
    pub const MESSAGES_PATH: &str = "/v1/messages";

    /// API version header value
    pub const VERSION: &str = "2023-06-01";
}

/// Defaults for generated config files
pub mod defaults {
    pub const ENDPOINT: &str = "https://api.anthropic.com";
    pub const MODEL: &str = "claude-3-5-sonnet-20241022";
    pub const MAX_TOKENS: u32 = 300;
    pub const TEMPERATURE: f32 = 0.7;
    pub const MAX_RESPONSE_LENGTH: u32 = 150;
    pub const MEMORY_WINDOW: usize = 5;

    pub const MAX_HISTORY: usize = 50;
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const CANCEL_GRACE_MS: u64 = 2000;

    pub const AUTO_INTERVAL_SECS: u64 = 30;
    pub const MAX_SCREENSHOTS: usize = 5;
    pub const MAX_CAPTURE_WIDTH: u32 = 1568;

    pub const OVERLAY_WIDTH: u16 = 400;
    pub const OVERLAY_HEIGHT: u16 = 300;
    pub const OPACITY_PERCENT: u8 = 85;
    pub const FONT_SIZE: f32 = 14.0;
    pub const TEXT_COLOR: &str = "#FFFFFF";
    pub const BACKGROUND_COLOR: &str = "#1A1A1A";
    pub const VISIBLE_MESSAGES: usize = 5;

    pub const HOTKEY_TOGGLE: &str = "ctrl+shift+end";
    pub const HOTKEY_CYCLE: &str = "ctrl+shift+home";
    pub const HOTKEY_INPUT: &str = "ctrl+shift+enter";
}

/// Config validation ranges
pub mod validation {
    pub const MAX_TOKENS: std::ops::RangeInclusive<u32> = 1..=4096;
    pub const MAX_MEMORY_WINDOW: usize = 50;
    pub const MAX_HISTORY: std::ops::RangeInclusive<usize> = 1..=1000;
    pub const REQUEST_TIMEOUT_SECS: std::ops::RangeInclusive<u64> = 1..=600;
    pub const MAX_CANCEL_GRACE_MS: u64 = 60_000;
    /// Auto capture may be disabled (0) but never faster than this
    pub const MIN_AUTO_INTERVAL_SECS: u64 = 5;
    pub const MAX_AUTO_INTERVAL_SECS: u64 = 3600;
    pub const MAX_SCREENSHOTS: std::ops::RangeInclusive<usize> = 1..=100;
    pub const CAPTURE_WIDTH: std::ops::RangeInclusive<u32> = 64..=8192;
    pub const DIMENSION: std::ops::RangeInclusive<u16> = 50..=4096;
    pub const OPACITY_PERCENT: std::ops::RangeInclusive<u8> = 10..=100;
    pub const FONT_SIZE: std::ops::RangeInclusive<f32> = 6.0..=96.0;
    pub const VISIBLE_MESSAGES: std::ops::RangeInclusive<usize> = 1..=50;
}
