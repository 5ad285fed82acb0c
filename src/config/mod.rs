//! Configuration management for game-partner
//!
//! A single TOML file under the user config dir, overridable from the
//! environment and validated before anything else starts.

pub mod settings;

pub use settings::{
    ApiSettings, CaptureSettings, HotkeySettings, OverlaySettings, SessionSettings, Settings, parse_hex_rgb,
};
