//! TOML settings for the overlay
//!
//! Loaded once at startup, overridden from the environment, then validated.
//! Any invalid value aborts startup before a window is created.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::constants::{self, defaults, validation};
use crate::error::ConfigError;
use crate::hotkeys::HotkeyBinding;
use crate::types::{Dimensions, Position};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub session: SessionSettings,
    pub capture: CaptureSettings,
    pub overlay: OverlaySettings,
    pub hotkeys: HotkeySettings,
}

/// AI provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub endpoint: String,
    /// Provider credential (env vars take precedence)
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Reply length the model is asked to stay under, in characters
    pub max_response_length: u32,
    /// Previous exchanges sent along with each request
    pub memory_window: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Initial state: Visible-Idle when true, Hidden otherwise
    pub start_visible: bool,
    pub max_history: usize,
    pub request_timeout_secs: u64,
    pub cancel_grace_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Seconds between automatic captures (0 = disabled)
    pub auto_interval_secs: u64,
    pub max_screenshots: usize,
    /// Screenshots wider than this are downscaled before upload
    pub max_width: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub width: u16,
    pub height: u16,
    pub opacity_percent: u8,
    /// Font family or full font name (empty = system default)
    pub font_family: String,
    pub font_size: f32,
    pub text_color: String,
    pub background_color: String,
    pub position: Position,
    pub visible_messages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeySettings {
    pub toggle_visibility: String,
    pub cycle_position: String,
    pub open_input: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            endpoint: defaults::ENDPOINT.to_string(),
            api_key: String::new(),
            model: defaults::MODEL.to_string(),
            max_tokens: defaults::MAX_TOKENS,
            temperature: defaults::TEMPERATURE,
            max_response_length: defaults::MAX_RESPONSE_LENGTH,
            memory_window: defaults::MEMORY_WINDOW,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            start_visible: true,
            max_history: defaults::MAX_HISTORY,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            cancel_grace_ms: defaults::CANCEL_GRACE_MS,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            auto_interval_secs: defaults::AUTO_INTERVAL_SECS,
            max_screenshots: defaults::MAX_SCREENSHOTS,
            max_width: defaults::MAX_CAPTURE_WIDTH,
        }
    }
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            width: defaults::OVERLAY_WIDTH,
            height: defaults::OVERLAY_HEIGHT,
            opacity_percent: defaults::OPACITY_PERCENT,
            font_family: String::new(),
            font_size: defaults::FONT_SIZE,
            text_color: defaults::TEXT_COLOR.to_string(),
            background_color: defaults::BACKGROUND_COLOR.to_string(),
            position: Position::default(),
            visible_messages: defaults::VISIBLE_MESSAGES,
        }
    }
}

impl Default for HotkeySettings {
    fn default() -> Self {
        Self {
            toggle_visibility: defaults::HOTKEY_TOGGLE.to_string(),
            cycle_position: defaults::HOTKEY_CYCLE.to_string(),
            open_input: defaults::HOTKEY_INPUT.to_string(),
        }
    }
}

impl SessionSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

impl CaptureSettings {
    pub fn auto_interval(&self) -> Option<Duration> {
        (self.auto_interval_secs > 0).then(|| Duration::from_secs(self.auto_interval_secs))
    }
}

impl OverlaySettings {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

impl HotkeySettings {
    /// (action name, binding string) pairs in a stable order
    pub fn entries(&self) -> [(&'static str, &str); 3] {
        [
            ("toggle_visibility", self.toggle_visibility.as_str()),
            ("cycle_position", self.cycle_position.as_str()),
            ("open_input", self.open_input.as_str()),
        ]
    }
}

/// Parse `#RRGGBB` (leading '#' optional) into 0xRRGGBB
pub fn parse_hex_rgb(hex: &str) -> Option<u32> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

impl Settings {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(constants::config::APP_DIR);
        path.push(constants::config::FILENAME);
        path
    }

    /// Load settings, apply env overrides and validate.
    ///
    /// With no explicit path, a missing default config file is generated from
    /// defaults so the user has something to edit.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        let mut settings = match fs::read_to_string(&path) {
            Ok(contents) => {
                info!(path = %path.display(), "Loading config file");
                Self::from_toml_str(&contents, &path)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                let settings = Self::default();
                match settings.save(&path) {
                    Ok(()) => info!(path = %path.display(), "Generated default config file"),
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to write default config file"),
                }
                settings
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        settings.apply_overrides_from(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let contents = self.to_toml_string()?;
        fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply credential/model overrides; `lookup` is `std::env::var` outside tests
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for var in constants::config::API_KEY_ENV_VARS {
            if let Some(key) = lookup(var).filter(|k| !k.trim().is_empty()) {
                info!(var = %var, "Using API key from environment");
                self.api.api_key = key.trim().to_string();
                break;
            }
        }
        if let Some(model) = lookup(constants::config::MODEL_ENV_VAR).filter(|m| !m.trim().is_empty()) {
            info!(model = %model, "Using model from environment");
            self.api.model = model.trim().to_string();
        }
    }

    /// Check every value; the first violation is returned
    pub fn validate(&self) -> Result<(), ConfigError> {
        let api = &self.api;
        if api.api_key.trim().is_empty() {
            return Err(ConfigError::invalid(
                "api.api_key",
                format!(
                    "no credential configured (set it in the config file or via {})",
                    constants::config::API_KEY_ENV_VARS.join(" / ")
                ),
            ));
        }
        if !(api.endpoint.starts_with("https://") || api.endpoint.starts_with("http://")) {
            return Err(ConfigError::invalid("api.endpoint", format!("'{}' is not an http(s) URL", api.endpoint)));
        }
        if api.model.trim().is_empty() {
            return Err(ConfigError::invalid("api.model", "must not be empty"));
        }
        check_range("api.max_tokens", api.max_tokens, &validation::MAX_TOKENS)?;
        if !(0.0..=1.0).contains(&api.temperature) {
            return Err(ConfigError::invalid("api.temperature", format!("{} is outside 0.0..=1.0", api.temperature)));
        }
        if api.max_response_length == 0 {
            return Err(ConfigError::invalid("api.max_response_length", "must be at least 1"));
        }
        if api.memory_window > validation::MAX_MEMORY_WINDOW {
            return Err(ConfigError::invalid(
                "api.memory_window",
                format!("{} exceeds maximum {}", api.memory_window, validation::MAX_MEMORY_WINDOW),
            ));
        }

        let session = &self.session;
        check_range("session.max_history", session.max_history, &validation::MAX_HISTORY)?;
        check_range("session.request_timeout_secs", session.request_timeout_secs, &validation::REQUEST_TIMEOUT_SECS)?;
        if session.cancel_grace_ms > validation::MAX_CANCEL_GRACE_MS {
            return Err(ConfigError::invalid(
                "session.cancel_grace_ms",
                format!("{} exceeds maximum {}", session.cancel_grace_ms, validation::MAX_CANCEL_GRACE_MS),
            ));
        }

        let capture = &self.capture;
        if capture.auto_interval_secs != 0 {
            check_range(
                "capture.auto_interval_secs",
                capture.auto_interval_secs,
                &(validation::MIN_AUTO_INTERVAL_SECS..=validation::MAX_AUTO_INTERVAL_SECS),
            )?;
        }
        check_range("capture.max_screenshots", capture.max_screenshots, &validation::MAX_SCREENSHOTS)?;
        check_range("capture.max_width", capture.max_width, &validation::CAPTURE_WIDTH)?;

        let overlay = &self.overlay;
        check_range("overlay.width", overlay.width, &validation::DIMENSION)?;
        check_range("overlay.height", overlay.height, &validation::DIMENSION)?;
        check_range("overlay.opacity_percent", overlay.opacity_percent, &validation::OPACITY_PERCENT)?;
        check_range("overlay.font_size", overlay.font_size, &validation::FONT_SIZE)?;
        check_range("overlay.visible_messages", overlay.visible_messages, &validation::VISIBLE_MESSAGES)?;
        if parse_hex_rgb(&overlay.text_color).is_none() {
            return Err(ConfigError::invalid("overlay.text_color", format!("'{}' is not #RRGGBB", overlay.text_color)));
        }
        if parse_hex_rgb(&overlay.background_color).is_none() {
            return Err(ConfigError::invalid(
                "overlay.background_color",
                format!("'{}' is not #RRGGBB", overlay.background_color),
            ));
        }

        let mut parsed: Vec<(&str, HotkeyBinding)> = Vec::new();
        for (action, raw) in self.hotkeys.entries() {
            let binding = HotkeyBinding::parse(raw)
                .map_err(|reason| ConfigError::invalid(hotkey_field(action), reason))?;
            if let Some((other, _)) = parsed.iter().find(|(_, b)| *b == binding) {
                return Err(ConfigError::invalid(
                    hotkey_field(action),
                    format!("'{raw}' is already bound to {other}"),
                ));
            }
            parsed.push((action, binding));
        }

        Ok(())
    }
}

fn hotkey_field(action: &str) -> &'static str {
    match action {
        "toggle_visibility" => "hotkeys.toggle_visibility",
        "cycle_position" => "hotkeys.cycle_position",
        _ => "hotkeys.open_input",
    }
}

fn check_range<T>(field: &'static str, value: T, range: &std::ops::RangeInclusive<T>) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("{} is outside {}..={}", value, range.start(), range.end()),
        ))
    }
}
