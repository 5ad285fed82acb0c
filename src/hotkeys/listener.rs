use anyhow::{Context, Result};
use evdev::{Device, EventSummary, KeyCode};
use std::thread;
use tracing::{debug, error, info, warn};

use super::HotkeySender;
use super::binding::{HotkeyBinding, Modifiers};
use crate::config::HotkeySettings;
use crate::constants::{input, paths, permissions};
use crate::error::HotkeyRegistrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    ToggleVisibility,
    CyclePosition,
    OpenInput,
}

impl HotkeyAction {
    pub fn name(self) -> &'static str {
        match self {
            HotkeyAction::ToggleVisibility => "toggle_visibility",
            HotkeyAction::CyclePosition => "cycle_position",
            HotkeyAction::OpenInput => "open_input",
        }
    }
}

/// Parsed bindings in action order. Settings are validated before this runs,
/// so a binding that still fails to parse is skipped with a warning.
pub fn bindings_from_settings(settings: &HotkeySettings) -> Vec<(HotkeyAction, HotkeyBinding)> {
    [
        (HotkeyAction::ToggleVisibility, settings.toggle_visibility.as_str()),
        (HotkeyAction::CyclePosition, settings.cycle_position.as_str()),
        (HotkeyAction::OpenInput, settings.open_input.as_str()),
    ]
    .into_iter()
    .filter_map(|(action, raw)| match HotkeyBinding::parse(raw) {
        Ok(binding) => Some((action, binding)),
        Err(reason) => {
            warn!(action = action.name(), binding = raw, reason = %reason, "Skipping hotkey");
            None
        }
    })
    .collect()
}

pub struct ListenerHandles {
    pub threads: Vec<thread::JoinHandle<()>>,
    /// Bindings at least one device can produce
    pub active: Vec<(HotkeyAction, HotkeyBinding)>,
    /// Bindings dropped because no device has the key
    pub dropped: Vec<HotkeyRegistrationError>,
}

/// Find all devices that look like keyboards (have letter and Enter keys)
fn find_keyboard_devices() -> Result<Vec<Device>, HotkeyRegistrationError> {
    info!(path = %paths::DEV_INPUT, "Scanning for keyboard devices...");

    let entries = std::fs::read_dir(paths::DEV_INPUT).map_err(|e| {
        HotkeyRegistrationError::NoDevices(format!(
            "cannot read {}: {e} (are you in the '{}' group? {})",
            paths::DEV_INPUT,
            permissions::INPUT_GROUP,
            permissions::ADD_TO_INPUT_GROUP
        ))
    })?;

    let mut devices = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let is_event_node = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("event"));
        if !is_event_node {
            continue;
        }
        let Ok(device) = Device::open(&path) else {
            continue;
        };
        let is_keyboard = device
            .supported_keys()
            .is_some_and(|keys| keys.contains(KeyCode::KEY_A) && keys.contains(KeyCode::KEY_ENTER));
        if is_keyboard {
            info!(device_path = %path.display(), name = ?device.name(), "Found keyboard device");
            devices.push(device);
        }
    }

    if devices.is_empty() {
        return Err(HotkeyRegistrationError::NoDevices(format!(
            "no readable keyboard under {}; add yourself to the '{}' group with `{}`, then log out and back in",
            paths::DEV_INPUT,
            permissions::INPUT_GROUP,
            permissions::ADD_TO_INPUT_GROUP
        )));
    }

    info!(count = devices.len(), "Listening on keyboard device(s)");
    Ok(devices)
}

/// Keep bindings some device supports; report the rest
fn partition_supported(
    bindings: &[(HotkeyAction, HotkeyBinding)],
    supports: impl Fn(KeyCode) -> bool,
) -> (Vec<(HotkeyAction, HotkeyBinding)>, Vec<HotkeyRegistrationError>) {
    let mut active = Vec::new();
    let mut dropped = Vec::new();
    for (action, binding) in bindings {
        if supports(binding.key) {
            active.push((*action, *binding));
        } else {
            dropped.push(HotkeyRegistrationError::UnsupportedKey {
                action: action.name(),
                binding: binding.to_string(),
            });
        }
    }
    (active, dropped)
}

/// Spawn one blocking reader thread per keyboard device
pub fn spawn_listeners(
    bindings: &[(HotkeyAction, HotkeyBinding)],
    sender: HotkeySender,
) -> Result<ListenerHandles, HotkeyRegistrationError> {
    let devices = find_keyboard_devices()?;

    let (active, dropped) = partition_supported(bindings, |key| {
        devices
            .iter()
            .any(|d| d.supported_keys().is_some_and(|keys| keys.contains(key)))
    });
    for err in &dropped {
        warn!(error = %err, "Hotkey unavailable");
    }

    let mut threads = Vec::new();
    if active.is_empty() {
        return Ok(ListenerHandles {
            threads,
            active,
            dropped,
        });
    }

    for device in devices {
        let sender = sender.clone();
        let bindings = active.clone();
        let handle = thread::spawn(move || {
            info!(device = ?device.name(), "Hotkey listener started");
            if let Err(e) = listen_for_hotkeys(device, &bindings, &sender) {
                error!(error = %e, "Hotkey listener error");
            }
        });
        threads.push(handle);
    }

    Ok(ListenerHandles {
        threads,
        active,
        dropped,
    })
}

/// Read events from one device until it fails or the bus consumer is gone
fn listen_for_hotkeys(
    mut device: Device,
    bindings: &[(HotkeyAction, HotkeyBinding)],
    sender: &HotkeySender,
) -> Result<()> {
    loop {
        // Finish with the events iterator before querying key state
        let mut pressed = Vec::new();
        for event in device.fetch_events().context("Failed to fetch events")? {
            if let EventSummary::Key(_, key, value) = event.destructure() {
                if value == input::KEY_PRESS && bindings.iter().any(|(_, b)| b.key == key) {
                    pressed.push(key);
                }
            }
        }
        if pressed.is_empty() {
            continue;
        }

        // Live modifier state avoids ordering issues within a batch
        let state = device.get_key_state().context("Failed to get keyboard state")?;
        let held = Modifiers::from_held(|k| state.contains(k));

        for key in pressed {
            let Some((action, _)) = bindings.iter().find(|(_, b)| b.matches(key, held)) else {
                debug!(key = ?key, modifiers = ?held, "Key press without matching modifiers");
                continue;
            };
            info!(action = action.name(), "Hotkey pressed");
            if !sender.send(*action) {
                info!("Hotkey bus closed, stopping listener");
                return Ok(());
            }
        }
    }
}
