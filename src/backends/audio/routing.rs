// SPDX-License-Identifier: GPL-3.0-only

//! Audio device routing preferences
//!
//! Capture prefers a USB input. Playback prefers external outputs so the
//! built-in speaker is not fed from the capture card's microphone:
//!
//! 1. Bluetooth (classic and low-energy)
//! 2. Wired or USB headsets and headphones
//! 3. Built-in speaker or earpiece
//!
//! Within a tier the type order decides, then platform device order.

use super::AudioDeviceInfo;
use std::fmt;

/// Endpoint type as far as routing cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioDeviceKind {
    UsbDevice,
    UsbHeadset,
    BluetoothA2dp,
    BluetoothSco,
    BleHeadset,
    BleSpeaker,
    BleBroadcast,
    WiredHeadset,
    WiredHeadphones,
    BuiltinSpeaker,
    BuiltinEarpiece,
    BuiltinMic,
    Other,
}

impl fmt::Display for AudioDeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioDeviceKind::UsbDevice => "usb-device",
            AudioDeviceKind::UsbHeadset => "usb-headset",
            AudioDeviceKind::BluetoothA2dp => "bluetooth-a2dp",
            AudioDeviceKind::BluetoothSco => "bluetooth-sco",
            AudioDeviceKind::BleHeadset => "ble-headset",
            AudioDeviceKind::BleSpeaker => "ble-speaker",
            AudioDeviceKind::BleBroadcast => "ble-broadcast",
            AudioDeviceKind::WiredHeadset => "wired-headset",
            AudioDeviceKind::WiredHeadphones => "wired-headphones",
            AudioDeviceKind::BuiltinSpeaker => "builtin-speaker",
            AudioDeviceKind::BuiltinEarpiece => "builtin-earpiece",
            AudioDeviceKind::BuiltinMic => "builtin-mic",
            AudioDeviceKind::Other => "other",
        };
        f.write_str(name)
    }
}

const CAPTURE_KINDS: &[AudioDeviceKind] = &[AudioDeviceKind::UsbDevice, AudioDeviceKind::UsbHeadset];

const PLAYBACK_TIERS: &[&[AudioDeviceKind]] = &[
    &[
        AudioDeviceKind::BluetoothA2dp,
        AudioDeviceKind::BluetoothSco,
        AudioDeviceKind::BleHeadset,
        AudioDeviceKind::BleSpeaker,
        AudioDeviceKind::BleBroadcast,
    ],
    &[
        AudioDeviceKind::WiredHeadset,
        AudioDeviceKind::WiredHeadphones,
        AudioDeviceKind::UsbHeadset,
    ],
    &[AudioDeviceKind::BuiltinSpeaker, AudioDeviceKind::BuiltinEarpiece],
];

/// First input whose kind is a USB input, in device order.
///
/// `None` means the platform default route.
pub fn pick_capture_route(inputs: &[AudioDeviceInfo]) -> Option<&AudioDeviceInfo> {
    inputs.iter().find(|d| CAPTURE_KINDS.contains(&d.kind))
}

/// Best output by the tier ladder. `None` means the platform default route.
pub fn pick_playback_route(outputs: &[AudioDeviceInfo]) -> Option<&AudioDeviceInfo> {
    PLAYBACK_TIERS
        .iter()
        .find_map(|tier| first_by_kinds(outputs, tier))
}

fn first_by_kinds<'a>(
    devices: &'a [AudioDeviceInfo],
    kinds: &[AudioDeviceKind],
) -> Option<&'a AudioDeviceInfo> {
    kinds
        .iter()
        .find_map(|kind| devices.iter().find(|d| d.kind == *kind))
}

/// Guess an endpoint kind from its name.
///
/// Desktop audio servers expose names, not types; these are the markers
/// ALSA, PulseAudio and PipeWire put into them.
pub fn classify_by_name(name: &str) -> AudioDeviceKind {
    let lower = name.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("bluez") || has("bluetooth") {
        if has("headset_head_unit") || has("hsp") || has("hfp") || has("sco") {
            AudioDeviceKind::BluetoothSco
        } else if has("le_audio") || has("le audio") || has("lc3") {
            AudioDeviceKind::BleHeadset
        } else {
            AudioDeviceKind::BluetoothA2dp
        }
    } else if has("usb") {
        if has("headset") || has("headphone") {
            AudioDeviceKind::UsbHeadset
        } else {
            AudioDeviceKind::UsbDevice
        }
    } else if has("headset") {
        AudioDeviceKind::WiredHeadset
    } else if has("headphone") {
        AudioDeviceKind::WiredHeadphones
    } else if has("speaker") || has("analog-stereo") || has("built-in") || has("hda intel") {
        AudioDeviceKind::BuiltinSpeaker
    } else if has("earpiece") {
        AudioDeviceKind::BuiltinEarpiece
    } else if has("mic") {
        AudioDeviceKind::BuiltinMic
    } else {
        AudioDeviceKind::Other
    }
}
