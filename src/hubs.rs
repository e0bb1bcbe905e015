// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hub-level types shared between the runtime and its callers.

use std::time::Duration;

use crate::consts::Color;
use crate::notifications::{EndState, HubAction};
use crate::snapshot::DeviceSnapshot;

pub mod runtime;

pub use runtime::Hub;

/// Connection lifecycle. Cyclic except for teardown; `Disconnecting` is
/// entered both by request and when the connect deadline lapses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HubState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Which protocol the hub was bound to after service discovery.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Protocol {
    Unselected,
    Lwp3Ble,
    SpikeBinary,
    SpikeJson,
}

/// What kind of byte transport backs this hub.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionKind {
    Ble,
    Line,
}

#[derive(Clone, Debug)]
pub struct HubConfig {
    pub connect_deadline: Duration,
    pub rssi_poll_interval: Duration,
    /// Minimum spacing of repeated identical battery events.
    pub battery_dampening: Duration,
    /// Interval requested from SPIKE hubs for device notifications.
    pub device_notification_interval_ms: u16,
    /// Chunk size for SPIKE writes until an InfoResponse arrives.
    pub default_max_packet_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            connect_deadline: Duration::from_secs(10),
            rssi_poll_interval: Duration::from_secs(5),
            battery_dampening: Duration::from_secs(120),
            device_notification_interval_ms: 5000,
            default_max_packet_size: 20,
        }
    }
}

/// Semantic commands accepted by [`Hub::send`]. The runtime encodes them
/// for whichever protocol the hub speaks; commands the active transport
/// cannot express surface as [`HubEvent::Diagnostic`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    StartPower {
        port: u8,
        power: i8,
    },
    Brake {
        port: u8,
    },
    Float {
        port: u8,
    },
    StartSpeed {
        port: u8,
        speed: i8,
        max_power: u8,
    },
    StartSpeedForTime {
        port: u8,
        time_ms: i16,
        speed: i8,
        max_power: u8,
        end_state: EndState,
    },
    StartSpeedForDegrees {
        port: u8,
        degrees: i32,
        speed: i8,
        max_power: u8,
        end_state: EndState,
    },
    GotoAbsolutePosition {
        port: u8,
        position: i32,
        speed: i8,
        max_power: u8,
        end_state: EndState,
    },
    HubLedColor(Color),
    HubLedRgb {
        red: u8,
        green: u8,
        blue: u8,
    },
    HubAction(HubAction),
    CreateVirtualPort {
        port_a: u8,
        port_b: u8,
    },
    DisconnectVirtualPort {
        port: u8,
    },
    SetHubName(String),
    StartProgram {
        slot: u8,
    },
    StopProgram {
        slot: u8,
    },
    ClearSlot {
        slot: u8,
    },
}

/// Events published to [`Hub::subscribe`] listeners. Snapshot-carrying
/// events hold immutable copies; readers never contend with the decoder.
#[derive(Clone, Debug)]
pub enum HubEvent {
    StateChanged(HubState),
    AttachedDevicesChanged(DeviceSnapshot),
    DeviceDataChanged(DeviceSnapshot),
    BatteryChanged(u8),
    RssiChanged(i16),
    NameChanged(String),
    /// Services were discovered but none is a protocol this engine
    /// speaks; the manager may retry the device on the line transport.
    NoUsableProtocol,
    /// Text forwarded from a SPIKE hub's console channel.
    Console(String),
    /// Dropped frames, unsupported commands, hub alerts.
    Diagnostic(String),
}
