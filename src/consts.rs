// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire-level constants for the two hub protocols, translated into Rust
//! types. Message and property ids follow
//! <https://lego.github.io/lego-ble-wireless-protocol-docs/index.html>.

use num_derive::FromPrimitive;
use serde::Serialize;
use std::fmt::{self, Debug, Display};

/// External ports 0..=5 are the sockets labelled A..F on the hub casing.
/// Everything at or above this id is a hub-internal virtual port (LED,
/// IMU, battery, ...).
pub const HUB_INTERNAL_PORT_BASE: u8 = 50;

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum MessageType {
    HubProperties = 0x01,
    HubActions = 0x02,
    HubAlerts = 0x03,
    HubAttachedIo = 0x04,
    GenericErrorMessages = 0x05,
    PortInformationRequest = 0x21,
    PortModeInformationRequest = 0x22,
    PortInputFormatSetupSingle = 0x41,
    PortInformation = 0x43,
    PortModeInformation = 0x44,
    PortValueSingle = 0x45,
    PortValueCombinedmode = 0x46,
    PortInputFormatSingle = 0x47,
    VirtualPortSetup = 0x61,
    PortOutputCommand = 0x81,
    PortOutputCommandFeedback = 0x82,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum HubPropertyKind {
    AdvertisingName = 0x01,
    Button = 0x02,
    FwVersion = 0x03,
    HwVersion = 0x04,
    Rssi = 0x05,
    BatteryVoltage = 0x06,
    BatteryType = 0x07,
    ManufacturerName = 0x08,
    RadioFirmwareVersion = 0x09,
    LegoWirelessProtocolVersion = 0x0A,
    SystemTypeId = 0x0B,
    HwNetworkId = 0x0C,
    PrimaryMacAddress = 0x0D,
    SecondaryMacAddress = 0x0E,
    HardwareNetworkFamily = 0x0F,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum HubPropertyOperation {
    SetDownstream = 0x01,
    EnableUpdatesDownstream = 0x02,
    DisableUpdatesDownstream = 0x03,
    ResetDownstream = 0x04,
    RequestUpdateDownstream = 0x05,
    UpdateUpstream = 0x06,
}

/// Attached-I/O event discriminant.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum IoEvent {
    DetachedIo = 0x00,
    AttachedIo = 0x01,
    AttachedVirtualIo = 0x02,
}

/// Port output sub-command ids, startup byte excluded.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum PortOutputSubCommandValue {
    SetAccTime = 0x05,
    SetDecTime = 0x06,
    StartSpeed = 0x07,
    StartSpeedForTime = 0x09,
    StartSpeedForDegrees = 0x0B,
    GotoAbsolutePosition = 0x0D,
    PresetEncoder = 0x14,
    WriteDirectModeData = 0x51,
}

/// Startup nibble 0x1 (execute immediately) + completion nibble 0x1
/// (command feedback) — the only combination this engine emits.
pub const STARTUP_EXECUTE_WITH_FEEDBACK: u8 = 0x11;

/// Named colours accepted by the hub LED in colour-index mode.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Color {
    Black = 0,
    Pink = 1,
    Purple = 2,
    Blue = 3,
    LightBlue = 4,
    Cyan = 5,
    Green = 6,
    Yellow = 7,
    Orange = 8,
    Red = 9,
    White = 10,
    None = 255,
}

/// Coarse classification of a device-type id, used to route port values
/// into the right snapshot map.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum DeviceCategory {
    Motor,
    Sensor,
    Light,
    HubInternal,
    Unknown,
}

/// A raw 16-bit device-type id as carried in attached-I/O messages.
///
/// The catalog of ids is sparse and grows with every hub generation, so
/// this is deliberately not an enum: unknown ids stay representable and
/// fall back to [`DeviceCategory::Unknown`].
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IoTypeId(pub u16);

/// id → (category, display name). Ids 48..=65 are the SPIKE Prime /
/// Robot Inventor generation.
static DEVICE_CATALOG: &[(u16, DeviceCategory, &str)] = &[
    (1, DeviceCategory::Motor, "Simple Medium Linear Motor"),
    (2, DeviceCategory::Motor, "Train Motor"),
    (8, DeviceCategory::Light, "LED Light"),
    (20, DeviceCategory::HubInternal, "Voltage Sensor"),
    (21, DeviceCategory::HubInternal, "Current Sensor"),
    (22, DeviceCategory::HubInternal, "Piezo Buzzer"),
    (23, DeviceCategory::HubInternal, "Hub LED"),
    (34, DeviceCategory::Sensor, "Tilt Sensor"),
    (35, DeviceCategory::Sensor, "Motion Sensor"),
    (37, DeviceCategory::Sensor, "Color & Distance Sensor"),
    (38, DeviceCategory::Motor, "Medium Linear Motor"),
    (39, DeviceCategory::Motor, "Move Hub Medium Linear Motor"),
    (40, DeviceCategory::HubInternal, "Move Hub Tilt Sensor"),
    (41, DeviceCategory::Motor, "Duplo Train Base Motor"),
    (42, DeviceCategory::HubInternal, "Duplo Train Base Speaker"),
    (43, DeviceCategory::Sensor, "Duplo Train Base Color Sensor"),
    (44, DeviceCategory::Sensor, "Duplo Train Base Speedometer"),
    (46, DeviceCategory::Motor, "Technic Large Linear Motor"),
    (47, DeviceCategory::Motor, "Technic XLarge Linear Motor"),
    (48, DeviceCategory::Motor, "Technic Medium Angular Motor"),
    (49, DeviceCategory::Motor, "Technic Large Angular Motor"),
    (54, DeviceCategory::HubInternal, "Gesture Sensor"),
    (55, DeviceCategory::HubInternal, "Remote Control Button"),
    (56, DeviceCategory::HubInternal, "Remote Control RSSI"),
    (57, DeviceCategory::HubInternal, "Accelerometer"),
    (58, DeviceCategory::HubInternal, "Gyro Sensor"),
    (59, DeviceCategory::HubInternal, "Tilt Sensor"),
    (60, DeviceCategory::HubInternal, "Temperature Sensor"),
    (61, DeviceCategory::Sensor, "Technic Color Sensor"),
    (62, DeviceCategory::Sensor, "Technic Distance Sensor"),
    (63, DeviceCategory::Sensor, "Technic Force Sensor"),
    (64, DeviceCategory::Light, "Technic 3x3 Color Light Matrix"),
    (65, DeviceCategory::Motor, "Technic Small Angular Motor"),
    (75, DeviceCategory::Motor, "Technic Medium Angular Motor"),
    (76, DeviceCategory::Motor, "Technic Large Angular Motor"),
];

impl IoTypeId {
    pub fn category(self) -> DeviceCategory {
        DEVICE_CATALOG
            .iter()
            .find(|(id, _, _)| *id == self.0)
            .map(|(_, cat, _)| *cat)
            .unwrap_or(DeviceCategory::Unknown)
    }

    pub fn label(self) -> &'static str {
        DEVICE_CATALOG
            .iter()
            .find(|(id, _, _)| *id == self.0)
            .map(|(_, _, name)| *name)
            .unwrap_or("Unknown Device")
    }
}

impl Display for IoTypeId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self.category() {
            DeviceCategory::Unknown => write!(fmt, "Unknown({:#06x})", self.0),
            _ => write!(fmt, "{}", self.label()),
        }
    }
}

impl Debug for IoTypeId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(fmt, "{}", self)
    }
}

/// Company identifier LEGO System A/S registered with the Bluetooth SIG,
/// little-endian in advertisement manufacturer data.
pub const LEGO_COMPANY_ID: u16 = 0x0397;

pub mod bleservice {
    use lazy_static::lazy_static;
    use uuid::Uuid;

    lazy_static! {
        /// LEGO Wireless Protocol 3 hub service.
        pub static ref LWP3_HUB: Uuid =
            Uuid::parse_str("00001623-1212-efde-1623-785feabcd123").unwrap();
        /// SPIKE Prime / Robot Inventor hub service.
        pub static ref SPIKE_HUB: Uuid =
            Uuid::parse_str("0000fd02-0000-1000-8000-00805f9b34fb").unwrap();
        /// Legacy 16-bit hub service (0xFEED), advertised but not spoken.
        pub static ref LEGACY_HUB: Uuid =
            Uuid::parse_str("0000feed-0000-1000-8000-00805f9b34fb").unwrap();
        /// Every service that identifies an advertisement as a LEGO hub.
        pub static ref KNOWN_LEGO_SERVICES: Vec<Uuid> =
            vec![*LWP3_HUB, *SPIKE_HUB, *LEGACY_HUB];
    }
}

pub mod blecharacteristic {
    use lazy_static::lazy_static;
    use uuid::Uuid;

    lazy_static! {
        /// The single LWP3 characteristic, both write and notify.
        pub static ref LWP3_ALL: Uuid =
            Uuid::parse_str("00001624-1212-efde-1623-785feabcd123").unwrap();
        /// SPIKE RX: hub receives, client writes without response.
        pub static ref SPIKE_RX: Uuid =
            Uuid::parse_str("0000fd02-0001-1000-8000-00805f9b34fb").unwrap();
        /// SPIKE TX: hub notifies.
        pub static ref SPIKE_TX: Uuid =
            Uuid::parse_str("0000fd02-0002-1000-8000-00805f9b34fb").unwrap();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn catalog_lookup() {
        assert_eq!(IoTypeId(49).category(), DeviceCategory::Motor);
        assert_eq!(IoTypeId(62).category(), DeviceCategory::Sensor);
        assert_eq!(IoTypeId(23).category(), DeviceCategory::HubInternal);
        assert_eq!(IoTypeId(0x4242).category(), DeviceCategory::Unknown);
        assert_eq!(format!("{}", IoTypeId(0x4242)), "Unknown(0x4242)");
        assert_eq!(IoTypeId(2).label(), "Train Motor");
    }
}
