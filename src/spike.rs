// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Message codec for the SPIKE Prime / Robot Inventor binary protocol.
//!
//! Payloads travel inside the COBS framing from [`crate::cobs`]. Inbound
//! messages are keyed by a one-byte tag; the interesting one is the
//! device notification, a concatenation of fixed-size telemetry
//! sub-records that together describe the hub's entire port state.

use crate::error::{Error, OptionContext, Result};
use log::{debug, trace};

// Message tags.
pub const INFO_REQUEST: u8 = 0x00;
pub const INFO_RESPONSE: u8 = 0x01;
pub const SET_HUB_NAME: u8 = 0x16;
pub const GET_HUB_NAME: u8 = 0x18;
pub const PROGRAM_FLOW_REQUEST: u8 = 0x1E;
pub const CONSOLE_NOTIFICATION: u8 = 0x21;
pub const DEVICE_NOTIFICATION_REQUEST: u8 = 0x28;
pub const DEVICE_NOTIFICATION: u8 = 0x3C;
pub const CLEAR_SLOT_REQUEST: u8 = 0x46;

#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpikeMessage {
    InfoResponse(InfoResponse),
    DeviceNotification(DeviceNotification),
    ConsoleNotification(String),
    Unknown { tag: u8, payload: Vec<u8> },
}

impl SpikeMessage {
    /// Parse one unpacked frame. Unknown tags are carried through; only a
    /// structurally broken frame is an error.
    pub fn parse(msg: &[u8]) -> Result<Self> {
        trace!("SPIKE frame: {:02x?}", msg);
        let (&tag, payload) = msg.split_first().context("Empty SPIKE frame")?;

        Ok(match tag {
            INFO_RESPONSE => SpikeMessage::InfoResponse(InfoResponse::parse(msg)?),
            DEVICE_NOTIFICATION => {
                SpikeMessage::DeviceNotification(DeviceNotification::parse(msg)?)
            }
            CONSOLE_NOTIFICATION => {
                let text = String::from_utf8_lossy(payload)
                    .trim_end_matches('\0')
                    .to_string();
                SpikeMessage::ConsoleNotification(text)
            }
            tag => SpikeMessage::Unknown {
                tag,
                payload: payload.to_vec(),
            },
        })
    }
}

/// Limits and versions negotiated by the first exchange on the link. The
/// runtime keeps `max_packet_size` for write chunking.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct InfoResponse {
    pub rpc_major: u8,
    pub rpc_minor: u8,
    pub rpc_build: u16,
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub firmware_build: u16,
    pub max_packet_size: u16,
    pub max_message_size: u16,
    pub max_chunk_size: u16,
    pub product_group_device: u16,
}

impl InfoResponse {
    pub const SIZE: usize = 17;

    pub fn parse(msg: &[u8]) -> Result<Self> {
        if msg.len() < Self::SIZE {
            return Err(Error::MalformedFrame(format!(
                "InfoResponse needs {} bytes, got {}",
                Self::SIZE,
                msg.len()
            )));
        }
        Ok(Self {
            rpc_major: msg[1],
            rpc_minor: msg[2],
            rpc_build: u16::from_le_bytes([msg[3], msg[4]]),
            firmware_major: msg[5],
            firmware_minor: msg[6],
            firmware_build: u16::from_le_bytes([msg[7], msg[8]]),
            max_packet_size: u16::from_le_bytes([msg[9], msg[10]]),
            max_message_size: u16::from_le_bytes([msg[11], msg[12]]),
            max_chunk_size: u16::from_le_bytes([msg[13], msg[14]]),
            product_group_device: u16::from_le_bytes([msg[15], msg[16]]),
        })
    }
}

/// Sub-record tags inside a device notification.
mod record_tag {
    pub const BATTERY: u8 = 0x00;
    pub const IMU: u8 = 0x01;
    pub const DISPLAY_5X5: u8 = 0x02;
    pub const MOTOR: u8 = 0x0A;
    pub const FORCE: u8 = 0x0B;
    pub const COLOR: u8 = 0x0C;
    pub const DISTANCE: u8 = 0x0D;
    pub const MATRIX_3X3: u8 = 0x0E;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceRecord {
    Battery {
        level: u8,
    },
    Imu {
        face: u8,
        accelerometer: [i16; 3],
        gyroscope: [i16; 3],
        orientation: [i16; 3],
        /// Most recent gesture id; 0 when none.
        gesture: u8,
    },
    Display5x5 {
        port: u8,
        pixels: [u8; 25],
    },
    Motor {
        port: u8,
        device_type: u8,
        absolute_position: i16,
        power: i16,
        speed: i8,
        position: i32,
    },
    Force {
        port: u8,
        force: u8,
        pressed: bool,
    },
    Color {
        port: u8,
        color_id: i8,
        red: u16,
        green: u16,
        blue: u16,
    },
    Distance {
        port: u8,
        /// Millimetres; −1 means nothing detected.
        distance_mm: i16,
    },
    Matrix3x3 {
        port: u8,
        pixels: [u8; 9],
    },
}

impl DeviceRecord {
    /// Total record size including the tag byte.
    fn size(tag: u8) -> Option<usize> {
        Some(match tag {
            record_tag::BATTERY => 2,
            record_tag::IMU => 21,
            record_tag::DISPLAY_5X5 => 27,
            record_tag::MOTOR => 12,
            record_tag::FORCE => 4,
            record_tag::COLOR => 9,
            record_tag::DISTANCE => 4,
            record_tag::MATRIX_3X3 => 11,
            _ => return None,
        })
    }

    /// `chunk` holds exactly `size(tag)` bytes starting at the tag.
    fn parse(chunk: &[u8]) -> Self {
        let le16 = |lo: usize| i16::from_le_bytes([chunk[lo], chunk[lo + 1]]);
        match chunk[0] {
            record_tag::BATTERY => DeviceRecord::Battery { level: chunk[1] },
            // one byte longer than the nine-axis payload: the trailing
            // byte carries the hub's latest gesture id
            record_tag::IMU => DeviceRecord::Imu {
                face: chunk[1],
                accelerometer: [le16(2), le16(4), le16(6)],
                gyroscope: [le16(8), le16(10), le16(12)],
                orientation: [le16(14), le16(16), le16(18)],
                gesture: chunk[20],
            },
            record_tag::DISPLAY_5X5 => {
                let mut pixels = [0u8; 25];
                pixels.copy_from_slice(&chunk[2..27]);
                DeviceRecord::Display5x5 {
                    port: chunk[1],
                    pixels,
                }
            }
            record_tag::MOTOR => DeviceRecord::Motor {
                port: chunk[1],
                device_type: chunk[2],
                absolute_position: le16(3),
                power: le16(5),
                speed: chunk[7] as i8,
                position: i32::from_le_bytes([
                    chunk[8], chunk[9], chunk[10], chunk[11],
                ]),
            },
            record_tag::FORCE => DeviceRecord::Force {
                port: chunk[1],
                force: chunk[2],
                pressed: chunk[3] != 0,
            },
            record_tag::COLOR => DeviceRecord::Color {
                port: chunk[1],
                color_id: chunk[2] as i8,
                red: le16(3) as u16,
                green: le16(5) as u16,
                blue: le16(7) as u16,
            },
            record_tag::DISTANCE => DeviceRecord::Distance {
                port: chunk[1],
                distance_mm: le16(2),
            },
            record_tag::MATRIX_3X3 => {
                let mut pixels = [0u8; 9];
                pixels.copy_from_slice(&chunk[2..11]);
                DeviceRecord::Matrix3x3 {
                    port: chunk[1],
                    pixels,
                }
            }
            // size() gates which tags reach here
            _ => unreachable!(),
        }
    }

    /// The port a record belongs to, if it describes an external port.
    pub fn port(&self) -> Option<u8> {
        match self {
            DeviceRecord::Motor { port, .. }
            | DeviceRecord::Force { port, .. }
            | DeviceRecord::Color { port, .. }
            | DeviceRecord::Distance { port, .. }
            | DeviceRecord::Matrix3x3 { port, .. } => Some(*port),
            _ => None,
        }
    }
}

/// One complete statement of the hub's current port state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceNotification {
    pub records: Vec<DeviceRecord>,
}

impl DeviceNotification {
    /// Walk the sub-records after the 3-byte header. The walk stops
    /// cleanly at the first unknown tag or short remainder: a partial
    /// snapshot beats discarded telemetry.
    pub fn parse(msg: &[u8]) -> Result<Self> {
        if msg.len() < 3 {
            return Err(Error::MalformedFrame(
                "DeviceNotification header truncated".to_string(),
            ));
        }
        let payload_size = u16::from_le_bytes([msg[1], msg[2]]) as usize;
        let body = &msg[3..msg.len().min(3 + payload_size)];

        let mut records = Vec::new();
        let mut offset = 0;
        while offset < body.len() {
            let tag = body[offset];
            let Some(size) = DeviceRecord::size(tag) else {
                debug!("Unknown device record tag {:#x}, stopping walk", tag);
                break;
            };
            if body.len() - offset < size {
                debug!("Truncated {:#x} record, stopping walk", tag);
                break;
            }
            records.push(DeviceRecord::parse(&body[offset..offset + size]));
            offset += size;
        }

        Ok(Self { records })
    }
}

// ---- outbound commands ----------------------------------------------------

pub fn info_request() -> Vec<u8> {
    vec![INFO_REQUEST]
}

/// Ask the hub to stream device notifications every `interval_ms`.
pub fn device_notification_request(interval_ms: u16) -> Vec<u8> {
    let interval = interval_ms.to_le_bytes();
    vec![DEVICE_NOTIFICATION_REQUEST, interval[0], interval[1]]
}

pub fn program_flow_request(stop: bool, slot: u8) -> Vec<u8> {
    vec![PROGRAM_FLOW_REQUEST, stop as u8, slot]
}

pub fn set_hub_name(name: &str) -> Vec<u8> {
    let mut msg = vec![SET_HUB_NAME];
    msg.extend_from_slice(name.as_bytes());
    msg.push(0);
    msg
}

pub fn get_hub_name() -> Vec<u8> {
    vec![GET_HUB_NAME]
}

pub fn clear_slot(slot: u8) -> Vec<u8> {
    vec![CLEAR_SLOT_REQUEST, slot]
}

#[cfg(test)]
mod test {
    use super::*;

    fn info_response_bytes() -> Vec<u8> {
        let mut msg = vec![INFO_RESPONSE];
        msg.push(1); // rpc major
        msg.push(2); // rpc minor
        msg.extend_from_slice(&300u16.to_le_bytes());
        msg.push(3); // fw major
        msg.push(4); // fw minor
        msg.extend_from_slice(&1337u16.to_le_bytes());
        msg.extend_from_slice(&509u16.to_le_bytes()); // max packet
        msg.extend_from_slice(&16384u16.to_le_bytes()); // max message
        msg.extend_from_slice(&509u16.to_le_bytes()); // max chunk
        msg.extend_from_slice(&0x2E01u16.to_le_bytes()); // product group
        msg
    }

    #[test]
    fn info_response() {
        let msg = SpikeMessage::parse(&info_response_bytes()).unwrap();
        let SpikeMessage::InfoResponse(info) = msg else {
            panic!("wrong type");
        };
        assert_eq!(info.rpc_major, 1);
        assert_eq!(info.rpc_build, 300);
        assert_eq!(info.firmware_build, 1337);
        assert_eq!(info.max_packet_size, 509);
        assert_eq!(info.product_group_device, 0x2E01);
    }

    #[test]
    fn info_response_truncated() {
        assert!(SpikeMessage::parse(&info_response_bytes()[..10]).is_err());
    }

    fn notification(records: &[&[u8]]) -> Vec<u8> {
        let body: Vec<u8> = records.concat();
        let mut msg = vec![DEVICE_NOTIFICATION];
        msg.extend_from_slice(&(body.len() as u16).to_le_bytes());
        msg.extend_from_slice(&body);
        msg
    }

    fn motor_record(port: u8, device_type: u8, speed: i8, position: i32) -> Vec<u8> {
        let mut rec = vec![0x0A, port, device_type];
        rec.extend_from_slice(&0i16.to_le_bytes()); // absolute position
        rec.extend_from_slice(&50i16.to_le_bytes()); // power
        rec.push(speed as u8);
        rec.extend_from_slice(&position.to_le_bytes());
        rec
    }

    #[test]
    fn battery_and_motor_notification() {
        let motor = motor_record(0, 49, 50, 360);
        let msg = notification(&[&[0x00, 75], &motor]);
        let SpikeMessage::DeviceNotification(notif) =
            SpikeMessage::parse(&msg).unwrap()
        else {
            panic!("wrong type");
        };
        assert_eq!(
            notif.records,
            vec![
                DeviceRecord::Battery { level: 75 },
                DeviceRecord::Motor {
                    port: 0,
                    device_type: 49,
                    absolute_position: 0,
                    power: 50,
                    speed: 50,
                    position: 360,
                },
            ]
        );
    }

    #[test]
    fn sensor_records() {
        let distance = [0x0D, 1, 0xFF, 0xFF]; // -1: nothing detected
        let force = [0x0B, 2, 55, 1];
        let mut color = vec![0x0C, 3, 9];
        color.extend_from_slice(&100u16.to_le_bytes());
        color.extend_from_slice(&200u16.to_le_bytes());
        color.extend_from_slice(&300u16.to_le_bytes());
        let msg = notification(&[&distance, &force, &color]);
        let SpikeMessage::DeviceNotification(notif) =
            SpikeMessage::parse(&msg).unwrap()
        else {
            panic!("wrong type");
        };
        assert_eq!(
            notif.records,
            vec![
                DeviceRecord::Distance {
                    port: 1,
                    distance_mm: -1,
                },
                DeviceRecord::Force {
                    port: 2,
                    force: 55,
                    pressed: true,
                },
                DeviceRecord::Color {
                    port: 3,
                    color_id: 9,
                    red: 100,
                    green: 200,
                    blue: 300,
                },
            ]
        );
    }

    #[test]
    fn imu_record() {
        let mut rec = vec![0x01, 2];
        for axis in [100i16, -100, 300, 1, -2, 3, 90, -90, 180] {
            rec.extend_from_slice(&axis.to_le_bytes());
        }
        rec.push(7); // gesture
        assert_eq!(rec.len(), 21);
        let msg = notification(&[&rec]);
        let SpikeMessage::DeviceNotification(notif) =
            SpikeMessage::parse(&msg).unwrap()
        else {
            panic!("wrong type");
        };
        assert_eq!(
            notif.records,
            vec![DeviceRecord::Imu {
                face: 2,
                accelerometer: [100, -100, 300],
                gyroscope: [1, -2, 3],
                orientation: [90, -90, 180],
                gesture: 7,
            }]
        );
    }

    #[test]
    fn display_record() {
        let mut rec = vec![0x02, 50];
        rec.extend_from_slice(&[9u8; 25]);
        assert_eq!(rec.len(), 27);
        // a record after the display proves the walker stays aligned
        let msg = notification(&[&rec, &[0x00, 60]]);
        let SpikeMessage::DeviceNotification(notif) =
            SpikeMessage::parse(&msg).unwrap()
        else {
            panic!("wrong type");
        };
        assert_eq!(
            notif.records,
            vec![
                DeviceRecord::Display5x5 {
                    port: 50,
                    pixels: [9; 25],
                },
                DeviceRecord::Battery { level: 60 },
            ]
        );
    }

    #[test]
    fn unknown_tag_stops_walk() {
        let msg = notification(&[&[0x00, 80], &[0x99, 1, 2, 3], &[0x00, 90]]);
        let SpikeMessage::DeviceNotification(notif) =
            SpikeMessage::parse(&msg).unwrap()
        else {
            panic!("wrong type");
        };
        // records up to the unknown tag survive, nothing after it
        assert_eq!(notif.records, vec![DeviceRecord::Battery { level: 80 }]);
    }

    #[test]
    fn truncated_record_dropped() {
        // a motor record cut short after its port byte
        let msg = notification(&[&[0x00, 80], &[0x0A, 0]]);
        let SpikeMessage::DeviceNotification(notif) =
            SpikeMessage::parse(&msg).unwrap()
        else {
            panic!("wrong type");
        };
        assert_eq!(notif.records, vec![DeviceRecord::Battery { level: 80 }]);
    }

    #[test]
    fn console_text() {
        let mut msg = vec![CONSOLE_NOTIFICATION];
        msg.extend_from_slice(b"hello\0");
        assert_eq!(
            SpikeMessage::parse(&msg).unwrap(),
            SpikeMessage::ConsoleNotification("hello".to_string())
        );
    }

    #[test]
    fn unknown_message() {
        assert_eq!(
            SpikeMessage::parse(&[0x7E, 1, 2]).unwrap(),
            SpikeMessage::Unknown {
                tag: 0x7E,
                payload: vec![1, 2],
            }
        );
        assert!(SpikeMessage::parse(&[]).is_err());
    }

    #[test]
    fn outbound_commands() {
        assert_eq!(info_request(), vec![0x00]);
        assert_eq!(device_notification_request(5000), vec![0x28, 0x88, 0x13]);
        assert_eq!(program_flow_request(true, 3), vec![0x1E, 1, 3]);
        assert_eq!(program_flow_request(false, 0), vec![0x1E, 0, 0]);
        assert_eq!(set_hub_name("Hub"), vec![0x16, b'H', b'u', b'b', 0]);
        assert_eq!(get_hub_name(), vec![0x18]);
        assert_eq!(clear_slot(2), vec![0x46, 2]);
    }
}
