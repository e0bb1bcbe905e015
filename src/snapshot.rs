// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The queryable model of a hub: attached devices plus the most recent
//! reading per port, as one plain value that can be copied out under a
//! short lock.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::consts::IoTypeId;
use crate::iodevice::{is_external_port, IoDevice};
use crate::jsonrpc::PortReading;
use crate::spike::{DeviceNotification, DeviceRecord};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MotorState {
    pub device_type: u16,
    pub speed: i8,
    /// Encoder position in degrees.
    pub position: i32,
    pub absolute_position: i16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ColorState {
    /// −1 when no colour is recognised.
    pub color_id: i8,
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ForceState {
    pub force: u8,
    pub pressed: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImuState {
    pub face: u8,
    pub accelerometer: [i16; 3],
    pub gyroscope: [i16; 3],
    pub orientation: [i16; 3],
}

/// What changed while applying a batch of telemetry; the runtime turns
/// this into events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub battery: Option<u8>,
    pub attached_changed: bool,
}

/// A value aggregate of everything known about the hub's peripherals.
///
/// Invariants:
/// * any port appears in at most one typed map;
/// * a detached port is absent from every map;
/// * a full telemetry notification replaces the typed maps wholesale, so
///   stale entries cannot outlive the device that produced them.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub motors: BTreeMap<u8, MotorState>,
    /// Millimetres; −1 means nothing detected.
    pub distances: BTreeMap<u8, i16>,
    pub colors: BTreeMap<u8, ColorState>,
    pub forces: BTreeMap<u8, ForceState>,
    /// 3×3 brightness (0..=100), row-major.
    pub light_matrices: BTreeMap<u8, [u8; 9]>,
    pub imu: Option<ImuState>,
    /// 5×5 display brightness, row-major.
    pub display: Option<[u8; 25]>,
    pub gesture: Option<u8>,
    /// Percentage 0..=100.
    pub battery: Option<u8>,
    pub attached: BTreeMap<u8, IoDevice>,
    /// Latest raw value bytes for ports without a typed decoder.
    pub raw_values: BTreeMap<u8, Vec<u8>>,
}

impl DeviceSnapshot {
    /// Record an attached device, replacing any previous occupant.
    pub fn attach(&mut self, device: IoDevice) {
        let port = device.port();
        self.remove_port_values(port);
        self.attached.insert(port, device);
    }

    /// Drop the port from every map at once.
    pub fn detach(&mut self, port: u8) {
        self.attached.remove(&port);
        self.remove_port_values(port);
    }

    pub fn insert_raw_value(&mut self, port: u8, values: Vec<u8>) {
        self.raw_values.insert(port, values);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Apply a SPIKE binary device notification. Each notification is a
    /// complete statement of port state, so the typed maps are replaced,
    /// not merged.
    pub fn apply_notification(&mut self, notif: &DeviceNotification) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        self.clear_typed_maps();
        let mut attached = self.internal_attachments();
        for record in &notif.records {
            match record {
                DeviceRecord::Battery { level } => {
                    let level = (*level).min(100);
                    self.battery = Some(level);
                    outcome.battery = Some(level);
                }
                DeviceRecord::Imu {
                    face,
                    accelerometer,
                    gyroscope,
                    orientation,
                    gesture,
                } => {
                    self.imu = Some(ImuState {
                        face: *face,
                        accelerometer: *accelerometer,
                        gyroscope: *gyroscope,
                        orientation: *orientation,
                    });
                    self.gesture = Some(*gesture);
                }
                DeviceRecord::Display5x5 { pixels, .. } => {
                    self.display = Some(*pixels);
                }
                record => {
                    self.insert_record(record);
                    if let (Some(port), Some(kind)) =
                        (record.port(), record_device_type(record))
                    {
                        attached.insert(port, IoDevice::new(kind, port));
                    }
                }
            }
        }

        outcome.attached_changed = attached != self.attached;
        self.attached = attached;
        outcome
    }

    /// Apply one accessory-line telemetry batch; same replace semantics
    /// as the binary path.
    pub fn apply_port_readings(&mut self, readings: &[PortReading]) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        self.clear_typed_maps();
        let mut attached = self.internal_attachments();
        for reading in readings {
            attached.insert(
                reading.port,
                IoDevice::new(IoTypeId(reading.device_type), reading.port),
            );
            for record in &reading.records {
                self.insert_record(record);
            }
        }

        outcome.attached_changed = attached != self.attached;
        self.attached = attached;
        outcome
    }

    /// Insert one typed record, keeping the one-typed-entry-per-port
    /// invariant: a later record for the same port wins.
    fn insert_record(&mut self, record: &DeviceRecord) {
        let Some(port) = record.port() else { return };
        self.remove_port_values(port);
        match record {
            DeviceRecord::Motor {
                device_type,
                absolute_position,
                power: _,
                speed,
                position,
                ..
            } => {
                self.motors.insert(
                    port,
                    MotorState {
                        device_type: *device_type as u16,
                        speed: *speed,
                        position: *position,
                        absolute_position: *absolute_position,
                    },
                );
            }
            DeviceRecord::Distance { distance_mm, .. } => {
                self.distances.insert(port, (*distance_mm).max(-1));
            }
            DeviceRecord::Color {
                color_id,
                red,
                green,
                blue,
                ..
            } => {
                self.colors.insert(
                    port,
                    ColorState {
                        color_id: *color_id,
                        red: *red,
                        green: *green,
                        blue: *blue,
                    },
                );
            }
            DeviceRecord::Force { force, pressed, .. } => {
                self.forces.insert(
                    port,
                    ForceState {
                        force: (*force).min(100),
                        pressed: *pressed,
                    },
                );
            }
            DeviceRecord::Matrix3x3 { pixels, .. } => {
                self.light_matrices.insert(port, *pixels);
            }
            _ => {}
        }
    }

    fn clear_typed_maps(&mut self) {
        self.motors.clear();
        self.distances.clear();
        self.colors.clear();
        self.forces.clear();
        self.light_matrices.clear();
    }

    fn remove_port_values(&mut self, port: u8) {
        self.motors.remove(&port);
        self.distances.remove(&port);
        self.colors.remove(&port);
        self.forces.remove(&port);
        self.light_matrices.remove(&port);
        self.raw_values.remove(&port);
    }

    /// Hub-internal attachments survive telemetry replacement; only the
    /// external ports are restated by each notification.
    fn internal_attachments(&self) -> BTreeMap<u8, IoDevice> {
        self.attached
            .iter()
            .filter(|(port, _)| !is_external_port(**port))
            .map(|(port, dev)| (*port, dev.clone()))
            .collect()
    }

    /// True if no port holds any value.
    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
            && self.distances.is_empty()
            && self.colors.is_empty()
            && self.forces.is_empty()
            && self.light_matrices.is_empty()
            && self.attached.is_empty()
            && self.raw_values.is_empty()
            && self.battery.is_none()
            && self.imu.is_none()
            && self.display.is_none()
    }
}

fn record_device_type(record: &DeviceRecord) -> Option<IoTypeId> {
    // the well-known SPIKE generation ids for sensor records that do not
    // carry their own device type
    Some(match record {
        DeviceRecord::Motor { device_type, .. } => IoTypeId(*device_type as u16),
        DeviceRecord::Color { .. } => IoTypeId(61),
        DeviceRecord::Distance { .. } => IoTypeId(62),
        DeviceRecord::Force { .. } => IoTypeId(63),
        DeviceRecord::Matrix3x3 { .. } => IoTypeId(64),
        _ => return None,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn motor(port: u8, speed: i8, position: i32) -> DeviceRecord {
        DeviceRecord::Motor {
            port,
            device_type: 49,
            absolute_position: 0,
            power: 50,
            speed,
            position,
        }
    }

    #[test]
    fn notification_replaces_typed_maps() {
        let mut snapshot = DeviceSnapshot::default();

        let outcome = snapshot.apply_notification(&DeviceNotification {
            records: vec![
                DeviceRecord::Battery { level: 75 },
                motor(0, 50, 360),
            ],
        });
        assert_eq!(outcome.battery, Some(75));
        assert!(outcome.attached_changed);
        assert_eq!(snapshot.battery, Some(75));
        assert_eq!(
            snapshot.motors.get(&0),
            Some(&MotorState {
                device_type: 49,
                speed: 50,
                position: 360,
                absolute_position: 0,
            })
        );
        assert!(snapshot.distances.is_empty());
        assert!(snapshot.colors.is_empty());
        assert!(snapshot.forces.is_empty());

        // the motor moved to port 1; port 0 must not retain a stale entry
        let outcome = snapshot.apply_notification(&DeviceNotification {
            records: vec![motor(1, 10, 90)],
        });
        assert!(outcome.attached_changed);
        assert!(!snapshot.motors.contains_key(&0));
        assert!(snapshot.motors.contains_key(&1));
        assert!(!snapshot.attached.contains_key(&0));
    }

    #[test]
    fn one_typed_entry_per_port() {
        let mut snapshot = DeviceSnapshot::default();
        snapshot.apply_notification(&DeviceNotification {
            records: vec![
                motor(2, 10, 0),
                DeviceRecord::Distance {
                    port: 2,
                    distance_mm: 140,
                },
            ],
        });
        // the later record for the port wins
        assert!(!snapshot.motors.contains_key(&2));
        assert_eq!(snapshot.distances.get(&2), Some(&140));
    }

    #[test]
    fn detach_clears_every_map() {
        let mut snapshot = DeviceSnapshot::default();
        snapshot.attach(IoDevice::new(IoTypeId(62), 3));
        snapshot.insert_raw_value(3, vec![1, 2, 3]);
        snapshot.distances.insert(3, 200);

        snapshot.detach(3);
        assert!(!snapshot.attached.contains_key(&3));
        assert!(!snapshot.distances.contains_key(&3));
        assert!(!snapshot.raw_values.contains_key(&3));
    }

    #[test]
    fn internal_ports_survive_telemetry() {
        let mut snapshot = DeviceSnapshot::default();
        snapshot.attach(IoDevice::new(IoTypeId(23), 50));
        snapshot.apply_notification(&DeviceNotification {
            records: vec![motor(0, 0, 0)],
        });
        assert!(snapshot.attached.contains_key(&50));
        assert!(snapshot.attached.contains_key(&0));
    }

    #[test]
    fn imu_and_display() {
        let mut snapshot = DeviceSnapshot::default();
        snapshot.apply_notification(&DeviceNotification {
            records: vec![
                DeviceRecord::Imu {
                    face: 1,
                    accelerometer: [1, 2, 3],
                    gyroscope: [4, 5, 6],
                    orientation: [7, 8, 9],
                    gesture: 3,
                },
                DeviceRecord::Display5x5 {
                    port: 50,
                    pixels: [9; 25],
                },
            ],
        });
        assert_eq!(snapshot.imu.unwrap().orientation, [7, 8, 9]);
        assert_eq!(snapshot.gesture, Some(3));
        assert_eq!(snapshot.display.unwrap(), [9; 25]);
    }

    #[test]
    fn battery_stays_in_range() {
        let mut snapshot = DeviceSnapshot::default();
        snapshot.apply_notification(&DeviceNotification {
            records: vec![DeviceRecord::Battery { level: 250 }],
        });
        assert_eq!(snapshot.battery, Some(100));
    }
}
