// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoder for the accessory line protocol: one JSON object per
//! CR/LF-terminated line, dispatched on the integer method field `m`.
//! Telemetry is mapped onto the same [`DeviceRecord`] shapes as the
//! binary path so the snapshot logic stays single-sourced.
//!
//! Outbound commands are `scratch.*` method calls carrying a fresh UUID
//! as the message id `i`.

use log::trace;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::iodevice::port_name;
use crate::spike::DeviceRecord;

/// Device-type groups used by the telemetry mapping. The sets mirror the
/// LWP3 catalog in `consts.rs` but are fixed here because the accessory
/// stream only ever reports this generation of devices.
const MOTOR_TYPES: &[i64] = &[1, 2, 48, 49, 65, 75, 76];
const SIMPLE_MOTOR_TYPES: &[i64] = &[1, 2];
const DISTANCE_SENSOR: i64 = 62;
const COLOR_SENSOR: i64 = 61;
const COLOR_DISTANCE_COMBO: i64 = 37;
const FORCE_SENSOR: i64 = 63;
const LIGHT_MATRIX: i64 = 64;

/// Telemetry for one external port: the reported device type plus zero or
/// more typed records (the colour+distance combo yields two).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortReading {
    pub port: u8,
    pub device_type: u16,
    pub records: Vec<DeviceRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineEvent {
    /// `m == 0`: a complete statement of all six external ports.
    PortTelemetry(Vec<PortReading>),
    /// `m == 2`: battery percentage.
    Battery(u8),
    /// Any other method, or an empty line.
    Ignored,
}

/// Parse one line (trailing `\r`/`\n` tolerated).
pub fn parse_line(line: &[u8]) -> Result<LineEvent> {
    let text = std::str::from_utf8(line)
        .map_err(|e| Error::MalformedFrame(format!("Line is not UTF-8: {}", e)))?
        .trim_end_matches(['\r', '\n'])
        .trim();
    if text.is_empty() {
        return Ok(LineEvent::Ignored);
    }

    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::MalformedFrame(format!("Bad JSON line: {}", e)))?;
    trace!("LINE: {}", value);

    let Some(method) = value.get("m").and_then(Value::as_i64) else {
        // our own echoed commands carry a string method; not telemetry
        return Ok(LineEvent::Ignored);
    };
    let params = value.get("p");

    match method {
        0 => {
            let Some(ports) = params.and_then(Value::as_array) else {
                return Ok(LineEvent::PortTelemetry(Vec::new()));
            };
            let readings = ports
                .iter()
                .take(6)
                .enumerate()
                .filter_map(|(port, entry)| port_reading(port as u8, entry))
                .collect();
            Ok(LineEvent::PortTelemetry(readings))
        }
        2 => {
            let level = params
                .and_then(|p| p.get(1))
                .and_then(lenient_i64)
                .unwrap_or(0)
                .clamp(0, 100);
            Ok(LineEvent::Battery(level as u8))
        }
        _ => Ok(LineEvent::Ignored),
    }
}

/// Accept an integer, a double, or a numeric string.
fn lenient_i64(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    if let Some(f) = value.as_f64() {
        return Some(f as i64);
    }
    let s = value.as_str()?;
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
}

fn values_at(values: &[Value], index: usize) -> Option<i64> {
    values.get(index).and_then(lenient_i64)
}

fn port_reading(port: u8, entry: &Value) -> Option<PortReading> {
    let entry = entry.as_array()?;
    let device_type = lenient_i64(entry.first()?)?;
    if device_type == 0 {
        return None;
    }
    let empty = Vec::new();
    let values = entry
        .get(1)
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let mut records = Vec::new();
    if MOTOR_TYPES.contains(&device_type) {
        let speed = values_at(values, 0).unwrap_or(0) as i8;
        // simple motors have no encoder
        let position = if SIMPLE_MOTOR_TYPES.contains(&device_type) {
            0
        } else {
            values_at(values, 2).unwrap_or(0) as i32
        };
        records.push(DeviceRecord::Motor {
            port,
            device_type: device_type as u8,
            absolute_position: 0,
            power: 0,
            speed,
            position,
        });
    } else if device_type == DISTANCE_SENSOR {
        records.push(DeviceRecord::Distance {
            port,
            distance_mm: centimetres_to_mm(values_at(values, 0)),
        });
    } else if device_type == COLOR_SENSOR {
        records.push(DeviceRecord::Color {
            port,
            color_id: values_at(values, 1).unwrap_or(-1) as i8,
            red: values_at(values, 2).unwrap_or(0) as u16,
            green: values_at(values, 3).unwrap_or(0) as u16,
            blue: values_at(values, 4).unwrap_or(0) as u16,
        });
    } else if device_type == COLOR_DISTANCE_COMBO {
        // One tuple feeds both maps. Reflected light lands in the red
        // channel and ambient in green; not calibrated RGB.
        records.push(DeviceRecord::Distance {
            port,
            distance_mm: centimetres_to_mm(values_at(values, 1)),
        });
        records.push(DeviceRecord::Color {
            port,
            color_id: values_at(values, 0).unwrap_or(-1) as i8,
            red: values_at(values, 2).unwrap_or(0) as u16,
            green: values_at(values, 3).unwrap_or(0) as u16,
            blue: 0,
        });
    } else if device_type == FORCE_SENSOR {
        records.push(DeviceRecord::Force {
            port,
            force: values_at(values, 0).unwrap_or(0).clamp(0, 100) as u8,
            pressed: values_at(values, 1).unwrap_or(0) != 0,
        });
    } else if device_type == LIGHT_MATRIX {
        let mut pixels = [0u8; 9];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = values_at(values, i).unwrap_or(0).clamp(0, 100) as u8;
        }
        records.push(DeviceRecord::Matrix3x3 { port, pixels });
    }
    // plain lights (8) and unrecognised types contribute the attachment only

    Some(PortReading {
        port,
        device_type: device_type as u16,
        records,
    })
}

fn centimetres_to_mm(value: Option<i64>) -> i16 {
    match value {
        Some(cm) if cm >= 0 => (cm * 10).min(i16::MAX as i64) as i16,
        _ => -1,
    }
}

// ---- outbound commands ----------------------------------------------------

fn command(method: &str, params: Value) -> Vec<u8> {
    let msg = json!({
        "m": method,
        "p": params,
        "i": Uuid::new_v4().to_string(),
    });
    let mut line = msg.to_string().into_bytes();
    line.push(b'\r');
    line
}

pub fn motor_pwm(port: u8, power: i8) -> Vec<u8> {
    command(
        "scratch.motor_pwm",
        json!({
            "port": port_name(port),
            "power": power.clamp(-100, 100),
            "stall": false,
        }),
    )
}

pub fn motor_start(port: u8, speed: i8) -> Vec<u8> {
    command(
        "scratch.motor_start",
        json!({
            "port": port_name(port),
            "speed": speed.clamp(-100, 100),
            "stall": true,
        }),
    )
}

pub fn motor_stop(port: u8) -> Vec<u8> {
    command(
        "scratch.motor_stop",
        json!({
            "port": port_name(port),
            "stop": 1,
        }),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn battery_line() {
        let event = parse_line(b"{\"m\":2,\"p\":[8.3,85]}\r").unwrap();
        assert_eq!(event, LineEvent::Battery(85));
    }

    #[test]
    fn battery_level_clamped() {
        let event = parse_line(b"{\"m\":2,\"p\":[8.3,140]}").unwrap();
        assert_eq!(event, LineEvent::Battery(100));
    }

    #[test]
    fn telemetry_line() {
        let line = br#"{"m":0,"p":[[49,[17,0,360]],[62,[25]],[63,[42,1]],[0,[]],[61,[12,9,10,20,30]],[8,[]]]}"#;
        let LineEvent::PortTelemetry(readings) = parse_line(line).unwrap() else {
            panic!("wrong event");
        };
        assert_eq!(readings.len(), 5);

        assert_eq!(
            readings[0].records,
            vec![DeviceRecord::Motor {
                port: 0,
                device_type: 49,
                absolute_position: 0,
                power: 0,
                speed: 17,
                position: 360,
            }]
        );
        // centimetres become millimetres
        assert_eq!(
            readings[1].records,
            vec![DeviceRecord::Distance {
                port: 1,
                distance_mm: 250,
            }]
        );
        assert_eq!(
            readings[2].records,
            vec![DeviceRecord::Force {
                port: 2,
                force: 42,
                pressed: true,
            }]
        );
        assert_eq!(
            readings[3].records,
            vec![DeviceRecord::Color {
                port: 4,
                color_id: 9,
                red: 20,
                green: 30,
                blue: 0, // values[4] missing in this line
            }]
        );
        // plain light: attachment only
        assert_eq!(readings[4].device_type, 8);
        assert!(readings[4].records.is_empty());
    }

    #[test]
    fn color_with_blue_channel() {
        let line = br#"{"m":0,"p":[[61,[12,3,10,20,30]]]}"#;
        let LineEvent::PortTelemetry(readings) = parse_line(line).unwrap() else {
            panic!("wrong event");
        };
        assert_eq!(
            readings[0].records,
            vec![DeviceRecord::Color {
                port: 0,
                color_id: 3,
                red: 10,
                green: 20,
                blue: 30,
            }]
        );
    }

    #[test]
    fn simple_motor_omits_position() {
        let line = br#"{"m":0,"p":[[2,[40,99,1234]]]}"#;
        let LineEvent::PortTelemetry(readings) = parse_line(line).unwrap() else {
            panic!("wrong event");
        };
        assert_eq!(
            readings[0].records,
            vec![DeviceRecord::Motor {
                port: 0,
                device_type: 2,
                absolute_position: 0,
                power: 0,
                speed: 40,
                position: 0,
            }]
        );
    }

    #[test]
    fn combo_sensor_emits_both() {
        let line = br#"{"m":0,"p":[[37,[5,12,70,35]]]}"#;
        let LineEvent::PortTelemetry(readings) = parse_line(line).unwrap() else {
            panic!("wrong event");
        };
        assert_eq!(
            readings[0].records,
            vec![
                DeviceRecord::Distance {
                    port: 0,
                    distance_mm: 120,
                },
                DeviceRecord::Color {
                    port: 0,
                    color_id: 5,
                    red: 70,
                    green: 35,
                    blue: 0,
                },
            ]
        );
    }

    #[test]
    fn lenient_numbers() {
        let line = br#"{"m":0,"p":[["62",["7.9"]]]}"#;
        let LineEvent::PortTelemetry(readings) = parse_line(line).unwrap() else {
            panic!("wrong event");
        };
        assert_eq!(
            readings[0].records,
            vec![DeviceRecord::Distance {
                port: 0,
                distance_mm: 70,
            }]
        );
    }

    #[test]
    fn null_distance_is_none_detected() {
        let line = br#"{"m":0,"p":[[62,[null]],[62,[-3]]]}"#;
        let LineEvent::PortTelemetry(readings) = parse_line(line).unwrap() else {
            panic!("wrong event");
        };
        assert_eq!(
            readings[0].records,
            vec![DeviceRecord::Distance {
                port: 0,
                distance_mm: -1,
            }]
        );
        assert_eq!(
            readings[1].records,
            vec![DeviceRecord::Distance {
                port: 1,
                distance_mm: -1,
            }]
        );
    }

    #[test]
    fn unknown_method_ignored() {
        assert_eq!(parse_line(b"{\"m\":99,\"p\":[]}").unwrap(), LineEvent::Ignored);
        assert_eq!(parse_line(b"").unwrap(), LineEvent::Ignored);
        assert_eq!(
            parse_line(b"{\"m\":\"scratch.motor_pwm\",\"p\":{}}").unwrap(),
            LineEvent::Ignored
        );
        assert!(parse_line(b"not json").is_err());
    }

    #[test]
    fn outbound_shapes() {
        let line = motor_pwm(0, 120);
        assert_eq!(line.last(), Some(&b'\r'));
        let msg: Value = serde_json::from_slice(&line[..line.len() - 1]).unwrap();
        assert_eq!(msg["m"], "scratch.motor_pwm");
        assert_eq!(msg["p"]["port"], "A");
        assert_eq!(msg["p"]["power"], 100); // clamped
        assert_eq!(msg["p"]["stall"], false);
        // every command carries a fresh UUID
        Uuid::parse_str(msg["i"].as_str().unwrap()).unwrap();

        let msg: Value = {
            let line = motor_start(1, -120);
            serde_json::from_slice(&line[..line.len() - 1]).unwrap()
        };
        assert_eq!(msg["m"], "scratch.motor_start");
        assert_eq!(msg["p"]["port"], "B");
        assert_eq!(msg["p"]["speed"], -100);
        assert_eq!(msg["p"]["stall"], true);

        let msg: Value = {
            let line = motor_stop(2);
            serde_json::from_slice(&line[..line.len() - 1]).unwrap()
        };
        assert_eq!(msg["m"], "scratch.motor_stop");
        assert_eq!(msg["p"]["port"], "C");
        assert_eq!(msg["p"]["stop"], 1);
    }
}
