// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parser and constructors for LWP3 hub messages.
//!
//! Message format:
//!
//! HEAD = LENGTH | HUB_ID (always 0) | TYPE
//! * LENGTH: u7 or split u14, see below. Total length of the message
//!   including the length field itself.
//! * TYPE: message type u8, catalogued in [`consts::MessageType`]
//!
//! LENGTH
//! lengths 0-127 are encoded as a single byte. If the MSB of the first
//! byte is set, the low 7 bits of the length live in byte 0 and the upper
//! 7 bits in byte 1: LEN = (BYTE0 & 0x7F) | (BYTE1 << 7).
//!
//! Unknown message types decode to [`NotificationMessage::Unknown`]
//! rather than an error; hubs newer than this catalog keep working.

use crate::consts::*;
use crate::error::{Error, OptionContext, Result};
use lego_hub_macros::Parse;
use log::{debug, trace};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

macro_rules! next {
    ($iter:ident) => {
        *$iter.next().context("Insufficient length")?
    };
}

macro_rules! two_bytes {
    ($t:ty, $iter:ident) => {
        <$t>::from_le_bytes([next!($iter), next!($iter)])
    };
}

macro_rules! four_bytes {
    ($t:ty, $iter:ident) => {
        <$t>::from_le_bytes([
            next!($iter),
            next!($iter),
            next!($iter),
            next!($iter),
        ])
    };
}

macro_rules! next_u16 {
    ($iter:ident) => {
        two_bytes!(u16, $iter)
    };
}

macro_rules! next_i16 {
    ($iter:ident) => {
        two_bytes!(i16, $iter)
    };
}

macro_rules! next_u32 {
    ($iter:ident) => {
        four_bytes!(u32, $iter)
    };
}

macro_rules! next_i32 {
    ($iter:ident) => {
        four_bytes!(i32, $iter)
    };
}

macro_rules! next_i8 {
    ($iter:ident) => {
        i8::from_le_bytes([next!($iter)])
    };
}

#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationMessage {
    HubProperties(HubProperty),
    HubActions(HubAction),
    HubAlerts(HubAlert),
    HubAttachedIo(AttachedIo),
    GenericErrorMessages(ErrorMessageFormat),
    PortInformationRequest(InformationRequest),
    PortModeInformationRequest(ModeInformationRequest),
    PortInputFormatSetupSingle(InputSetupSingle),
    PortInformation(PortInformationValue),
    PortModeInformation(PortModeInformationValue),
    PortValueSingle(PortValueSingleFormat),
    PortValueCombinedmode(PortValueCombinedFormat),
    PortInputFormatSingle(PortInputFormatSingleFormat),
    VirtualPortSetup(VirtualPortSetupFormat),
    PortOutputCommand(PortOutputCommandFormat),
    PortOutputCommandFeedback(PortOutputCommandFeedbackFormat),
    /// Anything this catalog does not know. Carried verbatim so listeners
    /// can still log or inspect it.
    Unknown { message_type: u8, payload: Vec<u8> },
}

impl NotificationMessage {
    /// Parse one frame. Fails with `MalformedFrame` only when the slice is
    /// shorter than the declared length or the minimum header; bytes past
    /// the declared length are ignored.
    pub fn parse(msg: &[u8]) -> Result<Self> {
        use NotificationMessage::*;

        trace!("NOTIFICATION: {:02x?}", msg);

        let (length, length_bytes) = Self::length(msg.iter())?;
        let header = length_bytes + 2;
        if length < header {
            return Err(Error::MalformedFrame(format!(
                "Declared length {} below header size {}",
                length, header
            )));
        }
        if msg.len() < length {
            return Err(Error::MalformedFrame(format!(
                "Declared length {} exceeds buffer size {}",
                length,
                msg.len()
            )));
        }

        let body = &msg[..length];
        let mut msg_iter = body.iter().skip(length_bytes);
        let _hub_id = next!(msg_iter);
        let type_byte = next!(msg_iter);

        let Some(message_type) = MessageType::from_u8(type_byte) else {
            return Ok(Unknown {
                message_type: type_byte,
                payload: msg_iter.copied().collect(),
            });
        };
        trace!("Identified message type: {:?} = {:#x}", message_type, type_byte);

        Ok(match message_type {
            MessageType::HubProperties => {
                HubProperties(HubProperty::parse(&mut msg_iter)?)
            }
            MessageType::HubActions => {
                // An action byte outside the catalog downgrades the whole
                // message to Unknown instead of failing the frame.
                let action = next!(msg_iter);
                match HubAction::from_u8(action) {
                    Some(action) => HubActions(action),
                    None => Unknown {
                        message_type: type_byte,
                        payload: vec![action],
                    },
                }
            }
            MessageType::HubAlerts => HubAlerts(HubAlert::parse(&mut msg_iter)?),
            MessageType::HubAttachedIo => {
                HubAttachedIo(AttachedIo::parse(&mut msg_iter)?)
            }
            MessageType::GenericErrorMessages => {
                GenericErrorMessages(ErrorMessageFormat::parse(&mut msg_iter)?)
            }
            MessageType::PortInformationRequest => {
                PortInformationRequest(InformationRequest::parse(&mut msg_iter)?)
            }
            MessageType::PortModeInformationRequest => {
                PortModeInformationRequest(ModeInformationRequest::parse(
                    &mut msg_iter,
                )?)
            }
            MessageType::PortInputFormatSetupSingle => {
                PortInputFormatSetupSingle(InputSetupSingle::parse(&mut msg_iter)?)
            }
            MessageType::PortInformation => {
                PortInformation(PortInformationValue::parse(&mut msg_iter)?)
            }
            MessageType::PortModeInformation => {
                PortModeInformation(PortModeInformationValue::parse(&mut msg_iter)?)
            }
            MessageType::PortValueSingle => {
                PortValueSingle(PortValueSingleFormat::parse(&mut msg_iter)?)
            }
            MessageType::PortValueCombinedmode => {
                PortValueCombinedmode(PortValueCombinedFormat::parse(&mut msg_iter)?)
            }
            MessageType::PortInputFormatSingle => {
                PortInputFormatSingle(PortInputFormatSingleFormat::parse(
                    &mut msg_iter,
                )?)
            }
            MessageType::VirtualPortSetup => {
                VirtualPortSetup(VirtualPortSetupFormat::parse(&mut msg_iter)?)
            }
            MessageType::PortOutputCommand => {
                PortOutputCommand(PortOutputCommandFormat::parse(&mut msg_iter)?)
            }
            MessageType::PortOutputCommandFeedback => PortOutputCommandFeedback(
                PortOutputCommandFeedbackFormat::parse(&mut msg_iter)?,
            ),
        })
    }

    /// Map from our enum members to MessageType values
    pub fn message_type(&self) -> u8 {
        use NotificationMessage::*;
        match self {
            HubProperties(_) => MessageType::HubProperties as u8,
            HubActions(_) => MessageType::HubActions as u8,
            HubAlerts(_) => MessageType::HubAlerts as u8,
            HubAttachedIo(_) => MessageType::HubAttachedIo as u8,
            GenericErrorMessages(_) => MessageType::GenericErrorMessages as u8,
            PortInformationRequest(_) => MessageType::PortInformationRequest as u8,
            PortModeInformationRequest(_) => {
                MessageType::PortModeInformationRequest as u8
            }
            PortInputFormatSetupSingle(_) => {
                MessageType::PortInputFormatSetupSingle as u8
            }
            PortInformation(_) => MessageType::PortInformation as u8,
            PortModeInformation(_) => MessageType::PortModeInformation as u8,
            PortValueSingle(_) => MessageType::PortValueSingle as u8,
            PortValueCombinedmode(_) => MessageType::PortValueCombinedmode as u8,
            PortInputFormatSingle(_) => MessageType::PortInputFormatSingle as u8,
            VirtualPortSetup(_) => MessageType::VirtualPortSetup as u8,
            PortOutputCommand(_) => MessageType::PortOutputCommand as u8,
            PortOutputCommandFeedback(_) => {
                MessageType::PortOutputCommandFeedback as u8
            }
            Unknown { message_type, .. } => *message_type,
        }
    }

    /// Returns (declared length, number of length bytes).
    fn length<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<(usize, usize)> {
        let first = next!(msg);

        if first & 0x80 == 0x00 {
            Ok((first as usize, 1))
        } else {
            let second = next!(msg);
            Ok((((second as usize) << 7) | ((first & 0x7f) as usize), 2))
        }
    }

    /// Serialise into a frame whose length field is correct by
    /// construction. Bodies are assembled with a single placeholder length
    /// byte; the two-byte form is substituted iff the total reaches 128.
    pub fn serialise(&self) -> Vec<u8> {
        use NotificationMessage::*;

        let mut ser = vec![0, 0, self.message_type()];
        match self {
            HubProperties(msg) => msg.serialise(&mut ser),
            HubActions(action) => ser.push(*action as u8),
            HubAlerts(msg) => msg.serialise(&mut ser),
            HubAttachedIo(msg) => msg.serialise(&mut ser),
            GenericErrorMessages(msg) => {
                ser.push(msg.command_type);
                ser.push(msg.error_code as u8);
            }
            PortInformationRequest(msg) => {
                ser.push(msg.port_id);
                ser.push(msg.information_type as u8);
            }
            PortModeInformationRequest(msg) => {
                ser.push(msg.port_id);
                ser.push(msg.mode);
                ser.push(msg.information_type);
            }
            PortInputFormatSetupSingle(msg) => msg.serialise(&mut ser),
            PortInformation(msg) => msg.serialise(&mut ser),
            PortModeInformation(msg) => {
                ser.push(msg.port_id);
                ser.push(msg.mode);
                ser.push(msg.information_type);
                ser.extend_from_slice(&msg.payload);
            }
            PortValueSingle(msg) => {
                ser.push(msg.port_id);
                ser.extend_from_slice(&msg.values);
            }
            PortValueCombinedmode(msg) => {
                ser.push(msg.port_id);
                ser.extend_from_slice(&msg.mode_pointers.to_le_bytes());
                ser.extend_from_slice(&msg.values);
            }
            PortInputFormatSingle(msg) => {
                ser.push(msg.port_id);
                ser.push(msg.mode);
                ser.extend_from_slice(&msg.delta.to_le_bytes());
                ser.push(msg.notification_enabled as u8);
            }
            VirtualPortSetup(msg) => msg.serialise(&mut ser),
            PortOutputCommand(msg) => msg.serialise(&mut ser),
            PortOutputCommandFeedback(msg) => msg.serialise(&mut ser),
            Unknown { payload, .. } => ser.extend_from_slice(payload),
        }
        Self::finalise_length(ser)
    }

    fn finalise_length(mut buf: Vec<u8>) -> Vec<u8> {
        if buf.len() < 128 {
            buf[0] = buf.len() as u8;
        } else {
            let total = buf.len() + 1;
            buf[0] = ((total & 0x7f) as u8) | 0x80;
            buf.insert(1, (total >> 7) as u8);
        }
        debug!("Serialised to: {:02x?}", buf);
        buf
    }

    // ---- semantic constructors -------------------------------------------

    pub fn hub_property_request(kind: HubPropertyKind) -> Self {
        Self::HubProperties(HubProperty {
            property: kind as u8,
            operation: HubPropertyOperation::RequestUpdateDownstream as u8,
            payload: Vec::new(),
        })
    }

    pub fn hub_property_enable_updates(kind: HubPropertyKind) -> Self {
        Self::HubProperties(HubProperty {
            property: kind as u8,
            operation: HubPropertyOperation::EnableUpdatesDownstream as u8,
            payload: Vec::new(),
        })
    }

    pub fn hub_property_set(kind: HubPropertyKind, payload: Vec<u8>) -> Self {
        Self::HubProperties(HubProperty {
            property: kind as u8,
            operation: HubPropertyOperation::SetDownstream as u8,
            payload,
        })
    }

    pub fn hub_action(action: HubAction) -> Self {
        Self::HubActions(action)
    }

    pub fn hub_alert_enable_updates(alert: AlertType) -> Self {
        Self::HubAlerts(HubAlert {
            alert_type: alert as u8,
            operation: AlertOperation::EnableUpdates as u8,
            payload: Vec::new(),
        })
    }

    pub fn port_information_request(port_id: u8, kind: InformationType) -> Self {
        Self::PortInformationRequest(InformationRequest {
            port_id,
            information_type: kind,
        })
    }

    pub fn port_input_format_setup(
        port_id: u8,
        mode: u8,
        delta: u32,
        notification_enabled: bool,
    ) -> Self {
        Self::PortInputFormatSetupSingle(InputSetupSingle {
            port_id,
            mode,
            delta,
            notification_enabled,
        })
    }

    pub fn start_power(port_id: u8, power: Power) -> Self {
        Self::port_output(
            port_id,
            PortOutputSubcommand::WriteDirectModeData {
                mode: 0x00,
                payload: vec![power.to_u8()],
            },
        )
    }

    /// `brake` is start-power with the magic braking value.
    pub fn brake(port_id: u8) -> Self {
        Self::start_power(port_id, Power::Brake)
    }

    /// Let the motor coast.
    pub fn float_motor(port_id: u8) -> Self {
        Self::start_power(port_id, Power::Float)
    }

    pub fn start_speed(port_id: u8, speed: i8, max_power: u8, use_profile: u8) -> Self {
        Self::port_output(
            port_id,
            PortOutputSubcommand::StartSpeed {
                speed,
                max_power,
                use_profile,
            },
        )
    }

    pub fn start_speed_for_time(
        port_id: u8,
        time_ms: i16,
        speed: i8,
        max_power: u8,
        end_state: EndState,
        use_profile: u8,
    ) -> Self {
        Self::port_output(
            port_id,
            PortOutputSubcommand::StartSpeedForTime {
                time_ms,
                speed,
                max_power,
                end_state,
                use_profile,
            },
        )
    }

    pub fn start_speed_for_degrees(
        port_id: u8,
        degrees: i32,
        speed: i8,
        max_power: u8,
        end_state: EndState,
        use_profile: u8,
    ) -> Self {
        Self::port_output(
            port_id,
            PortOutputSubcommand::StartSpeedForDegrees {
                degrees,
                speed,
                max_power,
                end_state,
                use_profile,
            },
        )
    }

    pub fn goto_absolute_position(
        port_id: u8,
        position: i32,
        speed: i8,
        max_power: u8,
        end_state: EndState,
        use_profile: u8,
    ) -> Self {
        Self::port_output(
            port_id,
            PortOutputSubcommand::GotoAbsolutePosition {
                position,
                speed,
                max_power,
                end_state,
                use_profile,
            },
        )
    }

    pub fn set_acc_time(port_id: u8, time_ms: i16, profile: i8) -> Self {
        Self::port_output(
            port_id,
            PortOutputSubcommand::SetAccTime {
                time_ms,
                profile,
            },
        )
    }

    pub fn set_dec_time(port_id: u8, time_ms: i16, profile: i8) -> Self {
        Self::port_output(
            port_id,
            PortOutputSubcommand::SetDecTime {
                time_ms,
                profile,
            },
        )
    }

    pub fn preset_encoder(port_id: u8, position: i32) -> Self {
        Self::port_output(
            port_id,
            PortOutputSubcommand::WriteDirectModeData {
                mode: 0x02,
                payload: position.to_le_bytes().to_vec(),
            },
        )
    }

    pub fn hub_led_color(port_id: u8, color: Color) -> Self {
        Self::port_output(
            port_id,
            PortOutputSubcommand::WriteDirectModeData {
                mode: HubLedMode::Colour as u8,
                payload: vec![color as u8],
            },
        )
    }

    pub fn hub_led_rgb(port_id: u8, red: u8, green: u8, blue: u8) -> Self {
        Self::port_output(
            port_id,
            PortOutputSubcommand::WriteDirectModeData {
                mode: HubLedMode::Rgb as u8,
                payload: vec![red, green, blue],
            },
        )
    }

    pub fn create_virtual_port(port_a: u8, port_b: u8) -> Self {
        Self::VirtualPortSetup(VirtualPortSetupFormat::Connect { port_a, port_b })
    }

    pub fn disconnect_virtual_port(port_id: u8) -> Self {
        Self::VirtualPortSetup(VirtualPortSetupFormat::Disconnect { port_id })
    }

    fn port_output(port_id: u8, subcommand: PortOutputSubcommand) -> Self {
        Self::PortOutputCommand(PortOutputCommandFormat {
            port_id,
            startup_and_completion: STARTUP_EXECUTE_WITH_FEEDBACK,
            subcommand,
        })
    }
}

/// The two modes by which hub LED colours may be set.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HubLedMode {
    /// Colour set to one of a number of specific named colours
    Colour = 0x00,
    /// Colour set to any RGB value
    Rgb = 0x01,
}

/// Property and operation pass through as their raw ids so that values
/// outside the catalog survive the decoder; the typed views are lossy
/// accessors on top.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubProperty {
    pub property: u8,
    pub operation: u8,
    pub payload: Vec<u8>,
}

impl HubProperty {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let property = next!(msg);
        let operation = next!(msg);
        let payload = msg.copied().collect();

        Ok(Self {
            property,
            operation,
            payload,
        })
    }

    fn serialise(&self, ser: &mut Vec<u8>) {
        ser.push(self.property);
        ser.push(self.operation);
        ser.extend_from_slice(&self.payload);
    }

    pub fn kind(&self) -> Option<HubPropertyKind> {
        HubPropertyKind::from_u8(self.property)
    }

    pub fn operation_kind(&self) -> Option<HubPropertyOperation> {
        HubPropertyOperation::from_u8(self.operation)
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum HubAction {
    SwitchOffHub = 0x01,
    Disconnect = 0x02,
    VccPortControlOn = 0x03,
    VccPortControlOff = 0x04,
    ActivateBusyIndication = 0x05,
    ResetBusyIndication = 0x06,
    Shutdown = 0x2F,
    HubWillSwitchOff = 0x30,
    HubWillDisconnect = 0x31,
    HubWillGoIntoBootMode = 0x32,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum AlertType {
    LowVoltage = 0x01,
    HighCurrent = 0x02,
    LowSignalStrength = 0x03,
    OverPowerCondition = 0x04,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum AlertOperation {
    EnableUpdates = 0x01,
    DisableUpdates = 0x02,
    RequestUpdate = 0x03,
    Update = 0x04,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubAlert {
    pub alert_type: u8,
    pub operation: u8,
    pub payload: Vec<u8>,
}

impl HubAlert {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let alert_type = next!(msg);
        let operation = next!(msg);
        let payload = msg.copied().collect();
        Ok(Self {
            alert_type,
            operation,
            payload,
        })
    }

    fn serialise(&self, ser: &mut Vec<u8>) {
        ser.push(self.alert_type);
        ser.push(self.operation);
        ser.extend_from_slice(&self.payload);
    }

    pub fn kind(&self) -> Option<AlertType> {
        AlertType::from_u8(self.alert_type)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AttachedIo {
    pub port: u8,
    pub event: IoAttachEvent,
}

impl AttachedIo {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port = next!(msg);
        let event = IoAttachEvent::parse(&mut msg)?;
        Ok(Self { port, event })
    }

    fn serialise(&self, ser: &mut Vec<u8>) {
        ser.push(self.port);
        self.event.serialise(ser);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IoAttachEvent {
    DetachedIo,
    AttachedIo {
        io_type_id: IoTypeId,
        hw_rev: u32,
        sw_rev: u32,
    },
    AttachedVirtualIo {
        io_type_id: IoTypeId,
        port_a: u8,
        port_b: u8,
    },
}

impl IoAttachEvent {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let event = IoEvent::from_u8(next!(msg)).context("Unknown IoEvent value")?;

        Ok(match event {
            IoEvent::DetachedIo => IoAttachEvent::DetachedIo,
            IoEvent::AttachedIo => {
                let io_type_id = IoTypeId(next_u16!(msg));
                let hw_rev = next_u32!(msg);
                let sw_rev = next_u32!(msg);
                IoAttachEvent::AttachedIo {
                    io_type_id,
                    hw_rev,
                    sw_rev,
                }
            }
            IoEvent::AttachedVirtualIo => {
                let io_type_id = IoTypeId(next_u16!(msg));
                let port_a = next!(msg);
                let port_b = next!(msg);
                IoAttachEvent::AttachedVirtualIo {
                    io_type_id,
                    port_a,
                    port_b,
                }
            }
        })
    }

    fn serialise(&self, ser: &mut Vec<u8>) {
        match self {
            IoAttachEvent::DetachedIo => ser.push(IoEvent::DetachedIo as u8),
            IoAttachEvent::AttachedIo {
                io_type_id,
                hw_rev,
                sw_rev,
            } => {
                ser.push(IoEvent::AttachedIo as u8);
                ser.extend_from_slice(&io_type_id.0.to_le_bytes());
                ser.extend_from_slice(&hw_rev.to_le_bytes());
                ser.extend_from_slice(&sw_rev.to_le_bytes());
            }
            IoAttachEvent::AttachedVirtualIo {
                io_type_id,
                port_a,
                port_b,
            } => {
                ser.push(IoEvent::AttachedVirtualIo as u8);
                ser.extend_from_slice(&io_type_id.0.to_le_bytes());
                ser.push(*port_a);
                ser.push(*port_b);
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ErrorMessageFormat {
    pub command_type: u8,
    pub error_code: ErrorCode,
}

impl ErrorMessageFormat {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let command_type = next!(msg);
        let error_code = ErrorCode::parse(&mut msg)?;
        Ok(Self {
            command_type,
            error_code,
        })
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, Parse)]
pub enum ErrorCode {
    Ack = 0x01,
    Mack = 0x02,
    BufferOverflow = 0x03,
    Timeout = 0x04,
    CommandNotRecognized = 0x05,
    InvalidUse = 0x06,
    Overcurrent = 0x07,
    InternalError = 0x08,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InformationRequest {
    pub port_id: u8,
    pub information_type: InformationType,
}

impl InformationRequest {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(msg);
        let information_type = InformationType::parse(&mut msg)?;
        Ok(Self {
            port_id,
            information_type,
        })
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, Parse)]
pub enum InformationType {
    PortValue = 0x00,
    ModeInfo = 0x01,
    PossibleModeCombinations = 0x02,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ModeInformationRequest {
    pub port_id: u8,
    pub mode: u8,
    pub information_type: u8,
}

impl ModeInformationRequest {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(msg);
        let mode = next!(msg);
        let information_type = next!(msg);
        Ok(Self {
            port_id,
            mode,
            information_type,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InputSetupSingle {
    pub port_id: u8,
    pub mode: u8,
    pub delta: u32,
    pub notification_enabled: bool,
}

impl InputSetupSingle {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(msg);
        let mode = next!(msg);
        let delta = next_u32!(msg);
        let notification_enabled = next!(msg) != 0;
        Ok(Self {
            port_id,
            mode,
            delta,
            notification_enabled,
        })
    }

    fn serialise(&self, ser: &mut Vec<u8>) {
        ser.push(self.port_id);
        ser.push(self.mode);
        ser.extend_from_slice(&self.delta.to_le_bytes());
        ser.push(self.notification_enabled as u8);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInformationValue {
    pub port_id: u8,
    pub information_type: PortInformationType,
}

impl PortInformationValue {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(msg);
        let information_type = PortInformationType::parse(&mut msg)?;
        Ok(Self {
            port_id,
            information_type,
        })
    }

    fn serialise(&self, ser: &mut Vec<u8>) {
        ser.push(self.port_id);
        match &self.information_type {
            PortInformationType::ModeInfo {
                capabilities,
                mode_count,
                input_modes,
                output_modes,
            } => {
                ser.push(1);
                ser.push(*capabilities);
                ser.push(*mode_count);
                ser.extend_from_slice(&input_modes.to_le_bytes());
                ser.extend_from_slice(&output_modes.to_le_bytes());
            }
            PortInformationType::PossibleModeCombinations(combos) => {
                ser.push(2);
                ser.extend_from_slice(combos);
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortInformationType {
    ModeInfo {
        capabilities: u8,
        mode_count: u8,
        input_modes: u16,
        output_modes: u16,
    },
    PossibleModeCombinations(Vec<u8>),
}

impl PortInformationType {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        use PortInformationType::*;

        match next!(msg) {
            1 => {
                let capabilities = next!(msg);
                let mode_count = next!(msg);
                let input_modes = next_u16!(msg);
                let output_modes = next_u16!(msg);
                Ok(ModeInfo {
                    capabilities,
                    mode_count,
                    input_modes,
                    output_modes,
                })
            }
            2 => Ok(PossibleModeCombinations(msg.copied().collect())),
            m => Err(Error::MalformedFrame(format!(
                "Invalid port information type {}",
                m
            ))),
        }
    }
}

/// Mode information payloads vary wildly by information type (strings,
/// float ranges, bitfields); the raw bytes are retained for the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortModeInformationValue {
    pub port_id: u8,
    pub mode: u8,
    pub information_type: u8,
    pub payload: Vec<u8>,
}

impl PortModeInformationValue {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(msg);
        let mode = next!(msg);
        let information_type = next!(msg);
        let payload = msg.copied().collect();
        Ok(Self {
            port_id,
            mode,
            information_type,
            payload,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortValueSingleFormat {
    pub port_id: u8,
    pub values: Vec<u8>,
}

impl PortValueSingleFormat {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(msg);
        let values = msg.copied().collect();
        Ok(Self { port_id, values })
    }
}

/// Combined-mode values arrive with a u16 of mode/dataset pointers ahead
/// of the payload. The pointers are retained unparsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortValueCombinedFormat {
    pub port_id: u8,
    pub mode_pointers: u16,
    pub values: Vec<u8>,
}

impl PortValueCombinedFormat {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(msg);
        let mode_pointers = next_u16!(msg);
        let values = msg.copied().collect();
        Ok(Self {
            port_id,
            mode_pointers,
            values,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInputFormatSingleFormat {
    pub port_id: u8,
    pub mode: u8,
    pub delta: u32,
    pub notification_enabled: bool,
}

impl PortInputFormatSingleFormat {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(msg);
        let mode = next!(msg);
        let delta = next_u32!(msg);
        let notification_enabled = next!(msg) != 0;
        Ok(Self {
            port_id,
            mode,
            delta,
            notification_enabled,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VirtualPortSetupFormat {
    Disconnect { port_id: u8 },
    Connect { port_a: u8, port_b: u8 },
}

impl VirtualPortSetupFormat {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        use VirtualPortSetupFormat::*;

        match next!(msg) {
            0 => {
                let port_id = next!(msg);
                Ok(Disconnect { port_id })
            }
            1 => {
                let port_a = next!(msg);
                let port_b = next!(msg);
                Ok(Connect { port_a, port_b })
            }
            c => Err(Error::MalformedFrame(format!(
                "Invalid virtual port subcommand {}",
                c
            ))),
        }
    }

    fn serialise(&self, ser: &mut Vec<u8>) {
        match self {
            VirtualPortSetupFormat::Disconnect { port_id } => {
                ser.push(0x00);
                ser.push(*port_id);
            }
            VirtualPortSetupFormat::Connect { port_a, port_b } => {
                ser.push(0x01);
                ser.push(*port_a);
                ser.push(*port_b);
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortOutputCommandFormat {
    pub port_id: u8,
    /// Startup nibble | completion nibble, raw. Outbound frames always use
    /// [`STARTUP_EXECUTE_WITH_FEEDBACK`].
    pub startup_and_completion: u8,
    pub subcommand: PortOutputSubcommand,
}

impl PortOutputCommandFormat {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(msg);
        let startup_and_completion = next!(msg);
        let subcommand = PortOutputSubcommand::parse(&mut msg)?;

        Ok(Self {
            port_id,
            startup_and_completion,
            subcommand,
        })
    }

    fn serialise(&self, ser: &mut Vec<u8>) {
        ser.push(self.port_id);
        ser.push(self.startup_and_completion);
        self.subcommand.serialise(ser);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortOutputSubcommand {
    SetAccTime {
        time_ms: i16,
        profile: i8,
    },
    SetDecTime {
        time_ms: i16,
        profile: i8,
    },
    StartSpeed {
        speed: i8,
        max_power: u8,
        use_profile: u8,
    },
    StartSpeedForTime {
        time_ms: i16,
        speed: i8,
        max_power: u8,
        end_state: EndState,
        use_profile: u8,
    },
    StartSpeedForDegrees {
        degrees: i32,
        speed: i8,
        max_power: u8,
        end_state: EndState,
        use_profile: u8,
    },
    GotoAbsolutePosition {
        position: i32,
        speed: i8,
        max_power: u8,
        end_state: EndState,
        use_profile: u8,
    },
    /// The mode byte leads the payload; its meaning depends on the device
    /// occupying the port (mode 0 is motor power on a motor, colour index
    /// on the hub LED).
    WriteDirectModeData {
        mode: u8,
        payload: Vec<u8>,
    },
    Unknown {
        subcommand: u8,
        payload: Vec<u8>,
    },
}

impl PortOutputSubcommand {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        use PortOutputSubcommand::*;

        let subcomm = next!(msg);
        trace!("Port output subcommand: {:#x}", subcomm);
        Ok(match subcomm {
            0x05 => {
                // SetAccTime(Time, ProfileNo)
                let time_ms = next_i16!(msg);
                let profile = next_i8!(msg);
                SetAccTime { time_ms, profile }
            }
            0x06 => {
                // SetDecTime(Time, ProfileNo)
                let time_ms = next_i16!(msg);
                let profile = next_i8!(msg);
                SetDecTime { time_ms, profile }
            }
            0x07 => {
                // StartSpeed(Speed, MaxPower, UseProfile)
                let speed = next_i8!(msg);
                let max_power = next!(msg);
                let use_profile = next!(msg);
                StartSpeed {
                    speed,
                    max_power,
                    use_profile,
                }
            }
            0x09 => {
                // StartSpeedForTime(Time, Speed, MaxPower, EndState, UseProfile)
                let time_ms = next_i16!(msg);
                let speed = next_i8!(msg);
                let max_power = next!(msg);
                let end_state = EndState::parse(&mut msg)?;
                let use_profile = next!(msg);
                StartSpeedForTime {
                    time_ms,
                    speed,
                    max_power,
                    end_state,
                    use_profile,
                }
            }
            0x0b => {
                // StartSpeedForDegrees(Degrees, Speed, MaxPower, EndState,
                // UseProfile)
                let degrees = next_i32!(msg);
                let speed = next_i8!(msg);
                let max_power = next!(msg);
                let end_state = EndState::parse(&mut msg)?;
                let use_profile = next!(msg);
                StartSpeedForDegrees {
                    degrees,
                    speed,
                    max_power,
                    end_state,
                    use_profile,
                }
            }
            0x0d => {
                // GotoAbsolutePosition(AbsPos, Speed, MaxPower, EndState,
                // UseProfile)
                let position = next_i32!(msg);
                let speed = next_i8!(msg);
                let max_power = next!(msg);
                let end_state = EndState::parse(&mut msg)?;
                let use_profile = next!(msg);
                GotoAbsolutePosition {
                    position,
                    speed,
                    max_power,
                    end_state,
                    use_profile,
                }
            }
            0x51 => {
                // WriteDirectModeData(Mode, PayLoad[0..n])
                let mode = next!(msg);
                let payload = msg.copied().collect();
                WriteDirectModeData { mode, payload }
            }
            c => Unknown {
                subcommand: c,
                payload: msg.copied().collect(),
            },
        })
    }

    fn serialise(&self, ser: &mut Vec<u8>) {
        use PortOutputSubcommand::*;

        match self {
            SetAccTime { time_ms, profile } => {
                ser.push(PortOutputSubCommandValue::SetAccTime as u8);
                ser.extend_from_slice(&time_ms.to_le_bytes());
                ser.push(profile.to_le_bytes()[0]);
            }
            SetDecTime { time_ms, profile } => {
                ser.push(PortOutputSubCommandValue::SetDecTime as u8);
                ser.extend_from_slice(&time_ms.to_le_bytes());
                ser.push(profile.to_le_bytes()[0]);
            }
            StartSpeed {
                speed,
                max_power,
                use_profile,
            } => {
                ser.push(PortOutputSubCommandValue::StartSpeed as u8);
                ser.push(speed.to_le_bytes()[0]);
                ser.push(*max_power);
                ser.push(*use_profile);
            }
            StartSpeedForTime {
                time_ms,
                speed,
                max_power,
                end_state,
                use_profile,
            } => {
                ser.push(PortOutputSubCommandValue::StartSpeedForTime as u8);
                ser.extend_from_slice(&time_ms.to_le_bytes());
                ser.push(speed.to_le_bytes()[0]);
                ser.push(*max_power);
                ser.push(*end_state as u8);
                ser.push(*use_profile);
            }
            StartSpeedForDegrees {
                degrees,
                speed,
                max_power,
                end_state,
                use_profile,
            } => {
                ser.push(PortOutputSubCommandValue::StartSpeedForDegrees as u8);
                ser.extend_from_slice(&degrees.to_le_bytes());
                ser.push(speed.to_le_bytes()[0]);
                ser.push(*max_power);
                ser.push(*end_state as u8);
                ser.push(*use_profile);
            }
            GotoAbsolutePosition {
                position,
                speed,
                max_power,
                end_state,
                use_profile,
            } => {
                ser.push(PortOutputSubCommandValue::GotoAbsolutePosition as u8);
                ser.extend_from_slice(&position.to_le_bytes());
                ser.push(speed.to_le_bytes()[0]);
                ser.push(*max_power);
                ser.push(*end_state as u8);
                ser.push(*use_profile);
            }
            WriteDirectModeData { mode, payload } => {
                ser.push(PortOutputSubCommandValue::WriteDirectModeData as u8);
                ser.push(*mode);
                ser.extend_from_slice(payload);
            }
            Unknown {
                subcommand,
                payload,
            } => {
                ser.push(*subcommand);
                ser.extend_from_slice(payload);
            }
        }
    }
}

/// Signed motor power with the two protocol magic values.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Power {
    Cw(u8),
    Ccw(u8),
    Float,
    Brake,
}

impl Power {
    pub fn to_u8(&self) -> u8 {
        use Power::*;
        let integer: i8 = match self {
            Float => 0,
            Brake => 127,
            Cw(p) => *p as i8,
            Ccw(p) => -(*p as i8),
        };
        integer.to_le_bytes()[0]
    }

    pub fn from_i8(val: i8) -> Result<Self> {
        use Power::*;
        match val {
            0 => Ok(Float),
            127 => Ok(Brake),
            p if (1..=100).contains(&p) => Ok(Cw(p as u8)),
            p if (-100..=-1).contains(&p) => Ok(Ccw((-p) as u8)),
            p => Err(Error::MalformedFrame(format!(
                "Invalid value for power: {}",
                p
            ))),
        }
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, Parse)]
pub enum EndState {
    Float = 0,
    Hold = 126,
    Brake = 127,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PortOutputCommandFeedbackFormat {
    pub msg1: FeedbackMessage,
    pub msg2: Option<FeedbackMessage>,
    pub msg3: Option<FeedbackMessage>,
}

impl PortOutputCommandFeedbackFormat {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let msg1 = FeedbackMessage::parse(&mut msg)?;
        let msg2 = FeedbackMessage::parse(&mut msg).ok();
        let msg3 = FeedbackMessage::parse(&mut msg).ok();
        Ok(Self { msg1, msg2, msg3 })
    }

    fn serialise(&self, ser: &mut Vec<u8>) {
        self.msg1.serialise(ser);
        if let Some(m) = &self.msg2 {
            m.serialise(ser);
        }
        if let Some(m) = &self.msg3 {
            m.serialise(ser);
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FeedbackMessage {
    pub port_id: u8,
    pub empty_cmd_in_progress: bool,
    pub empty_cmd_completed: bool,
    pub discarded: bool,
    pub idle: bool,
    pub busy_full: bool,
}

impl FeedbackMessage {
    pub fn parse<'a>(mut msg: impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(msg);
        let bitfields = next!(msg);
        Ok(Self {
            port_id,
            empty_cmd_in_progress: (bitfields & 0x01) != 0,
            empty_cmd_completed: (bitfields & 0x02) != 0,
            discarded: (bitfields & 0x04) != 0,
            idle: (bitfields & 0x08) != 0,
            busy_full: (bitfields & 0x10) != 0,
        })
    }

    fn serialise(&self, ser: &mut Vec<u8>) {
        ser.push(self.port_id);
        ser.push(
            (self.empty_cmd_in_progress as u8)
                | ((self.empty_cmd_completed as u8) << 1)
                | ((self.discarded as u8) << 2)
                | ((self.idle as u8) << 3)
                | ((self.busy_full as u8) << 4),
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use log::LevelFilter;

    fn init() {
        let _ = env_logger::builder()
            .is_test(true)
            .filter(None, LevelFilter::Trace)
            .try_init();
    }

    #[test]
    fn battery_update() {
        init();
        let msg = NotificationMessage::parse(&[0x06, 0x00, 0x01, 0x06, 0x06, 0x64])
            .unwrap();
        let NotificationMessage::HubProperties(prop) = msg else {
            panic!("wrong type");
        };
        assert_eq!(prop.kind(), Some(HubPropertyKind::BatteryVoltage));
        assert_eq!(prop.operation_kind(), Some(HubPropertyOperation::UpdateUpstream));
        assert_eq!(prop.payload, vec![0x64]);
    }

    #[test]
    fn attach_io_message() {
        init();
        let msgs: &[&[u8]] = &[
            &[15, 0, 4, 0, 1, 47, 0, 0, 16, 0, 0, 0, 16, 0, 0],
            &[15, 0, 4, 50, 1, 23, 0, 0, 0, 0, 16, 0, 0, 0, 16],
            &[15, 0, 4, 61, 1, 60, 0, 0, 0, 0, 16, 0, 0, 0, 16],
        ];
        for msg in msgs {
            let notif = NotificationMessage::parse(msg).unwrap();
            let NotificationMessage::HubAttachedIo(attached) = notif else {
                panic!("wrong type");
            };
            assert!(matches!(
                attached.event,
                IoAttachEvent::AttachedIo { .. }
            ));
        }
    }

    #[test]
    fn detach_message() {
        init();
        let notif = NotificationMessage::parse(&[5, 0, 4, 1, 0]).unwrap();
        assert_eq!(
            notif,
            NotificationMessage::HubAttachedIo(AttachedIo {
                port: 1,
                event: IoAttachEvent::DetachedIo,
            })
        );
    }

    #[test]
    fn virtual_attach_message() {
        init();
        let notif =
            NotificationMessage::parse(&[9, 0, 4, 16, 2, 49, 0, 0, 1]).unwrap();
        assert_eq!(
            notif,
            NotificationMessage::HubAttachedIo(AttachedIo {
                port: 16,
                event: IoAttachEvent::AttachedVirtualIo {
                    io_type_id: IoTypeId(49),
                    port_a: 0,
                    port_b: 1,
                },
            })
        );
    }

    #[test]
    fn error_message() {
        init();
        let notif = NotificationMessage::parse(&[5, 0, 5, 17, 5]).unwrap();
        assert_eq!(
            notif,
            NotificationMessage::GenericErrorMessages(ErrorMessageFormat {
                command_type: 17,
                error_code: ErrorCode::CommandNotRecognized,
            })
        );
    }

    #[test]
    fn unknown_message_type() {
        init();
        let notif = NotificationMessage::parse(&[5, 0, 0x77, 1, 2]).unwrap();
        assert_eq!(
            notif,
            NotificationMessage::Unknown {
                message_type: 0x77,
                payload: vec![1, 2],
            }
        );
    }

    #[test]
    fn unknown_hub_action() {
        init();
        let notif = NotificationMessage::parse(&[4, 0, 0x02, 0x99]).unwrap();
        assert_eq!(
            notif,
            NotificationMessage::Unknown {
                message_type: 0x02,
                payload: vec![0x99],
            }
        );
    }

    #[test]
    fn malformed_frames() {
        init();
        // empty, one byte, declared length beyond the buffer
        assert!(NotificationMessage::parse(&[]).is_err());
        assert!(NotificationMessage::parse(&[1]).is_err());
        assert!(NotificationMessage::parse(&[10, 0, 1, 6]).is_err());
        // two-byte length form pointing past the end
        assert!(NotificationMessage::parse(&[0x80, 0x01, 0, 0x45]).is_err());
    }

    #[test]
    fn trailing_bytes_ignored() {
        init();
        let notif =
            NotificationMessage::parse(&[5, 0, 4, 1, 0, 0xAA, 0xBB]).unwrap();
        assert!(matches!(notif, NotificationMessage::HubAttachedIo(_)));
    }

    #[test]
    fn message_length() {
        init();
        let test_cases = &[
            ([0x34, 0x00], 0x34_usize, 1_usize),
            ([0x7f, 0x00], 0x7f, 1),
            ([0b1000_0000, 0b0000_0001], 128, 2),
            ([0b1000_0001, 0b0000_0001], 129, 2),
            ([0b1000_0010, 0b0000_0001], 130, 2),
        ];

        for case in test_cases {
            assert_eq!(
                NotificationMessage::length(case.0.iter()).unwrap(),
                (case.1, case.2)
            );
        }
    }

    #[test]
    fn length_encoding_boundary() {
        init();
        // 4 bytes of header/port + 123 value bytes = 127 total: one byte form
        let msg = NotificationMessage::PortValueSingle(PortValueSingleFormat {
            port_id: 0,
            values: vec![0xAA; 123],
        });
        let ser = msg.serialise();
        assert_eq!(ser.len(), 127);
        assert_eq!(ser[0], 127);
        assert_eq!(NotificationMessage::parse(&ser).unwrap(), msg);

        // one more value byte pushes the total past 127: two byte form
        let msg = NotificationMessage::PortValueSingle(PortValueSingleFormat {
            port_id: 0,
            values: vec![0xAA; 124],
        });
        let ser = msg.serialise();
        assert_eq!(ser.len(), 129);
        assert_eq!(ser[0], 0x81);
        assert_eq!(ser[1], 0x01);
        assert_eq!(NotificationMessage::parse(&ser).unwrap(), msg);
    }

    #[test]
    fn motor_start_speed() {
        init();
        let msg = NotificationMessage::start_speed(0, 75, 100, 0);
        assert_eq!(
            msg.serialise(),
            &[0x09, 0x00, 0x81, 0x00, 0x11, 0x07, 0x4B, 0x64, 0x00]
        );
    }

    #[test]
    fn motor_start_speed_for_time() {
        init();
        let msg =
            NotificationMessage::start_speed_for_time(0, 1000, 50, 100, EndState::Brake, 0);
        assert_eq!(
            msg.serialise(),
            &[0x0C, 0x00, 0x81, 0x00, 0x11, 0x09, 0xE8, 0x03, 0x32, 0x64, 0x7F, 0x00]
        );
    }

    #[test]
    fn virtual_port_connect() {
        init();
        let msg = NotificationMessage::create_virtual_port(0, 1);
        assert_eq!(msg.serialise(), &[0x06, 0x00, 0x61, 0x01, 0x00, 0x01]);

        let msg = NotificationMessage::disconnect_virtual_port(0x10);
        assert_eq!(msg.serialise(), &[0x05, 0x00, 0x61, 0x00, 0x10]);
    }

    #[test]
    fn motor_brake_and_float() {
        init();
        assert_eq!(
            NotificationMessage::brake(1).serialise(),
            &[0x08, 0x00, 0x81, 0x01, 0x11, 0x51, 0x00, 0x7F]
        );
        assert_eq!(
            NotificationMessage::float_motor(1).serialise(),
            &[0x08, 0x00, 0x81, 0x01, 0x11, 0x51, 0x00, 0x00]
        );
        // reverse power is two's complement in one byte
        assert_eq!(
            NotificationMessage::start_power(0, Power::Ccw(50)).serialise(),
            &[0x08, 0x00, 0x81, 0x00, 0x11, 0x51, 0x00, 0xCE]
        );
    }

    #[test]
    fn hub_led_modes() {
        init();
        assert_eq!(
            NotificationMessage::hub_led_color(50, Color::Red).serialise(),
            &[0x08, 0x00, 0x81, 50, 0x11, 0x51, 0x00, 9]
        );
        assert_eq!(
            NotificationMessage::hub_led_rgb(50, 0x12, 0x34, 0x56).serialise(),
            &[0x0A, 0x00, 0x81, 50, 0x11, 0x51, 0x01, 0x12, 0x34, 0x56]
        );
    }

    #[test]
    fn constructor_round_trips() {
        init();
        let messages = vec![
            NotificationMessage::hub_property_request(HubPropertyKind::BatteryVoltage),
            NotificationMessage::hub_property_enable_updates(
                HubPropertyKind::BatteryVoltage,
            ),
            NotificationMessage::hub_action(HubAction::SwitchOffHub),
            NotificationMessage::hub_alert_enable_updates(AlertType::LowVoltage),
            NotificationMessage::port_information_request(2, InformationType::ModeInfo),
            NotificationMessage::port_input_format_setup(3, 0, 1, true),
            NotificationMessage::start_power(0, Power::Cw(40)),
            NotificationMessage::brake(0),
            NotificationMessage::start_speed(1, -30, 80, 3),
            NotificationMessage::start_speed_for_time(2, 500, 50, 100, EndState::Hold, 0),
            NotificationMessage::start_speed_for_degrees(
                3,
                360,
                -50,
                100,
                EndState::Float,
                1,
            ),
            NotificationMessage::goto_absolute_position(0, -90, 20, 60, EndState::Brake, 0),
            NotificationMessage::set_acc_time(0, 200, 0),
            NotificationMessage::set_dec_time(0, 300, 0),
            NotificationMessage::preset_encoder(1, 1000),
            NotificationMessage::hub_led_color(50, Color::Green),
            NotificationMessage::hub_led_rgb(50, 1, 2, 3),
            NotificationMessage::create_virtual_port(0, 1),
            NotificationMessage::disconnect_virtual_port(0x10),
        ];
        for msg in messages {
            let ser = msg.serialise();
            assert_eq!(ser[0] as usize, ser.len());
            assert_eq!(NotificationMessage::parse(&ser).unwrap(), msg, "{:02x?}", ser);
        }
    }

    #[test]
    fn feedback_round_trip() {
        init();
        let ser = &[5, 0, 0x82, 0, 0x0A];
        let NotificationMessage::PortOutputCommandFeedback(fb) =
            NotificationMessage::parse(ser).unwrap()
        else {
            panic!("wrong type");
        };
        assert!(fb.msg1.empty_cmd_completed);
        assert!(fb.msg1.idle);
        assert!(!fb.msg1.busy_full);
        assert!(fb.msg2.is_none());
    }
}
