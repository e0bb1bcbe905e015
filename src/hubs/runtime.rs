// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The per-hub runtime: one state machine that owns the snapshot, binds a
//! protocol to the transport, and translates between semantic commands
//! and wire frames.
//!
//! All inbound events for a hub are funnelled through
//! [`Hub::on_transport_event`] in arrival order; outbound commands go
//! through an mpsc queue drained by a single writer task, so sends are
//! strictly ordered among themselves.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use log::{debug, trace, warn};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::consts::{
    blecharacteristic, bleservice, HubPropertyKind, HubPropertyOperation, IoTypeId,
    HUB_INTERNAL_PORT_BASE,
};
use crate::error::{Error, Result};
use crate::hubs::{Command, ConnectionKind, HubConfig, HubEvent, HubState, Protocol};
use crate::iodevice::{is_external_port, IoDevice};
use crate::jsonrpc::{self, LineEvent};
use crate::notifications::{HubProperty, IoAttachEvent, NotificationMessage, Power};
use crate::cobs;
use crate::snapshot::{ApplyOutcome, DeviceSnapshot};
use crate::spike::{self, InfoResponse, SpikeMessage};
use crate::transport::{
    CharacteristicInfo, ServiceInfo, Transport, TransportEvent, WriteMode,
    LINE_STREAM,
};

const COMMAND_QUEUE_DEPTH: usize = 32;
const EVENT_CHANNEL_DEPTH: usize = 64;

/// Handle to one hub's runtime. Cheap to clone; all clones share state.
#[derive(Clone, Debug)]
pub struct Hub {
    inner: Arc<HubInner>,
}

#[derive(Debug)]
struct HubInner {
    identifier: String,
    kind: ConnectionKind,
    config: HubConfig,
    transport: Arc<dyn Transport>,

    name: Mutex<String>,
    state: Mutex<HubState>,
    protocol: Mutex<Protocol>,
    snapshot: Mutex<DeviceSnapshot>,
    chars: Mutex<BoundCharacteristics>,
    limits: Mutex<Option<InfoResponse>>,
    battery_gate: Mutex<BatteryGate>,
    rssi: Mutex<Option<i16>>,

    events: broadcast::Sender<HubEvent>,
    cmd_tx: mpsc::Sender<Command>,
    connect_cancel: Mutex<Option<CancellationToken>>,
    rssi_cancel: Mutex<Option<CancellationToken>>,
}

#[derive(Debug, Default, Clone)]
struct BoundCharacteristics {
    write: Option<Uuid>,
    notify: Option<Uuid>,
}

/// Dampens battery events: the first nonzero reading always fires, after
/// that a change fires immediately and an unchanged value at most once
/// per dampening window.
#[derive(Debug, Default)]
struct BatteryGate {
    last_emitted: Option<u8>,
    last_at: Option<Instant>,
}

impl BatteryGate {
    fn admit(&mut self, level: u8, window: std::time::Duration) -> bool {
        let emit = match (self.last_emitted, self.last_at) {
            (None, _) => level != 0,
            (Some(prev), Some(at)) => level != prev || at.elapsed() >= window,
            (Some(prev), None) => level != prev,
        };
        if emit {
            self.last_emitted = Some(level);
            self.last_at = Some(Instant::now());
        }
        emit
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Lock a std mutex, recovering the data from a poisoned guard.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Hub {
    /// Must be called from within a tokio runtime; the outbound writer
    /// task is spawned here.
    pub fn new(
        identifier: impl Into<String>,
        transport: Arc<dyn Transport>,
        kind: ConnectionKind,
    ) -> Self {
        Self::with_config(identifier, transport, kind, HubConfig::default())
    }

    pub fn with_config(
        identifier: impl Into<String>,
        transport: Arc<dyn Transport>,
        kind: ConnectionKind,
        config: HubConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_DEPTH);

        let hub = Self {
            inner: Arc::new(HubInner {
                identifier: identifier.into(),
                kind,
                config,
                transport,
                name: Mutex::new(String::new()),
                state: Mutex::new(HubState::Disconnected),
                protocol: Mutex::new(Protocol::Unselected),
                snapshot: Mutex::new(DeviceSnapshot::default()),
                chars: Mutex::new(BoundCharacteristics::default()),
                limits: Mutex::new(None),
                battery_gate: Mutex::new(BatteryGate::default()),
                rssi: Mutex::new(None),
                events,
                cmd_tx,
                connect_cancel: Mutex::new(None),
                rssi_cancel: Mutex::new(None),
            }),
        };

        tokio::spawn(Self::writer_loop(hub.clone(), cmd_rx));
        hub
    }

    // ---- public surface --------------------------------------------------

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    pub fn name(&self) -> String {
        lock(&self.inner.name).clone()
    }

    pub fn kind(&self) -> ConnectionKind {
        self.inner.kind
    }

    pub fn state(&self) -> HubState {
        *lock(&self.inner.state)
    }

    pub fn protocol(&self) -> Protocol {
        *lock(&self.inner.protocol)
    }

    pub fn rssi(&self) -> Option<i16> {
        *lock(&self.inner.rssi)
    }

    /// Copy-on-read view of the device model; never blocks on telemetry.
    pub fn snapshot(&self) -> DeviceSnapshot {
        lock(&self.inner.snapshot).clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.inner.events.subscribe()
    }

    /// Ask the transport to connect. Valid only while disconnected; the
    /// attempt is abandoned if the transport does not produce a usable
    /// connection within the configured deadline.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = lock(&self.inner.state);
            match *state {
                HubState::Disconnected | HubState::Disconnecting => {
                    *state = HubState::Connecting;
                }
                current => {
                    return Err(Error::HubError(format!(
                        "connect() invalid while {:?}",
                        current
                    )));
                }
            }
        }
        self.emit(HubEvent::StateChanged(HubState::Connecting));
        self.arm_connect_deadline();
        self.inner.transport.open().await
    }

    /// Idempotent; closing an already-closed transport is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        let should_close = {
            let mut state = lock(&self.inner.state);
            match *state {
                HubState::Connected | HubState::Connecting => {
                    *state = HubState::Disconnecting;
                    true
                }
                HubState::Disconnecting | HubState::Disconnected => false,
            }
        };
        if should_close {
            self.emit(HubEvent::StateChanged(HubState::Disconnecting));
            self.cancel_timers();
            self.inner.transport.close().await?;
        }
        Ok(())
    }

    /// Enqueue one semantic command; ordering among sends is FIFO.
    pub async fn send(&self, command: Command) -> Result<()> {
        self.inner
            .cmd_tx
            .send(command)
            .await
            .map_err(|_| Error::HubError("Command queue closed".to_string()))
    }

    /// Feed one transport event into the state machine. The adapter must
    /// call this serially, in arrival order.
    pub async fn on_transport_event(&self, event: TransportEvent) {
        trace!("[{}] transport event: {:?}", self.inner.identifier, event);
        match event {
            TransportEvent::Connected => {
                if self.inner.kind == ConnectionKind::Line {
                    // no services on a line transport; the protocol is fixed
                    *lock(&self.inner.protocol) = Protocol::SpikeJson;
                    self.mark_connected();
                }
                // BLE stays in Connecting until services arrive
            }
            TransportEvent::ServicesDiscovered(services) => {
                self.select_protocol(&services).await;
            }
            TransportEvent::FrameReceived { tag, data } => {
                self.handle_frame(&tag, &data).await;
            }
            TransportEvent::LineReceived(line) => {
                self.handle_line(&line);
            }
            TransportEvent::RssiUpdate(rssi) => {
                self.record_rssi(rssi);
            }
            TransportEvent::Disconnected { reason } => {
                self.handle_disconnect(reason);
            }
        }
    }

    // ---- state transitions -----------------------------------------------

    fn emit(&self, event: HubEvent) {
        // listeners are optional
        let _ = self.inner.events.send(event);
    }

    fn set_state(&self, new: HubState) {
        let changed = {
            let mut state = lock(&self.inner.state);
            if *state == new {
                false
            } else {
                *state = new;
                true
            }
        };
        if changed {
            self.emit(HubEvent::StateChanged(new));
        }
    }

    fn mark_connected(&self) {
        if let Some(token) = lock(&self.inner.connect_cancel).take() {
            token.cancel();
        }
        self.set_state(HubState::Connected);
        if self.inner.kind == ConnectionKind::Ble {
            self.spawn_rssi_poll();
        }
    }

    fn arm_connect_deadline(&self) {
        let token = CancellationToken::new();
        if let Some(old) = lock(&self.inner.connect_cancel).replace(token.clone()) {
            old.cancel();
        }
        let hub = self.clone();
        let deadline = self.inner.config.connect_deadline;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    if hub.state() == HubState::Connecting {
                        warn!(
                            "[{}] connect deadline elapsed",
                            hub.inner.identifier
                        );
                        hub.emit(HubEvent::Diagnostic(
                            Error::ConnectTimeout.to_string(),
                        ));
                        hub.set_state(HubState::Disconnecting);
                        let _ = hub.inner.transport.close().await;
                    }
                }
            }
        });
    }

    fn spawn_rssi_poll(&self) {
        let token = CancellationToken::new();
        if let Some(old) = lock(&self.inner.rssi_cancel).replace(token.clone()) {
            old.cancel();
        }
        let hub = self.clone();
        let interval = self.inner.config.rssi_poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        match hub.inner.transport.read_rssi().await {
                            Ok(rssi) => hub.record_rssi(rssi),
                            Err(e) => {
                                debug!(
                                    "[{}] rssi poll stopped: {}",
                                    hub.inner.identifier, e
                                );
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    fn cancel_timers(&self) {
        if let Some(token) = lock(&self.inner.connect_cancel).take() {
            token.cancel();
        }
        if let Some(token) = lock(&self.inner.rssi_cancel).take() {
            token.cancel();
        }
    }

    fn handle_disconnect(&self, reason: Option<String>) {
        self.cancel_timers();
        *lock(&self.inner.protocol) = Protocol::Unselected;
        *lock(&self.inner.chars) = BoundCharacteristics::default();
        *lock(&self.inner.limits) = None;
        lock(&self.inner.battery_gate).reset();
        lock(&self.inner.snapshot).clear();
        if let Some(reason) = reason {
            self.emit(HubEvent::Diagnostic(format!(
                "Transport closed: {}",
                reason
            )));
        }
        self.set_state(HubState::Disconnected);
    }

    // ---- protocol selection & bootstrap ----------------------------------

    /// SPIKE binary first, then LWP3; otherwise report that the device is
    /// not a hub we can drive over this transport.
    async fn select_protocol(&self, services: &[ServiceInfo]) {
        if self.protocol() != Protocol::Unselected {
            return;
        }

        if let Some(service) =
            services.iter().find(|s| s.service == *bleservice::SPIKE_HUB)
        {
            let write = pick_char(service, |c| c.writable)
                .unwrap_or(*blecharacteristic::SPIKE_RX);
            let notify = pick_char(service, |c| c.notifiable)
                .unwrap_or(*blecharacteristic::SPIKE_TX);
            *lock(&self.inner.chars) = BoundCharacteristics {
                write: Some(write),
                notify: Some(notify),
            };
            *lock(&self.inner.protocol) = Protocol::SpikeBinary;
            debug!("[{}] selected SPIKE binary", self.inner.identifier);

            if let Err(e) = self.inner.transport.subscribe(&notify).await {
                warn!("[{}] subscribe failed: {}", self.inner.identifier, e);
            }
            self.mark_connected();
            if let Err(e) = self.write_spike(&spike::info_request()).await {
                warn!("[{}] info request failed: {}", self.inner.identifier, e);
            }
            return;
        }

        if let Some(service) =
            services.iter().find(|s| s.service == *bleservice::LWP3_HUB)
        {
            let tag = service
                .characteristics
                .first()
                .map(|c| c.tag)
                .unwrap_or(*blecharacteristic::LWP3_ALL);
            *lock(&self.inner.chars) = BoundCharacteristics {
                write: Some(tag),
                notify: Some(tag),
            };
            *lock(&self.inner.protocol) = Protocol::Lwp3Ble;
            debug!("[{}] selected LWP3", self.inner.identifier);

            if let Err(e) = self.inner.transport.subscribe(&tag).await {
                warn!("[{}] subscribe failed: {}", self.inner.identifier, e);
            }
            self.mark_connected();
            for msg in [
                NotificationMessage::hub_property_request(
                    HubPropertyKind::BatteryVoltage,
                ),
                NotificationMessage::hub_property_enable_updates(
                    HubPropertyKind::BatteryVoltage,
                ),
            ] {
                if let Err(e) = self.write_lwp3(msg).await {
                    warn!(
                        "[{}] battery bootstrap failed: {}",
                        self.inner.identifier, e
                    );
                }
            }
            return;
        }

        warn!("[{}] no usable protocol", self.inner.identifier);
        self.emit(HubEvent::NoUsableProtocol);
    }

    // ---- inbound ---------------------------------------------------------

    async fn handle_frame(&self, tag: &Uuid, data: &[u8]) {
        let expected = lock(&self.inner.chars).notify;
        if let Some(expected) = expected {
            if expected != *tag {
                trace!("[{}] frame on unbound tag {}", self.inner.identifier, tag);
                return;
            }
        }
        match self.protocol() {
            Protocol::Lwp3Ble => self.handle_lwp3(data).await,
            Protocol::SpikeBinary => {
                let payload = cobs::unpack(data);
                if payload.is_empty() {
                    debug!("[{}] unframeable SPIKE data", self.inner.identifier);
                    return;
                }
                self.handle_spike(&payload).await;
            }
            protocol => {
                trace!(
                    "[{}] frame ignored in protocol {:?}",
                    self.inner.identifier,
                    protocol
                );
            }
        }
    }

    async fn handle_lwp3(&self, data: &[u8]) {
        let message = match NotificationMessage::parse(data) {
            Ok(message) => message,
            Err(e) => {
                warn!("[{}] dropped LWP3 frame: {}", self.inner.identifier, e);
                return;
            }
        };

        match message {
            NotificationMessage::HubAttachedIo(attached) => {
                self.handle_attached_io(attached.port, attached.event).await;
            }
            NotificationMessage::PortValueSingle(value) => {
                let copy = {
                    let mut snapshot = lock(&self.inner.snapshot);
                    snapshot.insert_raw_value(value.port_id, value.values);
                    snapshot.clone()
                };
                self.emit(HubEvent::DeviceDataChanged(copy));
            }
            NotificationMessage::PortValueCombinedmode(value) => {
                let copy = {
                    let mut snapshot = lock(&self.inner.snapshot);
                    snapshot.insert_raw_value(value.port_id, value.values);
                    snapshot.clone()
                };
                self.emit(HubEvent::DeviceDataChanged(copy));
            }
            NotificationMessage::HubProperties(property) => {
                self.handle_hub_property(property);
            }
            NotificationMessage::GenericErrorMessages(err) => {
                self.emit(HubEvent::Diagnostic(format!(
                    "Hub rejected command {:#04x}: {:?}",
                    err.command_type, err.error_code
                )));
            }
            NotificationMessage::HubAlerts(alert) => {
                self.emit(HubEvent::Diagnostic(format!(
                    "Hub alert {:?} (operation {:#04x})",
                    alert.kind(),
                    alert.operation
                )));
            }
            NotificationMessage::PortOutputCommandFeedback(feedback) => {
                debug!(
                    "[{}] port output feedback: {:?}",
                    self.inner.identifier, feedback
                );
                if feedback.msg1.discarded {
                    self.emit(HubEvent::Diagnostic(format!(
                        "Command discarded on port {}",
                        feedback.msg1.port_id
                    )));
                }
            }
            NotificationMessage::Unknown {
                message_type,
                ref payload,
            } => {
                debug!(
                    "[{}] unknown LWP3 message {:#04x}: {:02x?}",
                    self.inner.identifier, message_type, payload
                );
                self.emit(HubEvent::Diagnostic(format!(
                    "Unknown LWP3 message {:#04x}",
                    message_type
                )));
            }
            other => {
                trace!("[{}] unhandled: {:?}", self.inner.identifier, other);
            }
        }
    }

    async fn handle_attached_io(&self, port: u8, event: IoAttachEvent) {
        match event {
            IoAttachEvent::AttachedIo {
                io_type_id,
                hw_rev,
                sw_rev,
            } => {
                let copy = {
                    let mut snapshot = lock(&self.inner.snapshot);
                    snapshot.attach(IoDevice::with_revisions(
                        io_type_id, port, hw_rev, sw_rev,
                    ));
                    snapshot.clone()
                };
                self.emit(HubEvent::AttachedDevicesChanged(copy));
                if is_external_port(port) {
                    // mode 0, delta 1, notifications on: stream the
                    // device's default value
                    let setup =
                        NotificationMessage::port_input_format_setup(port, 0, 1, true);
                    if let Err(e) = self.write_lwp3(setup).await {
                        warn!(
                            "[{}] port input setup failed: {}",
                            self.inner.identifier, e
                        );
                    }
                }
            }
            IoAttachEvent::AttachedVirtualIo {
                io_type_id,
                port_a,
                port_b,
            } => {
                let copy = {
                    let mut snapshot = lock(&self.inner.snapshot);
                    snapshot.attach(IoDevice::new_virtual(
                        io_type_id, port, port_a, port_b,
                    ));
                    snapshot.clone()
                };
                self.emit(HubEvent::AttachedDevicesChanged(copy));
            }
            IoAttachEvent::DetachedIo => {
                let copy = {
                    let mut snapshot = lock(&self.inner.snapshot);
                    snapshot.detach(port);
                    snapshot.clone()
                };
                self.emit(HubEvent::AttachedDevicesChanged(copy));
            }
        }
    }

    fn handle_hub_property(&self, property: HubProperty) {
        if property.operation_kind() != Some(HubPropertyOperation::UpdateUpstream) {
            return;
        }
        match property.kind() {
            Some(HubPropertyKind::BatteryVoltage) => {
                let Some(&level) = property.payload.first() else {
                    return;
                };
                self.apply_battery(level.min(100));
            }
            Some(HubPropertyKind::AdvertisingName) => {
                let name = String::from_utf8_lossy(&property.payload)
                    .trim_end_matches('\0')
                    .to_string();
                *lock(&self.inner.name) = name.clone();
                self.emit(HubEvent::NameChanged(name));
            }
            Some(HubPropertyKind::Rssi) => {
                let Some(&raw) = property.payload.first() else {
                    return;
                };
                self.record_rssi(raw as i8 as i16);
            }
            _ => {
                trace!(
                    "[{}] hub property {:#04x} ignored",
                    self.inner.identifier,
                    property.property
                );
            }
        }
    }

    async fn handle_spike(&self, payload: &[u8]) {
        let message = match SpikeMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("[{}] dropped SPIKE frame: {}", self.inner.identifier, e);
                return;
            }
        };

        match message {
            SpikeMessage::InfoResponse(info) => {
                debug!(
                    "[{}] negotiated limits: packet {} message {}",
                    self.inner.identifier, info.max_packet_size, info.max_message_size
                );
                *lock(&self.inner.limits) = Some(info);
                let request = spike::device_notification_request(
                    self.inner.config.device_notification_interval_ms,
                );
                if let Err(e) = self.write_spike(&request).await {
                    warn!(
                        "[{}] device notification request failed: {}",
                        self.inner.identifier, e
                    );
                }
            }
            SpikeMessage::DeviceNotification(notification) => {
                let (outcome, copy) = {
                    let mut snapshot = lock(&self.inner.snapshot);
                    let outcome = snapshot.apply_notification(&notification);
                    (outcome, snapshot.clone())
                };
                self.publish_apply(outcome, copy);
            }
            SpikeMessage::ConsoleNotification(text) => {
                self.emit(HubEvent::Console(text));
            }
            SpikeMessage::Unknown { tag, ref payload } => {
                debug!(
                    "[{}] unknown SPIKE message {:#04x}: {:02x?}",
                    self.inner.identifier, tag, payload
                );
            }
        }
    }

    fn handle_line(&self, line: &[u8]) {
        if self.protocol() != Protocol::SpikeJson {
            return;
        }
        match jsonrpc::parse_line(line) {
            Ok(LineEvent::PortTelemetry(readings)) => {
                let (outcome, copy) = {
                    let mut snapshot = lock(&self.inner.snapshot);
                    let outcome = snapshot.apply_port_readings(&readings);
                    (outcome, snapshot.clone())
                };
                self.publish_apply(outcome, copy);
            }
            Ok(LineEvent::Battery(level)) => {
                self.apply_battery(level);
            }
            Ok(LineEvent::Ignored) => {}
            Err(e) => {
                warn!("[{}] dropped line: {}", self.inner.identifier, e);
            }
        }
    }

    fn publish_apply(&self, outcome: ApplyOutcome, copy: DeviceSnapshot) {
        if outcome.attached_changed {
            self.emit(HubEvent::AttachedDevicesChanged(copy.clone()));
        }
        self.emit(HubEvent::DeviceDataChanged(copy));
        if let Some(level) = outcome.battery {
            self.gate_battery(level);
        }
    }

    fn apply_battery(&self, level: u8) {
        lock(&self.inner.snapshot).battery = Some(level);
        self.gate_battery(level);
    }

    fn gate_battery(&self, level: u8) {
        let emit = lock(&self.inner.battery_gate)
            .admit(level, self.inner.config.battery_dampening);
        if emit {
            self.emit(HubEvent::BatteryChanged(level));
        }
    }

    fn record_rssi(&self, rssi: i16) {
        let changed = {
            let mut slot = lock(&self.inner.rssi);
            if *slot == Some(rssi) {
                false
            } else {
                *slot = Some(rssi);
                true
            }
        };
        if changed {
            self.emit(HubEvent::RssiChanged(rssi));
        }
    }

    // ---- outbound --------------------------------------------------------

    async fn writer_loop(hub: Hub, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match hub.encode_and_write(command).await {
                Ok(()) => {}
                Err(Error::UnsupportedCommand(msg)) => {
                    debug!("[{}] {}", hub.inner.identifier, msg);
                    hub.emit(HubEvent::Diagnostic(format!(
                        "Unsupported command: {}",
                        msg
                    )));
                }
                Err(e) => {
                    warn!("[{}] write failed: {}", hub.inner.identifier, e);
                    hub.emit(HubEvent::Diagnostic(format!("Write failed: {}", e)));
                }
            }
        }
    }

    async fn encode_and_write(&self, command: Command) -> Result<()> {
        match self.protocol() {
            Protocol::Lwp3Ble => self.write_lwp3_command(command).await,
            Protocol::SpikeBinary => self.write_spike_command(command).await,
            Protocol::SpikeJson => self.write_json_command(command).await,
            Protocol::Unselected => Err(Error::UnsupportedCommand(format!(
                "{:?} before a protocol was selected",
                command
            ))),
        }
    }

    async fn write_lwp3_command(&self, command: Command) -> Result<()> {
        let message = match command {
            Command::StartPower { port, power } => {
                NotificationMessage::start_power(port, power_from_i8(power))
            }
            Command::Brake { port } => NotificationMessage::brake(port),
            Command::Float { port } => NotificationMessage::float_motor(port),
            Command::StartSpeed {
                port,
                speed,
                max_power,
            } => NotificationMessage::start_speed(port, speed, max_power, 0),
            Command::StartSpeedForTime {
                port,
                time_ms,
                speed,
                max_power,
                end_state,
            } => NotificationMessage::start_speed_for_time(
                port, time_ms, speed, max_power, end_state, 0,
            ),
            Command::StartSpeedForDegrees {
                port,
                degrees,
                speed,
                max_power,
                end_state,
            } => NotificationMessage::start_speed_for_degrees(
                port, degrees, speed, max_power, end_state, 0,
            ),
            Command::GotoAbsolutePosition {
                port,
                position,
                speed,
                max_power,
                end_state,
            } => NotificationMessage::goto_absolute_position(
                port, position, speed, max_power, end_state, 0,
            ),
            Command::HubLedColor(color) => {
                NotificationMessage::hub_led_color(self.led_port(), color)
            }
            Command::HubLedRgb { red, green, blue } => {
                NotificationMessage::hub_led_rgb(self.led_port(), red, green, blue)
            }
            Command::HubAction(action) => NotificationMessage::hub_action(action),
            Command::CreateVirtualPort { port_a, port_b } => {
                NotificationMessage::create_virtual_port(port_a, port_b)
            }
            Command::DisconnectVirtualPort { port } => {
                NotificationMessage::disconnect_virtual_port(port)
            }
            Command::SetHubName(name) => {
                self.set_local_name(&name);
                NotificationMessage::hub_property_set(
                    HubPropertyKind::AdvertisingName,
                    name.into_bytes(),
                )
            }
            command @ (Command::StartProgram { .. }
            | Command::StopProgram { .. }
            | Command::ClearSlot { .. }) => {
                return Err(Error::UnsupportedCommand(format!(
                    "{:?} on the LWP3 protocol",
                    command
                )));
            }
        };
        self.write_lwp3(message).await
    }

    async fn write_spike_command(&self, command: Command) -> Result<()> {
        let payload = match command {
            Command::SetHubName(name) => {
                self.set_local_name(&name);
                spike::set_hub_name(&name)
            }
            Command::StartProgram { slot } => spike::program_flow_request(false, slot),
            Command::StopProgram { slot } => spike::program_flow_request(true, slot),
            Command::ClearSlot { slot } => spike::clear_slot(slot),
            command => {
                return Err(Error::UnsupportedCommand(format!(
                    "{:?} on the SPIKE binary protocol",
                    command
                )));
            }
        };
        self.write_spike(&payload).await
    }

    /// The accessory stream can only express the scratch motor verbs;
    /// everything else is reported, not guessed at.
    async fn write_json_command(&self, command: Command) -> Result<()> {
        let line = match command {
            Command::StartPower { port, power } => {
                if power == 0 {
                    jsonrpc::motor_stop(port)
                } else {
                    jsonrpc::motor_pwm(port, power)
                }
            }
            // floating is start-power at zero, which the stream expresses
            // as a stop; braking has no scratch verb and the pwm range
            // cannot carry the magic braking value
            Command::Float { port } => jsonrpc::motor_stop(port),
            Command::StartSpeed { port, speed, .. } => {
                if speed == 0 {
                    jsonrpc::motor_stop(port)
                } else {
                    jsonrpc::motor_start(port, speed)
                }
            }
            command => {
                return Err(Error::UnsupportedCommand(format!(
                    "{:?} on the accessory transport",
                    command
                )));
            }
        };
        self.inner
            .transport
            .write(&LINE_STREAM, &line, WriteMode::WithResponse)
            .await
    }

    async fn write_lwp3(&self, message: NotificationMessage) -> Result<()> {
        let tag = lock(&self.inner.chars)
            .write
            .ok_or_else(|| Error::HubError("No write characteristic".to_string()))?;
        self.inner
            .transport
            .write(&tag, &message.serialise(), WriteMode::WithoutResponse)
            .await
    }

    /// Pack and write one SPIKE payload, split to the negotiated packet
    /// size (or a conservative default before negotiation).
    async fn write_spike(&self, payload: &[u8]) -> Result<()> {
        let tag = lock(&self.inner.chars)
            .write
            .ok_or_else(|| Error::HubError("No write characteristic".to_string()))?;
        let max_packet = (*lock(&self.inner.limits))
            .map(|info| info.max_packet_size as usize)
            .filter(|&size| size > 0)
            .unwrap_or(self.inner.config.default_max_packet_size);

        let frame = cobs::pack(payload);
        for chunk in frame.chunks(max_packet) {
            self.inner
                .transport
                .write(&tag, chunk, WriteMode::WithoutResponse)
                .await?;
        }
        Ok(())
    }

    fn set_local_name(&self, name: &str) {
        *lock(&self.inner.name) = name.to_string();
        self.emit(HubEvent::NameChanged(name.to_string()));
    }

    /// Port of the attached hub LED, if the hub reported one.
    fn led_port(&self) -> u8 {
        lock(&self.inner.snapshot)
            .attached
            .values()
            .find(|device| device.kind() == IoTypeId(23))
            .map(|device| device.port())
            .unwrap_or(HUB_INTERNAL_PORT_BASE)
    }
}

fn pick_char(
    service: &ServiceInfo,
    predicate: impl Fn(&CharacteristicInfo) -> bool,
) -> Option<Uuid> {
    service
        .characteristics
        .iter()
        .find(|c| predicate(c))
        .map(|c| c.tag)
}

fn power_from_i8(power: i8) -> Power {
    match power {
        0 => Power::Float,
        127 => Power::Brake,
        p if p > 0 => Power::Cw((p as i16).min(100) as u8),
        p => Power::Ccw((-(p as i16)).min(100) as u8),
    }
}
