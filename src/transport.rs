// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The boundary between the engine and whatever moves bytes for it.
//!
//! Adapters wrap a connected BLE peripheral or a line-oriented accessory
//! stream. Scanning, pairing, and service discovery happen on the adapter
//! side; the runtime only sees role-hinted characteristic tags and byte
//! payloads.

use std::fmt::Debug;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// Tag used in [`Transport::write`] for the single stream of a line
/// transport, which has no characteristics.
pub const LINE_STREAM: Uuid = Uuid::nil();

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

/// Role hints for a discovered characteristic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub tag: Uuid,
    pub writable: bool,
    pub notifiable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInfo {
    pub service: Uuid,
    pub characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    pub fn characteristic(&self, tag: &Uuid) -> Option<&CharacteristicInfo> {
        self.characteristics.iter().find(|c| c.tag == *tag)
    }
}

/// Events an adapter delivers upward, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    ServicesDiscovered(Vec<ServiceInfo>),
    FrameReceived { tag: Uuid, data: Vec<u8> },
    /// One line from the accessory stream, terminator included or not.
    LineReceived(Vec<u8>),
    RssiUpdate(i16),
    Disconnected { reason: Option<String> },
}

#[async_trait]
pub trait Transport: Debug + Send + Sync {
    async fn open(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
    async fn write(&self, tag: &Uuid, data: &[u8], mode: WriteMode) -> Result<()>;
    async fn subscribe(&self, tag: &Uuid) -> Result<()>;
    async fn read_rssi(&self) -> Result<i16>;
}
