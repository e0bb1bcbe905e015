// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport-agnostic protocol engine for LEGO hubs.
//!
//! Speaks the two wire protocols of the Powered Up / SPIKE Prime /
//! Robot Inventor families — LWP3 and the COBS-framed SPIKE binary
//! protocol, plus the JSON accessory stream — over any byte transport
//! that implements [`transport::Transport`]. Incoming frames are
//! projected into a queryable [`snapshot::DeviceSnapshot`] per hub;
//! outgoing motor, light, and hub commands are synthesised from the
//! semantic [`hubs::Command`] enum.
//!
//! Scanning and connecting are the embedder's job: hand the engine an
//! already-connected transport and feed it [`transport::TransportEvent`]s.

pub mod cobs;
pub mod consts;
pub mod error;
pub mod hubs;
pub mod iodevice;
pub mod jsonrpc;
pub mod manager;
pub mod notifications;
pub mod snapshot;
pub mod spike;
pub mod transport;


pub use error::{Error, OptionContext, Result};
pub use futures;

pub use consts::{Color, DeviceCategory, IoTypeId};
pub use hubs::{
    Command, ConnectionKind, Hub, HubConfig, HubEvent, HubState, Protocol,
};
pub use iodevice::IoDevice;
pub use manager::{HubManager, ManagerConfig, ManagerEvent, ScanObservation};
pub use snapshot::DeviceSnapshot;
pub use transport::{Transport, TransportEvent, WriteMode};
