// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt::Display;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A frame shorter than its declared length, or a truncated record.
    /// Recovery is always "drop the frame, keep the stream".
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    /// The active transport cannot express this command.
    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),
    #[error("Transport error: {0}")]
    TransportError(String),
    #[error("Connect deadline elapsed")]
    ConnectTimeout,
    /// Services were discovered but none of them is a hub protocol we speak.
    #[error("No usable protocol")]
    NoUsableProtocol,
    #[error("Hub error: {0}")]
    HubError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait OptionContext<T> {
    fn context<D: Display>(self, ctx: D) -> Result<T>;
}

impl<T> OptionContext<T> for Option<T> {
    fn context<D: Display>(self, ctx: D) -> Result<T> {
        self.ok_or_else(|| Error::MalformedFrame(ctx.to_string()))
    }
}

impl<T> OptionContext<T> for Result<T> {
    fn context<D: Display>(self, _ctx: D) -> Result<T> {
        self
    }
}
