// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The outbound seam. Whatever actually carries bytes to the remote process lives behind
//! [`Transport`]; replies come back in through [`crate::ConnectionContext::dispatch`].

use flume::{Receiver, Sender};

use crate::errors::RpcError;
use crate::messages::Outbound;

pub trait Transport: Send + Sync {
    /// Queue a message for delivery. Must not block on the remote side.
    fn send(&self, message: Outbound) -> Result<(), RpcError>;
}

/// Transport that hands outbound messages to a flume channel, for embedding into an existing
/// event loop (or for driving a context by hand).
#[derive(Clone)]
pub struct ChannelTransport {
    sender: Sender<Outbound>,
}

impl ChannelTransport {
    pub fn new() -> (Self, Receiver<Outbound>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender }, receiver)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, message: Outbound) -> Result<(), RpcError> {
        self.sender
            .send(message)
            .map_err(|e| RpcError::CouldNotSend(e.to_string()))
    }
}
