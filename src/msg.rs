//! Messages exchanged between ports.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::IdGenerator;

/// Identity of a port as seen from the other end of a connection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemotePort(String);

impl RemotePort {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RemotePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemotePort {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for RemotePort {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A message travelling from one port to another.
///
/// A message is owned by whichever buffer holds it and ends its life when
/// the destination component retrieves it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Msg {
    /// Unique id, drawn from the simulation's id generator.
    pub id: u64,
    /// The sending port.
    pub src: RemotePort,
    /// The receiving port.
    pub dst: RemotePort,
    /// Size on the wire, for bandwidth modelling in collaborator components.
    pub traffic_bytes: u64,
    /// Message content.
    pub payload: serde_json::Value,
}

impl Msg {
    pub fn new(
        id: u64,
        src: impl Into<RemotePort>,
        dst: impl Into<RemotePort>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            src: src.into(),
            dst: dst.into(),
            traffic_bytes: 0,
            payload,
        }
    }

    /// Creates a message with an id taken from `ids`.
    pub fn with_generated_id(
        ids: &IdGenerator,
        src: impl Into<RemotePort>,
        dst: impl Into<RemotePort>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(ids.generate(), src, dst, payload)
    }

    pub fn with_traffic_bytes(mut self, bytes: u64) -> Self {
        self.traffic_bytes = bytes;
        self
    }
}
