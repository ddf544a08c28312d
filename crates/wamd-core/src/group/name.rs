use std::fmt;

use serde::{Deserialize, Serialize};

/// A device of a user: `(name, device id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolAddress {
    name: String,
    device_id: u32,
}

impl ProtocolAddress {
    /// Address of `device_id` belonging to user `name`.
    pub fn new(name: impl Into<String>, device_id: u32) -> Self {
        Self { name: name.into(), device_id }
    }

    /// User part.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device part.
    pub fn device_id(&self) -> u32 {
        self.device_id
    }
}

impl fmt::Display for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.device_id)
    }
}

/// Identifies one sender key record: a sender device within a group.
///
/// Displays as `group::name::device`, which is also the store id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SenderKeyName {
    group_id: String,
    sender: ProtocolAddress,
}

impl SenderKeyName {
    /// Name for `sender`'s key in `group_id`.
    pub fn new(group_id: impl Into<String>, sender: ProtocolAddress) -> Self {
        Self { group_id: group_id.into(), sender }
    }

    /// Group identifier.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Sending device.
    pub fn sender(&self) -> &ProtocolAddress {
        &self.sender
    }
}

impl fmt::Display for SenderKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.group_id, self.sender.name, self.sender.device_id)
    }
}
