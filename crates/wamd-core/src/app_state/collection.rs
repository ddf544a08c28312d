use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Named app-state collection. Each has its own version and LTHash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionName {
    /// Blocklist changes
    CriticalBlock,
    /// Push name, contacts and other low-volume critical settings
    CriticalUnblockLow,
    /// High priority chat actions (mute, clear, delete)
    RegularHigh,
    /// Low priority chat actions (archive, mark read, pin, star)
    RegularLow,
    /// Everything else (labels, quick replies)
    Regular,
}

impl CollectionName {
    /// Every collection, in the order a full sync requests them.
    pub const ALL: [Self; 5] = [
        Self::CriticalBlock,
        Self::CriticalUnblockLow,
        Self::RegularHigh,
        Self::RegularLow,
        Self::Regular,
    ];

    /// Wire name. Also bound into snapshot and patch MACs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CriticalBlock => "critical_block",
            Self::CriticalUnblockLow => "critical_unblock_low",
            Self::RegularHigh => "regular_high",
            Self::RegularLow => "regular_low",
            Self::Regular => "regular",
        }
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown collection name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown app-state collection: {0}")]
pub struct UnknownCollection(pub String);

impl FromStr for CollectionName {
    type Err = UnknownCollection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownCollection(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for name in CollectionName::ALL {
            assert_eq!(name.as_str().parse::<CollectionName>().unwrap(), name);
        }
        assert!("regular_medium".parse::<CollectionName>().is_err());
    }
}
