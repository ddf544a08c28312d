//! Wire types for app-state patches and snapshots
//!
//! The public structs are the logical messages. [`SyncdPatch::to_bytes`] and
//! friends encode them with the WhatsApp protobuf layouts:
//!
//! ```text
//! SyncdPatch     { version: SyncdVersion = 1, mutations = 2, snapshotMac = 4,
//!                  patchMac = 5, keyId: KeyId = 6 }
//! SyncdSnapshot  { version: SyncdVersion = 1, records = 2, mac = 3, keyId: KeyId = 4 }
//! SyncdMutation  { operation = 1 (SET = 0, REMOVE = 1), record = 2 }
//! SyncdRecord    { index: SyncdIndex = 1, value: SyncdValue = 2, keyId: KeyId = 3 }
//! SyncActionData { index = 1, value = 2, padding = 3, version = 4 }
//! ```

use prost::Message;

use super::{AppStateError, CollectionName};

/// What a mutation does to its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncdOperation {
    /// Insert or overwrite
    Set,
    /// Delete; requires a live value at the index
    Remove,
}

impl SyncdOperation {
    /// Tag byte bound into the value MAC.
    pub fn mac_tag(self) -> u8 {
        match self {
            Self::Set => 0x01,
            Self::Remove => 0x02,
        }
    }

    fn wire_value(self) -> i32 {
        match self {
            Self::Set => 0,
            Self::Remove => 1,
        }
    }

    fn from_wire(value: Option<i32>, collection: CollectionName) -> Result<Self, AppStateError> {
        match value {
            None | Some(0) => Ok(Self::Set),
            Some(1) => Ok(Self::Remove),
            Some(other) => Err(malformed(collection, format!("unknown operation {other}"))),
        }
    }
}

/// One encrypted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncdRecord {
    /// HMAC-SHA256 of the plaintext index
    pub index: Vec<u8>,
    /// `iv ‖ ciphertext ‖ value MAC (32 bytes)`
    pub value: Vec<u8>,
    /// Raw id of the app-state key that sealed this record
    pub key_id: Vec<u8>,
}

/// A record plus the operation applied with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncdMutation {
    /// Set or remove
    pub operation: SyncdOperation,
    /// The sealed entry
    pub record: SyncdRecord,
}

/// Incremental change to one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncdPatch {
    /// Collection version after this patch
    pub version: u64,
    /// Mutations, applied in order
    pub mutations: Vec<SyncdMutation>,
    /// Expected snapshot MAC after applying the patch
    pub snapshot_mac: Vec<u8>,
    /// MAC over snapshot MAC, value MACs, version and collection name
    pub patch_mac: Vec<u8>,
    /// Raw id of the key for the patch and snapshot MACs
    pub key_id: Vec<u8>,
}

/// Full contents of one collection at a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncdSnapshot {
    /// Collection version
    pub version: u64,
    /// Every live record; all are implicit SETs
    pub records: Vec<SyncdRecord>,
    /// Snapshot MAC over the resulting LTHash
    pub mac: Vec<u8>,
    /// Raw id of the key for the snapshot MAC
    pub key_id: Vec<u8>,
}

/// Plaintext sealed inside a record's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncActionData {
    /// Canonical index bytes
    pub index: Vec<u8>,
    /// Encoded `SyncActionValue` (mute, archive, label, ...)
    pub value: Vec<u8>,
    /// Padding, empty when we encode
    pub padding: Vec<u8>,
    /// Action API version
    pub version: u32,
}

impl SyncdRecord {
    /// Value blob without the trailing MAC, and the MAC.
    pub fn split_value(&self) -> Option<(&[u8], &[u8])> {
        let split = self.value.len().checked_sub(32)?;
        Some(self.value.split_at(split))
    }

    fn to_proto(&self) -> RecordProto {
        RecordProto {
            index: Some(BlobProto { blob: Some(self.index.clone()) }),
            value: Some(BlobProto { blob: Some(self.value.clone()) }),
            key_id: Some(KeyIdProto { id: Some(self.key_id.clone()) }),
        }
    }

    fn from_proto(proto: RecordProto) -> Self {
        Self {
            index: proto.index.and_then(|index| index.blob).unwrap_or_default(),
            value: proto.value.and_then(|value| value.blob).unwrap_or_default(),
            key_id: key_id_bytes(proto.key_id),
        }
    }
}

impl SyncdPatch {
    /// Protobuf encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mutations = self
            .mutations
            .iter()
            .map(|mutation| MutationProto {
                operation: Some(mutation.operation.wire_value()),
                record: Some(mutation.record.to_proto()),
            })
            .collect();

        PatchProto {
            version: Some(VersionProto { version: Some(self.version) }),
            mutations,
            snapshot_mac: Some(self.snapshot_mac.clone()),
            patch_mac: Some(self.patch_mac.clone()),
            key_id: Some(KeyIdProto { id: Some(self.key_id.clone()) }),
        }
        .encode_to_vec()
    }

    /// Decode a protobuf patch received for `collection`.
    ///
    /// # Errors
    ///
    /// - `Malformed` for bad protobuf, a missing version or record, or an
    ///   unknown operation
    pub fn from_bytes(bytes: &[u8], collection: CollectionName) -> Result<Self, AppStateError> {
        let proto = PatchProto::decode(bytes).map_err(|e| malformed(collection, e.to_string()))?;
        let version = wire_version(proto.version, collection)?;

        let mutations = proto
            .mutations
            .into_iter()
            .map(|mutation| {
                let operation = SyncdOperation::from_wire(mutation.operation, collection)?;
                let Some(record) = mutation.record else {
                    return Err(malformed(collection, "mutation without record".into()));
                };
                Ok(SyncdMutation { operation, record: SyncdRecord::from_proto(record) })
            })
            .collect::<Result<Vec<_>, AppStateError>>()?;

        Ok(Self {
            version,
            mutations,
            snapshot_mac: proto.snapshot_mac.unwrap_or_default(),
            patch_mac: proto.patch_mac.unwrap_or_default(),
            key_id: key_id_bytes(proto.key_id),
        })
    }
}

impl SyncdSnapshot {
    /// Protobuf encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        SnapshotProto {
            version: Some(VersionProto { version: Some(self.version) }),
            records: self.records.iter().map(SyncdRecord::to_proto).collect(),
            mac: Some(self.mac.clone()),
            key_id: Some(KeyIdProto { id: Some(self.key_id.clone()) }),
        }
        .encode_to_vec()
    }

    /// Decode a protobuf snapshot received for `collection`.
    ///
    /// # Errors
    ///
    /// - `Malformed` for bad protobuf or a missing version
    pub fn from_bytes(bytes: &[u8], collection: CollectionName) -> Result<Self, AppStateError> {
        let proto =
            SnapshotProto::decode(bytes).map_err(|e| malformed(collection, e.to_string()))?;

        Ok(Self {
            version: wire_version(proto.version, collection)?,
            records: proto.records.into_iter().map(SyncdRecord::from_proto).collect(),
            mac: proto.mac.unwrap_or_default(),
            key_id: key_id_bytes(proto.key_id),
        })
    }
}

impl SyncActionData {
    /// Protobuf encoding, the plaintext sealed into a record value.
    pub fn to_bytes(&self) -> Vec<u8> {
        ActionDataProto {
            index: Some(self.index.clone()),
            value: Some(self.value.clone()),
            padding: Some(self.padding.clone()),
            version: Some(self.version as i32),
        }
        .encode_to_vec()
    }

    /// Decode a decrypted record value.
    ///
    /// # Errors
    ///
    /// - `Malformed` for bad protobuf or a negative version
    pub fn from_bytes(bytes: &[u8], collection: CollectionName) -> Result<Self, AppStateError> {
        let proto =
            ActionDataProto::decode(bytes).map_err(|e| malformed(collection, e.to_string()))?;
        let version = proto.version.unwrap_or_default();
        let version = u32::try_from(version)
            .map_err(|_| malformed(collection, format!("negative action version {version}")))?;

        Ok(Self {
            index: proto.index.unwrap_or_default(),
            value: proto.value.unwrap_or_default(),
            padding: proto.padding.unwrap_or_default(),
            version,
        })
    }
}

fn malformed(collection: CollectionName, reason: String) -> AppStateError {
    AppStateError::Malformed { collection, reason }
}

fn wire_version(
    version: Option<VersionProto>,
    collection: CollectionName,
) -> Result<u64, AppStateError> {
    version
        .and_then(|version| version.version)
        .ok_or_else(|| malformed(collection, "missing version".into()))
}

fn key_id_bytes(key_id: Option<KeyIdProto>) -> Vec<u8> {
    key_id.and_then(|key_id| key_id.id).unwrap_or_default()
}

#[derive(Clone, PartialEq, Message)]
struct VersionProto {
    #[prost(uint64, optional, tag = "1")]
    version: Option<u64>,
}

#[derive(Clone, PartialEq, Message)]
struct KeyIdProto {
    #[prost(bytes = "vec", optional, tag = "1")]
    id: Option<Vec<u8>>,
}

/// `SyncdIndex` and `SyncdValue` share this shape.
#[derive(Clone, PartialEq, Message)]
struct BlobProto {
    #[prost(bytes = "vec", optional, tag = "1")]
    blob: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
struct RecordProto {
    #[prost(message, optional, tag = "1")]
    index: Option<BlobProto>,
    #[prost(message, optional, tag = "2")]
    value: Option<BlobProto>,
    #[prost(message, optional, tag = "3")]
    key_id: Option<KeyIdProto>,
}

#[derive(Clone, PartialEq, Message)]
struct MutationProto {
    #[prost(int32, optional, tag = "1")]
    operation: Option<i32>,
    #[prost(message, optional, tag = "2")]
    record: Option<RecordProto>,
}

#[derive(Clone, PartialEq, Message)]
struct PatchProto {
    #[prost(message, optional, tag = "1")]
    version: Option<VersionProto>,
    #[prost(message, repeated, tag = "2")]
    mutations: Vec<MutationProto>,
    #[prost(bytes = "vec", optional, tag = "4")]
    snapshot_mac: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "5")]
    patch_mac: Option<Vec<u8>>,
    #[prost(message, optional, tag = "6")]
    key_id: Option<KeyIdProto>,
}

#[derive(Clone, PartialEq, Message)]
struct SnapshotProto {
    #[prost(message, optional, tag = "1")]
    version: Option<VersionProto>,
    #[prost(message, repeated, tag = "2")]
    records: Vec<RecordProto>,
    #[prost(bytes = "vec", optional, tag = "3")]
    mac: Option<Vec<u8>>,
    #[prost(message, optional, tag = "4")]
    key_id: Option<KeyIdProto>,
}

#[derive(Clone, PartialEq, Message)]
struct ActionDataProto {
    #[prost(bytes = "vec", optional, tag = "1")]
    index: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    value: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    padding: Option<Vec<u8>>,
    #[prost(int32, optional, tag = "4")]
    version: Option<i32>,
}
