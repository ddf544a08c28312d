//! Group sessions on top of the sender key ratchet
//!
//! [`GroupSessionBuilder`] creates our own sender key and ingests peers'
//! distribution messages. [`GroupCipher`] encrypts and decrypts group
//! messages for one `(group, sender)` pair. Both load the record from a
//! [`KeyStore`](crate::store::KeyStore), mutate it in memory and write it
//! back only after the whole operation succeeded.

mod builder;
mod cipher;
mod error;
mod name;

pub use builder::GroupSessionBuilder;
pub use cipher::GroupCipher;
pub use error::GroupError;
pub use name::{ProtocolAddress, SenderKeyName};

use wamd_crypto::SenderKeyRecord;

use crate::store::{KeyNamespace, KeyStore, load_value, store_value};

/// Load the record for `name`. `None` if nothing was ever stored.
pub async fn load_sender_key<S: KeyStore>(
    store: &S,
    name: &SenderKeyName,
) -> Result<Option<SenderKeyRecord>, GroupError> {
    Ok(load_value(store, KeyNamespace::SenderKey, &name.to_string()).await?)
}

/// Persist the record for `name`.
pub async fn store_sender_key<S: KeyStore>(
    store: &S,
    name: &SenderKeyName,
    record: &SenderKeyRecord,
) -> Result<(), GroupError> {
    Ok(store_value(store, KeyNamespace::SenderKey, &name.to_string(), record).await?)
}
