//! Typed chat modifications
//!
//! Maps user-level chat changes to [`PatchCreate`]s, and decoded
//! [`Mutation`]s back to typed actions. Values are `SyncActionValue`
//! protobufs; only the actions below are modeled and other fields are
//! skipped when decoding.
//!
//! ```text
//! action         index                                         collection      api
//! mute           [mute, jid]                                   regular_high    2
//! archive        [archive, jid]                                regular_low     3
//! mark read      [markChatAsRead, jid]                         regular_low     3
//! pin            [pin_v1, jid]                                 regular_low     5
//! star           [star, jid, message id, from me, 0]           regular_low     2
//! delete for me  [deleteMessageForMe, jid, message id, from me, 0]
//!                                                              regular_high    3
//! clear          [clearChat, jid, 1, 0]                        regular_high    6
//! delete         [deleteChat, jid, 1]                          regular_high    6
//! push name      [setting_pushName]                            critical_block  1
//! ```

use prost::Message;

use super::{ChatError, CollectionName, Mutation, PatchCreate, SyncdOperation};

/// Identifies one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageKey {
    /// Chat the message belongs to
    pub remote_jid: String,
    /// Whether we sent it
    pub from_me: bool,
    /// Message id
    pub id: String,
    /// Sender inside a group, for messages not from us
    pub participant: Option<String>,
}

/// A message listed in a [`MessageRange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeMessage {
    /// The message
    pub key: MessageKey,
    /// When it was sent
    pub timestamp: i64,
}

/// The messages a chat-wide action covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageRange {
    /// Timestamp of the newest message
    pub last_message_timestamp: Option<i64>,
    /// Timestamp of the newest system message
    pub last_system_message_timestamp: Option<i64>,
    /// The newest messages of the chat, oldest first
    pub messages: Vec<RangeMessage>,
}

impl MessageRange {
    /// Range ending at the last of `messages`.
    ///
    /// Participants are normalized to their user jid.
    ///
    /// # Errors
    ///
    /// - `IncompleteKey` if a key has no id or chat
    /// - `MissingParticipant` for someone else's group message without a sender
    /// - `MissingTimestamp` for a message with a zero timestamp
    pub fn from_last_messages(mut messages: Vec<RangeMessage>) -> Result<Self, ChatError> {
        for message in &mut messages {
            let key = &mut message.key;
            if key.id.is_empty() || key.remote_jid.is_empty() {
                return Err(ChatError::IncompleteKey);
            }
            if is_group(&key.remote_jid) && !key.from_me && key.participant.is_none() {
                return Err(ChatError::MissingParticipant { id: key.id.clone() });
            }
            if message.timestamp == 0 {
                return Err(ChatError::MissingTimestamp { id: key.id.clone() });
            }
            if let Some(participant) = &mut key.participant {
                *participant = normalized_user(participant);
            }
        }

        Ok(Self {
            last_message_timestamp: messages.last().map(|message| message.timestamp),
            last_system_message_timestamp: None,
            messages,
        })
    }

    fn to_proto(&self) -> RangeProto {
        RangeProto {
            last_message_timestamp: self.last_message_timestamp,
            last_system_message_timestamp: self.last_system_message_timestamp,
            messages: self
                .messages
                .iter()
                .map(|message| RangeMessageProto {
                    key: Some(message.key.to_proto()),
                    timestamp: Some(message.timestamp),
                })
                .collect(),
        }
    }

    fn from_proto(proto: RangeProto) -> Self {
        Self {
            last_message_timestamp: proto.last_message_timestamp,
            last_system_message_timestamp: proto.last_system_message_timestamp,
            messages: proto
                .messages
                .into_iter()
                .map(|message| RangeMessage {
                    key: message.key.map(MessageKey::from_proto).unwrap_or_default(),
                    timestamp: message.timestamp.unwrap_or_default(),
                })
                .collect(),
        }
    }
}

impl MessageKey {
    fn to_proto(&self) -> MessageKeyProto {
        MessageKeyProto {
            remote_jid: Some(self.remote_jid.clone()),
            from_me: Some(self.from_me),
            id: Some(self.id.clone()),
            participant: self.participant.clone(),
        }
    }

    fn from_proto(proto: MessageKeyProto) -> Self {
        Self {
            remote_jid: proto.remote_jid.unwrap_or_default(),
            from_me: proto.from_me.unwrap_or_default(),
            id: proto.id.unwrap_or_default(),
            participant: proto.participant,
        }
    }
}

/// A change to one chat (or account setting) made on this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatModification {
    /// Mute until a timestamp, or unmute with `None`
    Mute {
        /// Mute end timestamp
        until: Option<i64>,
    },
    /// Archive or unarchive
    Archive {
        /// New archived flag
        archived: bool,
        /// Messages the chat held when archived
        last_messages: MessageRange,
    },
    /// Mark the chat read or unread
    MarkRead {
        /// New read flag
        read: bool,
        /// Messages the flag covers
        last_messages: MessageRange,
    },
    /// Pin or unpin
    Pin {
        /// New pinned flag
        pinned: bool,
    },
    /// Star or unstar one message
    Star {
        /// The message
        message: MessageKey,
        /// New starred flag
        starred: bool,
    },
    /// Delete one message on our devices only
    DeleteForMe {
        /// The message
        message: MessageKey,
        /// When it was sent
        timestamp: i64,
        /// Also delete downloaded media
        delete_media: bool,
    },
    /// Clear every message, keeping the chat
    Clear {
        /// Messages to clear
        last_messages: MessageRange,
    },
    /// Delete the chat
    Delete {
        /// Messages the chat held
        last_messages: MessageRange,
    },
    /// Change our push name
    PushName {
        /// New display name
        name: String,
    },
}

impl ChatModification {
    /// Patch that applies this change to `jid`, stamped with `timestamp`.
    ///
    /// `jid` is ignored for account settings such as the push name.
    pub fn to_patch_create(&self, jid: &str, timestamp: i64) -> PatchCreate {
        let mut value = ActionValueProto { timestamp: Some(timestamp), ..Default::default() };

        let (index, collection, api_version) = match self {
            Self::Mute { until } => {
                value.mute_action =
                    Some(MuteProto { muted: Some(until.is_some()), mute_end_timestamp: *until });
                (index(&["mute", jid]), CollectionName::RegularHigh, 2)
            }
            Self::Archive { archived, last_messages } => {
                value.archive_chat_action = Some(ArchiveProto {
                    archived: Some(*archived),
                    message_range: Some(last_messages.to_proto()),
                });
                (index(&["archive", jid]), CollectionName::RegularLow, 3)
            }
            Self::MarkRead { read, last_messages } => {
                value.mark_chat_as_read_action = Some(MarkReadProto {
                    read: Some(*read),
                    message_range: Some(last_messages.to_proto()),
                });
                (index(&["markChatAsRead", jid]), CollectionName::RegularLow, 3)
            }
            Self::Pin { pinned } => {
                value.pin_action = Some(PinProto { pinned: Some(*pinned) });
                (index(&["pin_v1", jid]), CollectionName::RegularLow, 5)
            }
            Self::Star { message, starred } => {
                value.star_action = Some(StarProto { starred: Some(*starred) });
                let index = index(&["star", jid, &message.id, flag(message.from_me), "0"]);
                (index, CollectionName::RegularLow, 2)
            }
            Self::DeleteForMe { message, timestamp, delete_media } => {
                value.delete_message_for_me_action = Some(DeleteForMeProto {
                    delete_media: Some(*delete_media),
                    message_timestamp: Some(*timestamp),
                });
                let from_me = flag(message.from_me);
                let index = index(&["deleteMessageForMe", jid, &message.id, from_me, "0"]);
                (index, CollectionName::RegularHigh, 3)
            }
            Self::Clear { last_messages } => {
                value.clear_chat_action =
                    Some(RangeOnlyProto { message_range: Some(last_messages.to_proto()) });
                (index(&["clearChat", jid, "1", "0"]), CollectionName::RegularHigh, 6)
            }
            Self::Delete { last_messages } => {
                value.delete_chat_action =
                    Some(RangeOnlyProto { message_range: Some(last_messages.to_proto()) });
                (index(&["deleteChat", jid, "1"]), CollectionName::RegularHigh, 6)
            }
            Self::PushName { name } => {
                value.push_name_setting = Some(PushNameProto { name: Some(name.clone()) });
                (index(&["setting_pushName"]), CollectionName::CriticalBlock, 1)
            }
        };

        PatchCreate {
            collection,
            index,
            value: value.encode_to_vec(),
            api_version,
            operation: SyncdOperation::Set,
        }
    }
}

/// A chat action received from another device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    /// Chat muted or unmuted
    Mute {
        /// Chat
        jid: String,
        /// Whether the chat is muted
        muted: bool,
        /// Mute end timestamp, when muted
        until: Option<i64>,
    },
    /// Chat archived or unarchived
    Archive {
        /// Chat
        jid: String,
        /// Whether the chat is archived
        archived: bool,
        /// Messages the chat held at the time
        range: Option<MessageRange>,
    },
    /// Chat marked read or unread
    MarkRead {
        /// Chat
        jid: String,
        /// Whether the chat is read
        read: bool,
        /// Messages the flag covers
        range: Option<MessageRange>,
    },
    /// Chat pinned or unpinned
    Pin {
        /// Chat
        jid: String,
        /// Whether the chat is pinned
        pinned: bool,
    },
    /// Message starred or unstarred
    Star {
        /// The message
        message: MessageKey,
        /// Whether it is starred
        starred: bool,
    },
    /// Message deleted on our devices
    DeleteForMe {
        /// The message
        message: MessageKey,
        /// When it was sent
        timestamp: Option<i64>,
        /// Whether media was deleted too
        delete_media: bool,
    },
    /// Chat cleared
    Clear {
        /// Chat
        jid: String,
        /// Messages cleared
        range: Option<MessageRange>,
    },
    /// Chat deleted
    Delete {
        /// Chat
        jid: String,
        /// Messages the chat held
        range: Option<MessageRange>,
    },
    /// Push name changed
    PushName {
        /// New display name
        name: String,
    },
}

/// A decoded chat action and when it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAction {
    /// Action timestamp set by the originating device
    pub timestamp: Option<i64>,
    /// What happened
    pub action: ChatAction,
}

impl SyncAction {
    /// Interpret an authenticated mutation.
    ///
    /// The value decides the action; the index kind is the fallback for
    /// archives, stars and deletes whose value lacks the action field.
    /// Returns `None` for actions not modeled here.
    ///
    /// # Errors
    ///
    /// - `InvalidValue` if the value is not a `SyncActionValue`
    /// - `IncompleteKey` if the index lacks the chat or message id
    pub fn from_mutation(mutation: &Mutation) -> Result<Option<Self>, ChatError> {
        let value = ActionValueProto::decode(mutation.value.as_slice())
            .map_err(|e| ChatError::InvalidValue { reason: e.to_string() })?;
        let index = &mutation.index;
        let kind = index.first().map_or("", String::as_str);
        let jid = || index.get(1).cloned().ok_or(ChatError::IncompleteKey);
        let message = || -> Result<MessageKey, ChatError> {
            Ok(MessageKey {
                remote_jid: jid()?,
                from_me: index.get(3).is_some_and(|from_me| from_me == "1"),
                id: index.get(2).cloned().ok_or(ChatError::IncompleteKey)?,
                participant: None,
            })
        };

        let action = if let Some(mute) = value.mute_action {
            let muted = mute.muted.unwrap_or_default();
            let until = if muted { mute.mute_end_timestamp } else { None };
            ChatAction::Mute { jid: jid()?, muted, until }
        } else if value.archive_chat_action.is_some() || kind == "archive" || kind == "unarchive" {
            let archive = value.archive_chat_action.unwrap_or_default();
            ChatAction::Archive {
                jid: jid()?,
                archived: archive.archived.unwrap_or(kind == "archive"),
                range: archive.message_range.map(MessageRange::from_proto),
            }
        } else if let Some(read) = value.mark_chat_as_read_action {
            ChatAction::MarkRead {
                jid: jid()?,
                read: read.read.unwrap_or_default(),
                range: read.message_range.map(MessageRange::from_proto),
            }
        } else if value.delete_message_for_me_action.is_some() || kind == "deleteMessageForMe" {
            let delete = value.delete_message_for_me_action.unwrap_or_default();
            ChatAction::DeleteForMe {
                message: message()?,
                timestamp: delete.message_timestamp,
                delete_media: delete.delete_media.unwrap_or_default(),
            }
        } else if let Some(setting) = value.push_name_setting {
            ChatAction::PushName { name: setting.name.unwrap_or_default() }
        } else if let Some(pin) = value.pin_action {
            ChatAction::Pin { jid: jid()?, pinned: pin.pinned.unwrap_or_default() }
        } else if value.star_action.is_some() || kind == "star" {
            let starred = value
                .star_action
                .and_then(|star| star.starred)
                .unwrap_or_else(|| index.last().is_some_and(|last| last == "1"));
            ChatAction::Star { message: message()?, starred }
        } else if value.delete_chat_action.is_some() || kind == "deleteChat" {
            let range = value.delete_chat_action.and_then(|delete| delete.message_range);
            ChatAction::Delete { jid: jid()?, range: range.map(MessageRange::from_proto) }
        } else if value.clear_chat_action.is_some() || kind == "clearChat" {
            let range = value.clear_chat_action.and_then(|clear| clear.message_range);
            ChatAction::Clear { jid: jid()?, range: range.map(MessageRange::from_proto) }
        } else {
            return Ok(None);
        };

        Ok(Some(Self { timestamp: value.timestamp, action }))
    }
}

fn index(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

fn flag(set: bool) -> &'static str {
    if set { "1" } else { "0" }
}

fn is_group(jid: &str) -> bool {
    jid.ends_with("@g.us")
}

/// `user_agent:device@server` → `user@server`, with `c.us` mapped to
/// `s.whatsapp.net`.
fn normalized_user(jid: &str) -> String {
    let Some((user, server)) = jid.split_once('@') else {
        return jid.to_string();
    };
    let user = user.split([':', '_']).next().unwrap_or(user);
    let server = if server == "c.us" { "s.whatsapp.net" } else { server };
    format!("{user}@{server}")
}

#[derive(Clone, PartialEq, Message)]
struct ActionValueProto {
    #[prost(int64, optional, tag = "1")]
    timestamp: Option<i64>,
    #[prost(message, optional, tag = "2")]
    star_action: Option<StarProto>,
    #[prost(message, optional, tag = "4")]
    mute_action: Option<MuteProto>,
    #[prost(message, optional, tag = "5")]
    pin_action: Option<PinProto>,
    #[prost(message, optional, tag = "7")]
    push_name_setting: Option<PushNameProto>,
    #[prost(message, optional, tag = "17")]
    archive_chat_action: Option<ArchiveProto>,
    #[prost(message, optional, tag = "18")]
    delete_message_for_me_action: Option<DeleteForMeProto>,
    #[prost(message, optional, tag = "20")]
    mark_chat_as_read_action: Option<MarkReadProto>,
    #[prost(message, optional, tag = "21")]
    clear_chat_action: Option<RangeOnlyProto>,
    #[prost(message, optional, tag = "22")]
    delete_chat_action: Option<RangeOnlyProto>,
}

#[derive(Clone, PartialEq, Message)]
struct StarProto {
    #[prost(bool, optional, tag = "1")]
    starred: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
struct MuteProto {
    #[prost(bool, optional, tag = "1")]
    muted: Option<bool>,
    #[prost(int64, optional, tag = "2")]
    mute_end_timestamp: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
struct PinProto {
    #[prost(bool, optional, tag = "1")]
    pinned: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
struct PushNameProto {
    #[prost(string, optional, tag = "1")]
    name: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
struct ArchiveProto {
    #[prost(bool, optional, tag = "1")]
    archived: Option<bool>,
    #[prost(message, optional, tag = "2")]
    message_range: Option<RangeProto>,
}

#[derive(Clone, PartialEq, Message)]
struct MarkReadProto {
    #[prost(bool, optional, tag = "1")]
    read: Option<bool>,
    #[prost(message, optional, tag = "2")]
    message_range: Option<RangeProto>,
}

#[derive(Clone, PartialEq, Message)]
struct DeleteForMeProto {
    #[prost(bool, optional, tag = "1")]
    delete_media: Option<bool>,
    #[prost(int64, optional, tag = "2")]
    message_timestamp: Option<i64>,
}

/// `ClearChatAction` and `DeleteChatAction` share this shape.
#[derive(Clone, PartialEq, Message)]
struct RangeOnlyProto {
    #[prost(message, optional, tag = "1")]
    message_range: Option<RangeProto>,
}

#[derive(Clone, PartialEq, Message)]
struct RangeProto {
    #[prost(int64, optional, tag = "1")]
    last_message_timestamp: Option<i64>,
    #[prost(int64, optional, tag = "2")]
    last_system_message_timestamp: Option<i64>,
    #[prost(message, repeated, tag = "3")]
    messages: Vec<RangeMessageProto>,
}

#[derive(Clone, PartialEq, Message)]
struct RangeMessageProto {
    #[prost(message, optional, tag = "1")]
    key: Option<MessageKeyProto>,
    #[prost(int64, optional, tag = "2")]
    timestamp: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
struct MessageKeyProto {
    #[prost(string, optional, tag = "1")]
    remote_jid: Option<String>,
    #[prost(bool, optional, tag = "2")]
    from_me: Option<bool>,
    #[prost(string, optional, tag = "3")]
    id: Option<String>,
    #[prost(string, optional, tag = "4")]
    participant: Option<String>,
}
