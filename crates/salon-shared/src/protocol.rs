use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MessageId, MessageType, RoomId, UserId};

/// A chat message as delivered by the server.
///
/// The `id` is assigned by the server-side authority and is strictly
/// increasing within a room; everything except `read_count` is immutable
/// once the message exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    /// Number of other participants who have read this message.
    /// Non-decreasing over the message's lifetime.
    pub read_count: u32,
}

impl Message {
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Outbound message envelope published to the room's app destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub room_id: RoomId,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
}

impl OutboundMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Acknowledgement that a single inbound message has been read by the
/// active viewer. Published automatically on receipt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadAck {
    pub message_id: MessageId,
}

impl ReadAck {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Read-receipt notification received on the room's read topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ReadReceiptEvent {
    /// One participant read one message.
    #[serde(rename = "MESSAGE_READ", rename_all = "camelCase")]
    Individual { message_id: MessageId },

    /// One participant caught up: every message with id in the range
    /// `(old_last_read_message_id, new_last_read_message_id]` was read.
    #[serde(rename = "MESSAGE_READ_ALL", rename_all = "camelCase")]
    Bulk {
        old_last_read_message_id: MessageId,
        new_last_read_message_id: MessageId,
    },
}

impl ReadReceiptEvent {
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
