use serde::{Deserialize, Serialize};

// Room identity = server-assigned integer id
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RoomId(pub i64);

impl RoomId {
    /// Broadcast topic carrying chat messages for this room.
    pub fn messages_topic(&self) -> String {
        format!("/topic/chats/rooms/{}", self.0)
    }

    /// Broadcast topic carrying system notices for this room.
    pub fn system_topic(&self) -> String {
        format!("/topic/chats/rooms/{}/system", self.0)
    }

    /// Broadcast topic carrying read-receipt events for this room.
    pub fn reads_topic(&self) -> String {
        format!("/topic/chats/rooms/{}/read", self.0)
    }

    /// Destination for publishing outbound messages.
    pub fn publish_destination(&self) -> String {
        format!("/app/chats/rooms/{}", self.0)
    }

    /// Destination for publishing read acknowledgements.
    pub fn read_destination(&self) -> String {
        format!("/app/chats/rooms/{}/read", self.0)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of content a message carries. For `Image` and `File` the content
/// field holds the uploaded attachment's URL rather than text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    Image,
    File,
}

impl MessageType {
    /// Classify an attachment by its MIME type.
    pub fn for_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Self::Image
        } else {
            Self::File
        }
    }

    /// Wire spelling of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::File => "FILE",
        }
    }
}

/// Transport session connection state, surfaced to the presentation
/// layer for degraded-state indicators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// The authenticated user, as reported by the identity collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub name: String,
}
