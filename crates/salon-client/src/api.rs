//! REST collaborators consumed by the sync controller.
//!
//! Three endpoints: the paginated history fetch, the bulk "read up to X"
//! mark, and the attachment upload that turns file bytes into a durable
//! URL before publish. The trait keeps the controller testable without a
//! server; `HttpChatApi` is the production implementation.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use salon_shared::protocol::Message;
use salon_shared::types::{MessageId, MessageType, RoomId};

use crate::error::ClientError;

/// One page of room history, in ascending id order.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
}

/// Durable reference for uploaded attachment bytes.
#[derive(Debug, Clone, Deserialize)]
pub struct Upload {
    pub url: String,
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn fetch_history(
        &self,
        room_id: RoomId,
        page: u32,
        size: u32,
    ) -> Result<HistoryPage, ClientError>;

    async fn mark_all_read(
        &self,
        room_id: RoomId,
        last_message_id: MessageId,
    ) -> Result<(), ClientError>;

    async fn upload_attachment(&self, bytes: Vec<u8>, mime: &str) -> Result<Upload, ClientError>;
}

/// reqwest-backed implementation against the chat REST API.
pub struct HttpChatApi {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_history(
        &self,
        room_id: RoomId,
        page: u32,
        size: u32,
    ) -> Result<HistoryPage, ClientError> {
        let url = format!("{}/chats/rooms/{}/messages", self.base_url, room_id);
        debug!(room = %room_id, page, size, "Fetching history page");

        let body = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("page", page), ("size", size)])
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        // decode separately so a schema mismatch surfaces as Validation,
        // not as a network failure
        Ok(serde_json::from_slice(&body)?)
    }

    async fn mark_all_read(
        &self,
        room_id: RoomId,
        last_message_id: MessageId,
    ) -> Result<(), ClientError> {
        let url = format!("{}/chats/rooms/{}/messages/read-all", self.base_url, room_id);
        debug!(room = %room_id, last = %last_message_id, "Marking all read");

        self.http
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "messageId": last_message_id.0 }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn upload_attachment(&self, bytes: Vec<u8>, mime: &str) -> Result<Upload, ClientError> {
        let url = format!("{}/chats/upload", self.base_url);
        let kind = MessageType::for_mime(mime);
        debug!(kind = kind.as_str(), len = bytes.len(), "Uploading attachment");

        let body = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .query(&[("type", kind.as_str())])
            .header(reqwest::header::CONTENT_TYPE, mime.to_string())
            .body(bytes)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        Ok(serde_json::from_slice(&body)?)
    }
}
