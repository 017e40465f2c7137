//! Chat message model plus the search request and response types shared by
//! the message index and its command-line tool.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Kind of a chat message, as far as rendering is concerned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Voice,
    Video,
    Emoji,
    Location,
    Link,
    File,
    System,
    /// Anything the exporter could not classify; rendered as its raw content.
    Other,
}

/// A single decrypted chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sequence number, monotonically assigned per talker by the source.
    pub seq: i64,
    pub time: DateTime<Utc>,
    /// Conversation identifier (a contact or a chat room).
    pub talker: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub talker_name: String,
    #[serde(default)]
    pub is_chat_room: bool,
    pub sender: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender_name: String,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub kind: MessageKind,
    /// Raw textual content as exported.
    #[serde(default)]
    pub content: String,
    /// Structured extras (link title/url, file name, location label, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contents: BTreeMap<String, JsonValue>,
}

impl Message {
    pub fn new(
        talker: impl Into<String>,
        sender: impl Into<String>,
        seq: i64,
        time: DateTime<Utc>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            seq,
            time,
            talker: talker.into(),
            talker_name: String::new(),
            is_chat_room: false,
            sender: sender.into(),
            sender_name: String::new(),
            is_self: false,
            kind: MessageKind::Text,
            content: content.into(),
            contents: BTreeMap::new(),
        }
    }

    /// Builder-style helper to attach a structured extra.
    pub fn with_content_field(
        mut self,
        key: impl Into<String>,
        value: impl Into<JsonValue>,
    ) -> Self {
        self.contents.insert(key.into(), value.into());
        self
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Plain-text rendering shown to users and indexed for search.
    pub fn plain_text_content(&self) -> String {
        match self.kind {
            MessageKind::Text | MessageKind::System | MessageKind::Other => self.content.clone(),
            MessageKind::Image => "[Image]".to_string(),
            MessageKind::Voice => "[Voice]".to_string(),
            MessageKind::Video => "[Video]".to_string(),
            MessageKind::Emoji => "[Emoji]".to_string(),
            MessageKind::Location => match self.content_str("label") {
                Some(label) => format!("[Location|{label}]"),
                None => "[Location]".to_string(),
            },
            MessageKind::Link => match (self.content_str("title"), self.content_str("url")) {
                (Some(title), Some(url)) => format!("[Link|{title}]({url})"),
                (Some(title), None) => format!("[Link|{title}]"),
                (None, Some(url)) => format!("[Link]({url})"),
                (None, None) => self.content.clone(),
            },
            MessageKind::File => match self.content_str("title") {
                Some(title) => format!("[File|{title}]"),
                None => "[File]".to_string(),
            },
        }
    }

    fn content_str(&self, key: &str) -> Option<&str> {
        self.contents.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
    }
}

/// Parameters of one search call.
///
/// `talker` and `sender` accept comma-separated lists. `start`/`end` are
/// inclusive; `None` leaves that side open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub talker: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Default::default() }
    }

    pub fn talkers(&self) -> Vec<String> {
        split_list(&self.talker)
    }

    pub fn senders(&self) -> Vec<String> {
        split_list(&self.sender)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// One matched message with its highlighted excerpt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub message: Message,
    /// Highlighted fragments of the content, empty when the engine reported none.
    pub snippet: String,
    /// Engine-native relevance score; only comparable within one response.
    pub score: f32,
}

/// Snapshot of the index state exposed to the control layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub document_count: u64,
    pub schema_version: Option<String>,
    pub fingerprint: Option<String>,
    pub last_built_at: Option<DateTime<Utc>>,
}

/// Search result page plus the parameters that actually took effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total: usize,
    pub hits: Vec<SearchHit>,
    pub duration_ms: i64,
    pub limit: usize,
    pub offset: usize,
    pub query: String,
    pub talker: String,
    pub sender: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_status: Option<IndexStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn text_renders_raw_content() {
        let m = Message::new("alice", "bob", 1, at(10), "hello world");
        assert_eq!(m.plain_text_content(), "hello world");
    }

    #[test]
    fn link_renders_title_and_url() {
        let m = Message::new("alice", "bob", 2, at(10), "")
            .with_kind(MessageKind::Link)
            .with_content_field("title", "Rust 1.80 released")
            .with_content_field("url", "https://blog.rust-lang.org");
        assert_eq!(m.plain_text_content(), "[Link|Rust 1.80 released](https://blog.rust-lang.org)");
    }

    #[test]
    fn media_kinds_render_placeholders() {
        let img = Message::new("a", "b", 1, at(0), "<xml/>").with_kind(MessageKind::Image);
        assert_eq!(img.plain_text_content(), "[Image]");
        let file = Message::new("a", "b", 2, at(0), "")
            .with_kind(MessageKind::File)
            .with_content_field("title", "report.pdf");
        assert_eq!(file.plain_text_content(), "[File|report.pdf]");
    }

    #[test]
    fn request_lists_are_split_and_trimmed() {
        let req = SearchRequest { talker: " a, b ,,c".into(), ..Default::default() };
        assert_eq!(req.talkers(), vec!["a", "b", "c"]);
        assert!(req.senders().is_empty());
    }

    #[test]
    fn message_json_roundtrip_keeps_extras() {
        let m = Message::new("room@chatroom", "carol", 7, at(1_700_000_000), "")
            .with_kind(MessageKind::Location)
            .with_content_field("label", "Cafe");
        let json = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
