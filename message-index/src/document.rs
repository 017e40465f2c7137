use message_model::Message;
use tantivy::{doc, TantivyDocument};

use crate::schema::MessageSchema;
use crate::IndexError;

/// Searchable representation of one message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDocument {
    /// `"<talker>:<seq>"`; re-indexing the same identity replaces the document.
    pub id: String,
    pub talker: String,
    pub sender: String,
    pub unix: i64,
    pub seq: i64,
    /// Plain-text rendering, the same text users see.
    pub content: String,
    /// Full serialized message, returned on hit.
    pub message_json: String,
}

pub fn document_id(talker: &str, seq: i64) -> String {
    format!("{talker}:{seq}")
}

impl MessageDocument {
    pub fn from_message(msg: &Message) -> Result<Self, IndexError> {
        let id = document_id(&msg.talker, msg.seq);
        let message_json = serde_json::to_string(msg)
            .map_err(|e| IndexError::Encode(format!("marshal message {id}: {e}")))?;
        Ok(Self {
            talker: msg.talker.clone(),
            sender: msg.sender.clone(),
            unix: msg.time.timestamp(),
            seq: msg.seq,
            content: msg.plain_text_content(),
            message_json,
            id,
        })
    }

    pub fn to_tantivy(&self, fields: &MessageSchema) -> TantivyDocument {
        doc!(
            fields.id => self.id.clone(),
            fields.talker => self.talker.clone(),
            fields.sender => self.sender.clone(),
            fields.unix => self.unix,
            fields.seq => self.seq,
            fields.content => self.content.clone(),
            fields.message_json => self.message_json.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use message_model::MessageKind;

    fn sample() -> Message {
        let at = Utc.timestamp_opt(1_700_000_123, 0).unwrap();
        Message::new("alice", "bob", 42, at, "see you at noon")
    }

    #[test]
    fn maps_identity_and_time() {
        let d = MessageDocument::from_message(&sample()).unwrap();
        assert_eq!(d.id, "alice:42");
        assert_eq!(d.talker, "alice");
        assert_eq!(d.sender, "bob");
        assert_eq!(d.unix, 1_700_000_123);
        assert_eq!(d.seq, 42);
    }

    #[test]
    fn content_uses_display_rendering() {
        let m = sample().with_kind(MessageKind::File).with_content_field("title", "budget.xlsx");
        let d = MessageDocument::from_message(&m).unwrap();
        assert_eq!(d.content, "[File|budget.xlsx]");
    }

    #[test]
    fn message_json_roundtrips_to_the_same_message() {
        let m = sample();
        let d = MessageDocument::from_message(&m).unwrap();
        let back: Message = serde_json::from_str(&d.message_json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn empty_talker_is_accepted_with_bare_seq_id() {
        let mut m = sample();
        m.talker.clear();
        let d = MessageDocument::from_message(&m).unwrap();
        assert_eq!(d.id, ":42");
        assert_eq!(d.talker, "");
    }

    #[test]
    fn talker_with_punctuation_keeps_full_id() {
        let mut m = sample();
        m.talker = "12345@chatroom".into();
        assert_eq!(MessageDocument::from_message(&m).unwrap().id, "12345@chatroom:42");
    }
}
