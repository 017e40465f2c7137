use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions, STORED,
    STRING,
};
use tantivy::Index;

use crate::tokenizer::{chat_analyzer, CHAT_TOKENIZER};

/// Fixed document mapping shared by every index instance.
///
/// - `content`: analyzed with the chat analyzer, positions kept for phrases, not stored.
/// - `talker`, `sender`, `id`: untokenized exact-match keywords, stored.
/// - `unix`, `seq`: stored i64, indexed and fast for range filters.
/// - `message_json`: stored only, never searchable.
#[derive(Debug, Clone)]
pub struct MessageSchema {
    pub schema: Schema,
    pub id: Field,
    pub talker: Field,
    pub sender: Field,
    pub unix: Field,
    pub seq: Field,
    pub content: Field,
    pub message_json: Field,
}

impl MessageSchema {
    pub fn build() -> Self {
        let mut schema_builder = Schema::builder();
        let id = schema_builder.add_text_field("id", STRING | STORED);
        let talker = schema_builder.add_text_field("talker", STRING | STORED);
        let sender = schema_builder.add_text_field("sender", STRING | STORED);
        let num_opts = NumericOptions::default().set_indexed().set_fast().set_stored();
        let unix = schema_builder.add_i64_field("unix", num_opts.clone());
        let seq = schema_builder.add_i64_field("seq", num_opts);
        let content_indexing = TextFieldIndexing::default()
            .set_tokenizer(CHAT_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let content_opts = TextOptions::default().set_indexing_options(content_indexing);
        let content = schema_builder.add_text_field("content", content_opts);
        let message_json = schema_builder.add_text_field("message_json", STORED);
        let schema = schema_builder.build();
        Self { schema, id, talker, sender, unix, seq, content, message_json }
    }

    /// Tokenizers are not persisted by tantivy; this must run after every open.
    pub fn register_tokenizers(index: &Index) {
        index.tokenizers().register(CHAT_TOKENIZER, chat_analyzer());
    }
}
