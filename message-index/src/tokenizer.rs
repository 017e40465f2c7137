//! Word analyzer for chat content.
//!
//! Latin-script text is split on anything that is not alphanumeric. CJK
//! ideographs, kana and hangul syllables carry no spaces between words, so
//! each of them becomes a token of its own; multi-character queries over them
//! are matched as phrases.

use std::iter::Peekable;
use std::str::CharIndices;

use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, TextAnalyzer, Token, TokenStream, Tokenizer};

/// Name under which [`chat_analyzer`] is registered on every index.
pub const CHAT_TOKENIZER: &str = "chat";

const MAX_TOKEN_BYTES: usize = 40;

pub fn chat_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(ChatTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_BYTES))
        .filter(LowerCaser)
        .build()
}

#[derive(Clone, Default)]
pub struct ChatTokenizer {
    token: Token,
}

pub struct ChatTokenStream<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
    token: &'a mut Token,
}

impl Tokenizer for ChatTokenizer {
    type TokenStream<'a> = ChatTokenStream<'a>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> ChatTokenStream<'a> {
        self.token = Token::default();
        ChatTokenStream { text, chars: text.char_indices().peekable(), token: &mut self.token }
    }
}

impl ChatTokenStream<'_> {
    fn emit(&mut self, from: usize, to: usize) {
        self.token.offset_from = from;
        self.token.offset_to = to;
        self.token.text.push_str(&self.text[from..to]);
    }
}

impl TokenStream for ChatTokenStream<'_> {
    fn advance(&mut self) -> bool {
        self.token.text.clear();
        self.token.position = self.token.position.wrapping_add(1);
        while let Some((start, c)) = self.chars.next() {
            if is_cjk(c) {
                self.emit(start, start + c.len_utf8());
                return true;
            }
            if c.is_alphanumeric() {
                let mut end = start + c.len_utf8();
                while let Some(&(offset, next)) = self.chars.peek() {
                    if !next.is_alphanumeric() || is_cjk(next) {
                        break;
                    }
                    end = offset + next.len_utf8();
                    self.chars.next();
                }
                self.emit(start, end);
                return true;
            }
        }
        false
    }

    fn token(&self) -> &Token {
        self.token
    }

    fn token_mut(&mut self) -> &mut Token {
        self.token
    }
}

pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30ff}'     // hiragana, katakana
        | '\u{3400}'..='\u{4dbf}'   // CJK extension A
        | '\u{4e00}'..='\u{9fff}'   // CJK unified ideographs
        | '\u{ac00}'..='\u{d7af}'   // hangul syllables
        | '\u{f900}'..='\u{faff}'   // CJK compatibility ideographs
        | '\u{20000}'..='\u{2a6df}' // CJK extension B
    )
}
