//! Compiles a search request into a query tree.
//!
//! Plain text is split on whitespace and every token must match. Text that
//! carries query-language markers (quotes, wildcards, parentheses, boolean
//! keywords) is handed to the engine's expression parser untouched.

use std::ops::Bound;

use chrono::{DateTime, Utc};
use tantivy::query::{
    BooleanQuery, EmptyQuery, Occur, PhraseQuery, Query, QueryParser, RangeQuery, TermQuery,
};
use tantivy::schema::IndexRecordOption;
use tantivy::tokenizer::TokenStream;
use tantivy::{Index, Term};
use tracing::debug;

use crate::schema::MessageSchema;
use crate::IndexError;

const ADVANCED_CHARS: &[char] = &['"', '\'', '*', '(', ')'];
const ADVANCED_KEYWORDS: &[&str] = &["AND", "OR", "NEAR"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Talker,
    Sender,
}

/// Inclusive range over message Unix seconds; `None` leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl TimeRange {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    pub fn from_dates(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start: start.map(|t| t.timestamp()), end: end.map(|t| t.timestamp()) }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        match (self.start, self.end) {
            (Some(s), Some(e)) if s > e => {
                Err(IndexError::Query(format!("time range start {s} is after end {e}")))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// Raw query-language expression over the content field.
    Expression(String),
    /// One plain-text token that must occur in the content.
    Match(String),
    /// Exact keyword match on a filter field.
    Term { field: FilterField, value: String },
    TimeRange(TimeRange),
    Conjunction(Vec<QueryNode>),
    Disjunction(Vec<QueryNode>),
}

pub fn is_advanced_query(text: &str) -> bool {
    let text = text.trim();
    if text.contains(ADVANCED_CHARS) {
        return true;
    }
    let is_keyword = |w: &str| ADVANCED_KEYWORDS.iter().any(|k| w.eq_ignore_ascii_case(k));
    if text.split_whitespace().any(is_keyword) {
        return true;
    }
    text.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("NOT "))
}

/// Content constraint for `text`, or `None` when it is blank.
pub fn build_content_query(text: &str) -> Option<QueryNode> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if is_advanced_query(text) {
        debug!(query = text, "advanced query, passed through");
        return Some(QueryNode::Expression(text.to_string()));
    }
    let mut tokens: Vec<QueryNode> =
        text.split_whitespace().map(|t| QueryNode::Match(t.to_string())).collect();
    if tokens.len() == 1 {
        return tokens.pop();
    }
    Some(QueryNode::Conjunction(tokens))
}

/// Any-of filter on `field`; blank values are ignored.
pub fn build_terms_filter(field: FilterField, values: &[String]) -> Option<QueryNode> {
    let mut terms: Vec<QueryNode> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| QueryNode::Term { field, value: v.to_string() })
        .collect();
    match terms.len() {
        0 => None,
        1 => terms.pop(),
        _ => Some(QueryNode::Disjunction(terms)),
    }
}

/// AND of every constraint present. `Ok(None)` means the request carries
/// nothing to match on and must yield no results.
pub fn build_query(
    text: &str,
    talkers: &[String],
    senders: &[String],
    range: TimeRange,
) -> Result<Option<QueryNode>, IndexError> {
    range.validate()?;
    let mut parts: Vec<QueryNode> = [
        build_content_query(text),
        build_terms_filter(FilterField::Talker, talkers),
        build_terms_filter(FilterField::Sender, senders),
        (!range.is_unbounded()).then_some(QueryNode::TimeRange(range)),
    ]
    .into_iter()
    .flatten()
    .collect();
    Ok(match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(QueryNode::Conjunction(parts)),
    })
}

impl QueryNode {
    /// Lower into an executable tantivy query.
    pub fn to_tantivy(
        &self,
        index: &Index,
        fields: &MessageSchema,
    ) -> Result<Box<dyn Query>, IndexError> {
        match self {
            QueryNode::Expression(expr) => {
                let parser = QueryParser::for_index(index, vec![fields.content]);
                parser
                    .parse_query(expr)
                    .map_err(|e| IndexError::Query(format!("invalid query {expr:?}: {e}")))
            }
            QueryNode::Match(token) => match_content(index, fields, token),
            QueryNode::Term { field, value } => {
                let f = match field {
                    FilterField::Talker => fields.talker,
                    FilterField::Sender => fields.sender,
                };
                let term = Term::from_field_text(f, value);
                Ok(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
            }
            QueryNode::TimeRange(range) => {
                let bound = |v: Option<i64>| match v {
                    Some(v) => Bound::Included(Term::from_field_i64(fields.unix, v)),
                    None => Bound::Unbounded,
                };
                Ok(Box::new(RangeQuery::new(bound(range.start), bound(range.end))))
            }
            QueryNode::Conjunction(nodes) => combine(nodes, Occur::Must, index, fields),
            QueryNode::Disjunction(nodes) => combine(nodes, Occur::Should, index, fields),
        }
    }
}

fn combine(
    nodes: &[QueryNode],
    occur: Occur,
    index: &Index,
    fields: &MessageSchema,
) -> Result<Box<dyn Query>, IndexError> {
    let clauses = nodes
        .iter()
        .map(|n| n.to_tantivy(index, fields).map(|q| (occur, q)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Box::new(BooleanQuery::from(clauses)))
}

/// Runs the token through the content analyzer: ideograph runs split into
/// several terms and are matched as a phrase.
fn match_content(
    index: &Index,
    fields: &MessageSchema,
    token: &str,
) -> Result<Box<dyn Query>, IndexError> {
    let mut analyzer = index
        .tokenizer_for_field(fields.content)
        .map_err(|e| IndexError::Query(format!("content analyzer: {e}")))?;
    let mut terms = Vec::new();
    analyzer
        .token_stream(token)
        .process(&mut |tok| terms.push(Term::from_field_text(fields.content, &tok.text)));
    let query: Box<dyn Query> = match terms.len() {
        0 => Box::new(EmptyQuery),
        1 => Box::new(TermQuery::new(terms.remove(0), IndexRecordOption::WithFreqs)),
        _ => Box::new(PhraseQuery::new(terms)),
    };
    Ok(query)
}
