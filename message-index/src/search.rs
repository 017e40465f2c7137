use std::time::Instant;

use message_model::{Message, SearchHit, SearchRequest, SearchResponse};
use tantivy::collector::{Count, TopDocs};
use tantivy::schema::{Field, Value as _};
use tantivy::snippet::SnippetGenerator;
use tantivy::TantivyDocument;
use tracing::{debug, warn};

use crate::query::{build_query, TimeRange};
use crate::store::MessageIndex;
use crate::IndexError;

const SNIPPET_SEPARATOR: &str = " … ";

/// Filters resolved by the caller, applied on top of the free-text query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub talkers: Vec<String>,
    pub senders: Vec<String>,
    pub range: TimeRange,
}

impl SearchFilter {
    pub fn from_request(request: &SearchRequest) -> Self {
        Self {
            talkers: request.talkers(),
            senders: request.senders(),
            range: TimeRange::from_dates(request.start, request.end),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// All matches, not just this page.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

impl MessageIndex {
    /// Ranked page of hits for `request.query` constrained by `filter`.
    ///
    /// The page is clamped to the configured bounds. A request with neither
    /// text nor filters returns no hits.
    pub fn search(
        &self,
        request: &SearchRequest,
        filter: &SearchFilter,
        offset: i64,
        limit: i64,
    ) -> Result<SearchResults, IndexError> {
        let (limit, offset) = self.config().clamp_page(limit, offset);
        let node = build_query(&request.query, &filter.talkers, &filter.senders, filter.range)?;
        let Some(node) = node else {
            return Ok(SearchResults { hits: Vec::new(), total: 0, limit, offset });
        };
        let fields = self.fields();
        let max_chars = self.config().snippet_max_chars;
        let max_fragments = self.config().snippet_max_fragments;

        self.with_handle(|h| {
            let query = node.to_tantivy(&h.index, fields)?;
            let searcher = h.reader.searcher();
            // The collector reserves `offset + limit` slots up front.
            if offset as u64 >= searcher.num_docs() {
                let total = searcher
                    .search(&*query, &Count)
                    .map_err(|e| IndexError::Storage(format!("search: {e}")))?;
                debug!(query = %request.query, total, offset, "page starts past the last match");
                return Ok(SearchResults { hits: Vec::new(), total, limit, offset });
            }
            let (top_docs, total) = searcher
                .search(&*query, &(TopDocs::with_limit(limit).and_offset(offset), Count))
                .map_err(|e| IndexError::Storage(format!("search: {e}")))?;
            let mut snippets = SnippetGenerator::create(&searcher, &*query, fields.content)
                .map_err(|e| IndexError::Storage(format!("snippet generator: {e}")))?;
            snippets.set_max_num_chars(max_chars);

            let mut hits = Vec::with_capacity(top_docs.len());
            for (score, addr) in top_docs {
                let doc: TantivyDocument = searcher
                    .doc(addr)
                    .map_err(|e| IndexError::Storage(format!("load document: {e}")))?;
                let stored = |field: Field| {
                    doc.get_first(field).and_then(|v| v.as_str()).unwrap_or_default()
                };
                let json = stored(fields.message_json);
                if json.is_empty() {
                    let id = stored(fields.id);
                    warn!(id, "hit without stored message, skipped");
                    continue;
                }
                let message: Message = serde_json::from_str(json)
                    .map_err(|e| IndexError::Storage(format!("decode stored message: {e}")))?;
                let snippet =
                    render_snippet(&snippets, &message.plain_text_content(), max_fragments);
                hits.push(SearchHit { message, snippet, score });
            }
            debug!(query = %request.query, total, returned = hits.len(), "search done");
            Ok(SearchResults { hits, total, limit, offset })
        })
    }

    /// Convenience wrapper resolving filters and paging from the request itself.
    pub fn search_request(&self, request: &SearchRequest) -> Result<SearchResponse, IndexError> {
        let started = Instant::now();
        let filter = SearchFilter::from_request(request);
        let results = self.search(request, &filter, request.offset, request.limit)?;
        Ok(SearchResponse {
            total: results.total,
            hits: results.hits,
            duration_ms: started.elapsed().as_millis() as i64,
            limit: results.limit,
            offset: results.offset,
            query: request.query.clone(),
            talker: request.talker.clone(),
            sender: request.sender.clone(),
            start: request.start,
            end: request.end,
            index_status: None,
        })
    }
}

/// Highlighted fragments, one per matching line, in HTML with `<b>` marks.
fn render_snippet(generator: &SnippetGenerator, text: &str, max_fragments: usize) -> String {
    text.lines()
        .map(|line| generator.snippet(line))
        .filter(|s| !s.highlighted().is_empty())
        .take(max_fragments)
        .map(|s| s.to_html())
        .collect::<Vec<_>>()
        .join(SNIPPET_SEPARATOR)
}
