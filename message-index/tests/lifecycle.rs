use chrono::{DateTime, TimeZone, Utc};
use message_index::store::{META_FINGERPRINT, SCHEMA_VERSION};
use message_index::{IndexError, MessageIndex, SearchFilter};
use message_model::{Message, SearchRequest};
use tantivy::schema::{Schema, TEXT};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn msg(talker: &str, seq: i64, content: &str) -> Message {
    Message::new(talker, "bob", seq, at(1_700_000_000 + seq), content)
}

#[test]
fn documents_and_metadata_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("index");
    {
        let idx = MessageIndex::open(&path).expect("open fresh index");
        idx.index_messages(&[msg("alice", 1, "hello"), msg("alice", 2, "world")]).expect("index");
        idx.set_metadata("custom", b"value").expect("set metadata");
        assert!(!idx.ensure_version().expect("first version check"));
        idx.close().expect("close");
    }
    let idx = MessageIndex::open(&path).expect("reopen index");
    assert_eq!(idx.doc_count().unwrap(), 2);
    assert_eq!(idx.get_metadata("custom").unwrap().as_deref(), Some(&b"value"[..]));
    assert!(idx.ensure_version().expect("version matches after reopen"));
}

#[test]
fn close_is_idempotent_and_disables_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let idx = MessageIndex::open(dir.path()).unwrap();
    idx.close().expect("first close");
    idx.close().expect("second close is a no-op");
    assert!(!idx.is_open());

    assert!(matches!(idx.get_metadata("k"), Err(IndexError::NotInitialized)));
    assert!(matches!(idx.set_metadata("k", b"v"), Err(IndexError::NotInitialized)));
    assert!(matches!(
        idx.index_messages(&[msg("alice", 1, "hi")]),
        Err(IndexError::NotInitialized)
    ));
    assert!(matches!(idx.reset(), Err(IndexError::NotInitialized)));
    assert!(matches!(idx.doc_count(), Err(IndexError::NotInitialized)));
    let req = SearchRequest::new("hi");
    assert!(matches!(
        idx.search(&req, &SearchFilter::default(), 0, 10),
        Err(IndexError::NotInitialized)
    ));
}

#[test]
fn reset_drops_documents_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let idx = MessageIndex::open(dir.path().join("index")).unwrap();
    idx.index_messages(&[msg("alice", 1, "hello"), msg("bob", 1, "hello")]).unwrap();
    assert!(!idx.ensure_fingerprint("abc").unwrap());
    idx.reset().expect("reset");

    assert!(idx.is_open());
    assert_eq!(idx.doc_count().unwrap(), 0);
    assert_eq!(idx.stored_fingerprint().unwrap(), None);
    assert_eq!(idx.schema_version().unwrap(), None);

    idx.index_messages(&[msg("carol", 5, "after reset")]).expect("index after reset");
    let res = idx.search_request(&SearchRequest::new("reset")).unwrap();
    assert_eq!(res.total, 1);
}

#[test]
fn second_open_on_same_path_fails_while_first_is_alive() {
    let dir = tempfile::tempdir().unwrap();
    let first = MessageIndex::open(dir.path()).unwrap();
    assert!(matches!(MessageIndex::open(dir.path()), Err(IndexError::Initialization(_))));
    first.close().unwrap();
    MessageIndex::open(dir.path()).expect("open after the first handle is closed");
}

#[test]
fn fingerprint_gate_reports_changes_and_stores_new_value() {
    let dir = tempfile::tempdir().unwrap();
    let idx = MessageIndex::open(dir.path()).unwrap();

    assert!(!idx.ensure_fingerprint("fp-1").unwrap(), "nothing stored yet");
    assert!(idx.ensure_fingerprint("fp-1").unwrap());
    assert!(idx.fingerprint_matches("fp-1").unwrap());

    assert!(!idx.ensure_fingerprint("fp-2").unwrap());
    assert_eq!(idx.get_metadata(META_FINGERPRINT).unwrap().as_deref(), Some(&b"fp-2"[..]));
    assert!(!idx.fingerprint_matches("fp-1").unwrap());
}

#[test]
fn empty_fingerprint_never_matches_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let idx = MessageIndex::open(dir.path()).unwrap();
    idx.update_fingerprint("").unwrap();
    assert!(!idx.fingerprint_matches("").unwrap());
}

#[test]
fn status_reports_count_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let idx = MessageIndex::open(dir.path()).unwrap();
    idx.index_messages(&[msg("alice", 1, "one"), msg("alice", 2, "two"), msg("alice", 3, "three")])
        .unwrap();
    idx.ensure_version().unwrap();
    idx.ensure_fingerprint("deadbeef").unwrap();
    idx.mark_built(at(1_700_000_500)).unwrap();

    let status = idx.status().unwrap();
    assert_eq!(status.document_count, 3);
    assert_eq!(status.schema_version.as_deref(), Some(SCHEMA_VERSION));
    assert_eq!(status.fingerprint.as_deref(), Some("deadbeef"));
    assert_eq!(status.last_built_at, Some(at(1_700_000_500)));
}

#[test]
fn reindexing_same_identity_replaces_document() {
    let dir = tempfile::tempdir().unwrap();
    let idx = MessageIndex::open(dir.path()).unwrap();
    idx.index_messages(&[msg("alice", 1, "hello world"), msg("alice", 2, "goodbye world")])
        .unwrap();
    idx.index_messages(&[msg("alice", 1, "hi there")]).unwrap();

    assert_eq!(idx.doc_count().unwrap(), 2);
    assert_eq!(idx.search_request(&SearchRequest::new("hello")).unwrap().total, 0);
    let hi = idx.search_request(&SearchRequest::new("hi")).unwrap();
    assert_eq!(hi.total, 1);
    assert_eq!(hi.hits[0].message.content, "hi there");
}

#[test]
fn duplicate_identity_within_one_call_keeps_the_last() {
    let dir = tempfile::tempdir().unwrap();
    let idx = MessageIndex::open(dir.path()).unwrap();
    idx.index_messages(&[msg("alice", 1, "first draft"), msg("alice", 1, "final text")]).unwrap();
    assert_eq!(idx.doc_count().unwrap(), 1);
    assert_eq!(idx.search_request(&SearchRequest::new("final")).unwrap().total, 1);
    assert_eq!(idx.search_request(&SearchRequest::new("draft")).unwrap().total, 0);
}

#[test]
fn empty_input_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let idx = MessageIndex::open(dir.path()).unwrap();
    idx.index_messages(&[]).expect("empty batch");
    assert_eq!(idx.doc_count().unwrap(), 0);
}

#[test]
fn message_without_talker_is_indexed_and_searchable() {
    let dir = tempfile::tempdir().unwrap();
    let idx = MessageIndex::open(dir.path()).unwrap();
    let mut orphan = msg("alice", 2, "orphaned note");
    orphan.talker.clear();
    idx.index_messages(&[msg("alice", 1, "fine"), orphan.clone()]).unwrap();

    assert_eq!(idx.doc_count().unwrap(), 2);
    let res = idx.search_request(&SearchRequest::new("orphaned")).unwrap();
    assert_eq!(res.total, 1);
    assert_eq!(res.hits[0].message, orphan);
}

#[test]
fn large_import_spans_several_batches() {
    let dir = tempfile::tempdir().unwrap();
    let idx = MessageIndex::open(dir.path()).unwrap();
    let messages: Vec<Message> =
        (0..612).map(|i| msg("room@chatroom", i, &format!("line {i} ping"))).collect();
    idx.index_messages(&messages).unwrap();
    assert_eq!(idx.doc_count().unwrap(), 612);
    assert_eq!(idx.search_request(&SearchRequest::new("ping")).unwrap().total, 612);
}

#[test]
fn engine_with_a_different_field_layout_is_recreated_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");
    {
        let idx = MessageIndex::open(&path).unwrap();
        idx.index_messages(&[msg("alice", 1, "hello")]).unwrap();
        assert!(!idx.ensure_version().unwrap());
        idx.close().unwrap();
    }

    // Replace the engine with one built from an unrelated layout.
    let engine = path.join("tantivy");
    std::fs::remove_dir_all(&engine).unwrap();
    std::fs::create_dir_all(&engine).unwrap();
    let mut builder = Schema::builder();
    builder.add_text_field("content", TEXT);
    tantivy::Index::create_in_dir(&engine, builder.build()).unwrap();

    let idx = MessageIndex::open(&path).expect("open recreates the engine");
    assert_eq!(idx.doc_count().unwrap(), 0);
    assert_eq!(idx.schema_version().unwrap(), None);
    assert!(!idx.ensure_version().unwrap(), "stale layout must report a rebuild");

    idx.index_messages(&[msg("alice", 1, "hello again")]).unwrap();
    assert_eq!(idx.search_request(&SearchRequest::new("again")).unwrap().total, 1);
}
