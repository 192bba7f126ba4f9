use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use tempfile::TempDir;

use docrag_core::config::{EmbeddingProvider, RagSettings};
use docrag_core::error::{Error, Result};
use docrag_core::traits::Embedder;
use docrag_embed::FakeEmbedder;
use docrag_pipeline::{build_prompt, IndexStatus, ProgressEvent, Retriever};
use docrag_vector::store::META_TABLE;
use docrag_vector::table::{open_db, set_meta};

const DIM: usize = 64;

fn settings(root: &Path, max_chars: usize, overlap: usize) -> RagSettings {
    let mut s = RagSettings::default();
    s.data.docs_dir = root.join("docs").to_string_lossy().to_string();
    s.data.persist_dir = root.join("db").to_string_lossy().to_string();
    s.data.collection = "handbook".to_string();
    s.chunking.max_chars = max_chars;
    s.chunking.overlap = overlap;
    s.embedding.provider = EmbeddingProvider::Fake;
    s.embedding.dimension = DIM;
    s
}

fn write_corpus(root: &Path) {
    let docs = root.join("docs");
    fs::create_dir_all(docs.join("hr")).unwrap();
    fs::write(
        docs.join("hr/pto.md"),
        "Paid time off policy. Employees receive twenty vacation days per year. Unused vacation days roll over once.",
    )
    .unwrap();
    fs::write(
        docs.join("it.txt"),
        "Laptop replacement happens every three years. Passwords rotate every quarter.",
    )
    .unwrap();
    fs::write(docs.join("ignored.csv"), "vacation,days").unwrap();
}

async fn fake_retriever(s: &RagSettings) -> Retriever {
    Retriever::from_settings(s, Arc::new(FakeEmbedder::new(DIM))).await.expect("retriever")
}

/// Delegates to the fake embedder for the first `ok_calls` batches, then fails.
struct FlakyEmbedder {
    inner: FakeEmbedder,
    ok_calls: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn embedder_id(&self) -> &str {
        self.inner.embedder_id()
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_calls {
            return Err(Error::provider("flaky", "rate limited"));
        }
        self.inner.embed_batch(texts).await
    }
}

#[tokio::test]
async fn empty_document_directory_is_not_an_error() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("docs")).unwrap();
    let s = settings(tmp.path(), 1500, 200);
    let retriever = fake_retriever(&s).await;

    let mut messages = Vec::new();
    let summary = retriever.rebuild_index(|m| messages.push(m.to_string())).await.expect("rebuild");

    assert_eq!(summary.counts(), (0, 0));
    assert!(messages.iter().any(|m| m.starts_with("No documents found in")), "{messages:?}");

    let hits = retriever.retrieve(&summary.index, "anything at all", 5).await.expect("retrieve");
    assert!(hits.is_empty());

    let index = retriever.ensure_index().await.expect("ensure on empty corpus");
    assert!(retriever.retrieve(&index, "anything", 3).await.unwrap().is_empty());
}

#[tokio::test]
async fn rebuild_then_retrieve_ranks_relevant_chunk_first() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let s = settings(tmp.path(), 1500, 200);
    let retriever = fake_retriever(&s).await;

    let summary = retriever.rebuild_index(|_| {}).await.expect("rebuild");
    assert_eq!(summary.counts(), (2, 2), "two supported documents, one chunk each");

    let hits = retriever.retrieve(&summary.index, "how many vacation days do employees receive", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].metadata.source_path.ends_with("pto.md"), "got {:?}", hits[0].metadata);
    assert!(hits[0].distance <= hits[1].distance);

    let prompt = build_prompt("How many vacation days?", &hits);
    assert!(prompt.contains("| Chunk: 0]"));
    assert!(prompt.contains("twenty vacation days"));
}

#[tokio::test]
async fn retrieve_returns_at_most_k_sorted_hits() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let s = settings(tmp.path(), 40, 10);
    let retriever = fake_retriever(&s).await;
    let summary = retriever.rebuild_index(|_| {}).await.unwrap();
    assert!(summary.chunk_count > 3);

    for k in [1, 3, summary.chunk_count + 5] {
        let hits = retriever.retrieve(&summary.index, "passwords rotate", k).await.unwrap();
        assert!(hits.len() <= k);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }
    assert!(retriever.retrieve(&summary.index, "passwords", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn rebuilding_unchanged_corpus_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let s = settings(tmp.path(), 50, 10);
    let retriever = fake_retriever(&s).await;

    let first = retriever.rebuild_index(|_| {}).await.unwrap();
    let second = retriever.rebuild_index(|_| {}).await.unwrap();

    assert_eq!(first.counts(), second.counts());
    assert_eq!(second.index.generation(), first.index.generation() + 1);
    assert_eq!(second.index.count().await.unwrap(), second.chunk_count);
}

#[tokio::test]
async fn ensure_index_builds_once_and_reuses_persisted_index() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let s = settings(tmp.path(), 1500, 200);

    let retriever = fake_retriever(&s).await;
    assert!(matches!(retriever.check_index().await, IndexStatus::Empty { index: None }));
    let built = retriever.ensure_index().await.expect("first ensure builds");
    assert_eq!(built.generation(), 1);
    assert_eq!(retriever.ensure_index().await.unwrap().generation(), 1, "second ensure is a no-op");

    // A new process with the same settings finds the index on disk.
    drop(retriever);
    let reopened = fake_retriever(&s).await;
    match reopened.check_index().await {
        IndexStatus::Ready { index, chunk_count } => {
            assert_eq!(index.generation(), 1);
            assert_eq!(chunk_count, 2);
        }
        other => panic!("expected ready index, got {other:?}"),
    }
    assert_eq!(reopened.ensure_index().await.unwrap().generation(), 1);
}

#[tokio::test]
async fn progress_events_arrive_in_order_with_batches_of_64() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    // 150 short sentences cut into ~150 chunks of at most 30 chars.
    let text: String = (0..150).map(|i| format!("Sentence number {i:03} here. ")).collect();
    fs::write(docs.join("long.txt"), text).unwrap();
    let s = settings(tmp.path(), 30, 0);
    let retriever = fake_retriever(&s).await;

    let events: Vec<ProgressEvent> = retriever.rebuild().try_collect().await.expect("events");

    assert!(matches!(events.first(), Some(ProgressEvent::Started { .. })));
    let (documents, chunks) = match &events[1] {
        ProgressEvent::DocumentsLoaded { documents, chunks } => (*documents, *chunks),
        other => panic!("expected DocumentsLoaded, got {other:?}"),
    };
    assert_eq!(documents, 1);
    assert!(chunks > 128, "need at least three batches, got {chunks} chunks");

    let batches: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::BatchIndexed { indexed, total } => Some((*indexed, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(batches[0], (64, chunks));
    assert_eq!(batches[1], (128, chunks));
    assert_eq!(batches.last().copied(), Some((chunks, chunks)));
    assert_eq!(batches.len(), chunks.div_ceil(64));
    assert_eq!(events[2].to_string(), format!("Indexed 64/{chunks} chunks..."));

    match events.last() {
        Some(ProgressEvent::Finished(summary)) => {
            assert_eq!(summary.counts(), (chunks, 1));
            assert_eq!(events.last().unwrap().to_string(), format!("Ingested {chunks} chunks from 1 files."));
        }
        other => panic!("expected Finished, got {other:?}"),
    }
}

#[tokio::test]
async fn rebuild_stream_is_lazy() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let s = settings(tmp.path(), 1500, 200);
    let retriever = fake_retriever(&s).await;

    let stream = retriever.rebuild();
    drop(stream);

    assert!(retriever.store().active_generation().await.unwrap().is_none(), "nothing ran without polling");
}

#[tokio::test]
async fn provider_failure_keeps_previous_generation_live() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    let text: String = (0..100).map(|i| format!("Line {i:03} of the manual. ")).collect();
    fs::write(docs.join("manual.txt"), text).unwrap();
    let s = settings(tmp.path(), 30, 0);

    let good = fake_retriever(&s).await;
    let built = good.rebuild_index(|_| {}).await.expect("initial build");
    assert!(built.chunk_count > 64);

    let flaky = FlakyEmbedder { inner: FakeEmbedder::new(DIM), ok_calls: 1, calls: AtomicUsize::new(0) };
    let retriever = Retriever::from_settings(&s, Arc::new(flaky)).await.unwrap();
    let mut messages = Vec::new();
    let err = retriever.rebuild_index(|m| messages.push(m.to_string())).await.unwrap_err();

    assert!(err.is_provider(), "got {err:?}");
    assert!(messages.iter().any(|m| m.starts_with("Indexed 64/")), "first batch went through: {messages:?}");
    let live = retriever.store().active().await.unwrap().expect("still published");
    assert_eq!(live.generation(), built.index.generation());
    assert_eq!(live.count().await.unwrap(), built.chunk_count);
}

#[tokio::test]
async fn index_from_another_embedder_is_stale_and_rebuilt() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let s = settings(tmp.path(), 1500, 200);

    let old = Retriever::from_settings(&s, Arc::new(FakeEmbedder::new(32))).await.unwrap();
    let old_index = old.rebuild_index(|_| {}).await.unwrap().index;

    let current = fake_retriever(&s).await;
    assert!(matches!(current.check_index().await, IndexStatus::Stale { .. }));

    let err = current.retrieve(&old_index, "vacation", 3).await.unwrap_err();
    assert!(matches!(err, Error::EmbedderMismatch { .. }));

    let fresh = current.ensure_index().await.expect("rebuilds with current embedder");
    assert_eq!(fresh.dim(), DIM);
    assert_eq!(fresh.generation(), old_index.generation() + 1);
    assert!(!current.retrieve(&fresh, "vacation", 3).await.unwrap().is_empty());
}

#[tokio::test]
async fn unreadable_generation_pointer_is_reported_and_rebuilt_only_when_enabled() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let s = settings(tmp.path(), 1500, 200);

    let retriever = fake_retriever(&s).await;
    let persist = s.data.persist_path();
    let conn = open_db(&persist.to_string_lossy()).await.unwrap();
    set_meta(&conn, META_TABLE, "active:handbook", "{not json").await.unwrap();

    match retriever.check_index().await {
        IndexStatus::CheckFailed(err) => assert!(matches!(err, Error::Storage(_)), "got {err:?}"),
        other => panic!("expected CheckFailed, got {other:?}"),
    }
    let err = retriever.ensure_index().await.unwrap_err();
    assert!(matches!(err, Error::Storage(_)), "check failure is returned by default, got {err:?}");

    let retriever = retriever.rebuild_on_check_failure(true);
    let rebuilt = retriever.ensure_index().await.expect("rebuilds when enabled");
    assert_eq!(rebuilt.generation(), 1);
    match retriever.check_index().await {
        IndexStatus::Ready { index, chunk_count } => {
            assert_eq!(index.generation(), 1);
            assert_eq!(chunk_count, 2);
        }
        other => panic!("expected ready index after rebuild, got {other:?}"),
    }
}
