mod common;

use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use common::{test_config, text_of_len};
use groundctx_core::data_processor::CorpusSource;
use groundctx_core::traits::VectorIndex;
use groundctx_core::types::{Chunk, Document, IngestReport, RetrievalOptions};
use groundctx_embed::FakeEmbedder;
use groundctx_rag::{ContextRetriever, DocumentIngestor};
use groundctx_vector::LanceIndex;

const DIM: usize = 256;

#[tokio::test]
async fn csv_corpus_to_lancedb_and_back() {
    let tmp = TempDir::new().expect("tmp");
    let csv_path = tmp.path().join("texts.csv");
    let mut body = String::from("content,url\n");
    body.push_str(&format!("\"{}\",https://abit.itmo.ru/ai\n", text_of_len("neural", 700)));
    body.push_str(&format!("\"{}\",https://itmo.ru/campus\n", text_of_len("campus", 650)));
    body.push_str("\"too short\",https://itmo.ru/short\n");
    body.push_str(",https://itmo.ru/empty\n");
    fs::write(&csv_path, body).expect("write csv");

    let cfg = test_config(DIM);
    let embedder = Arc::new(FakeEmbedder::new(DIM));
    let index = Arc::new(LanceIndex::open(&tmp.path().join("lancedb"), "chunks", DIM).await.expect("open"));
    let ingestor = DocumentIngestor::new(&cfg, embedder.clone(), index.clone()).expect("ingestor");
    let source = CorpusSource::Table(csv_path);

    let IngestReport::Built(stats) = ingestor.ingest(Some(&source)).await.expect("ingest") else {
        panic!("expected a fresh build");
    };
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.skipped_rows, 1);
    assert_eq!(stats.short_documents, 1);
    let rows = index.count_rows().await.expect("count");
    assert_eq!(rows, stats.chunks);

    assert_eq!(ingestor.ingest(Some(&source)).await.expect("again"), IngestReport::Reused);
    assert_eq!(index.count_rows().await.expect("count"), rows, "no writes on the second run");

    let retriever = ContextRetriever::new(embedder, index);
    let options = RetrievalOptions { num_chunks: 2, expansion_enabled: false, max_links: 1 };
    let result = retriever.retrieve("campus3 campus4 campus5", options).await.expect("retrieve");
    assert_eq!(result.contexts.len(), 2);
    assert!(result.contexts[0].contains("campus3"));
    assert_eq!(result.source_urls, vec!["https://itmo.ru/campus"]);
}

#[tokio::test]
async fn leftover_rows_are_replaced_by_a_full_build() {
    let tmp = TempDir::new().expect("tmp");
    let cfg = test_config(DIM);
    let embedder = Arc::new(FakeEmbedder::new(DIM));
    let index = Arc::new(LanceIndex::open(&tmp.path().join("lancedb"), "chunks", DIM).await.expect("open"));
    let stale = vec![Chunk::new("half written row from an earlier run", "https://itmo.ru/old")];
    index.add(&stale, &[vec![0.125; DIM]]).await.expect("seed");
    assert!(index.is_partial().await.expect("partial"));

    let source = CorpusSource::Documents(vec![Document::new(text_of_len("library", 600), "https://itmo.ru/library")]);
    let ingestor = DocumentIngestor::new(&cfg, embedder, index.clone()).expect("ingestor");
    let IngestReport::Built(stats) = ingestor.ingest(Some(&source)).await.expect("ingest") else {
        panic!("a partial index must not be reused");
    };
    assert_eq!(index.count_rows().await.expect("count"), stats.chunks);
    assert!(index.exists().await.expect("exists"));
}
