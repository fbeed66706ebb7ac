mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{hit, test_config, text_of_len, FailingGenerator, FixedGenerator, InMemoryIndex, RawEmbedder, ScriptedIndex};
use groundctx_core::data_processor::CorpusSource;
use groundctx_core::error::GenerationError;
use groundctx_core::types::{Document, ExpandedQuerySet, RetrievalOptions};
use groundctx_core::Error;
use groundctx_embed::FakeEmbedder;
use groundctx_rag::{ContextRetriever, DocumentIngestor, QueryExpander};

const DIM: usize = 512;

fn options(num_chunks: usize, expansion_enabled: bool, max_links: usize) -> RetrievalOptions {
    RetrievalOptions { num_chunks, expansion_enabled, max_links }
}

async fn built_index() -> Arc<InMemoryIndex> {
    let cfg = test_config(DIM);
    let index = Arc::new(InMemoryIndex::default());
    let source = CorpusSource::Documents(vec![
        Document::new(text_of_len("admission", 900), "https://abit.itmo.ru/admission"),
        Document::new(text_of_len("dormitory", 700), "https://itmo.ru/dorms"),
        Document::new(text_of_len("scholarship", 800), "https://itmo.ru/scholarships"),
        Document::new(text_of_len("exam", 600), "relative/exams"),
    ]);
    DocumentIngestor::new(&cfg, Arc::new(FakeEmbedder::new(DIM)), index.clone())
        .expect("ingestor")
        .ingest(Some(&source))
        .await
        .expect("ingest");
    index
}

#[tokio::test]
async fn retrieve_before_ingest_fails_fast() {
    let retriever = ContextRetriever::new(Arc::new(FakeEmbedder::new(DIM)), Arc::new(InMemoryIndex::default()));
    let err = retriever.retrieve("anything", options(5, false, 3)).await.unwrap_err();
    assert!(matches!(err, Error::RetrievalPrecondition(_)), "got {err:?}");
}

#[tokio::test]
async fn identical_chunk_from_two_queries_is_deduplicated_but_counted_twice() {
    let index = Arc::new(ScriptedIndex::new(vec![
        vec![hit("shared passage", "https://x"), hit("only first", "https://y")],
        vec![hit("shared passage", "https://x"), hit("only second", "https://z")],
    ]));
    let generator = FixedGenerator::new(r#"{"queries": ["q one", "q two"], "search_strategy": "split"}"#);
    let retriever = ContextRetriever::new(Arc::new(FakeEmbedder::new(DIM)), index)
        .with_expander(QueryExpander::new(generator.clone()));

    let result = retriever.retrieve("question", options(5, true, 3)).await.expect("retrieve");
    assert_eq!(result.contexts, vec!["shared passage", "only first", "only second"]);
    assert_eq!(result.source_urls[0], "https://x", "x occurs twice in the raw pool");
    assert_eq!(result.source_urls, vec!["https://x", "https://y", "https://z"]);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn contexts_and_links_are_truncated_independently() {
    let index = Arc::new(ScriptedIndex::new(vec![
        vec![hit("a", "https://one.example"), hit("b", "https://two.example")],
        vec![hit("c", "https://three.example"), hit("d", "https://two.example")],
        vec![hit("e", "https://four.example"), hit("a", "https://one.example")],
    ]));
    let generator = FixedGenerator::new(r#"{"queries": ["x", "y", "z"], "search_strategy": "s"}"#);
    let retriever = ContextRetriever::new(Arc::new(FakeEmbedder::new(DIM)), index)
        .with_expander(QueryExpander::new(generator));

    let result = retriever.retrieve("q", options(2, true, 1)).await.expect("retrieve");
    assert_eq!(result.contexts, vec!["a", "b"]);
    // https://one.example and https://two.example both occur twice; https://one.example was seen first
    assert_eq!(result.source_urls, vec!["https://one.example"]);
}

#[tokio::test]
async fn expansion_without_expander_uses_the_original_query() {
    let index = Arc::new(ScriptedIndex::new(vec![vec![hit("first", "https://a")], vec![hit("never", "https://b")]]));
    let retriever = ContextRetriever::new(Arc::new(FakeEmbedder::new(DIM)), index.clone());
    let result = retriever.retrieve("q", options(5, true, 3)).await.expect("retrieve");
    assert_eq!(result.contexts, vec!["first"]);
    assert_eq!(index.responses.lock().unwrap().len(), 1, "only one search was run");
}

#[tokio::test]
async fn failing_expansion_matches_unexpanded_retrieval() {
    let index = built_index().await;
    let failures: [fn() -> GenerationError; 5] = [
        || GenerationError::Timeout,
        || GenerationError::Transport("connection reset".into()),
        || GenerationError::Api { status: 500, body: "oops".into() },
        || GenerationError::Refusal("no".into()),
        || GenerationError::Empty,
    ];
    let plain = ContextRetriever::new(Arc::new(FakeEmbedder::new(DIM)), index.clone())
        .retrieve("dormitory3 dormitory4 places", options(3, false, 2))
        .await
        .expect("plain");
    assert!(!plain.contexts.is_empty());

    for make in failures {
        let generator = FailingGenerator::new(make);
        let retriever = ContextRetriever::new(Arc::new(FakeEmbedder::new(DIM)), index.clone())
            .with_expander(QueryExpander::new(generator.clone()));
        let expanded = retriever
            .retrieve("dormitory3 dormitory4 places", options(3, true, 2))
            .await
            .expect("expanded");
        assert_eq!(expanded, plain);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1, "single attempt, no retry");
    }
}

#[tokio::test]
async fn malformed_or_empty_structured_output_falls_back() {
    for reply in ["not json at all", r#"{"queries": [], "search_strategy": "none"}"#, r#"{"search_strategy": "x"}"#] {
        let expander = QueryExpander::new(FixedGenerator::new(reply));
        let set = expander.expand("original question").await;
        assert_eq!(set, ExpandedQuerySet::fallback("original question"), "reply {reply:?}");
        assert_eq!(set.strategy_description, "fallback");
    }
}

#[tokio::test]
async fn successful_expansion_is_capped_at_three_queries() {
    let reply = r#"{"queries": ["a", " ", "b", "c", "d"], "search_strategy": "broad"}"#;
    let set = QueryExpander::new(FixedGenerator::new(reply)).expand("q").await;
    assert_eq!(set.queries, vec!["a", "b", "c"]);
    assert_eq!(set.strategy_description, "broad");
}

#[tokio::test]
async fn relative_urls_never_rank() {
    let index = built_index().await;
    let retriever = ContextRetriever::new(Arc::new(FakeEmbedder::new(DIM)), index);
    let result = retriever.retrieve("exam3 exam4 exam5", options(10, false, 10)).await.expect("retrieve");
    assert!(result.contexts.iter().any(|c| c.contains("exam3")));
    assert!(result.source_urls.iter().all(|u| u.starts_with("https://")));
    assert!(result.source_urls.len() <= 10);
}

#[tokio::test]
async fn query_embedding_failure_is_propagated() {
    let index = built_index().await;
    let retriever = ContextRetriever::new(Arc::new(RawEmbedder { dim: DIM, fail: true }), index);
    let err = retriever.retrieve("q", options(3, false, 3)).await.unwrap_err();
    assert!(matches!(err, Error::Embedding(_)), "got {err:?}");
}

#[tokio::test]
async fn similarity_search_returns_best_match_first() {
    let index = built_index().await;
    let retriever = ContextRetriever::new(Arc::new(FakeEmbedder::new(DIM)), index);
    let hits = retriever.similarity_search("scholarship1 scholarship2 scholarship3", 2).await.expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.source_url, "https://itmo.ru/scholarships");
    assert!(hits[0].score >= hits[1].score);
}
