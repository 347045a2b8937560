// Composition tests: the sheet -> embed -> project -> aggregate chain, run
// end to end with the hashing embedder. Workbooks go through tempfile dirs.

mod common;

use std::sync::Arc;

use common::{seo_food_table, three_topic_table, workbook_bytes, HashEmbedder, DIM};
use kwmap::error::ClusterError;
use kwmap::pipeline::process::{place_topics, process_sheet, ProcessRequest};
use kwmap::pipeline::vectorize::VectorizeJob;
use kwmap::sheet::model::{KeywordSheet, TextField};
use kwmap::sheet::reader::{read_bytes, read_path};
use kwmap::sheet::table::Table;

fn sheet(table: Table) -> KeywordSheet {
    KeywordSheet::from_table(table).unwrap()
}

fn inline(field: TextField) -> ProcessRequest {
    ProcessRequest {
        field,
        vectorize: true,
        ..ProcessRequest::default()
    }
}

// ============================================================
// Chain: sheet -> embeddings -> UMAP -> centroids
// ============================================================

#[tokio::test]
async fn three_row_example_gives_two_centroids() {
    let embedder = HashEmbedder::new();
    let (response, _) = process_sheet(&sheet(seo_food_table()), &embedder, &inline(TextField::Keyword))
        .await
        .unwrap();

    assert_eq!(response.keywords.len(), 3);
    assert_eq!(response.topics, vec!["SEO", "Food"]);
    assert_eq!(response.centroids.len(), 2);

    let seo = &response.centroids[0];
    assert_eq!((seo.topic.as_str(), seo.count), ("SEO", 2));

    let food = &response.centroids[1];
    assert_eq!((food.topic.as_str(), food.count), ("Food", 1));
    assert_eq!(food.dispersion, 0.0);
    assert_eq!((food.x, food.y), (response.keywords[2].x, response.keywords[2].y));
}

#[tokio::test]
async fn keyword_points_carry_row_fields() {
    let embedder = HashEmbedder::new();
    let (response, _) = process_sheet(&sheet(seo_food_table()), &embedder, &inline(TextField::Topic))
        .await
        .unwrap();

    let first = &response.keywords[0];
    assert_eq!(first.id, 0);
    assert_eq!(first.keyword, "seo tools");
    assert_eq!(first.volume, 100);
    assert_eq!(first.traffic, 0);
    assert_eq!(first.subtopic, "");
    assert!(first.x.is_finite() && first.y.is_finite());
}

#[tokio::test]
async fn identical_runs_give_identical_coordinates() {
    let embedder = HashEmbedder::new();
    let request = inline(TextField::Keyword);
    let input = sheet(three_topic_table());

    let (a, _) = process_sheet(&input, &embedder, &request).await.unwrap();
    let (b, _) = process_sheet(&input, &embedder, &request).await.unwrap();

    let coords = |r: &kwmap::pipeline::process::ProcessResponse| {
        r.keywords.iter().map(|k| (k.x, k.y)).collect::<Vec<_>>()
    };
    assert_eq!(coords(&a), coords(&b));
}

#[tokio::test]
async fn missing_embedding_columns_without_vectorize() {
    let embedder = HashEmbedder::new();
    let err = process_sheet(&sheet(seo_food_table()), &embedder, &ProcessRequest::default())
        .await
        .unwrap_err();
    match err {
        ClusterError::MissingEmbeddings { prefix } => assert_eq!(prefix, "keyword_embed_"),
        other => panic!("expected MissingEmbeddings, got {other:?}"),
    }
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn inline_subtopic_without_column_is_rejected() {
    let embedder = HashEmbedder::new();
    let err = process_sheet(&sheet(seo_food_table()), &embedder, &inline(TextField::Subtopic))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::MissingColumns(_)));
}

#[tokio::test]
async fn invalid_params_rejected_before_embedding() {
    let embedder = HashEmbedder::new();
    let mut request = inline(TextField::Keyword);
    request.params.n_neighbors = 1;
    let err = process_sheet(&sheet(seo_food_table()), &embedder, &request)
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::InvalidParameter(_)));
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn header_only_sheet_is_empty_sheet() {
    let embedder = HashEmbedder::new();
    let empty = sheet(Table::new(vec!["Keyword".into(), "Topic".into()], vec![]));
    let err = process_sheet(&empty, &embedder, &inline(TextField::Keyword))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::EmptySheet));
    assert_eq!(err.status_code(), 400);
    assert_eq!(embedder.calls(), 0);
}

#[test]
fn sheet_without_topic_rejected() {
    let bytes = workbook_bytes(&Table::new(vec!["Keyword".into()], vec![]));
    let err = KeywordSheet::from_table(read_bytes(bytes).unwrap()).unwrap_err();
    match err {
        ClusterError::MissingColumns(cols) => assert_eq!(cols, vec!["Topic"]),
        other => panic!("expected MissingColumns, got {other:?}"),
    }
}

// ============================================================
// Chain: vectorize -> stored columns -> process
// ============================================================

#[tokio::test]
async fn vectorized_workbook_feeds_process() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("keywords.xlsx");
    std::fs::write(&input, workbook_bytes(&three_topic_table())).unwrap();

    let embedder = HashEmbedder::new();
    let job = VectorizeJob::open(&input, None).unwrap();
    assert_eq!(job.output(), dir.path().join("keywords_vectorized.xlsx"));

    let report = job.run(&embedder).await.unwrap();
    assert_eq!(report.rows, 12);
    assert_eq!(report.original_columns, 3);
    // Keyword and Topic only: no Subtopic column in the input
    assert_eq!(report.added_columns, 2 * DIM);
    assert_eq!(report.total_columns, 3 + 2 * DIM);
    assert_eq!(embedder.calls(), 2);

    let written = read_path(&report.output).unwrap();
    assert_eq!(written.headers.len(), report.total_columns);
    assert_eq!(written.headers[3], "keyword_embed_0");
    assert!(written.column_index("subtopic_embed_0").is_none());

    let stored = sheet(written);
    let (response, state) = process_sheet(&stored, &embedder, &ProcessRequest::default())
        .await
        .unwrap();
    assert_eq!(embedder.calls(), 2, "stored columns must not re-embed");
    assert_eq!(response.centroids.len(), 3);
    assert_eq!(state.field(), TextField::Keyword);
    assert_eq!(state.training().len(), 12);
}

#[tokio::test]
async fn revectorizing_replaces_embedding_columns() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("keywords.xlsx");
    std::fs::write(&input, workbook_bytes(&seo_food_table())).unwrap();

    let embedder = HashEmbedder::new();
    let first = VectorizeJob::open(&input, None).unwrap().run(&embedder).await.unwrap();
    let again = dir.path().join("again.xlsx");
    let second = VectorizeJob::open(&first.output, Some(&again))
        .unwrap()
        .run(&embedder)
        .await
        .unwrap();

    assert_eq!(second.total_columns, first.total_columns);
    assert_eq!(read_path(&again).unwrap().headers.len(), first.total_columns);
}

#[test]
fn vectorize_missing_columns_fails_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.xlsx");
    let table = Table::new(vec!["Keyword".into(), "URL".into()], vec![]);
    std::fs::write(&input, workbook_bytes(&table)).unwrap();

    assert!(matches!(
        VectorizeJob::open(&input, None),
        Err(ClusterError::MissingColumns(_))
    ));
    assert!(!dir.path().join("bad_vectorized.xlsx").exists());
}

// ============================================================
// Chain: projection -> topic placement
// ============================================================

#[tokio::test]
async fn general_topics_placed_by_transform() {
    let embedder = HashEmbedder::new();
    let (_, state) = process_sheet(&sheet(three_topic_table()), &embedder, &inline(TextField::Keyword))
        .await
        .unwrap();

    let topics = vec!["seo".to_string(), "running".to_string()];
    let placed = place_topics(Arc::new(state), &embedder, &topics).await.unwrap();

    assert_eq!(placed.mode, "transform");
    assert_eq!(placed.general_topics.len(), 2);
    assert_eq!(placed.general_topics[1].topic, "running");
    assert!(placed
        .general_topics
        .iter()
        .all(|p| p.is_general && p.x.is_finite() && p.y.is_finite()));
}

#[tokio::test]
async fn single_row_projection_falls_back_to_refit() {
    let embedder = HashEmbedder::new();
    let one = common::keyword_table(&[("seo tools", "SEO")]);
    let (response, state) = process_sheet(&sheet(one), &embedder, &inline(TextField::Keyword))
        .await
        .unwrap();
    assert_eq!((response.keywords[0].x, response.keywords[0].y), (0.0, 0.0));

    let topics = vec!["marketing".to_string()];
    let placed = place_topics(Arc::new(state), &embedder, &topics).await.unwrap();
    assert_eq!(placed.mode, "refit_fallback");
    assert_eq!(placed.general_topics.len(), 1);
}

#[tokio::test]
async fn general_topics_keep_submitted_labels() {
    let embedder = HashEmbedder::new();
    let (_, state) = process_sheet(&sheet(three_topic_table()), &embedder, &inline(TextField::Keyword))
        .await
        .unwrap();

    let topics = vec!["  seo  ".to_string(), " ".to_string(), "running".to_string()];
    let placed = place_topics(Arc::new(state), &embedder, &topics).await.unwrap();

    let labels: Vec<&str> = placed.general_topics.iter().map(|p| p.topic.as_str()).collect();
    assert_eq!(labels, vec!["  seo  ", " ", "running"]);
}

#[tokio::test]
async fn empty_topic_list_rejected() {
    let embedder = HashEmbedder::new();
    let (_, state) = process_sheet(&sheet(seo_food_table()), &embedder, &inline(TextField::Keyword))
        .await
        .unwrap();
    let state = Arc::new(state);
    let err = place_topics(state.clone(), &embedder, &[]).await.unwrap_err();
    assert!(matches!(err, ClusterError::NoTopics));

    let blank = vec!["".to_string(), "   ".to_string()];
    let err = place_topics(state, &embedder, &blank).await.unwrap_err();
    assert!(matches!(err, ClusterError::NoTopics));
}
