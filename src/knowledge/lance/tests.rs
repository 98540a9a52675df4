use super::*;
use tempfile::TempDir;

fn doc(id: &str, source: &str, vector: Vec<f32>) -> IndexedDocument {
    IndexedDocument {
        id: id.to_string(),
        document: KnowledgeDocument::new(format!("content of {}", source), source),
        vector,
        created_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

#[tokio::test]
async fn fresh_directory_is_empty() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let index = LanceIndex::open(&temp_dir.path().join("knowledge"))
        .await
        .expect("should open");

    assert_eq!(index.count().await.expect("count"), 0);
    assert!(
        index
            .search(&[1.0, 0.0], 5)
            .await
            .expect("search on empty index")
            .is_empty()
    );
}

#[tokio::test]
async fn search_orders_by_similarity() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let index = LanceIndex::open(&temp_dir.path().join("knowledge"))
        .await
        .expect("should open");

    index
        .append(vec![
            doc("1", "far", vec![0.0, 1.0, 0.0]),
            doc("2", "near", vec![1.0, 0.1, 0.0]),
            doc("3", "exact", vec![1.0, 0.0, 0.0]),
        ])
        .await
        .expect("append should succeed");

    let results = index.search(&[1.0, 0.0, 0.0], 2).await.expect("search");
    let sources: Vec<&str> = results.iter().map(|r| r.document.source.as_str()).collect();
    assert_eq!(sources, vec!["exact", "near"]);
    assert!(results[0].score >= results[1].score);
}

#[tokio::test]
async fn documents_survive_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("knowledge");

    {
        let index = LanceIndex::open(&path).await.expect("should open");
        index
            .append(vec![doc("1", "car-1", vec![1.0, 0.0])])
            .await
            .expect("append");
    }

    let reopened = LanceIndex::open(&path).await.expect("should reopen");
    assert_eq!(reopened.count().await.expect("count"), 1);

    reopened
        .append(vec![doc("2", "car-2", vec![0.0, 1.0])])
        .await
        .expect("append after reopen");
    assert_eq!(reopened.count().await.expect("count"), 2);
}

#[tokio::test]
async fn ties_keep_insertion_order() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let index = LanceIndex::open(&temp_dir.path().join("knowledge"))
        .await
        .expect("should open");

    index
        .append(vec![doc("1", "first", vec![1.0, 0.0])])
        .await
        .expect("append");
    index
        .append(vec![doc("2", "second", vec![1.0, 0.0])])
        .await
        .expect("append");

    let results = index.search(&[1.0, 0.0], 2).await.expect("search");
    assert_eq!(results[0].document.source, "first");
    assert_eq!(results[1].document.source, "second");
}

#[tokio::test]
async fn dimension_mismatch_is_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let index = LanceIndex::open(&temp_dir.path().join("knowledge"))
        .await
        .expect("should open");

    index
        .append(vec![doc("1", "a", vec![1.0, 0.0])])
        .await
        .expect("append");

    let result = index.append(vec![doc("2", "b", vec![1.0, 0.0, 0.0])]).await;
    assert!(matches!(result, Err(RagError::Store(_))));
    assert!(matches!(
        index.search(&[1.0], 1).await,
        Err(RagError::Store(_))
    ));
}

#[tokio::test]
async fn clear_drops_everything() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let index = LanceIndex::open(&temp_dir.path().join("knowledge"))
        .await
        .expect("should open");

    index
        .append(vec![doc("1", "a", vec![1.0, 0.0])])
        .await
        .expect("append");
    index.clear().await.expect("clear");
    assert_eq!(index.count().await.expect("count"), 0);

    // a new dimension is accepted once the table is gone
    index
        .append(vec![doc("2", "b", vec![0.0, 0.0, 1.0])])
        .await
        .expect("append after clear");
    assert_eq!(index.count().await.expect("count"), 1);
}

#[tokio::test]
async fn file_in_place_of_directory_is_unavailable() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("knowledge");
    std::fs::write(&path, b"not an index").expect("write file");

    let result = LanceIndex::open(&path).await;
    assert!(matches!(result, Err(RagError::StoreUnavailable(_))));
}
