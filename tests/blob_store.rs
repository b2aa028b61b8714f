mod common;

use axum::http::Method;
use bytes::Bytes;
use common::test_db;
use futures::TryStreamExt;
use paper_pipeline::{
    backends::BlobStore,
    errors::Error,
    services::LocalBlobStore,
};
use std::time::Duration;
use tempfile::TempDir;

async fn store() -> (TempDir, LocalBlobStore) {
    let (dir, db) = test_db().await;
    let store = LocalBlobStore::new(
        db,
        dir.path().join("blobs"),
        "http://127.0.0.1:3000",
        "test-secret",
    );
    (dir, store)
}

async fn read_all(store: &LocalBlobStore, bucket: &str, key: &str) -> Vec<u8> {
    let pieces: Vec<Bytes> = store.get(bucket, key).await.unwrap().try_collect().await.unwrap();
    pieces.concat()
}

#[tokio::test]
async fn put_then_get_returns_the_payload() {
    let (_dir, store) = store().await;
    store
        .put("papers", "files/a.pdf", Bytes::from_static(b"%PDF-1.7 body"))
        .await
        .unwrap();

    assert_eq!(read_all(&store, "papers", "files/a.pdf").await, b"%PDF-1.7 body");

    let (object, _) = store.open_reader("papers", "files/a.pdf").await.unwrap();
    assert_eq!(object.size_bytes, 13);
    assert_eq!(
        object.etag.as_deref(),
        Some(format!("{:x}", md5::compute(b"%PDF-1.7 body")).as_str())
    );
    assert_eq!(store.size("papers", "files/a.pdf").await.unwrap(), Some(13));
    assert_eq!(store.size("papers", "files/b.pdf").await.unwrap(), None);
}

#[tokio::test]
async fn overwriting_replaces_content() {
    let (_dir, store) = store().await;
    store.put("papers", "k", Bytes::from_static(b"first")).await.unwrap();
    store.put("papers", "k", Bytes::from_static(b"second!")).await.unwrap();

    assert_eq!(read_all(&store, "papers", "k").await, b"second!");
    assert_eq!(store.list("papers", "").await.unwrap(), vec!["k"]);
}

#[tokio::test]
async fn missing_objects_are_not_found() {
    let (_dir, store) = store().await;
    assert!(matches!(
        store.get("papers", "nope").await.err().unwrap(),
        Error::NotFound(_)
    ));
    assert!(matches!(
        store.copy("papers", "nope", "also-nope").await.unwrap_err(),
        Error::NotFound(_)
    ));
}

#[tokio::test]
async fn list_filters_by_prefix_in_key_order() {
    let (_dir, store) = store().await;
    for key in ["chunks/h/2", "chunks/h/0", "chunks/h/10", "chunks/other/0", "files/h.pdf"] {
        store.put("papers", key, Bytes::from_static(b"x")).await.unwrap();
    }
    store.put("archive", "chunks/h/5", Bytes::from_static(b"x")).await.unwrap();

    assert_eq!(
        store.list("papers", "chunks/h/").await.unwrap(),
        vec!["chunks/h/0", "chunks/h/10", "chunks/h/2"]
    );
    assert!(store.list("papers", "missing/").await.unwrap().is_empty());
}

#[tokio::test]
async fn append_checks_the_write_position() {
    let (_dir, store) = store().await;
    let next = store
        .append("papers", "merged.pdf", Bytes::from_static(b"abc"), 0)
        .await
        .unwrap();
    assert_eq!(next, 3);
    let next = store
        .append("papers", "merged.pdf", Bytes::from_static(b"defg"), next)
        .await
        .unwrap();
    assert_eq!(next, 7);

    let err = store
        .append("papers", "merged.pdf", Bytes::from_static(b"zz"), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(read_all(&store, "papers", "merged.pdf").await, b"abcdefg");

    let (object, _) = store.open_reader("papers", "merged.pdf").await.unwrap();
    assert_eq!(object.size_bytes, 7);
    assert_eq!(object.etag, None);

    // offset zero starts the object over
    store
        .append("papers", "merged.pdf", Bytes::from_static(b"new"), 0)
        .await
        .unwrap();
    assert_eq!(read_all(&store, "papers", "merged.pdf").await, b"new");
}

#[tokio::test]
async fn copy_duplicates_within_a_bucket() {
    let (_dir, store) = store().await;
    store
        .put("papers", "files/a.pdf", Bytes::from_static(b"payload"))
        .await
        .unwrap();
    store
        .copy("papers", "files/a.pdf", "backup/files/a.pdf")
        .await
        .unwrap();

    assert_eq!(read_all(&store, "papers", "backup/files/a.pdf").await, b"payload");
    assert_eq!(read_all(&store, "papers", "files/a.pdf").await, b"payload");
}

#[tokio::test]
async fn unsafe_names_are_rejected() {
    let (_dir, store) = store().await;
    assert!(matches!(
        store.put("papers", "../escape", Bytes::new()).await.unwrap_err(),
        Error::Validation(_)
    ));
    assert!(matches!(
        store.put("UPPER", "k", Bytes::new()).await.unwrap_err(),
        Error::Validation(_)
    ));
    assert!(store
        .sign_url("papers", "/abs", &Method::GET, Duration::from_secs(60))
        .is_err());
}

#[tokio::test]
async fn signed_url_points_at_the_blob_route() {
    let (_dir, store) = store().await;
    let url = store
        .sign_url("papers", "images/p.jpg", &Method::GET, Duration::from_secs(120))
        .unwrap();

    assert!(url.starts_with("http://127.0.0.1:3000/blobs/papers/images/p.jpg?method=GET&expires="));
    assert!(url.contains("&signature="));
}
