mod common;

use common::{BUCKET, FakeRecognizer, Harness, HarnessBuilder, wait_recognition};
use paper_pipeline::errors::Error;
use std::time::Duration;

#[tokio::test]
async fn pages_are_joined_in_page_order() {
    // the first page answers last
    let harness = HarnessBuilder::default()
        .pages(&["one ", "two ", "three"])
        .recognizer(|blobs| {
            FakeRecognizer::new(blobs)
                .delayed("one ", Duration::from_millis(150))
                .delayed("two ", Duration::from_millis(50))
        })
        .build()
        .await;
    harness.blobs.insert(BUCKET, "files/doc.pdf", b"%PDF-1.7");

    let task = harness
        .recognition
        .submit(BUCKET, "files/doc.pdf", "pdf")
        .await
        .unwrap();
    let status = wait_recognition(&harness.recognition, &task).await;

    assert_eq!(status.text, "one two three");
    assert_eq!(harness.recognizer.calls(), 3);
    assert_eq!(harness.blobs.keys(BUCKET, "images/").len(), 3);
}

#[tokio::test]
async fn failed_page_leaves_an_empty_slot() {
    let harness = HarnessBuilder::default()
        .pages(&["p0", "p1", "p2"])
        .recognizer(|blobs| FakeRecognizer::new(blobs).failing("p1"))
        .build()
        .await;
    harness.blobs.insert(BUCKET, "files/doc.pdf", b"%PDF-1.7");

    let task = harness
        .recognition
        .submit(BUCKET, "files/doc.pdf", "pdf")
        .await
        .unwrap();
    let status = wait_recognition(&harness.recognition, &task).await;

    assert!(status.finished);
    assert_eq!(status.text, "p0p2");
}

#[tokio::test]
async fn second_submission_is_served_from_cache() {
    let harness = HarnessBuilder::default()
        .pages(&["cached text"])
        .build()
        .await;
    harness.blobs.insert(BUCKET, "files/doc.pdf", b"%PDF-1.7");

    let first = harness
        .recognition
        .submit(BUCKET, "files/doc.pdf", "pdf")
        .await
        .unwrap();
    wait_recognition(&harness.recognition, &first).await;

    let second = harness
        .recognition
        .submit(BUCKET, "files/doc.pdf", "pdf")
        .await
        .unwrap();
    assert_ne!(first, second);
    // finished at submission, no polling needed
    let status = harness.recognition.get_status(&second).await.unwrap();
    assert!(status.finished);
    assert_eq!(status.text, "cached text");
    assert_eq!(harness.rasterizer.calls(), 1);

    // a different file type is a different cache entry
    let other = harness
        .recognition
        .submit(BUCKET, "files/doc.pdf", "png")
        .await
        .unwrap();
    wait_recognition(&harness.recognition, &other).await;
    assert_eq!(harness.rasterizer.calls(), 2);
}

#[tokio::test]
async fn empty_results_are_not_cached() {
    let harness = HarnessBuilder::default()
        .pages(&["only"])
        .recognizer(|blobs| FakeRecognizer::new(blobs).failing("only"))
        .build()
        .await;
    harness.blobs.insert(BUCKET, "files/doc.pdf", b"%PDF-1.7");

    for _ in 0..2 {
        let task = harness
            .recognition
            .submit(BUCKET, "files/doc.pdf", "pdf")
            .await
            .unwrap();
        let status = wait_recognition(&harness.recognition, &task).await;
        assert!(status.is_failure());
    }
    assert_eq!(harness.rasterizer.calls(), 2);
}

#[tokio::test]
async fn missing_source_finishes_empty() {
    let harness = Harness::new().await;

    let task = harness
        .recognition
        .submit(BUCKET, "files/absent.pdf", "pdf")
        .await
        .unwrap();
    let status = wait_recognition(&harness.recognition, &task).await;

    assert!(status.is_failure());
    assert_eq!(harness.rasterizer.calls(), 0);
}

#[tokio::test]
async fn submit_validates_and_unknown_tasks_are_not_found() {
    let harness = Harness::new().await;

    assert!(matches!(
        harness.recognition.submit("", "files/doc.pdf", "pdf").await.unwrap_err(),
        Error::Validation(_)
    ));
    assert!(matches!(
        harness.recognition.get_status("no-such-task").await.unwrap_err(),
        Error::NotFound(_)
    ));
}
