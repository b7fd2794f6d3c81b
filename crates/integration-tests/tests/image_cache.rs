//! Integration tests for the image cache.

use std::sync::Arc;
use std::time::Duration;

use petmart_client::session::MemorySessionStorage;
use petmart_client::{ImageCacheError, PetmartClient};
use petmart_integration_tests::{IMAGE_SIZE, MockBackend};

#[tokio::test]
async fn test_second_fetch_is_a_hit() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.client();
    let uri = backend.image_url("bone.jpg");

    let path = client.images().get_or_fetch(&uri).await.expect("fetch");
    assert_eq!(std::fs::read(&path).expect("read").len(), IMAGE_SIZE);
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));

    let again = client.images().get_or_fetch(&uri).await.expect("hit");
    assert_eq!(path, again);
    assert_eq!(backend.image_downloads(), 1);
    assert_eq!(client.images().len().await, 1);
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_download() {
    let backend = MockBackend::start().await;
    backend.set_image_delay(Duration::from_millis(150));
    let (client, _dir) = backend.client();
    let uri = backend.image_url("collar.png");

    let fetches: Vec<_> = (0..5)
        .map(|_| {
            let client = client.clone();
            let uri = uri.clone();
            tokio::spawn(async move { client.images().get_or_fetch(&uri).await })
        })
        .collect();

    let mut paths = Vec::new();
    for fetch in fetches {
        paths.push(fetch.await.expect("join").expect("fetch"));
    }

    assert_eq!(backend.image_downloads(), 1);
    assert!(paths.windows(2).all(|w| w.first() == w.get(1)));
}

#[tokio::test]
async fn test_deleted_file_is_downloaded_again() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.client();
    let uri = backend.image_url("leash.jpg");

    let path = client.images().get_or_fetch(&uri).await.expect("fetch");
    std::fs::remove_file(&path).expect("delete");

    let again = client.images().get_or_fetch(&uri).await.expect("refetch");
    assert!(again.exists());
    assert_eq!(backend.image_downloads(), 2);
}

#[tokio::test]
async fn test_oldest_entries_evicted_over_bound() {
    let backend = MockBackend::start().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = backend.config(&dir);
    config.image_cache_max_bytes = Some(25);
    let client = PetmartClient::with_storage(&config, Arc::new(MemorySessionStorage::new()))
        .expect("client");

    let first = client
        .images()
        .get_or_fetch(&backend.image_url("a.jpg"))
        .await
        .expect("a");
    client
        .images()
        .get_or_fetch(&backend.image_url("b.jpg"))
        .await
        .expect("b");
    client
        .images()
        .get_or_fetch(&backend.image_url("c.jpg"))
        .await
        .expect("c");

    assert_eq!(client.images().len().await, 2);
    assert_eq!(client.images().total_bytes().await, 20);
    assert!(!first.exists());
    assert!(
        client
            .images()
            .cached_path(&backend.image_url("a.jpg"))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_index_survives_restart() {
    let backend = MockBackend::start().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let uri = backend.image_url("bowl.jpg");

    {
        let client = PetmartClient::with_storage(
            &backend.config(&dir),
            Arc::new(MemorySessionStorage::new()),
        )
        .expect("client");
        client.images().get_or_fetch(&uri).await.expect("fetch");
    }

    let client = PetmartClient::with_storage(
        &backend.config(&dir),
        Arc::new(MemorySessionStorage::new()),
    )
    .expect("client");
    assert!(client.images().cached_path(&uri).await.is_some());
    client.images().get_or_fetch(&uri).await.expect("hit");
    assert_eq!(backend.image_downloads(), 1);
}

#[tokio::test]
async fn test_failed_download_is_not_cached() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.client();

    let err = client
        .images()
        .get_or_fetch(&backend.image_url("missing.jpg"))
        .await
        .expect_err("404");

    assert!(matches!(err, ImageCacheError::Status { status: 404, .. }));
    assert!(client.images().is_empty().await);
}

#[tokio::test]
async fn test_concurrent_inserts_do_not_evict_each_other_in_flight() {
    let backend = MockBackend::start().await;
    backend.set_image_delay(Duration::from_millis(50));
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = backend.config(&dir);
    config.image_cache_max_bytes = Some(15);
    let client = PetmartClient::with_storage(&config, Arc::new(MemorySessionStorage::new()))
        .expect("client");

    let fetch = |name: &'static str| {
        let client = client.clone();
        let uri = backend.image_url(name);
        async move {
            let path = client.images().get_or_fetch(&uri).await.expect("fetch");
            // Checked in the same poll the fetch returned in
            let existed = path.exists();
            (path, existed)
        }
    };

    let ((_, x_existed), (_, y_existed)) = tokio::join!(fetch("x.jpg"), fetch("y.jpg"));

    assert!(x_existed);
    assert!(y_existed);
    assert_eq!(client.images().len().await, 1);
    assert_eq!(client.images().total_bytes().await, 10);
}

#[tokio::test]
async fn test_cancelled_download_does_not_block_later_fetches() {
    let backend = MockBackend::start().await;
    backend.set_image_delay(Duration::from_millis(300));
    let (client, _dir) = backend.client();
    let uri = backend.image_url("brush.jpg");

    let cancelled =
        tokio::time::timeout(Duration::from_millis(50), client.images().get_or_fetch(&uri)).await;
    assert!(cancelled.is_err());

    backend.set_image_delay(Duration::ZERO);
    let path = client.images().get_or_fetch(&uri).await.expect("fetch");
    assert!(path.exists());
    assert_eq!(client.images().len().await, 1);
}
