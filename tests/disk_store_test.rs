// Disk-backed asset store against a fake upstream CDN.

use std::net::SocketAddr;

use axum::{http::header, response::IntoResponse, routing::get, Router};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use deco_cache_engine::provider::disk_store::DiskAssetStore;
use deco_cache_engine::provider::traits::AssetStore;

const ICON_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x42];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init();
}

async fn serve_icon() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], ICON_BYTES.to_vec())
}

async fn start_cdn() -> SocketAddr {
    let app = Router::new().route("/icons/{name}", get(serve_icon));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

#[tokio::test]
async fn test_download_then_reload_catalog() {
    init_tracing();
    let addr = start_cdn().await;
    let dir = tempfile::tempdir().unwrap();
    let store = DiskAssetStore::new(dir.path());

    let url = format!("http://{addr}/icons/icon-1.png");
    let path = store
        .download_and_store("badges", "icon-1", &url, 7)
        .await
        .unwrap();

    assert!(path.exists());
    assert_eq!(std::fs::read(&path).unwrap(), ICON_BYTES);

    // A fresh load sees the stored asset.
    let catalog = store.load_catalog("badges").await.unwrap();
    assert_eq!(catalog.get("icon-1"), Some(&path));

    // Re-downloading the same id replaces the entry rather than duplicating it.
    let path2 = store
        .download_and_store("badges", "icon-1", &url, 7)
        .await
        .unwrap();
    assert_eq!(path, path2);
    let catalog = store.load_catalog("badges").await.unwrap();
    assert_eq!(catalog.len(), 1);
}

#[tokio::test]
async fn test_categories_are_independent() {
    init_tracing();
    let addr = start_cdn().await;
    let dir = tempfile::tempdir().unwrap();
    let store = DiskAssetStore::new(dir.path());

    let url = format!("http://{addr}/icons/icon-1.png");
    store
        .download_and_store("badges", "icon-1", &url, 7)
        .await
        .unwrap();

    let paints = store.load_catalog("paints").await.unwrap();
    assert!(paints.is_empty());
    let badges = store.load_catalog("badges").await.unwrap();
    assert_eq!(badges.len(), 1);
}

#[tokio::test]
async fn test_http_error_is_propagated_and_nothing_is_recorded() {
    init_tracing();
    let addr = start_cdn().await;
    let dir = tempfile::tempdir().unwrap();
    let store = DiskAssetStore::new(dir.path());

    let url = format!("http://{addr}/missing/icon-1.png");
    let err = store
        .download_and_store("badges", "icon-1", &url, 7)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("404"));

    let catalog = store.load_catalog("badges").await.unwrap();
    assert!(catalog.is_empty());
}

#[tokio::test]
async fn test_expired_entries_are_pruned_on_load() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let badges_dir = dir.path().join("badges");
    std::fs::create_dir_all(&badges_dir).unwrap();

    // An asset stored 30 days ago with a 7-day expiry.
    let old_file = badges_dir.join("old.png");
    std::fs::write(&old_file, ICON_BYTES).unwrap();
    let stored_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
        - 30 * 86_400;
    let index = format!(
        r#"[{{"asset_id":"old","file_name":"old.png","stored_at_secs":{stored_at},"expiry_days":7}}]"#
    );
    std::fs::write(badges_dir.join("index.json"), index).unwrap();

    let store = DiskAssetStore::new(dir.path());
    let catalog = store.load_catalog("badges").await.unwrap();

    assert!(catalog.is_empty());
    assert!(!old_file.exists());
}
