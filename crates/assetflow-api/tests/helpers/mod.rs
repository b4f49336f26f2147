//! Test helpers: build AppState and router for integration tests.
//!
//! Everything runs in memory: no `DATABASE_URL`, local storage under a temp dir, origins
//! served by mockito, and clamd replaced by a local listener when scanning is enabled.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_test::TestServer;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use assetflow_api::setup::{routes, services};
use assetflow_api::state::AppState;
use assetflow_core::{AssetflowConfig, Config};
use assetflow_worker::{drain_queue, MessageHandler};

pub const FILES_BASE_URL: &str = "http://files.test";

/// 8-byte PNG signature followed by an IHDR chunk header and filler.
pub fn png_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H',
        b'D', b'R',
    ];
    let mut filler = 0u8;
    while data.len() < len {
        data.push(filler);
        filler = filler.wrapping_add(1);
    }
    data.truncate(len);
    data
}

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub fn media_dir(&self) -> PathBuf {
        self._temp_dir.path().join("media")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self._temp_dir.path().join("staging")
    }

    /// Put `data` into the content store under `name`.
    pub async fn store_fixture(&self, name: &str, data: &[u8]) {
        let source = self._temp_dir.path().join(format!("fixture-{}", name));
        tokio::fs::write(&source, data).await.unwrap();
        self.state.storage.store_file(name, &source).await.unwrap();
        tokio::fs::remove_file(&source).await.unwrap();
    }

    /// Run every queued lifecycle message through the orchestrator.
    pub async fn drain(&self) -> usize {
        drain_queue(
            self.state.queue.queue.as_ref(),
            self.state.orchestrator.clone() as Arc<dyn MessageHandler>,
        )
        .await
        .unwrap()
    }
}

pub fn test_config(root: &Path, overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::new();
    let defaults = [
        ("LOCAL_STORAGE_PATH", root.join("media").display().to_string()),
        ("STAGING_PATH", root.join("staging").display().to_string()),
        ("LOCAL_STORAGE_BASE_URL", FILES_BASE_URL.to_string()),
        ("CLAMAV_ENABLED", "false".to_string()),
        ("ALLOW_PRIVATE_ORIGINS", "true".to_string()),
        ("DOWNLOAD_CONNECT_TIMEOUT_SECS", "2".to_string()),
        ("DOWNLOAD_READ_TIMEOUT_SECS", "5".to_string()),
    ];
    for (key, value) in defaults {
        vars.insert(key.to_string(), value);
    }
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }

    let inner = AssetflowConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
    inner.validate().unwrap();
    Config(Box::new(inner))
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(&[]).await
}

pub async fn setup_test_app_with(overrides: &[(&str, &str)]) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path(), overrides);

    let state = services::initialize_services(&config).await.unwrap();
    let router = routes::setup_routes(state.clone());
    let server = TestServer::new(router.into_make_service()).unwrap();

    TestApp {
        server,
        state,
        _temp_dir: temp_dir,
    }
}

/// A stand-in for clamd that answers every INSTREAM session with `reply`.
/// Returns the port it listens on.
pub async fn spawn_fake_clamd(reply: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut command = [0u8; 10];
                if socket.read_exact(&mut command).await.is_err() {
                    return;
                }
                loop {
                    let mut len = [0u8; 4];
                    if socket.read_exact(&mut len).await.is_err() {
                        return;
                    }
                    let len = u32::from_be_bytes(len) as usize;
                    if len == 0 {
                        break;
                    }
                    let mut chunk = vec![0u8; len];
                    if socket.read_exact(&mut chunk).await.is_err() {
                        return;
                    }
                }
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    port
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

pub async fn dir_entries(path: &Path) -> usize {
    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    let mut count = 0;
    while let Ok(Some(_)) = entries.next_entry().await {
        count += 1;
    }
    count
}
