#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

use phoebe::config::{Config, Overrides};
use phoebe::server::dispatch::{handle_connection, Peer};
use phoebe::server::Wiki;

/// A wiki in a temp directory whose connections run over in-memory
/// duplex streams, sidestepping TLS.
pub struct TestWiki {
    _temp_dir: TempDir,
    wiki: Arc<Wiki>,
}

impl TestWiki {
    pub fn new() -> Self {
        Self::with_overrides(Overrides::default())
    }

    pub fn with_overrides(mut overrides: Overrides) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        overrides.wiki_dir = Some(temp_dir.path().to_path_buf());
        let config = Config::load(&overrides).expect("load config");
        Self {
            _temp_dir: temp_dir,
            wiki: Arc::new(Wiki::new(config)),
        }
    }

    pub fn wiki(&self) -> &Wiki {
        &self.wiki
    }

    /// Send raw bytes as one connection and collect the full response.
    pub async fn raw_request(&self, bytes: &[u8]) -> Vec<u8> {
        let (client, server) = duplex(1 << 20);
        let peer = Peer {
            ip: "127.0.0.1".to_string(),
            fingerprint: None,
        };
        let server_task = tokio::spawn(handle_connection(server, peer, self.wiki.clone()));

        let (mut read_half, mut write_half) = tokio::io::split(client);
        write_half.write_all(bytes).await.expect("send request");
        write_half.shutdown().await.expect("shutdown");
        let mut response = Vec::new();
        read_half
            .read_to_end(&mut response)
            .await
            .expect("read response");
        server_task.await.expect("server task");
        response
    }

    pub async fn request(&self, line: &str) -> Vec<u8> {
        self.raw_request(format!("{line}\r\n").as_bytes()).await
    }

    pub async fn titan(&self, line: &str, body: &[u8]) -> Vec<u8> {
        let mut bytes = format!("{line}\r\n").into_bytes();
        bytes.extend_from_slice(body);
        self.raw_request(&bytes).await
    }
}

pub fn status_line(response: &[u8]) -> String {
    String::from_utf8_lossy(response)
        .split("\r\n")
        .next()
        .unwrap_or_default()
        .to_string()
}

pub fn body_of(response: &[u8]) -> Vec<u8> {
    match response.windows(2).position(|w| w == b"\r\n") {
        Some(i) => response[i + 2..].to_vec(),
        None => Vec::new(),
    }
}

pub fn body_text(response: &[u8]) -> String {
    String::from_utf8_lossy(&body_of(response)).into_owned()
}
