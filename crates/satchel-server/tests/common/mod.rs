//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use cookie::Cookie;
use reqwest::Client;
use reqwest::header::{COOKIE, SET_COOKIE};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use satchel_server::{Server, ServerConfig};
use satchel_session::{SessionManager, SessionOptions};

/// A test server that runs in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client for this server.
    pub client: Client,
    /// Session manager the server runs on.
    pub sessions: SessionManager,
    /// Handle to the server task.
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server with an in-memory session manager.
    pub async fn start() -> Result<Self> {
        Self::start_with(SessionManager::new(SessionOptions::default())).await
    }

    /// Start a new test server over an existing session manager.
    pub async fn start_with(sessions: SessionManager) -> Result<Self> {
        let addr = find_available_port().await?;

        let config = ServerConfig::new()
            .with_bind_address(addr)
            .with_request_logging(false);

        let server = Server::new(sessions.clone(), config);
        let handle = tokio::spawn(async move {
            let _ = server.run_on(addr).await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            sessions,
            handle,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// GET `path`, sending `cookie` as the `Cookie` header when present.
    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Result<reqwest::Response> {
        let mut request = self.client.get(format!("{}{}", self.base_url(), path));
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        Ok(request.send().await?)
    }

    /// Stop the server task.
    pub fn stop(self) {
        self.handle.abort();
    }
}

/// The `name=value` pair of the last `Set-Cookie` header, if any.
pub fn cookie_pair(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .last()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Cookie::parse_encoded(v).ok())
        .map(|c| Cookie::new(c.name(), c.value()).encoded().to_string())
}

/// Raw `Set-Cookie` header values.
pub fn set_cookie_headers(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect()
}

/// Find an available port for the test server.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
