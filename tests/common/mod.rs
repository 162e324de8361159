//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;

use tempfile::TempDir;
use tokio::net::TcpListener;
use woodland::{HttpServer, Router, Shutdown};

/// A server running on a loopback port until dropped.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Serve `router` on an ephemeral loopback port.
pub async fn start_server(router: Router) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = HttpServer::new(router).run(listener, rx).await;
    });

    TestServer { addr, shutdown }
}

/// Client without pooling or proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// A directory with `hello.txt` (13 bytes), `docs/index.html` and `empty/`.
pub fn static_root() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "hello.txt", "Hello, World!");
    std::fs::create_dir(dir.path().join("docs")).unwrap();
    write(dir.path(), "docs/index.html", "<h1>docs</h1>");
    std::fs::create_dir(dir.path().join("empty")).unwrap();
    dir
}

fn write(root: &Path, name: &str, content: &str) {
    std::fs::write(root.join(name), content).unwrap();
}
