//! Canned-response HTTP server for tests.
//!
//! Compiled for this crate's own tests and, through the `test-support`
//! feature, for downstream crates that need a fake GitHub.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Path with query → (status, body). Unknown paths answer 404.
pub type Routes = HashMap<String, (u16, Vec<u8>)>;

/// Request targets received so far, in arrival order.
pub type RequestLog = Arc<Mutex<Vec<String>>>;

/// Serve `routes` until the runtime shuts down; returns the base URL.
pub async fn serve(routes: Routes) -> String {
    serve_recording(routes).await.0
}

/// Like [`serve`], also returning the log of requested paths.
pub async fn serve_recording(routes: Routes) -> (String, RequestLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);
    let log: RequestLog = Arc::default();
    let requests = log.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = routes.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let target = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                requests.lock().unwrap().push(target.clone());

                let (status, body) = routes
                    .get(&target)
                    .cloned()
                    .unwrap_or((404, b"{\"message\":\"Not Found\"}".to_vec()));
                let head = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}", addr), log)
}

/// `(path, (200, body))`, for building [`Routes`] from JSON literals.
pub fn ok(path: &str, body: &str) -> (String, (u16, Vec<u8>)) {
    (path.to_string(), (200, body.as_bytes().to_vec()))
}
