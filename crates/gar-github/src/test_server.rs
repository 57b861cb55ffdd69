//! Scripted HTTP server standing in for the GitHub API in tests.
//!
//! Each route matches a request path exactly and, optionally, a substring of
//! its query string. The first unused matching route answers. A route is used
//! up unless it is the last one left for the request, so the final reply for
//! a path repeats.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::client::{ClientConfig, GitHubClient, RetryPolicy};

/// A canned response. `{base}` in header values becomes the server URL.
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn ok(body: &str) -> Self {
        Self::json(200, body)
    }

    pub fn next_page(mut self, target: &str) -> Self {
        self.headers
            .push(("link".to_string(), format!("<{{base}}{target}>; rel=\"next\"")));
        self
    }
}

struct Route {
    path: String,
    query: Option<String>,
    reply: Reply,
    used: bool,
}

impl Route {
    fn matches(&self, path: &str, query: &str) -> bool {
        !self.used && self.path == path && self.query.as_deref().is_none_or(|q| query.contains(q))
    }
}

#[derive(Default)]
struct Script {
    routes: Vec<Route>,
    requests: Vec<String>,
}

impl Script {
    fn respond(&mut self, target: &str) -> Reply {
        self.requests.push(target.to_string());
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let matching: Vec<usize> = self
            .routes
            .iter()
            .enumerate()
            .filter(|(_, route)| route.matches(path, query))
            .map(|(index, _)| index)
            .collect();
        match matching.as_slice() {
            [] => Reply::json(404, r#"{"message": "Not Found"}"#),
            [only] => self.routes[*only].reply.clone(),
            [first, ..] => {
                self.routes[*first].used = true;
                self.routes[*first].reply.clone()
            }
        }
    }
}

pub struct TestServer {
    pub base: String,
    script: Arc<Mutex<Script>>,
}

impl TestServer {
    /// Starts serving `routes`, given as `("/path?query-substring", reply)`.
    pub async fn start(routes: Vec<(&str, Reply)>) -> Self {
        let script = Script {
            routes: routes
                .into_iter()
                .map(|(spec, reply)| {
                    let (path, query) = match spec.split_once('?') {
                        Some((path, query)) => (path, Some(query.to_string())),
                        None => (spec, None),
                    };
                    Route {
                        path: path.to_string(),
                        query,
                        reply,
                        used: false,
                    }
                })
                .collect(),
            requests: Vec::new(),
        };
        let script = Arc::new(Mutex::new(script));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let shared = Arc::clone(&script);
        let server_base = base.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = Vec::new();
                let mut chunk = [0_u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&request);
                let target = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let reply = shared.lock().unwrap().respond(&target);

                let reason = StatusCode::from_u16(reply.status)
                    .ok()
                    .and_then(|status| status.canonical_reason())
                    .unwrap_or("Unknown");
                let mut head = format!(
                    "HTTP/1.1 {} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n",
                    reply.status,
                    reply.body.len()
                );
                for (name, value) in &reply.headers {
                    head.push_str(&format!("{name}: {}\r\n", value.replace("{base}", &server_base)));
                }
                head.push_str("\r\n");
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(reply.body.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self { base, script }
    }

    /// Request targets (path and query) in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.script.lock().unwrap().requests.clone()
    }

    /// Number of requests whose path is exactly `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|target| target.split('?').next() == Some(path))
            .count()
    }

    /// A client for this server that retries up to `max_attempts` times
    /// without real delays.
    pub fn client(&self, max_attempts: u32) -> GitHubClient {
        let config = ClientConfig {
            api_url: self.base.clone(),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
        };
        GitHubClient::new("ghp_test", config).unwrap()
    }
}
