#![allow(dead_code)]

use axum::{
    body::Bytes,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use dashboard::directory::DirectoryClient;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One request as seen by the fake broker.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Recorded {
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

type Reply = (StatusCode, String);

#[derive(Default)]
struct Routes {
    gets: HashMap<String, Reply>,
    posts: HashMap<String, Reply>,
    delays: HashMap<String, Duration>,
}

/// Minimal oneM2M CSE answering canned replies keyed by method, path and query.
#[derive(Clone)]
pub struct FakeBroker {
    pub addr: SocketAddr,
    routes: Arc<Mutex<Routes>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

fn route_key(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    }
}

impl FakeBroker {
    pub async fn start() -> Self {
        let routes = Arc::new(Mutex::new(Routes::default()));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handler_routes = routes.clone();
        let handler_requests = requests.clone();
        let app = Router::new().fallback(
            move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
                let routes = handler_routes.clone();
                let requests = handler_requests.clone();
                async move { respond(routes, requests, method, uri, headers, body).await }
            },
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake broker");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake broker");
        });

        Self {
            addr,
            routes,
            requests,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self, timeout: Duration) -> DirectoryClient {
        DirectoryClient::new(
            &self.url(),
            "CDashboard".to_string(),
            "3".to_string(),
            timeout,
            chrono::FixedOffset::west_opt(4 * 3600).unwrap(),
        )
        .expect("client")
    }

    /// `query` is matched verbatim, e.g. `fu=1&ty=2&lbl=sensor`.
    pub fn on_get(&self, path: &str, query: &str, status: StatusCode, body: Value) {
        self.on_get_raw(path, query, status, body.to_string());
    }

    pub fn on_get_raw(&self, path: &str, query: &str, status: StatusCode, body: String) {
        self.routes
            .lock()
            .unwrap()
            .gets
            .insert(route_key(path, query), (status, body));
    }

    pub fn on_post(&self, path: &str, status: StatusCode, body: Value) {
        self.routes
            .lock()
            .unwrap()
            .posts
            .insert(path.to_string(), (status, body.to_string()));
    }

    pub fn delay(&self, path: &str, delay: Duration) {
        self.routes
            .lock()
            .unwrap()
            .delays
            .insert(path.to_string(), delay);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn posts_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == Method::POST && r.path == path)
            .collect()
    }

    /// Publishes a sensor or actuator AE with one container per metric.
    pub fn add_device(&self, name: &str, label: &str, metrics: &[&str]) {
        let url = format!("cse-in/{}", name);
        let containers: Vec<String> = metrics.iter().map(|m| format!("{}/{}", url, m)).collect();
        self.on_get(
            &format!("/{}", url),
            "fu=1&ty=3&lvl=1",
            StatusCode::OK,
            json!({ "m2m:uril": containers }),
        );
        self.on_get(
            &format!("/{}", url),
            "",
            StatusCode::OK,
            json!({ "m2m:ae": { "rn": name, "ri": format!("C{}", name), "lbl": [label] } }),
        );
    }
}

async fn respond(
    routes: Arc<Mutex<Routes>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let raw_query = uri.query().unwrap_or_default().to_string();
    let query = raw_query
        .split('&')
        .filter(|p| !p.is_empty())
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: path.clone(),
        query,
        headers,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let delay = routes.lock().unwrap().delays.get(&path).copied();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let reply = {
        let routes = routes.lock().unwrap();
        if method == Method::POST {
            routes.posts.get(&path).cloned()
        } else {
            routes.gets.get(&route_key(&path, &raw_query)).cloned()
        }
    };
    match reply {
        Some((status, body)) => (status, [("X-M2M-RSC", "2000")], body).into_response(),
        // unscripted creations succeed
        None if method == Method::POST => (
            StatusCode::CREATED,
            [("X-M2M-RSC", "2001")],
            json!({ "m2m:sub": { "ri": "created" } }).to_string(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, [("X-M2M-RSC", "4004")], String::new()).into_response(),
    }
}
