//! Shared test infrastructure for integration tests
//!
//! Provides TestServer (the real router on an ephemeral port, backed by temp
//! directories) and FakeUpstream (a canned-response HTTP server standing in
//! for the icon index, the raw icon host and the Iconify API).

#![allow(dead_code)]

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use kiss_startpage::api::handlers::AppState;
use kiss_startpage::api::router;
use kiss_startpage::auth::PasswordRecord;
use kiss_startpage::config::Config;
use kiss_startpage::icons::HttpUpstream;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "correct-horse";

#[derive(Clone)]
struct Canned {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

#[derive(Default)]
struct FakeState {
    routes: Mutex<HashMap<String, Canned>>,
    hits: Mutex<HashMap<String, usize>>,
}

/// Canned-response HTTP server. Paths are matched without the query string;
/// unknown paths answer 404.
#[derive(Clone)]
pub struct FakeUpstream {
    addr: SocketAddr,
    state: Arc<FakeState>,
}

async fn fake_handler(State(state): State<Arc<FakeState>>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    *state.hits.lock().entry(path.clone()).or_default() += 1;
    let canned = state.routes.lock().get(&path).cloned();
    match canned {
        Some(c) => (
            StatusCode::from_u16(c.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            [(header::CONTENT_TYPE, c.content_type)],
            c.body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "missing").into_response(),
    }
}

impl FakeUpstream {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new()
            .fallback(fake_handler)
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake upstream");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, state }
    }

    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn respond(&self, path: &str, status: u16, content_type: &'static str, body: &[u8]) {
        self.state.routes.lock().insert(
            path.to_string(),
            Canned {
                status,
                content_type,
                body: body.to_vec(),
            },
        );
    }

    pub fn respond_json(&self, path: &str, body: &Value) {
        let raw = serde_json::to_vec(body).unwrap();
        self.respond(path, 200, "application/json", &raw);
    }

    /// Requests seen for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.state.hits.lock().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.state.hits.lock().values().sum()
    }

    /// The fixture catalog and icon files used across the icon tests.
    pub fn with_default_fixtures(self) -> Self {
        self.respond_json(
            "/index.json",
            &json!([
                {"Name": "Plex", "Reference": "plex", "SVG": "Yes", "PNG": "Yes", "Category": "Media", "Tags": "video"},
                {"Name": "Plexamp", "Reference": "plexamp", "SVG": "Yes", "PNG": "No", "Category": "Media"},
                {"Name": "Jellyfin", "Reference": "jellyfin", "SVG": "Yes", "PNG": "Yes"},
                {"Name": "Broken", "Reference": "broken", "SVG": "Yes", "PNG": "Yes"}
            ]),
        );
        self.respond("/raw/svg/plex.svg", 200, "image/svg+xml", b"<svg>plex</svg>");
        self.respond("/raw/png/plex.png", 200, "image/png", b"\x89PNGplex");
        self.respond("/raw/png/jellyfin.png", 200, "image/png", b"\x89PNGjelly");
        self.respond("/raw/svg/broken.svg", 500, "text/plain", b"boom");
        self.respond("/raw/png/broken.png", 200, "image/png", b"\x89PNGbroken");
        self.respond_json(
            "/iconify/search",
            &json!({"icons": ["simple-icons:plex", "logos:plex", "simple-icons:plexamp"]}),
        );
        self.respond(
            "/iconify/simple-icons/plex.svg",
            200,
            "image/svg+xml; charset=utf-8",
            b"<svg>si-plex</svg>",
        );
        self
    }
}

/// The real router served on 127.0.0.1 with temp data, app and icon dirs.
pub struct TestServer {
    addr: SocketAddr,
    pub upstream: FakeUpstream,
    dir: TempDir,
}

impl TestServer {
    /// Start a server with the default fixtures and no admin account.
    pub async fn start() -> Self {
        let upstream = FakeUpstream::start().await.with_default_fixtures();
        Self::start_with(upstream, |_| {}).await
    }

    /// Start a server whose `users.json` holds an admin that must change
    /// the password before editing.
    pub async fn with_forced_password_change() -> Self {
        let upstream = FakeUpstream::start().await.with_default_fixtures();
        Self::start_with(upstream, |data_dir| {
            let mut record = PasswordRecord::new(ADMIN_PASSWORD, 1);
            record.must_change_password = true;
            let doc = json!({"users": {(ADMIN_USER): record}});
            std::fs::write(
                data_dir.join("users.json"),
                serde_json::to_vec_pretty(&doc).unwrap(),
            )
            .unwrap();
        })
        .await
    }

    /// Start a server, letting `seed` populate the data dir first.
    pub async fn start_with(upstream: FakeUpstream, seed: impl FnOnce(&Path)) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = dir.path().join("data");
        let app_root = dir.path().join("app");
        let icons_dir = dir.path().join("private-icons");
        for d in [&data_dir, &app_root, &icons_dir] {
            std::fs::create_dir_all(d).unwrap();
        }
        seed(&data_dir);

        let config = Config {
            data_dir,
            app_root,
            private_icons_dir: icons_dir,
            password_iterations: 10,
            icon_index_url: format!("{}/index.json", upstream.base()),
            icon_raw_base: format!("{}/raw", upstream.base()),
            iconify_api_base: format!("{}/iconify", upstream.base()),
            ..Config::default()
        };

        let http = Arc::new(HttpUpstream::new().expect("Failed to build HTTP client"));
        let state = Arc::new(AppState::new(
            &config,
            http,
            Some(kiss_startpage::metrics::Metrics::new()),
        ));
        state.ensure_files().expect("Failed to seed data files");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().unwrap();
        let app = router(state);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, upstream, dir }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn data_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("data")
    }

    pub fn app_root(&self) -> std::path::PathBuf {
        self.dir.path().join("app")
    }

    pub fn private_icons_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("private-icons")
    }

    /// A browser-like client: keeps cookies, does not follow redirects.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    pub async fn post_json(
        &self,
        client: &reqwest::Client,
        path: &str,
        body: Value,
    ) -> (u16, Value) {
        let resp = client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn get_json(&self, client: &reqwest::Client, path: &str) -> (u16, Value) {
        let resp = client.get(self.url(path)).send().await.unwrap();
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    /// Create the admin account and return a client holding its session.
    pub async fn bootstrap_admin(&self) -> reqwest::Client {
        let client = self.client();
        let (status, body) = self
            .post_json(
                &client,
                "/api/auth/bootstrap",
                json!({"username": ADMIN_USER, "password": ADMIN_PASSWORD}),
            )
            .await;
        assert_eq!(status, 200, "bootstrap failed: {body}");
        client
    }
}
