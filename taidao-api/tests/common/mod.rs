//! Common test utilities for integration tests
//!
//! This module provides shared infrastructure for integration tests:
//! - A migrated in-memory database per test
//! - Fake integrations (mailer, phone verifier, chat, profiles, weather)
//! - Request helpers for form posts and cookies

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use futures::{stream, StreamExt};
use std::sync::{Arc, Mutex};
use taidao_api::{
    app::{build_router, AppState},
    clients::{
        bsky::{BskyError, Profile, ProfileSource},
        cwa::{CwaError, Forecast36h, WeatherSource, WeekForecast},
        mailer::{MailError, Mailer, Message},
        openai::{ChatError, ChatMessage, ChatUpstream, DeltaStream},
        twilio::{Channel, OtpVerifier, VerificationStatus, VerifyError},
    },
    config::Config,
};
use taidao_shared::db::{
    migrations::run_migrations,
    pool::{create_pool, DatabaseConfig},
    timestamp,
};
use tower::ServiceExt;

/// Mailer that keeps every message
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Message>>,
}

impl RecordingMailer {
    /// Code from the most recent message to `to`
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let message = sent.iter().rev().find(|m| m.to == to)?;
        let start = message.html_body.find("<strong>")? + "<strong>".len();
        let end = message.html_body.find("</strong>")?;
        Some(message.html_body[start..end].to_string())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: Message) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Verifier that approves exactly one code
pub struct FakeVerifier {
    pub approved_code: String,
    pub started: Mutex<Vec<String>>,

    /// Every check finds no live verification
    pub expired: bool,
}

impl FakeVerifier {
    pub fn approving(code: &str) -> Self {
        Self {
            approved_code: code.to_string(),
            started: Mutex::new(Vec::new()),
            expired: false,
        }
    }

    pub fn expired() -> Self {
        Self {
            expired: true,
            ..Self::approving("")
        }
    }
}

#[async_trait]
impl OtpVerifier for FakeVerifier {
    async fn start(&self, to: &str, _channel: Channel) -> Result<(), VerifyError> {
        self.started.lock().unwrap().push(to.to_string());
        Ok(())
    }

    async fn check(&self, _to: &str, code: &str) -> Result<VerificationStatus, VerifyError> {
        if self.expired {
            Ok(VerificationStatus::NotFound)
        } else if code == self.approved_code {
            Ok(VerificationStatus::Approved)
        } else {
            Ok(VerificationStatus::Pending)
        }
    }
}

/// Chat upstream that replays fixed deltas, optionally failing at the end
pub struct ScriptedChat {
    pub deltas: Vec<String>,
    pub fail_at_end: bool,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub fn new(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            fail_at_end: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(deltas: &[&str]) -> Self {
        Self {
            fail_at_end: true,
            ..Self::new(deltas)
        }
    }
}

#[async_trait]
impl ChatUpstream for ScriptedChat {
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<DeltaStream, ChatError> {
        self.requests.lock().unwrap().push(messages);

        let mut items: Vec<Result<String, ChatError>> =
            self.deltas.iter().cloned().map(Ok).collect();
        if self.fail_at_end {
            items.push(Err(ChatError::Upstream {
                status: 500,
                body: "boom".to_string(),
            }));
        }

        Ok(stream::iter(items).boxed())
    }
}

/// Profile source backed by a fixed list
pub struct StaticProfiles(pub Vec<Profile>);

#[async_trait]
impl ProfileSource for StaticProfiles {
    async fn get_profiles(&self, dids: &[String]) -> Result<Vec<Profile>, BskyError> {
        Ok(self
            .0
            .iter()
            .filter(|p| dids.contains(&p.did))
            .cloned()
            .collect())
    }
}

/// Weather source serving fixture documents
pub struct FixtureWeather;

pub fn week_fixture() -> WeekForecast {
    serde_json::from_value(serde_json::json!({
        "records": {
            "locations": [{
                "location": [{
                    "locationName": "臺北市",
                    "weatherElement": [
                        {"elementName": "T", "time": [
                            {"startTime": "2025-05-20 06:00:00", "elementValue": [{"value": "28", "measures": "攝氏度"}]}
                        ]}
                    ]
                }]
            }]
        }
    }))
    .unwrap()
}

pub fn forecast_36h_fixture() -> Forecast36h {
    serde_json::from_value(serde_json::json!({
        "records": {
            "location": [{
                "locationName": "臺北市",
                "weatherElement": [
                    {"elementName": "Wx", "time": [{"startTime": "2025-05-20 06:00:00", "endTime": "2025-05-20 18:00:00", "parameter": {"parameterName": "多雲"}}]}
                ]
            }]
        }
    }))
    .unwrap()
}

#[async_trait]
impl WeatherSource for FixtureWeather {
    async fn week(&self, locations: &[String]) -> Result<WeekForecast, CwaError> {
        if locations.is_empty() {
            return Err(CwaError::NoLocations);
        }
        Ok(week_fixture())
    }

    async fn forecast_36h(&self) -> Result<Forecast36h, CwaError> {
        Ok(forecast_36h_fixture())
    }
}

/// Test context containing all necessary resources
pub struct TestContext {
    pub db: sqlx::SqlitePool,
    pub app: Router,
    pub config: Config,
    pub mailer: Arc<RecordingMailer>,
}

impl TestContext {
    /// Creates a context with a fresh database and no optional integrations
    pub async fn new() -> Self {
        Self::with_state(|state| state).await
    }

    /// Creates a context, letting the caller install fakes on the state
    pub async fn with_state(customize: impl FnOnce(AppState) -> AppState) -> Self {
        let config = Config::for_tests();

        let db = create_pool(DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&db).await.unwrap();

        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(db.clone(), config.clone(), reqwest::Client::new())
            .with_mailer(mailer.clone())
            .with_profile_source(Arc::new(StaticProfiles(Vec::new())));

        let app = build_router(customize(state));

        Self {
            db,
            app,
            config,
            mailer,
        }
    }

    /// Sends a request through the router
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// POSTs a url-encoded form, optionally with a session cookie
    pub async fn post_form(
        &self,
        uri: &str,
        fields: &[(&str, &str)],
        session: Option<&str>,
    ) -> Response<Body> {
        let body = reqwest::Url::parse_with_params("http://localhost/", fields)
            .unwrap()
            .query()
            .unwrap_or("")
            .to_string();
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(id) = session {
            builder = builder.header(header::COOKIE, format!("session={}", id));
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// GETs `uri`, optionally with a session cookie
    pub async fn get(&self, uri: &str, session: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(id) = session {
            builder = builder.header(header::COOKIE, format!("session={}", id));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Moves a row's `created_at` `age` into the past
    pub async fn backdate(&self, table: &str, key_column: &str, key: &str, age: chrono::Duration) {
        sqlx::query(&format!(
            "UPDATE {} SET created_at = ? WHERE {} = ?",
            table, key_column
        ))
        .bind(timestamp(chrono::Utc::now() - age))
        .bind(key)
        .execute(&self.db)
        .await
        .unwrap();
    }

    /// Signs up `username`/`email` through both email steps and returns the
    /// session id
    pub async fn sign_up(&self, username: &str, email: &str) -> String {
        let response = self
            .post_form(
                "/sign-up-by-email/",
                &[("username", username), ("email", email)],
                None,
            )
            .await;
        assert_eq!(response.status(), 303);

        let code = self.mailer.last_code_for(email).unwrap();
        let response = self
            .post_form(
                "/verify-sign-up-email/",
                &[("username", username), ("email", email), ("token", &code)],
                None,
            )
            .await;
        assert_eq!(response.status(), 303);

        session_from(&response).unwrap()
    }
}

/// Session id from a `Set-Cookie` header
pub fn session_from(response: &Response<Body>) -> Option<String> {
    let cookie = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let value = cookie.strip_prefix("session=")?.split(';').next()?;
    Some(value.to_string())
}

/// Reads a response body as text
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Reads a response body as JSON
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
