/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use taidao_api::{app::AppState, config::Config};
/// use taidao_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = create_pool(DatabaseConfig {
///     url: config.database.url.clone(),
///     ..Default::default()
/// })
/// .await?;
/// let state = AppState::new(pool, config, reqwest::Client::new());
/// let app = taidao_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::clients::{
    bsky::{AppViewClient, ProfileDirectory, ProfileSource},
    cwa::{CwaClient, WeatherSource},
    mailer::{LogMailer, Mailer},
    openai::{ChatUpstream, OpenAiChat},
    twilio::{OtpVerifier, TwilioVerify},
};
use crate::config::Config;
use crate::middleware::rate_limit::{rate_limit_layer, RouteLimiter};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, MethodRouter},
    Router,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Every service lives behind an `Arc`, so cloning is cheap. Optional
/// integrations are `None` when their credentials are not configured, and
/// the routes that need them answer 503.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Verification email delivery
    pub mailer: Arc<dyn Mailer>,

    /// Phone verification provider
    pub verifier: Option<Arc<dyn OtpVerifier>>,

    /// Chat completion upstream
    pub chat: Option<Arc<dyn ChatUpstream>>,

    /// Cached Bluesky profiles of feed members
    pub profiles: Arc<ProfileDirectory>,

    /// CWA forecasts
    pub weather: Option<Arc<dyn WeatherSource>>,
}

impl AppState {
    /// Creates application state with the production integrations that
    /// `config` enables
    pub fn new(db: SqlitePool, config: Config, http: reqwest::Client) -> Self {
        let verifier = config
            .twilio
            .clone()
            .map(|twilio| Arc::new(TwilioVerify::new(http.clone(), twilio)) as Arc<dyn OtpVerifier>);

        let chat = config
            .openai
            .clone()
            .map(|openai| Arc::new(OpenAiChat::new(http.clone(), openai)) as Arc<dyn ChatUpstream>);

        let weather = config
            .cwa_token
            .clone()
            .map(|token| Arc::new(CwaClient::new(http.clone(), token)) as Arc<dyn WeatherSource>);

        let appview = AppViewClient::new(http, &config.feed.appview_url);

        Self {
            db,
            config: Arc::new(config),
            mailer: Arc::new(LogMailer),
            verifier,
            chat,
            profiles: Arc::new(ProfileDirectory::new(Arc::new(appview))),
            weather,
        }
    }

    /// Replaces the mailer
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Replaces the phone verification provider
    pub fn with_verifier(mut self, verifier: Arc<dyn OtpVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Replaces the chat upstream
    pub fn with_chat(mut self, chat: Arc<dyn ChatUpstream>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Replaces the profile source, starting with an empty cache
    pub fn with_profile_source(mut self, source: Arc<dyn ProfileSource>) -> Self {
        self.profiles = Arc::new(ProfileDirectory::new(source));
        self
    }

    /// Replaces the forecast source
    pub fn with_weather(mut self, weather: Arc<dyn WeatherSource>) -> Self {
        self.weather = Some(weather);
        self
    }

    /// Whether session cookies carry `Secure`
    pub fn cookie_secure(&self) -> bool {
        self.config.api.cookie_secure
    }
}

/// Wraps a route with its own OTP rate limit bucket
fn rate_limited(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.layer(from_fn_with_state(RouteLimiter::otp(), rate_limit_layer))
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /health                                   # Health check
/// ├── GET  /session/                                 # Current user
/// ├── POST /sign-up-by-email/                        # Send sign-up code
/// ├── POST /verify-sign-up-email/          (limited) # Create account
/// ├── POST /log-in-by-email/               (limited) # Send log-in code
/// ├── POST /verify-log-in-email/           (limited) # Log in
/// ├── POST /log-in-by-phone/               (limited) # Send SMS code
/// ├── POST /verify-log-in-phone/           (limited) # Log in by phone
/// ├── POST /log-out/                                 # Drop sessions
/// ├── GET  /xrpc/app.bsky.feed.describeFeedGenerator
/// ├── GET  /xrpc/app.bsky.feed.getFeedSkeleton
/// ├── GET  /.well-known/did.json
/// ├── GET  /bsky-taiwanese/                          # Member profiles
/// ├── POST /chat/                                    # SSE chat relay
/// ├── GET  /weather/week/                            # Week forecast
/// ├── GET  /weather/today/                           # 36-hour summary
/// └── POST /weather/chat/                            # SSE weather chat
/// ```
///
/// Every `(limited)` route owns a separate token bucket.
///
/// # Middleware Stack
///
/// 1. Logging (tower-http TraceLayer)
/// 2. Rate limiting (per route)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let account_routes = Router::new()
        .route("/session/", get(routes::session::current_session))
        .route("/sign-up-by-email/", post(routes::email_auth::sign_up_by_email))
        .route(
            "/verify-sign-up-email/",
            rate_limited(post(routes::email_auth::verify_sign_up_email)),
        )
        .route(
            "/log-in-by-email/",
            rate_limited(post(routes::email_auth::log_in_by_email)),
        )
        .route(
            "/verify-log-in-email/",
            rate_limited(post(routes::email_auth::verify_log_in_email)),
        )
        .route(
            "/log-in-by-phone/",
            rate_limited(post(routes::phone_auth::log_in_by_phone)),
        )
        .route(
            "/verify-log-in-phone/",
            rate_limited(post(routes::phone_auth::verify_log_in_phone)),
        )
        .route("/log-out/", post(routes::session::log_out));

    let feed_routes = Router::new()
        .route(
            "/xrpc/app.bsky.feed.describeFeedGenerator",
            get(routes::feed::describe_feed_generator),
        )
        .route(
            "/xrpc/app.bsky.feed.getFeedSkeleton",
            get(routes::feed::get_feed_skeleton),
        )
        .route("/.well-known/did.json", get(routes::feed::did_document))
        .route("/bsky-taiwanese/", get(routes::profiles::list_members));

    let assistant_routes = Router::new()
        .route("/chat/", post(routes::chat::chat))
        .route("/weather/week/", get(routes::weather::week))
        .route("/weather/today/", get(routes::weather::today))
        .route("/weather/chat/", post(routes::weather::weather_chat));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(account_routes)
        .merge(feed_routes)
        .merge(assistant_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
