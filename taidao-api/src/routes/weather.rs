/// CWA weather endpoints
///
/// - `GET /weather/week/?locations=臺北市,高雄市&format=csv|text`
/// - `GET /weather/today/` - 36-hour summary for every county
/// - `POST /weather/chat/` (form `message`) - SSE chat grounded on that
///   summary

use super::chat::{chat_upstream, require_message, sse_response};
use crate::{
    app::AppState,
    clients::{
        cwa::{CwaError, WeatherSource},
        openai::ChatMessage,
    },
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Query, State},
    http::header,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Form,
};
use futures::Stream;
use serde::Deserialize;
use std::{convert::Infallible, sync::Arc};

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Output format of the week forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekFormat {
    Csv,
    Text,
}

#[derive(Debug, Default, Deserialize)]
pub struct WeekParams {
    #[serde(default)]
    pub locations: String,

    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherChatForm {
    #[serde(default)]
    pub message: String,
}

/// Splits a comma separated location list, dropping blanks
pub fn parse_locations(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_format(raw: Option<&str>) -> ApiResult<WeekFormat> {
    match raw.filter(|s| !s.is_empty()) {
        None | Some("csv") => Ok(WeekFormat::Csv),
        Some("text") => Ok(WeekFormat::Text),
        Some(other) => Err(ApiError::BadRequest(format!(
            "Unknown format {}, expected csv or text",
            other
        ))),
    }
}

fn weather_source(state: &AppState) -> ApiResult<Arc<dyn WeatherSource>> {
    state
        .weather
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("Weather is not configured".to_string()))
}

fn system_prompt(summary: &str) -> String {
    format!(
        "你是臺灣的天氣助理。以下是中央氣象署的 36 小時天氣預報，請依據預報回答使用者的問題。\n\n{}",
        summary
    )
}

/// Week forecast for the requested locations
///
/// # Errors
///
/// - `400 Bad Request`: No locations, or an unknown format
/// - `503 Service Unavailable`: Weather is not configured
pub async fn week(
    State(state): State<AppState>,
    Query(params): Query<WeekParams>,
) -> ApiResult<Response> {
    let locations = parse_locations(&params.locations);
    if locations.is_empty() {
        return Err(CwaError::NoLocations.into());
    }
    let format = parse_format(params.format.as_deref())?;
    let source = weather_source(&state)?;

    let forecast = source.week(&locations).await?;

    let (content_type, body) = match format {
        WeekFormat::Csv => (CSV_CONTENT_TYPE, forecast.to_csv()?),
        WeekFormat::Text => (TEXT_CONTENT_TYPE, forecast.to_text()?),
    };

    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// 36-hour summary for every county
pub async fn today(State(state): State<AppState>) -> ApiResult<Response> {
    let source = weather_source(&state)?;
    let summary = source.forecast_36h().await?.summary()?;

    Ok(([(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], summary).into_response())
}

/// Chat about the weather
///
/// The current 36-hour summary goes to the model as the system message.
///
/// # Errors
///
/// - `400 Bad Request`: Empty message
/// - `503 Service Unavailable`: Chat or weather is not configured
pub async fn weather_chat(
    State(state): State<AppState>,
    Form(form): Form<WeatherChatForm>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let message = require_message(&form.message)?;
    let upstream = chat_upstream(&state)?;
    let source = weather_source(&state)?;

    let summary = source.forecast_36h().await?.summary()?;

    let deltas = upstream
        .stream(vec![
            ChatMessage::system(system_prompt(&summary)),
            ChatMessage::user(message),
        ])
        .await
        .map_err(|e| ApiError::internal("Failed to start chat completion", e))?;

    Ok(sse_response(deltas))
}
