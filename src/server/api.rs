use crate::codec::{ StreamProtocol, DATA_STREAM_HEADER, DATA_STREAM_VERSION };
use crate::models::chat::ChatRequest;
use crate::relay::{ Relay, RelayError };
use axum::{
    routing::{ get, post },
    Router,
    Json,
    body::Body,
    extract::{ State, Query, rejection::{ JsonRejection, QueryRejection } },
    response::{ IntoResponse, Response },
    http::{ header, HeaderValue, StatusCode },
};
use serde::{ Deserialize, Serialize };
use thiserror::Error;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn };

pub const CHAT_PATH: &str = "/api/chat";
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("upstream timed out: {0}")]
    Timeout(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        };
        let body = Json(ErrorBody { error: self.to_string() });
        (code, body).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Upstream(_) => ApiError::Upstream(e.to_string()),
            RelayError::DeadlineExceeded(_) => ApiError::Timeout(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Deserialize, Default)]
pub struct StreamQuery {
    #[serde(default)]
    pub protocol: StreamProtocol,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
}

#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(CHAT_PATH, post(chat_handler))
        .route(HEALTH_PATH, get(health_handler))
        .layer(cors)
        .with_state(state)
}

async fn chat_handler(
    State(state): State<AppState>,
    query: Result<Query<StreamQuery>, QueryRejection>,
    payload: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let Json(req) = payload?;
    if req.messages.is_empty() {
        return Err(ApiError::BadRequest("messages must not be empty".into()));
    }

    let reply = state.relay.start(req.messages).await.map_err(|e| {
        warn!("Relay failed before streaming: {}", e);
        ApiError::from(e)
    })?;

    let protocol = query.protocol;
    info!("Streaming reply using {} protocol", protocol);
    let mut response = Body::from_stream(reply.into_body(protocol)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(StreamProtocol::CONTENT_TYPE));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if protocol == StreamProtocol::Data {
        headers.insert(DATA_STREAM_HEADER, HeaderValue::from_static(DATA_STREAM_VERSION));
    }
    Ok(response)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        model: state.relay.model(),
    })
}
