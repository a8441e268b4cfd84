//! HTTP surface: `POST <api_prefix>/:collection/login`.
//!
//! The route runs the migration gate as a route layer, then the login handler
//! (normal authentication). The gate only looks at JSON bodies; form posts
//! from the fallback path go straight to the handler.

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    extract::{FromRequest, Path, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::error;
use zeroize::Zeroizing;

use crate::{
    auth::Authenticator,
    config::PluginSettings,
    gate::{GateError, MigrationGate},
    record::RecordId,
    store::StoreError,
};

/// Shared state of the login route.
#[derive(Clone)]
pub struct LoginState {
    gate: MigrationGate,
    authenticator: Arc<dyn Authenticator>,
    settings: Arc<PluginSettings>,
}

impl LoginState {
    /// Bundles the gate, the normal authenticator and the settings.
    pub fn new(
        gate: MigrationGate,
        authenticator: Arc<dyn Authenticator>,
        settings: PluginSettings,
    ) -> Self {
        Self {
            gate,
            authenticator,
            settings: Arc::new(settings),
        }
    }
}

/// Builds the login router.
pub fn build_router(state: LoginState) -> Router {
    let route = state.settings.login_route();

    Router::new()
        .route(&route, post(login))
        .route_layer(middleware::from_fn_with_state(state.clone(), migration_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Successful login body.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Always `"Auth Passed"`.
    pub message: &'static str,
    /// Session token.
    pub token: String,
    /// The authenticated record.
    pub user: LoginUser,
}

/// Record reference in a [`LoginResponse`].
#[derive(Debug, Serialize)]
pub struct LoginUser {
    /// Record id.
    pub id: RecordId,
}

/// Errors returned by the login route.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Normal authentication rejected the credentials.
    #[error("The email or password provided is incorrect.")]
    InvalidCredentials,
    /// The body could not be read as JSON or form data.
    #[error("{0}")]
    BadRequest(String),
    /// The body exceeded the configured limit.
    #[error("The request body is too large.")]
    PayloadTooLarge,
    /// No authenticatable collection with this slug.
    #[error("The requested resource was not found.")]
    NotFound,
    /// The login could not be completed.
    #[error("Something went wrong.")]
    Internal,
}

#[derive(Serialize)]
struct ErrorBody {
    errors: Vec<ErrorMessage>,
}

#[derive(Serialize)]
struct ErrorMessage {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            errors: vec![ErrorMessage {
                message: self.to_string(),
            }],
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownCollection(_) => Self::NotFound,
            err => {
                error!(error = %err, "login lookup failed");
                Self::Internal
            }
        }
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Lookup(err) => err.into(),
            GateError::Persistence(_) => Self::Internal,
            GateError::Verification(err) => {
                error!(error = %err, "legacy verification task failed");
                Self::Internal
            }
        }
    }
}

struct Credentials {
    identifier: String,
    password: Zeroizing<String>,
}

impl Credentials {
    /// Missing or non-string fields read as empty.
    fn from_fields(mut fields: HashMap<String, String>, identifier_field: &str) -> Self {
        Self {
            identifier: fields.remove(identifier_field).unwrap_or_default(),
            password: Zeroizing::new(fields.remove("password").unwrap_or_default()),
        }
    }
}

fn string_fields(object: Map<String, Value>) -> HashMap<String, String> {
    object
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(value) => Some((key, value)),
            _ => None,
        })
        .collect()
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

async fn migration_gate(
    State(state): State<LoginState>,
    Path(collection): Path<String>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !is_json(request.headers()) {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, state.settings.body_limit)
        .await
        .map_err(|_| ApiError::PayloadTooLarge)?;

    // Unparsable bodies are left for the handler to reject.
    if let Ok(Value::Object(object)) = serde_json::from_slice::<Value>(&bytes) {
        let credentials =
            Credentials::from_fields(string_fields(object), &state.settings.identifier_field);
        state
            .gate
            .evaluate(&collection, &credentials.identifier, &credentials.password)
            .await?;
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

async fn login(
    State(state): State<LoginState>,
    Path(collection): Path<String>,
    request: Request,
) -> Result<Json<LoginResponse>, ApiError> {
    let fields = if is_json(request.headers()) {
        let Json(object) = Json::<Map<String, Value>>::from_request(request, &state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        string_fields(object)
    } else {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        fields
    };
    let credentials = Credentials::from_fields(fields, &state.settings.identifier_field);

    let session = state
        .authenticator
        .login(&collection, &credentials.identifier, &credentials.password)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    Ok(Json(LoginResponse {
        message: "Auth Passed",
        token: session.token,
        user: LoginUser {
            id: session.record_id,
        },
    }))
}
