//! Edge Gate
//!
//! Stateless request interceptor deciding coarse route access ahead of every
//! handler. A pure function of {path, cookie presence, signature validity,
//! expiry}: it never touches a data store and never resolves the user
//! record, so it stays viable in a constrained low-latency context. Only
//! the Session Manager may additionally consult revocation state.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};

use crate::application::config::AuthConfig;
use crate::application::session::decode_session_token;

/// Route classes and redirect targets
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Prefixes reachable only with a valid session
    pub protected_prefixes: Vec<String>,
    /// Prefixes meant for signed-out visitors (login, register)
    pub auth_only_prefixes: Vec<String>,
    /// Where protected-path misses are sent
    pub login_path: String,
    /// Where authenticated visitors of auth-only paths are sent
    pub home_path: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            protected_prefixes: vec!["/account".to_string(), "/dashboard".to_string()],
            auth_only_prefixes: vec!["/login".to_string(), "/register".to_string()],
            login_path: "/login".to_string(),
            home_path: "/account".to_string(),
        }
    }
}

/// Outcome of a gate evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Request passes through unchanged
    Pass,
    /// Protected path without a valid session
    RedirectToLogin { location: String },
    /// Auth-only path with a valid session
    RedirectHome { location: String },
}

/// Decide route access from the session cookie alone
///
/// `destination` is what gets preserved in the `redirect` query parameter
/// (typically path + query); prefix matching runs against `path` only.
pub fn evaluate(
    gate: &GateConfig,
    path: &str,
    destination: &str,
    token: Option<&str>,
    secret: &[u8; 32],
    now: DateTime<Utc>,
) -> GateDecision {
    let has_valid_session = token
        .map(|t| decode_session_token(t, secret, now).is_some())
        .unwrap_or(false);

    let is_protected = gate.protected_prefixes.iter().any(|p| path.starts_with(p));
    if is_protected && !has_valid_session {
        let encoded: String =
            url::form_urlencoded::byte_serialize(destination.as_bytes()).collect();
        return GateDecision::RedirectToLogin {
            location: format!("{}?redirect={}", gate.login_path, encoded),
        };
    }

    let is_auth_only = gate.auth_only_prefixes.iter().any(|p| path.starts_with(p));
    if is_auth_only && has_valid_session {
        return GateDecision::RedirectHome {
            location: gate.home_path.clone(),
        };
    }

    GateDecision::Pass
}

/// Middleware state
#[derive(Clone)]
pub struct GateState {
    pub config: Arc<AuthConfig>,
    pub gate: Arc<GateConfig>,
}

/// Axum middleware wrapping [`evaluate`]
pub async fn edge_gate(
    State(state): State<GateState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let destination = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let token = platform::cookie::extract_cookie(req.headers(), &state.config.session_cookie_name);

    let decision = evaluate(
        &state.gate,
        &path,
        &destination,
        token.as_deref(),
        &state.config.session_secret,
        Utc::now(),
    );

    match decision {
        GateDecision::Pass => next.run(req).await,
        GateDecision::RedirectToLogin { location } | GateDecision::RedirectHome { location } => {
            redirect(&location)
        }
    }
}

fn redirect(location: &str) -> Response {
    match header::HeaderValue::from_str(location) {
        Ok(value) => {
            (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, value)]).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
