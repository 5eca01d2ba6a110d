//! HTTP front end: turns axum requests into [`Request`]s and
//! [`Response`]s back into HTTP.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::{Json, Router};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use deskd_types::SessionId;

use crate::constants::{COOKIE_ATTRIBUTES, MAX_BODY_BYTES};
use crate::dispatch::{Dispatcher, Outcome, Request, Response};

/// Build the router. Every path goes through the dispatcher.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .fallback(handle)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(dispatcher)
}

async fn handle(
    State(dispatcher): State<Arc<Dispatcher>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    let cookie_name = dispatcher.instance().config.session.cookie_name.clone();

    let query = match Query::<HashMap<String, String>>::try_from_uri(&uri) {
        Ok(Query(params)) => params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<Map<_, _>>(),
        Err(e) => {
            warn!(error = %e, "unparseable query string");
            Map::new()
        }
    };

    let request = Request {
        method,
        path: uri.path().to_string(),
        query,
        body,
        session: session_cookie(&headers, &cookie_name),
    };

    // Dropping the guard (client disconnect drops this future) cancels
    // in-flight backend work.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let outcome = dispatcher.handle(request, cancel).await;
    guard.disarm();

    into_http(outcome, &cookie_name)
}

/// Find the session id in the `Cookie` header.
fn session_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<SessionId> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .and_then(|(_, value)| SessionId::parse(value).ok())
}

fn into_http(outcome: Outcome, cookie_name: &str) -> HttpResponse {
    let mut response = outcome.response.into_response();
    if outcome.new_session {
        let cookie = format!("{}={}; {}", cookie_name, outcome.session, COOKIE_ATTRIBUTES);
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().insert(SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "invalid session cookie"),
        }
    }
    response
}

impl IntoResponse for Response {
    fn into_response(self) -> HttpResponse {
        match self {
            Response::Json { status, body } => (status, Json(body)).into_response(),
            Response::Raw { mime, data } => {
                ([(CONTENT_TYPE, mime)], Body::from(data)).into_response()
            }
            Response::NotFound => StatusCode::NOT_FOUND.into_response(),
        }
    }
}
