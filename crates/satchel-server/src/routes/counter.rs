//! Demo routes: a per-session visit counter and session deletion.

use axum::{
    Router,
    extract::State,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use satchel_session::Error as SessionError;
use tracing::debug;

use crate::cookies::{RequestCookies, ResponseCookies};
use crate::error::Result;
use crate::state::AppState;

const COUNTER_KEY: &str = "counter";

/// Increment the session's counter and show it.
pub async fn counter_handler(State(state): State<AppState>, cookies: RequestCookies) -> Response {
    let mut response = ResponseCookies::new();

    match increment(&state, &cookies, &mut response).await {
        Ok(count) => (response, Html(format!("<h1>Hello World {count}</h1>"))).into_response(),
        Err(e) => (response, e).into_response(),
    }
}

async fn increment(
    state: &AppState,
    cookies: &RequestCookies,
    response: &mut ResponseCookies,
) -> Result<i64> {
    let name = state.cookie_name();

    let mut session = match state.sessions.resolve(cookies, response, name).await {
        Ok(session) => session,
        Err(SessionError::SessionExpired(id)) => {
            // Clear the stale cookie so the next request starts fresh.
            state.sessions.delete(cookies, response, name).await;
            return Err(SessionError::SessionExpired(id).into());
        }
        Err(e) => return Err(e.into()),
    };

    let count = match session.decode::<i64>(COUNTER_KEY) {
        Ok(count) => count + 1,
        Err(SessionError::ValueAbsent(_)) => 1,
        Err(e) => return Err(e.into()),
    };

    state
        .sessions
        .set_and_save(&mut session, COUNTER_KEY, count, response)
        .await?;

    debug!(session_id = %session.id(), count, "Counter incremented");
    Ok(count)
}

/// Delete the caller's session.
pub async fn delete_session_handler(
    State(state): State<AppState>,
    cookies: RequestCookies,
) -> (ResponseCookies, &'static str) {
    let mut response = ResponseCookies::new();
    state
        .sessions
        .delete(&cookies, &mut response, state.cookie_name())
        .await;
    (response, "session deleted")
}

/// Create the demo session routes.
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(counter_handler))
        .route("/delete-session", get(delete_session_handler))
}
