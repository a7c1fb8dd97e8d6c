//! Account routes: signup, login, logout.
//!
//! `POST /signup` and `POST /login` are public. `GET /logout` requires a
//! session and is mounted behind the session middleware.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::extract::AppJson;
use crate::middleware::{
    ACCESS_COOKIE, LOGIN_PATH, REFRESH_COOKIE, SessionUser, clear_session, session_cookie,
};
use crate::state::AppState;

/// Build the public signup/login router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

/// Build the router for routes that need an authenticated session.
pub fn session_router() -> Router<Arc<AppState>> {
    Router::new().route("/logout", get(logout))
}

// ── Request / Response types ─────────────────────────────────────────

/// Signup and login body. Missing fields fail validation as empty strings.
#[derive(Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn signup(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<CredentialsRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    state.accounts.signup(&body.username, &body.password).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User created successfully.",
        }),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(body): AppJson<CredentialsRequest>,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    let session = state.accounts.login(&body.username, &body.password).await?;

    let jar = jar
        .add(session_cookie(
            REFRESH_COOKIE,
            session.refresh_token,
            state.secure_cookies,
        ))
        .add(session_cookie(
            ACCESS_COOKIE,
            session.access_token,
            state.secure_cookies,
        ));

    Ok((
        jar,
        Json(MessageResponse {
            message: "Login successful.",
        }),
    ))
}

/// Revoke every refresh token of the user and clear the cookies.
async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    state.accounts.logout(&user.username).await?;
    Ok((clear_session(jar), Redirect::to(LOGIN_PATH)))
}
