//! Session middleware for `Tally`.
//!
//! Reads the `authToken` cookie and verifies it. When the access token is
//! expired or otherwise invalid, the `refreshToken` cookie is exchanged for
//! a new access token, which is set on the response. Requests without a
//! usable session are redirected to `/login`.
//!
//! Nothing is cached between requests; every request is re-evaluated.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{debug, info};

use tally_core::error::TokenError;

use crate::error::AppError;
use crate::state::AppState;

/// Cookie carrying the access token.
pub const ACCESS_COOKIE: &str = "authToken";
/// Cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";
/// Where unauthenticated requests are sent.
pub const LOGIN_PATH: &str = "/login";

/// The authenticated user, injected into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    /// Lowercased username from the verified token.
    pub username: String,
}

/// Build an http-only session cookie scoped to the whole site.
#[must_use]
pub fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .secure(secure)
        .build()
}

/// Remove both session cookies from the jar.
#[must_use]
pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

/// Middleware that authenticates the session cookies.
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(access_token) = jar.get(ACCESS_COOKIE).map(|c| c.value().to_owned()) else {
        return redirect_to_login(jar);
    };

    let access_error = match state.tokens.verify_access(&access_token) {
        Ok(claims) => {
            req.extensions_mut().insert(SessionUser {
                username: claims.sub,
            });
            return next.run(req).await;
        }
        Err(e) => e,
    };

    debug!(reason = %access_error, "access token rejected, trying refresh token");

    let Some(refresh_token) = jar.get(REFRESH_COOKIE).map(|c| c.value().to_owned()) else {
        return redirect_to_login(jar);
    };

    match state.tokens.rotate_on_expiry(&refresh_token).await {
        Ok(rotation) => {
            req.extensions_mut().insert(SessionUser {
                username: rotation.username,
            });
            let response = next.run(req).await;
            // A handler that set or cleared the access cookie itself (logout) wins.
            if sets_cookie(&response, ACCESS_COOKIE) {
                return response;
            }
            let jar = jar.add(session_cookie(
                ACCESS_COOKIE,
                rotation.access_token,
                state.secure_cookies,
            ));
            (jar, response).into_response()
        }
        Err(e @ (TokenError::Revoked | TokenError::Invalid { .. } | TokenError::Expired)) => {
            info!(reason = %e, "refresh token rejected, session ended");
            redirect_to_login(jar)
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

fn sets_cookie(response: &Response, name: &str) -> bool {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split_once('=').is_some_and(|(k, _)| k.trim() == name))
}

fn redirect_to_login(jar: CookieJar) -> Response {
    (clear_session(jar), Redirect::to(LOGIN_PATH)).into_response()
}
