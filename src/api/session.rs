//! Session lifecycle: login, status check, logout.
//!
//! A [`Session`] is a plain value passed into every authenticated call.
//! [`establish`] drives the cookie-first flow: validate an externally
//! supplied cookie when there is one, fall back to a password login exactly
//! once when it is rejected.

use serde::Deserialize;

use super::{ApiCall, ApiError, PwgClient, SESSION_COOKIE};

/// Identity Piwigo reports for unauthenticated sessions.
pub const GUEST_USER: &str = "guest";

#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Value of the session cookie, present after login or when supplied
    /// externally (config file or `--cookie`).
    pub cookie: Option<String>,
    /// Upload token from the last successful status check.
    pub token: Option<String>,
    /// Server-advertised chunk size in bytes; 0 until a status check succeeds.
    pub chunk_size: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie(cookie: impl Into<String>) -> Self {
        Self {
            cookie: Some(cookie.into()),
            ..Self::default()
        }
    }

    /// The session cookie, or an auth failure before any network I/O.
    pub fn require_cookie(&self) -> Result<&str, ApiError> {
        self.cookie
            .as_deref()
            .ok_or_else(|| ApiError::Auth("no session cookie; log in first".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub username: String,
    pub chunk_size: u64,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    username: String,
    pwg_token: Option<String>,
    upload_form_chunk_size: Option<u64>,
}

pub fn login(
    client: &PwgClient,
    session: &mut Session,
    username: &str,
    password: &str,
) -> Result<(), ApiError> {
    let call = ApiCall::post("pwg.session.login")
        .form("username", username)
        .form("password", password);
    let response = client.execute(&call, None).map_err(|err| match err {
        ApiError::Protocol(message) => ApiError::Auth(format!("login rejected: {message}")),
        other => other,
    })?;

    let cookie = extract_session_cookie(&response.set_cookies).ok_or_else(|| {
        ApiError::Auth("login succeeded but no session cookie was returned".to_string())
    })?;

    session.cookie = Some(cookie);
    session.token = None;
    session.chunk_size = 0;
    Ok(())
}

/// Validate the current cookie and pick up the upload token and chunk size.
///
/// A guest identity means the cookie is not actually authenticated; the
/// token is left unset and the caller must fall back to a password login.
pub fn check_status(client: &PwgClient, session: &mut Session) -> Result<SessionStatus, ApiError> {
    let cookie = session.require_cookie()?.to_string();
    let call = ApiCall::get("pwg.session.getStatus");
    let response = client.execute(&call, Some(&cookie))?;

    let payload: StatusPayload = serde_json::from_value(response.result)?;
    if payload.username == GUEST_USER {
        return Err(ApiError::Auth(
            "session cookie is not authenticated (guest identity)".to_string(),
        ));
    }

    // The server advertises the chunk size in kilobytes.
    let chunk_size = payload.upload_form_chunk_size.unwrap_or(0) * 1000;
    session.token = payload.pwg_token;
    session.chunk_size = chunk_size;

    Ok(SessionStatus {
        username: payload.username,
        chunk_size,
    })
}

/// Best-effort logout: local cookie and token are cleared no matter what the
/// server says.
pub fn logout(client: &PwgClient, session: &mut Session) {
    let cookie = session.cookie.take();
    session.token = None;
    session.chunk_size = 0;

    if let Some(cookie) = cookie {
        let call = ApiCall::post("pwg.session.logout");
        if let Err(err) = client.execute(&call, Some(&cookie)) {
            log::warn!("server-side logout failed: {err}");
        }
    }
}

/// Establish a token-acquired session from whatever auth material is
/// configured. A rejected external cookie falls back to a password login
/// exactly once; a rejection after that is fatal.
pub fn establish(
    client: &PwgClient,
    cookie: Option<&str>,
    credentials: Option<(&str, &str)>,
) -> Result<(Session, SessionStatus), ApiError> {
    if let Some(value) = cookie {
        let mut session = Session::with_cookie(value);
        match check_status(client, &mut session) {
            Ok(status) => {
                log::info!("resumed session as {}", status.username);
                return Ok((session, status));
            }
            Err(ApiError::Auth(reason)) => {
                log::warn!("session cookie rejected ({reason}); falling back to password login");
            }
            Err(err) => return Err(err),
        }
    }

    let (username, password) = credentials.ok_or_else(|| {
        ApiError::Auth("no valid session cookie and no credentials configured".to_string())
    })?;

    let mut session = Session::new();
    login(client, &mut session, username, password)?;
    let status = check_status(client, &mut session)?;
    log::info!("logged in as {}", status.username);
    Ok((session, status))
}

/// Pick the session cookie out of raw `Set-Cookie` header values. The last
/// matching value wins; servers can emit several across redirects.
fn extract_session_cookie(set_cookies: &[String]) -> Option<String> {
    set_cookies.iter().rev().find_map(|raw| {
        let (name, rest) = raw.split_once('=')?;
        if name.trim() != SESSION_COOKIE {
            return None;
        }
        Some(rest.split(';').next().unwrap_or("").trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_matching_cookie_wins() {
        let cookies = vec![
            "pwg_id=first; path=/".to_string(),
            "other=nope; path=/".to_string(),
            "pwg_id=second; path=/; HttpOnly".to_string(),
        ];
        assert_eq!(extract_session_cookie(&cookies).as_deref(), Some("second"));
    }

    #[test]
    fn no_session_cookie_yields_none() {
        let cookies = vec!["theme=dark; path=/".to_string()];
        assert_eq!(extract_session_cookie(&cookies), None);
    }

    #[test]
    fn cookie_value_is_stripped_of_attributes() {
        let cookies = vec!["pwg_id=abc123".to_string()];
        assert_eq!(extract_session_cookie(&cookies).as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_cookie_fails_before_any_network_call() {
        let session = Session::new();
        assert!(matches!(session.require_cookie(), Err(ApiError::Auth(_))));
    }
}
