//! Piwigo web API plumbing.
//!
//! Every call goes to the single `/ws.php` endpoint and comes back as a JSON
//! envelope (`stat`, `message`, `result`). A call is described by a plain
//! [`ApiCall`] value (method name, verb, extra query/form fields) and executed
//! by [`PwgClient::execute`]; multipart uploads share the same response
//! decoding via [`PwgClient::execute_multipart`]. No retries happen here,
//! callers decide what a failure means.

use reqwest::StatusCode;
use reqwest::blocking::multipart::Form;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, SET_COOKIE};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub mod categories;
pub mod session;
pub mod upload;

pub const ENDPOINT: &str = "/ws.php";

/// Name of the cookie carrying the Piwigo session id.
pub const SESSION_COOKIE: &str = "pwg_id";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed with HTTP status {0}")]
    Transport(StatusCode),

    #[error("server rejected request: {0}")]
    Protocol(String),

    #[error("server returned a body that is not valid JSON: {body}")]
    MalformedResponse { body: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("could not decode result payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
}

/// Description of one API call. The envelope adds `format=json` and places
/// `method` in the query string (GET) or the body (POST).
#[derive(Debug, Clone)]
pub struct ApiCall {
    pub method: &'static str,
    pub verb: Verb,
    query: Vec<(&'static str, String)>,
    form: Vec<(&'static str, String)>,
}

impl ApiCall {
    pub fn get(method: &'static str) -> Self {
        Self {
            method,
            verb: Verb::Get,
            query: Vec::new(),
            form: Vec::new(),
        }
    }

    pub fn post(method: &'static str) -> Self {
        Self {
            method,
            verb: Verb::Post,
            query: Vec::new(),
            form: Vec::new(),
        }
    }

    pub fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    pub fn form(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.form.push((key, value.into()));
        self
    }
}

/// Decoded success envelope: the `result` payload plus every raw
/// `Set-Cookie` header value (login needs them).
#[derive(Debug)]
pub struct ApiResponse {
    pub result: Value,
    pub set_cookies: Vec<String>,
}

pub struct PwgClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl PwgClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, ENDPOINT)
    }

    pub fn execute(&self, call: &ApiCall, cookie: Option<&str>) -> Result<ApiResponse, ApiError> {
        let url = self.endpoint();

        let mut query: Vec<(&str, &str)> = vec![("format", "json")];
        if call.verb == Verb::Get {
            query.push(("method", call.method));
        }
        for (key, value) in &call.query {
            query.push((key, value.as_str()));
        }

        let request = match call.verb {
            Verb::Get => self
                .http
                .get(&url)
                .query(&query)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8"),
            Verb::Post => {
                let mut form: Vec<(&str, &str)> = vec![("method", call.method)];
                for (key, value) in &call.form {
                    form.push((key, value.as_str()));
                }
                self.http.post(&url).query(&query).form(&form)
            }
        };

        let request = request.header(ACCEPT, "application/json");
        let request = match cookie {
            Some(value) => request.header(COOKIE, format!("{SESSION_COOKIE}={value}")),
            None => request,
        };

        decode(request.send()?)
    }

    /// POST a multipart form to the endpoint. The `method` field is added to
    /// the form body, mirroring what `execute` does for plain POSTs.
    pub fn execute_multipart(
        &self,
        method: &'static str,
        form: Form,
        cookie: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let form = form.text("method", method);
        let request = self
            .http
            .post(self.endpoint())
            .query(&[("format", "json")])
            .header(ACCEPT, "application/json")
            .multipart(form);
        let request = match cookie {
            Some(value) => request.header(COOKIE, format!("{SESSION_COOKIE}={value}")),
            None => request,
        };

        decode(request.send()?)
    }
}

fn decode(response: reqwest::blocking::Response) -> Result<ApiResponse, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Transport(status));
    }

    let set_cookies = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_owned)
        .collect();

    let body = response.text()?;
    let envelope: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(_) => {
            // Surface the raw body; multipart upload failures in particular
            // come back as HTML or PHP warnings rather than an envelope.
            log::error!("server returned a non-JSON body:\n{body}");
            return Err(ApiError::MalformedResponse { body });
        }
    };

    if envelope.get("stat").and_then(Value::as_str) != Some("ok") {
        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message")
            .to_string();
        return Err(ApiError::Protocol(message));
    }

    Ok(ApiResponse {
        result: envelope.get("result").cloned().unwrap_or(Value::Null),
        set_cookies,
    })
}
