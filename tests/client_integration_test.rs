use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tiny_http::{Header, Method, Response, Server};

use pwgup::api::{ApiError, PwgClient, categories, session};
use pwgup::category::{self, Lookup};
use pwgup::uploader::{self, UploadError};

// Use serial_test to prevent port conflicts
use serial_test::serial;

const TIMEOUT: Duration = Duration::from_secs(5);

/// One request as seen by the stub server: verb, the `pwg.*` method, all
/// query/form/multipart text parameters, the cookie header and the bytes of
/// the `file` part when there is one.
#[derive(Debug, Clone, Default)]
struct Recorded {
    post: bool,
    api_method: String,
    params: HashMap<String, String>,
    cookie: Option<String>,
    file: Option<Vec<u8>>,
}

type StubResponse = Response<Cursor<Vec<u8>>>;

fn ok_json(body: &serde_json::Value) -> StubResponse {
    Response::from_string(body.to_string())
        .with_header(Header::from_bytes("Content-Type", "application/json").unwrap())
}

fn start_stub<F>(port: u16, handler: F)
where
    F: Fn(&Recorded) -> StubResponse + Send + 'static,
{
    let server = Server::http(("127.0.0.1", port)).unwrap();
    thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let recorded = parse_request(&mut request);
            let _ = request.respond(handler(&recorded));
        }
    });
}

fn parse_request(request: &mut tiny_http::Request) -> Recorded {
    let mut recorded = Recorded {
        post: request.method() == &Method::Post,
        ..Recorded::default()
    };

    if let Some((_, query)) = request.url().split_once('?') {
        for (key, value) in parse_urlencoded(query.as_bytes()) {
            recorded.params.insert(key, value);
        }
    }

    let mut content_type = String::new();
    for header in request.headers() {
        if header.field.equiv("Cookie") {
            recorded.cookie = Some(header.value.as_str().to_string());
        }
        if header.field.equiv("Content-Type") {
            content_type = header.value.as_str().to_string();
        }
    }

    let mut body = Vec::new();
    request.as_reader().read_to_end(&mut body).unwrap();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        for (key, value) in parse_urlencoded(&body) {
            recorded.params.insert(key, value);
        }
    } else if let Some(boundary) = content_type
        .split("boundary=")
        .nth(1)
        .map(|b| b.trim_matches('"').to_string())
    {
        for part in parse_multipart(&body, &boundary) {
            if part.filename.is_some() && part.name == "file" {
                recorded.file = Some(part.data);
            } else {
                recorded
                    .params
                    .insert(part.name, String::from_utf8_lossy(&part.data).into_owned());
            }
        }
    }

    recorded.api_method = recorded.params.get("method").cloned().unwrap_or_default();
    recorded
}

fn parse_urlencoded(raw: &[u8]) -> Vec<(String, String)> {
    String::from_utf8_lossy(raw)
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((
                urlencoding::decode(key).ok()?.into_owned(),
                urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned(),
            ))
        })
        .collect()
}

struct MultipartPart {
    name: String,
    filename: Option<String>,
    data: Vec<u8>,
}

fn parse_multipart(body: &[u8], boundary: &str) -> Vec<MultipartPart> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();

    for segment in split_on(body, delimiter.as_bytes()).into_iter().skip(1) {
        if segment.starts_with(b"--") {
            break;
        }
        let segment = segment.strip_prefix(b"\r\n").unwrap_or(segment);
        let Some(split) = find(segment, b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&segment[..split]);
        let data = &segment[split + 4..];
        let data = data.strip_suffix(b"\r\n").unwrap_or(data).to_vec();

        let name = attr(&head, "name=\"").unwrap_or_default();
        let filename = attr(&head, "filename=\"");
        parts.push(MultipartPart {
            name,
            filename,
            data,
        });
    }

    parts
}

fn attr(head: &str, marker: &str) -> Option<String> {
    let start = head.find(marker)? + marker.len();
    let rest = &head[start..];
    Some(rest[..rest.find('"')?].to_string())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut segments = Vec::new();
    let mut rest = haystack;
    while let Some(at) = find(rest, needle) {
        segments.push(&rest[..at]);
        rest = &rest[at + needle.len()..];
    }
    segments.push(rest);
    segments
}

fn client(port: u16) -> PwgClient {
    PwgClient::new(&format!("http://127.0.0.1:{port}"), TIMEOUT).unwrap()
}

#[test]
#[serial]
fn login_takes_the_last_session_cookie() {
    let port = 7821;
    let seen = Arc::new(Mutex::new(Vec::<Recorded>::new()));
    let seen_by_stub = Arc::clone(&seen);
    start_stub(port, move |req| {
        seen_by_stub.lock().unwrap().push(req.clone());
        ok_json(&serde_json::json!({"stat": "ok", "result": true}))
            .with_header(Header::from_bytes("Set-Cookie", "pwg_id=first; path=/").unwrap())
            .with_header(Header::from_bytes("Set-Cookie", "other=nope; path=/").unwrap())
            .with_header(
                Header::from_bytes("Set-Cookie", "pwg_id=second; path=/; HttpOnly").unwrap(),
            )
    });

    let client = client(port);
    let mut session = session::Session::new();
    session::login(&client, &mut session, "alice", "secret").unwrap();

    assert_eq!(session.cookie.as_deref(), Some("second"));
    assert!(session.token.is_none());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].post);
    assert_eq!(seen[0].api_method, "pwg.session.login");
    assert_eq!(seen[0].params.get("username").map(String::as_str), Some("alice"));
    assert_eq!(seen[0].params.get("password").map(String::as_str), Some("secret"));
    assert_eq!(seen[0].cookie, None);
}

#[test]
#[serial]
fn status_check_acquires_token_and_chunk_size() {
    let port = 7822;
    start_stub(port, |req| {
        assert_eq!(req.api_method, "pwg.session.getStatus");
        ok_json(&serde_json::json!({
            "stat": "ok",
            "result": {
                "username": "alice",
                "pwg_token": "tok123",
                "upload_form_chunk_size": 500,
            }
        }))
    });

    let client = client(port);
    let mut session = session::Session::with_cookie("abc");
    let status = session::check_status(&client, &mut session).unwrap();

    assert_eq!(status.username, "alice");
    assert_eq!(status.chunk_size, 500_000);
    assert_eq!(session.chunk_size, 500_000);
    assert_eq!(session.token.as_deref(), Some("tok123"));
}

#[test]
#[serial]
fn guest_identity_rejects_the_cookie_and_establish_falls_back_to_login() {
    let port = 7823;
    let logins = Arc::new(AtomicUsize::new(0));
    let logins_by_stub = Arc::clone(&logins);
    start_stub(port, move |req| match req.api_method.as_str() {
        "pwg.session.getStatus" => {
            if req.cookie.as_deref() == Some("pwg_id=fresh") {
                ok_json(&serde_json::json!({
                    "stat": "ok",
                    "result": {
                        "username": "alice",
                        "pwg_token": "tok123",
                        "upload_form_chunk_size": 500,
                    }
                }))
            } else {
                ok_json(&serde_json::json!({
                    "stat": "ok",
                    "result": {"username": "guest"}
                }))
            }
        }
        "pwg.session.login" => {
            logins_by_stub.fetch_add(1, Ordering::SeqCst);
            ok_json(&serde_json::json!({"stat": "ok", "result": true}))
                .with_header(Header::from_bytes("Set-Cookie", "pwg_id=fresh; path=/").unwrap())
        }
        other => panic!("unexpected api method {other}"),
    });

    let client = client(port);
    let (session, status) =
        session::establish(&client, Some("stale"), Some(("alice", "secret"))).unwrap();

    assert_eq!(status.username, "alice");
    assert_eq!(session.cookie.as_deref(), Some("fresh"));
    assert_eq!(session.token.as_deref(), Some("tok123"));
    assert_eq!(logins.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn guest_identity_without_credentials_is_fatal() {
    let port = 7824;
    start_stub(port, |_req| {
        ok_json(&serde_json::json!({"stat": "ok", "result": {"username": "guest"}}))
    });

    let client = client(port);
    let result = session::establish(&client, Some("stale"), None);
    assert!(matches!(result, Err(ApiError::Auth(_))));
}

#[test]
#[serial]
fn protocol_failure_carries_the_server_message() {
    let port = 7825;
    start_stub(port, |_req| {
        ok_json(&serde_json::json!({
            "stat": "fail",
            "err": 999,
            "message": "Invalid username/password"
        }))
    });

    let client = client(port);
    let mut session = session::Session::new();
    match session::login(&client, &mut session, "alice", "wrong") {
        Err(ApiError::Auth(message)) => assert!(message.contains("Invalid username/password")),
        other => panic!("expected an auth failure, got {other:?}"),
    }
    // A failed envelope never leaves a usable session behind.
    assert!(session.cookie.is_none());

    // The same rejected envelope on a non-login call stays a protocol error.
    let mut stale = session::Session::with_cookie("abc");
    assert!(matches!(
        session::check_status(&client, &mut stale),
        Err(ApiError::Protocol(message)) if message == "Invalid username/password"
    ));
}

#[test]
#[serial]
fn non_json_bodies_are_surfaced_raw() {
    let port = 7826;
    start_stub(port, |_req| {
        Response::from_string("<html>boom</html>")
            .with_header(Header::from_bytes("Content-Type", "text/html").unwrap())
    });

    let client = client(port);
    let mut session = session::Session::with_cookie("abc");
    match session::check_status(&client, &mut session) {
        Err(ApiError::MalformedResponse { body }) => assert!(body.contains("boom")),
        other => panic!("expected a malformed response failure, got {other:?}"),
    }
}

#[test]
#[serial]
fn http_errors_are_transport_failures() {
    let port = 7827;
    start_stub(port, |_req| {
        Response::from_string("internal error").with_status_code(500)
    });

    let client = client(port);
    let mut session = session::Session::with_cookie("abc");
    assert!(matches!(
        session::check_status(&client, &mut session),
        Err(ApiError::Transport(status)) if status.as_u16() == 500
    ));
}

#[test]
#[serial]
fn lookup_resolves_names_against_the_flat_listing() {
    let port = 7828;
    start_stub(port, |req| {
        assert_eq!(req.api_method, "pwg.categories.getList");
        assert_eq!(req.params.get("recursive").map(String::as_str), Some("true"));
        assert_eq!(
            req.params.get("tree_output").map(String::as_str),
            Some("false")
        );
        ok_json(&serde_json::json!({
            "stat": "ok",
            "result": {
                "categories": [
                    {"id": 1, "name": "Holidays", "uppercats": "1"},
                    {"id": 5, "name": "Trips", "uppercats": "1,5"},
                ]
            }
        }))
    });

    let client = client(port);
    let session = session::Session::with_cookie("abc");
    match category::lookup(&client, &session, "trips").unwrap() {
        Lookup::Matched { id, path } => {
            assert_eq!(id, 5);
            assert_eq!(path, "Holidays::Trips");
        }
        other => panic!("expected a match, got {other:?}"),
    }
}

#[test]
#[serial]
fn numeric_lookup_makes_no_network_call() {
    let port = 7829;
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_by_stub = Arc::clone(&calls);
    start_stub(port, move |_req| {
        calls_by_stub.fetch_add(1, Ordering::SeqCst);
        ok_json(&serde_json::json!({"stat": "ok", "result": null}))
    });

    let client = client(port);
    let session = session::Session::with_cookie("abc");
    match category::lookup(&client, &session, "123").unwrap() {
        Lookup::Id(id) => assert_eq!(id, 123),
        other => panic!("expected a verbatim id, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
#[serial]
fn missing_category_creates_exactly_once_when_asked() {
    let port = 7830;
    let adds = Arc::new(AtomicUsize::new(0));
    let adds_by_stub = Arc::clone(&adds);
    start_stub(port, move |req| match req.api_method.as_str() {
        "pwg.categories.getList" => ok_json(&serde_json::json!({
            "stat": "ok",
            "result": {"categories": []}
        })),
        "pwg.categories.add" => {
            adds_by_stub.fetch_add(1, Ordering::SeqCst);
            assert_eq!(req.params.get("name").map(String::as_str), Some("NewAlbum"));
            assert!(!req.params.contains_key("parent"));
            ok_json(&serde_json::json!({"stat": "ok", "result": {"id": 42}}))
        }
        other => panic!("unexpected api method {other}"),
    });

    let client = client(port);
    let session = session::Session::with_cookie("abc");

    assert!(matches!(
        category::lookup(&client, &session, "NewAlbum").unwrap(),
        Lookup::Missing
    ));
    let id = categories::add(&client, &session, "NewAlbum", None, None).unwrap();
    assert_eq!(id, 42);
    assert_eq!(adds.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn chunked_upload_round_trips_the_file() {
    let port = 7831;
    let chunks = Arc::new(Mutex::new(Vec::<Recorded>::new()));
    let chunks_by_stub = Arc::clone(&chunks);
    start_stub(port, move |req| {
        assert_eq!(req.api_method, "pwg.images.upload");
        chunks_by_stub.lock().unwrap().push(req.clone());
        ok_json(&serde_json::json!({"stat": "ok", "result": {"image_id": 9}}))
    });

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("photo.jpg");
    let content: Vec<u8> = (0u32..1234).map(|i| (i % 251) as u8).collect();
    fs::write(&path, &content).unwrap();

    let client = client(port);
    let session = session::Session {
        cookie: Some("abc".to_string()),
        token: Some("tok123".to_string()),
        chunk_size: 500,
    };

    let mut progress = Vec::new();
    uploader::upload_file(&client, &session, &path, 77, |sent| progress.push(sent)).unwrap();

    assert_eq!(progress, vec![500, 500, 234]);

    let chunks = chunks.lock().unwrap();
    assert_eq!(chunks.len(), 3);
    let mut rebuilt = Vec::new();
    for (index, chunk) in chunks.iter().enumerate() {
        assert!(chunk.post);
        assert_eq!(chunk.cookie.as_deref(), Some("pwg_id=abc"));
        assert_eq!(
            chunk.params.get("chunk").map(String::as_str),
            Some(index.to_string().as_str())
        );
        assert_eq!(chunk.params.get("chunks").map(String::as_str), Some("3"));
        assert_eq!(chunk.params.get("category").map(String::as_str), Some("77"));
        assert_eq!(
            chunk.params.get("pwg_token").map(String::as_str),
            Some("tok123")
        );
        assert_eq!(
            chunk.params.get("name").map(String::as_str),
            Some("photo.jpg")
        );
        rebuilt.extend_from_slice(chunk.file.as_ref().unwrap());
    }
    assert_eq!(rebuilt, content);
}

#[test]
#[serial]
fn upload_requires_a_prior_status_check() {
    let port = 7832;
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_by_stub = Arc::clone(&calls);
    start_stub(port, move |_req| {
        calls_by_stub.fetch_add(1, Ordering::SeqCst);
        ok_json(&serde_json::json!({"stat": "ok", "result": null}))
    });

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("photo.jpg");
    fs::write(&path, b"data").unwrap();

    let client = client(port);
    let session = session::Session::with_cookie("abc");
    assert!(matches!(
        uploader::upload_file(&client, &session, &path, 77, |_| {}),
        Err(UploadError::NoChunkSize)
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
