//! Command handlers. All interaction lives here: prompts, progress bars,
//! operator-facing output. The library modules underneath never touch the
//! terminal.

use anyhow::{Context, Result, bail};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::api::categories::{self, Privacy};
use crate::api::session::{self, Session};
use crate::api::PwgClient;
use crate::category::{self, Lookup, ResolveError};
use crate::config::{ConnectionConfig, DEFAULT_TIMEOUT};
use crate::{files, uploader};

pub fn upload(
    conn: &ConnectionConfig,
    category: &str,
    create: bool,
    recurse: bool,
    file_args: &[String],
) -> Result<()> {
    // Validate the file list before any network traffic.
    let files = files::collect(file_args, recurse)?;

    let client = connect(conn)?;
    let (session, _status) = authenticate(&client, conn)?;

    let category_id = match resolve_category(&client, &session, category, create)? {
        Some(id) => id,
        None => {
            log::info!("aborted; nothing uploaded");
            return Ok(());
        }
    };

    for (path, size) in &files {
        let bar = byte_progress_bar(*size, path);
        let result = uploader::upload_file(&client, &session, path, category_id, |sent| {
            bar.inc(sent)
        });
        bar.finish_and_clear();
        result.with_context(|| format!("upload of {} failed", path.display()))?;
        log::info!("uploaded {} ({} bytes)", path.display(), size);
    }

    Ok(())
}

pub fn albums(conn: &ConnectionConfig) -> Result<()> {
    let client = connect(conn)?;
    let (session, _status) = authenticate(&client, conn)?;
    let forest = categories::fetch_tree(&client, &session)?;
    print!("{}", category::render_tree(&forest));
    Ok(())
}

pub fn mkalbum(
    conn: &ConnectionConfig,
    name: &str,
    parent: Option<u64>,
    privacy: Option<Privacy>,
) -> Result<()> {
    let client = connect(conn)?;
    let (session, _status) = authenticate(&client, conn)?;
    let id = categories::add(&client, &session, name, parent, privacy)?;
    log::info!("created category {id} {name}");
    Ok(())
}

pub fn status(conn: &ConnectionConfig) -> Result<()> {
    let client = connect(conn)?;
    let (_session, status) = authenticate(&client, conn)?;
    log::info!(
        "session is valid: user {}, upload chunk size {} bytes",
        status.username,
        status.chunk_size
    );
    Ok(())
}

pub fn logout(conn: &ConnectionConfig) -> Result<()> {
    let client = connect(conn)?;
    let (mut session, _status) = authenticate(&client, conn)?;
    session::logout(&client, &mut session);
    log::info!("logged out");
    Ok(())
}

fn connect(conn: &ConnectionConfig) -> Result<PwgClient> {
    let base_url = match conn.base_url.as_deref() {
        Some(url) => url,
        None => bail!("you must set a value for base_url"),
    };
    let timeout = conn.timeout.unwrap_or(DEFAULT_TIMEOUT);
    PwgClient::new(base_url, timeout).context("could not build HTTP client")
}

fn authenticate(
    client: &PwgClient,
    conn: &ConnectionConfig,
) -> Result<(Session, session::SessionStatus)> {
    let credentials = match (conn.username.as_deref(), conn.password.as_deref()) {
        (Some(username), Some(password)) => Some((username, password)),
        _ => None,
    };
    if conn.cookie.is_none() && credentials.is_none() {
        bail!("you must set username and password (or a session cookie)");
    }

    session::establish(client, conn.cookie.as_deref(), credentials)
        .context("could not establish a session")
}

/// Turn the resolver's outcome into a category id, prompting on a miss.
/// `Ok(None)` means the operator declined to create the category; callers
/// treat that as a clean exit, not an error.
fn resolve_category(
    client: &PwgClient,
    session: &Session,
    input: &str,
    create: bool,
) -> Result<Option<u64>> {
    match category::lookup(client, session, input) {
        Ok(Lookup::Id(id)) => Ok(Some(id)),
        Ok(Lookup::Matched { id, path }) => {
            log::info!("uploading to category {id} {path}");
            Ok(Some(id))
        }
        Ok(Lookup::Missing) => {
            if !create {
                let confirmed = Confirm::new()
                    .with_prompt(format!("No matches found for category '{input}'. Create it?"))
                    .default(false)
                    .interact()
                    .map_err(|e| anyhow::anyhow!("prompt failed: {e}"))?;
                if !confirmed {
                    return Ok(None);
                }
            }
            let id = categories::add(client, session, input, None, None)?;
            log::info!("created category {id} {input}");
            Ok(Some(id))
        }
        Err(ResolveError::Ambiguous { name, candidates }) => {
            log::error!("multiple matches found for category '{name}':");
            for candidate in &candidates {
                log::error!("  ({}) {}", candidate.id, candidate.path);
            }
            bail!("category '{name}' is ambiguous; pass a numeric id instead");
        }
        Err(ResolveError::Api(err)) => Err(err.into()),
    }
}

fn byte_progress_bar(total: u64, path: &Path) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{msg} {spinner:.green} {bytes}/{total_bytes} ({percent}%) [{bar:40.cyan/blue}] {eta}",
    )
    .unwrap()
    .progress_chars("=>-");
    bar.set_style(style);
    bar.set_message(
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
    );
    bar
}
