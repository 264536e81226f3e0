//! The chunk upload call.

use reqwest::blocking::multipart::{Form, Part};

use super::session::Session;
use super::{ApiError, PwgClient};

/// Metadata accompanying one chunk of a file. The server reassembles by
/// `name` + `chunk` index + `chunks` total, so `chunks` must be identical on
/// every request of one upload.
#[derive(Debug)]
pub struct ChunkUpload<'a> {
    pub category_id: u64,
    pub chunk_num: u64,
    pub max_chunks: u64,
    /// Base name of the destination file, not the full local path.
    pub file_name: &'a str,
    pub mime: &'a str,
    pub token: &'a str,
}

pub fn send_chunk(
    client: &PwgClient,
    session: &Session,
    chunk: &ChunkUpload<'_>,
    data: Vec<u8>,
) -> Result<(), ApiError> {
    let part = Part::bytes(data)
        .file_name(chunk.file_name.to_string())
        .mime_str(chunk.mime)?;

    let form = Form::new()
        .text("chunk", chunk.chunk_num.to_string())
        .text("chunks", chunk.max_chunks.to_string())
        .text("category", chunk.category_id.to_string())
        .text("pwg_token", chunk.token.to_string())
        .text("name", chunk.file_name.to_string())
        .part("file", part);

    client.execute_multipart("pwg.images.upload", form, Some(session.require_cookie()?))?;
    Ok(())
}
