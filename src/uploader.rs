//! Chunked file upload orchestration.
//!
//! A file is cut into `chunk_size`-byte pieces and each piece is POSTed as
//! an independent multipart request, in strictly ascending index order. The
//! declared total is computed once and repeated on every request; the server
//! reassembles by file name + chunk index + total.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::api::session::Session;
use crate::api::upload::{self, ChunkUpload};
use crate::api::{ApiError, PwgClient};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("server did not advertise a chunk size; check session status before uploading")]
    NoChunkSize,

    #[error("session has no upload token; check session status before uploading")]
    NoUploadToken,

    #[error("{0} is empty; zero-byte files cannot be uploaded")]
    EmptyFile(PathBuf),

    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Number of chunk requests a file of `total` bytes produces.
pub fn chunk_count(total: u64, chunk_size: u64) -> u64 {
    total.div_ceil(chunk_size)
}

/// Yields consecutive chunks of up to `chunk_size` bytes; the final chunk
/// holds the remainder. Each chunk is fully buffered before being returned.
pub struct ChunkReader<R> {
    reader: R,
    chunk_size: u64,
    remaining: u64,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(reader: R, total: u64, chunk_size: u64) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            reader,
            chunk_size,
            remaining: total,
        }
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let len = self.remaining.min(self.chunk_size) as usize;
        let mut buf = vec![0u8; len];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => {
                self.remaining -= len as u64;
                Some(Ok(buf))
            }
            Err(err) => {
                self.remaining = 0;
                Some(Err(err))
            }
        }
    }
}

/// Upload one file into a category. `progress` fires once per uploaded
/// chunk with the bytes just transferred.
///
/// Any chunk failure aborts the whole file; there is no resume, a retried
/// upload restarts from chunk 0.
pub fn upload_file(
    client: &PwgClient,
    session: &Session,
    path: &Path,
    category_id: u64,
    mut progress: impl FnMut(u64),
) -> Result<(), UploadError> {
    if session.chunk_size == 0 {
        return Err(UploadError::NoChunkSize);
    }
    let token = session.token.as_deref().ok_or(UploadError::NoUploadToken)?;

    let total = fs::metadata(path)
        .map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if total == 0 {
        return Err(UploadError::EmptyFile(path.to_path_buf()));
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let max_chunks = chunk_count(total, session.chunk_size);

    let file = File::open(path).map_err(|source| UploadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let chunks = ChunkReader::new(file, total, session.chunk_size);

    log::info!(
        "uploading {} ({} bytes, {} chunk{})",
        path.display(),
        total,
        max_chunks,
        if max_chunks == 1 { "" } else { "s" }
    );

    for (chunk_num, chunk) in chunks.enumerate() {
        let data = chunk.map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let sent = data.len() as u64;

        upload::send_chunk(
            client,
            session,
            &ChunkUpload {
                category_id,
                chunk_num: chunk_num as u64,
                max_chunks,
                file_name: &file_name,
                mime: mime.as_ref(),
                token,
            },
            data,
        )?;

        progress(sent);
        log::debug!(
            "chunk {}/{} of {} uploaded",
            chunk_num as u64 + 1,
            max_chunks,
            file_name
        );
    }

    Ok(())
}
