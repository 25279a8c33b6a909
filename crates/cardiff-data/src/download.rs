//! Ranged, resumable download of accounts archives.
//!
//! Archives run to multiple gigabytes, so they are fetched with ranged GET
//! requests and streamed to a named temporary file. A connection dropped
//! mid-range resumes from the byte offset reached rather than restarting
//! the archive.

use std::io::{Seek, SeekFrom, Write};

use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use tempfile::NamedTempFile;

use crate::error::{DataError, Result};

/// Configuration for ranged archive downloads.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Bytes requested per range request.
    pub range_size: u64,
    /// Write granularity for streamed chunks.
    pub chunk_size: usize,
    /// Resume attempts before the download fails.
    pub max_retries: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            range_size: 100 * 1024 * 1024,
            chunk_size: 64 * 1024,
            max_retries: 3,
        }
    }
}

/// Download an archive to a temporary file, range by range.
///
/// The file is deleted when the returned handle is dropped, so the caller
/// keeps it alive for as long as the archive is being read.
pub async fn download_archive(
    client: &reqwest::Client,
    url: &str,
    config: &DownloadConfig,
) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    let mut offset: u64 = 0;
    let mut retries = 0;

    loop {
        let end = offset + config.range_size - 1;
        let response = client
            .get(url)
            .header(RANGE, format!("bytes={offset}-{end}"))
            .send()
            .await?;

        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            // The previous range ended exactly at the end of the archive.
            break;
        }
        if !response.status().is_success() {
            return Err(DataError::Http(format!(
                "failed to fetch {url}: HTTP {}",
                response.status()
            )));
        }
        let ranged = response.status() == StatusCode::PARTIAL_CONTENT;

        let mut received: u64 = 0;
        let mut interrupted = false;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    for part in bytes.chunks(config.chunk_size.max(1)) {
                        file.write_all(part)?;
                    }
                    received += bytes.len() as u64;
                }
                Err(err) => {
                    retries += 1;
                    if retries > config.max_retries {
                        return Err(DataError::Network(err));
                    }
                    log::warn!("resuming {url} from byte {}: {err}", offset + received);
                    interrupted = true;
                    break;
                }
            }
        }

        if interrupted {
            if ranged {
                offset += received;
            } else {
                // The server ignored the range header, so a resume would
                // duplicate bytes; start the file over.
                offset = 0;
                file.as_file_mut().set_len(0)?;
                file.as_file_mut().seek(SeekFrom::Start(0))?;
            }
            continue;
        }

        offset += received;
        retries = 0;
        if !ranged || received < config.range_size {
            break;
        }
    }

    file.flush()?;
    file.as_file_mut().seek(SeekFrom::Start(0))?;
    Ok(file)
}
