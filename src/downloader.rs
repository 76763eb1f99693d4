//! Resumable, adaptively-chunked file download over a ranged GET.
//!
//! One [`download`] call owns its destination file handle and the transport
//! response for the duration of the transfer; both are released on every
//! exit path. See the component design for `Downloader`.

use std::path::Path;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::{
    Method,
    header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE},
};
use tokio::io::AsyncWriteExt;

use crate::{
    Result,
    error::RuntimeError,
    hooks::{HookBus, HookEvent, HookPayload},
};

/// The outcome of a completed (or already-complete) download.
#[derive(Debug, Clone, Copy)]
pub struct DownloadOutcome {
    pub status: u16,
    pub bytes_written: u64,
    pub total_size: Option<u64>,
    pub resumed: bool,
}

fn chunk_size_for(total: Option<u64>) -> usize {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    match total {
        Some(n) if n > 5 * GIB => 1024 * 1024,
        Some(n) if n > 500 * MIB => 512 * 1024,
        Some(n) if n > 10 * MIB => 256 * 1024,
        Some(_) => 64 * 1024,
        None => 16 * 1024,
    }
}

fn parse_content_range_total(value: &str) -> Option<u64> {
    // "bytes start-end/total"
    value.rsplit('/').next()?.parse().ok()
}

/// Performs one resumable download attempt. `headers` should already carry
/// auth and any caller-supplied headers; a `Range` header is added/removed
/// here as the resume logic dictates.
pub async fn download(
    http: &reqwest::Client,
    method: Method,
    url: &str,
    mut headers: HeaderMap,
    dest: &Path,
    resume: bool,
    hooks: &HookBus,
) -> Result<DownloadOutcome> {
    let existing = if resume {
        tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0)
    } else {
        0
    };

    let mut start = existing;
    if start > 0 {
        headers.insert(RANGE, format!("bytes={start}-").parse().unwrap());
    }

    let response = http
        .request(method.clone(), url)
        .headers(headers.clone())
        .send()
        .await
        .map_err(|source| RuntimeError::Transport {
            method: method.to_string(),
            url: url.to_string(),
            source,
        })?;

    let status = response.status();

    if status.as_u16() == 416 {
        return Ok(DownloadOutcome {
            status: 416,
            bytes_written: existing,
            total_size: Some(existing),
            resumed: true,
        });
    }

    let (response, status) = if start > 0 && (status.as_u16() != 206 || !response.headers().contains_key(CONTENT_RANGE)) {
        // server ignored the Range request: restart from scratch, without Range.
        start = 0;
        headers.remove(RANGE);
        let retry = http
            .request(method.clone(), url)
            .headers(headers)
            .send()
            .await
            .map_err(|source| RuntimeError::Transport {
                method: method.to_string(),
                url: url.to_string(),
                source,
            })?;
        let status = retry.status();
        (retry, status)
    } else {
        (response, status)
    };

    let total_size = response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_total)
        .or_else(|| {
            response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|len| len + start)
        });

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(start > 0)
        .truncate(start == 0)
        .open(dest)
        .await
        .map_err(|source| RuntimeError::Io {
            path: dest.to_path_buf(),
            source,
        })?;

    let chunk_size = chunk_size_for(total_size);
    let mut buffer: Vec<u8> = Vec::with_capacity(chunk_size);
    let mut downloaded: u64 = start;
    let mut last_reported: u64 = start;
    let report_threshold = total_size.map(|t| (t / 100).max(1));

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk: Bytes = chunk.map_err(|source| RuntimeError::Transport {
            method: method.to_string(),
            url: url.to_string(),
            source,
        })?;
        downloaded += chunk.len() as u64;
        buffer.extend_from_slice(&chunk);

        if buffer.len() >= chunk_size {
            flush(&mut file, &mut buffer, dest).await?;
        }

        if let Some(threshold) = report_threshold {
            if downloaded - last_reported > threshold {
                last_reported = downloaded;
                hooks.dispatch(
                    HookEvent::Progress,
                    HookPayload::Progress {
                        downloaded,
                        total: total_size,
                    },
                );
            }
        }
    }

    if !buffer.is_empty() {
        flush(&mut file, &mut buffer, dest).await?;
    }
    file.flush().await.map_err(|source| RuntimeError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    hooks.dispatch(
        HookEvent::Progress,
        HookPayload::Progress {
            downloaded,
            total: total_size,
        },
    );

    Ok(DownloadOutcome {
        status: status.as_u16(),
        bytes_written: downloaded,
        total_size,
        resumed: start > 0,
    })
}

async fn flush(file: &mut tokio::fs::File, buffer: &mut Vec<u8>, dest: &Path) -> Result<()> {
    file.write_all(buffer).await.map_err(|source| RuntimeError::Io {
        path: dest.to_path_buf(),
        source,
    })?;
    buffer.clear();
    Ok(())
}
