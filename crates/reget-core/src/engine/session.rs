//! Transfer session - one HTTP request/response cycle
//!
//! A session issues a (possibly ranged) GET, streams the body into the task's
//! temp file and, once the body is exhausted, renames the temp file onto the
//! destination. It never fails across its boundary: every ending is reported
//! as a [`SessionOutcome`] and all intermediate state goes through a
//! [`TransferSink`], so the owning task stays the only place where status
//! changes happen.

use crate::error::DownloadError;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use reget_types::Validator;
use reqwest::header::{
    HeaderMap, HeaderName, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, ETAG, IF_RANGE,
    LAST_MODIFIED, RANGE,
};
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

/// Minimum spacing between progress notifications
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Everything a session needs to know before issuing its request
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub url: Url,
    pub temp_path: PathBuf,
    pub destination_path: PathBuf,
    /// First byte to request; 0 means a plain, unconditional GET
    pub offset: u64,
    pub buffer_size: usize,
    /// Sent as `If-Range` when `offset > 0`
    pub validator: Validator,
}

/// What the server told us about the resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status: u16,
    pub accepts_ranges: bool,
    pub validator: Validator,
    /// Offset of the first body byte within the resource
    pub start_offset: u64,
    pub total_length: Option<u64>,
}

impl ResponseMeta {
    /// Range support plus at least one validator
    pub fn is_resumable(&self) -> bool {
        self.accepts_ranges && !self.validator.is_empty()
    }
}

/// Receives a session's intermediate reports
pub trait TransferSink: Send + Sync {
    /// Response headers were accepted; the body is about to stream
    fn on_headers(&self, meta: &ResponseMeta);

    /// A chunk of `len` bytes was written and flushed `elapsed_ms` after the
    /// previous one. `downloaded` is the new end offset of the temp file.
    fn on_chunk(&self, len: u64, elapsed_ms: u64, downloaded: u64);

    /// Throttled progress notification
    fn on_progress(&self, downloaded: u64, total: Option<u64>);
}

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Body fully received and renamed onto the destination
    Completed { bytes: u64 },
    /// The cancellation token fired; partial data was left in place
    Cancelled,
    Failed(DownloadError),
}

/// A single request/response cycle for one task
pub struct TransferSession {
    client: Client,
    plan: SessionPlan,
    token: CancellationToken,
}

impl TransferSession {
    pub fn new(client: Client, plan: SessionPlan, token: CancellationToken) -> Self {
        Self {
            client,
            plan,
            token,
        }
    }

    pub fn plan(&self) -> &SessionPlan {
        &self.plan
    }

    /// Run the session to its end. The response and the temp file handle are
    /// dropped before this returns, whatever the outcome.
    pub async fn run(self, sink: &dyn TransferSink) -> SessionOutcome {
        match self.execute(sink).await {
            Ok(Some(bytes)) => SessionOutcome::Completed { bytes },
            Ok(None) => SessionOutcome::Cancelled,
            Err(_) if self.token.is_cancelled() => SessionOutcome::Cancelled,
            Err(e) => SessionOutcome::Failed(e),
        }
    }

    /// `Ok(None)` means cancelled
    async fn execute(&self, sink: &dyn TransferSink) -> Result<Option<u64>, DownloadError> {
        let plan = &self.plan;

        let mut request = self.client.get(plan.url.clone());
        if plan.offset > 0 {
            request = request.header(RANGE, format!("bytes={}-", plan.offset));
            if let Some(if_range) = plan.validator.if_range() {
                request = request.header(IF_RANGE, if_range);
            }
            info!("Requesting {} from byte {}", plan.url, plan.offset);
        } else {
            info!("Requesting {}", plan.url);
        }

        let response = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Ok(None),
            response = request.send() => response?,
        };

        let status = response.status();
        if plan.offset > 0
            && (status == StatusCode::OK || status == StatusCode::PRECONDITION_FAILED)
        {
            // The server refused the conditional range: the resource changed
            return Err(DownloadError::StaleRange);
        }
        if !status.is_success() {
            return Err(DownloadError::Server {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("Unexpected status")
                    .to_string(),
            });
        }

        let meta = parse_response_meta(status, response.headers(), plan.offset)?;
        debug!("Response metadata for {}: {:?}", plan.url, meta);

        let mut file = open_at(&plan.temp_path, meta.start_offset).await?;
        sink.on_headers(&meta);

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let mut reader = StreamReader::new(body);
        let mut buffer = vec![0u8; plan.buffer_size.max(1)];
        let mut downloaded = meta.start_offset;
        let mut last_chunk = Instant::now();
        let mut last_progress = Instant::now();

        loop {
            let read = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    file.flush().await?;
                    info!("Transfer of {} interrupted at byte {}", plan.url, downloaded);
                    return Ok(None);
                }
                read = reader.read(&mut buffer) => read?,
            };
            if read == 0 {
                break;
            }

            file.write_all(&buffer[..read]).await?;
            file.flush().await?;
            downloaded += read as u64;

            let elapsed_ms = last_chunk.elapsed().as_millis() as u64;
            last_chunk = Instant::now();
            sink.on_chunk(read as u64, elapsed_ms, downloaded);

            if last_progress.elapsed() >= PROGRESS_INTERVAL {
                sink.on_progress(downloaded, meta.total_length);
                last_progress = Instant::now();
            }
        }

        sink.on_progress(downloaded, meta.total_length);
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = meta.total_length {
            if downloaded != expected {
                return Err(DownloadError::IncompleteTransfer {
                    expected,
                    received: downloaded,
                });
            }
        }

        tokio::fs::rename(&plan.temp_path, &plan.destination_path).await?;
        info!(
            "Finished {} ({} bytes) -> {}",
            plan.url,
            downloaded,
            plan.destination_path.display()
        );
        Ok(Some(downloaded))
    }
}

/// Open the temp file for writing at `offset`, dropping anything past it.
///
/// Bytes before `offset` must already be on disk; a server that starts its
/// range beyond what we hold would leave a hole in the file.
async fn open_at(path: &Path, offset: u64) -> Result<File, DownloadError> {
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .await?;

    let on_disk = file.metadata().await?.len();
    if offset > on_disk {
        return Err(DownloadError::InvalidResponse(format!(
            "range starts at byte {} but only {} bytes are on disk",
            offset, on_disk
        )));
    }

    file.set_len(offset).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    Ok(file)
}

/// Extract range support, validator, start offset and total length
pub fn parse_response_meta(
    status: StatusCode,
    headers: &HeaderMap,
    requested_offset: u64,
) -> Result<ResponseMeta, DownloadError> {
    let header = |name: HeaderName| header_str(headers, name);

    let partial = status == StatusCode::PARTIAL_CONTENT;
    let accepts_ranges = partial
        || header(ACCEPT_RANGES)
            .map(|v| v.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")))
            .unwrap_or(false);

    let etag = header(ETAG).map(|s| s.to_string());
    let last_modified = header(LAST_MODIFIED).and_then(parse_http_date);
    let content_length = header(CONTENT_LENGTH).and_then(|v| v.trim().parse::<u64>().ok());

    let (start_offset, total_length) = if partial {
        match header(CONTENT_RANGE) {
            Some(value) => {
                let (start, total) = parse_content_range(value).ok_or_else(|| {
                    DownloadError::InvalidResponse(format!("malformed Content-Range: {}", value))
                })?;
                (start, total.or(content_length.map(|len| start + len)))
            }
            None => (requested_offset, content_length.map(|len| requested_offset + len)),
        }
    } else {
        (0, content_length)
    };

    Ok(ResponseMeta {
        status: status.as_u16(),
        accepts_ranges,
        validator: Validator::new(etag, last_modified),
        start_offset,
        total_length,
    })
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parse `bytes <start>-<end>/<total>` into the start and (if declared) total
pub fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let spec = value.trim().strip_prefix("bytes")?.trim();
    let (range, total) = spec.split_once('/')?;
    let (start, _end) = range.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((start, total))
}

/// Parse an HTTP-date (`Wed, 21 Oct 2015 07:28:00 GMT`)
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(reqwest::header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(
            parse_content_range("bytes 400-999/1000"),
            Some((400, Some(1000)))
        );
        assert_eq!(parse_content_range("bytes 0-99/*"), Some((0, None)));
        assert_eq!(parse_content_range("items 0-1/2"), None);
        assert_eq!(parse_content_range("bytes */1000"), None);
    }

    #[test]
    fn test_parse_http_date() {
        let expected = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
        assert_eq!(
            parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(expected)
        );
        assert_eq!(parse_http_date("yesterday"), None);
    }

    #[test]
    fn test_full_response_meta() {
        let map = headers(&[
            (ACCEPT_RANGES, "bytes"),
            (ETAG, "\"v1\""),
            (CONTENT_LENGTH, "1000"),
        ]);
        let meta = parse_response_meta(StatusCode::OK, &map, 0).unwrap();
        assert!(meta.accepts_ranges);
        assert!(meta.is_resumable());
        assert_eq!(meta.start_offset, 0);
        assert_eq!(meta.total_length, Some(1000));
        assert_eq!(meta.validator.etag.as_deref(), Some("\"v1\""));
    }

    #[test]
    fn test_ranges_without_validator_are_not_resumable() {
        let map = headers(&[(ACCEPT_RANGES, "bytes"), (CONTENT_LENGTH, "10")]);
        let meta = parse_response_meta(StatusCode::OK, &map, 0).unwrap();
        assert!(meta.accepts_ranges);
        assert!(!meta.is_resumable());

        let map = headers(&[(ACCEPT_RANGES, "none"), (ETAG, "\"v1\"")]);
        let meta = parse_response_meta(StatusCode::OK, &map, 0).unwrap();
        assert!(!meta.is_resumable());
    }

    #[test]
    fn test_partial_response_prefers_declared_range() {
        let map = headers(&[
            (CONTENT_RANGE, "bytes 300-999/1200"),
            (CONTENT_LENGTH, "700"),
            (LAST_MODIFIED, "Wed, 21 Oct 2015 07:28:00 GMT"),
        ]);
        let meta = parse_response_meta(StatusCode::PARTIAL_CONTENT, &map, 350).unwrap();
        assert!(meta.accepts_ranges);
        assert_eq!(meta.start_offset, 300);
        assert_eq!(meta.total_length, Some(1200));
        assert!(meta.validator.last_modified.is_some());
    }

    #[test]
    fn test_partial_response_without_content_range() {
        let map = headers(&[(CONTENT_LENGTH, "600")]);
        let meta = parse_response_meta(StatusCode::PARTIAL_CONTENT, &map, 400).unwrap();
        assert_eq!(meta.start_offset, 400);
        assert_eq!(meta.total_length, Some(1000));
    }

    #[test]
    fn test_malformed_content_range_is_rejected() {
        let map = headers(&[(CONTENT_RANGE, "bytes garbage")]);
        let result = parse_response_meta(StatusCode::PARTIAL_CONTENT, &map, 10);
        assert!(matches!(result, Err(DownloadError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_open_at_truncates_to_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.part");
        tokio::fs::write(&path, vec![7u8; 100]).await.unwrap();

        let mut file = open_at(&path, 60).await.unwrap();
        file.write_all(b"xy").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        let contents = tokio::fs::read(&path).await.unwrap();
        assert_eq!(contents.len(), 62);
        assert_eq!(&contents[60..], b"xy");
    }

    #[tokio::test]
    async fn test_open_at_rejects_gap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.part");
        tokio::fs::write(&path, vec![0u8; 10]).await.unwrap();

        let result = open_at(&path, 11).await;
        assert!(matches!(result, Err(DownloadError::InvalidResponse(_))));
    }
}
