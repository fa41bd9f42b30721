//! Streaming downloads with resume support.
//!
//! Bodies are written to `download-*.part` files in the session's download
//! directory and renamed to drop the suffix once complete. When a transfer
//! fails or is cancelled after bytes were written, and the server advertised
//! byte ranges, the partial file is kept and a [`ResumeToken`] describing it
//! is attached to the error.
//!
//! [`ResumeToken`]: crate::data::ResumeToken

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use http::header::{self, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use super::auth::send_with_challenges;
use super::operation::TaskContext;
use super::transport::{BoxStream, Transport, TransportError, TransportErrorKind};
use crate::core::{expected_total, validate_resumed_response};
use crate::data::{Download, HttpRequest, Progress, ProgressCallback, ResponseMeta, ResumeData};
use crate::error::{Error, Result};

/// Range and credential headers are never written into resume data.
fn is_replayable(name: &HeaderName) -> bool {
    ![header::RANGE, header::IF_RANGE, header::AUTHORIZATION, header::PROXY_AUTHORIZATION].contains(name)
}

struct PartialFile {
    file:    File,
    path:    PathBuf,
    written: u64,
}

pub(crate) async fn download<T: Transport>(
    ctx: &TaskContext<T>,
    request: HttpRequest,
    progress: Option<ProgressCallback>,
) -> Result<Download> {
    let replay = replay_headers(&request);
    let url = request.url.to_string();

    let response = send_with_challenges(ctx, request).await?;
    let meta = response.meta;
    let mut body = response.body;
    if !ctx.accepted.contains(meta.status.as_u16()) {
        return Err(Error::UnacceptableStatus {
            status:   meta.status,
            response: Box::new(meta),
        });
    }

    let mut part = create_partial(&ctx.config.download_dir).await?;
    let mut resume = ResumeData::new(url, part.path.clone());
    resume.headers = replay;
    resume.total_bytes = expected_total(&meta);
    resume.etag = meta.etag().map(str::to_string);
    resume.last_modified = meta.last_modified().map(str::to_string);
    let resumable = meta.accepts_byte_ranges() || meta.status == StatusCode::PARTIAL_CONTENT;

    debug!(path = %part.path.display(), total = ?resume.total_bytes, resumable, "downloading");
    let pumped = pump(ctx, &mut body, &mut part, resume.total_bytes, progress.as_ref()).await;
    finish(pumped, part, resume, resumable, meta).await
}

pub(crate) async fn resume<T: Transport>(
    ctx: &TaskContext<T>,
    mut resume: ResumeData,
    progress: Option<ProgressCallback>,
) -> Result<Download> {
    let on_disk = match fs::metadata(&resume.partial_path).await {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            return Err(invalidated(format!(
                "partial file {} is unavailable: {e}",
                resume.partial_path.display()
            )));
        }
    };
    if on_disk != resume.bytes_received {
        return Err(invalidated(format!(
            "partial file holds {on_disk} bytes, resume data expects {}",
            resume.bytes_received
        )));
    }

    let request = resume_request(&resume)?;
    let response = send_with_challenges(ctx, request).await?;
    let meta = response.meta;
    let mut body = response.body;
    let status = meta.status;
    match status {
        StatusCode::PARTIAL_CONTENT => {
            resume.total_bytes = validate_resumed_response(&meta, &resume).map_err(invalidated)?;
        }
        StatusCode::OK | StatusCode::RANGE_NOT_SATISFIABLE => {
            return Err(invalidated(format!("server answered {status} instead of partial content")));
        }
        _ if !ctx.accepted.contains(status.as_u16()) => {
            return Err(Error::UnacceptableStatus {
                status,
                response: Box::new(meta),
            });
        }
        _ => return Err(invalidated(format!("server answered {status} instead of partial content"))),
    }
    if let Some(etag) = meta.etag() {
        resume.etag = Some(etag.to_string());
    }

    let file = OpenOptions::new().append(true).open(&resume.partial_path).await?;
    let mut part = PartialFile {
        file,
        path: resume.partial_path.clone(),
        written: resume.bytes_received,
    };

    debug!(path = %part.path.display(), offset = part.written, total = ?resume.total_bytes, "resuming download");
    let pumped = pump(ctx, &mut body, &mut part, resume.total_bytes, progress.as_ref()).await;
    finish(pumped, part, resume, true, meta).await
}

fn invalidated(reason: String) -> Error {
    warn!(%reason, "resume data invalidated");
    Error::ResumeInvalidated(reason)
}

fn replay_headers(request: &HttpRequest) -> Vec<(String, String)> {
    request
        .headers
        .iter()
        .filter(|(name, _)| is_replayable(name))
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect()
}

fn resume_request(resume: &ResumeData) -> Result<HttpRequest> {
    let mut request = HttpRequest::parse(Method::GET, &resume.url).map_err(|e| invalidated(e.to_string()))?;
    for (name, value) in &resume.headers {
        let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) else {
            continue;
        };
        request.headers.append(name, value);
    }

    let range = HeaderValue::try_from(resume.range_header()).map_err(|e| invalidated(e.to_string()))?;
    request.headers.insert(header::RANGE, range);
    if let Some(validator) = resume.validator().and_then(|v| HeaderValue::try_from(v).ok()) {
        request.headers.insert(header::IF_RANGE, validator);
    }
    Ok(request)
}

async fn create_partial(dir: &Path) -> Result<PartialFile> {
    fs::create_dir_all(dir).await?;
    let (file, path) = tempfile::Builder::new()
        .prefix("download-")
        .suffix(".part")
        .tempfile_in(dir)?
        .keep()
        .map_err(|e| e.error)?;
    Ok(PartialFile {
        file: File::from_std(file),
        path,
        written: 0,
    })
}

/// Copy the body into the partial file, reporting progress per chunk.
async fn pump<T: Transport>(
    ctx: &TaskContext<T>,
    body: &mut BoxStream<'static, std::result::Result<bytes::Bytes, TransportError>>,
    part: &mut PartialFile,
    expected: Option<u64>,
    progress: Option<&ProgressCallback>,
) -> Result<()> {
    while let Some(chunk) = ctx.guard(body.next()).await? {
        let chunk = chunk.map_err(Error::transport)?;
        if chunk.is_empty() {
            continue;
        }
        part.file.write_all(&chunk).await?;
        part.written += chunk.len() as u64;

        let report = Progress {
            bytes_written:        chunk.len() as u64,
            total_bytes_written:  part.written,
            total_bytes_expected: expected,
        };
        ctx.op.set_progress(report);
        if ctx.is_cancelled() {
            return Err(Error::cancelled());
        }
        trace!(written = report.total_bytes_written, expected = ?expected, "progress");
        if let Some(callback) = progress {
            callback(&report);
        }
    }

    if let Some(expected) = expected {
        if part.written < expected {
            return Err(Error::transport(TransportError::new(
                TransportErrorKind::Interrupted,
                format!("body ended after {} of {expected} bytes", part.written),
            )));
        }
    }
    Ok(())
}

async fn finish(
    pumped: Result<()>,
    mut part: PartialFile,
    mut resume: ResumeData,
    resumable: bool,
    response: ResponseMeta,
) -> Result<Download> {
    let flushed = part.file.flush().await;
    let outcome = match (pumped, flushed) {
        (Ok(()), Ok(())) => part.file.sync_all().await.map_err(Error::from),
        (Ok(()), Err(e)) => Err(Error::from(e)),
        (Err(e), _) => Err(e),
    };
    let PartialFile { file, path, written } = part;
    drop(file);

    match outcome {
        Ok(()) => {
            let location = completed_path(&path);
            fs::rename(&path, &location).await?;
            debug!(location = %location.display(), bytes = written, "download complete");
            Ok(Download { location, response })
        }
        Err(err) => {
            let keep = resumable && written > 0 && matches!(err, Error::Transport { .. } | Error::Cancelled { .. });
            if !keep {
                if let Err(e) = fs::remove_file(&path).await {
                    warn!(error = %e, path = %path.display(), "failed to remove partial download");
                }
                return Err(err);
            }
            resume.bytes_received = written;
            let token = resume.encode();
            debug!(path = %path.display(), bytes = written, "kept partial download for resume");
            Err(match err {
                Error::Transport { source, .. } => Error::Transport { source, resume: Some(token) },
                _ => Error::Cancelled { resume: Some(token) },
            })
        }
    }
}

/// `download-x.part` becomes `download-x`.
fn completed_path(partial: &Path) -> PathBuf {
    if partial.extension().is_some_and(|ext| ext == "part") {
        partial.with_extension("")
    } else {
        partial.to_path_buf()
    }
}
