//! Conversion upload endpoint.

use axum::{
    body::Body,
    extract::{Multipart, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};
use filemorph_core::{CallerId, ConversionRequest, Format};
use std::path::Path;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::ApiError;
use super::middleware::Caller;
use crate::metrics::{CONVERSIONS_REJECTED, UPLOAD_BYTES};
use crate::state::AppState;

pub const JOB_ID_HEADER: HeaderName = HeaderName::from_static("x-job-id");
pub const OUTPUT_FORMAT_HEADER: HeaderName = HeaderName::from_static("x-output-format");

/// Cancels the job if the request is dropped before the result is ready.
///
/// Axum drops the handler future when the client goes away, which runs this
/// guard's destructor.
struct CancelOnDrop(Option<CancellationToken>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(token) = self.0.take() {
            debug!("Client went away, cancelling conversion");
            token.cancel();
        }
    }
}

/// Fields of the multipart upload.
#[derive(Default)]
struct UploadForm {
    file: Option<(Option<String>, Vec<u8>)>,
    target: Option<String>,
    format: Option<String>,
    caller: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("file") => {
                    let file_name = field.file_name().map(str::to_string);
                    let data = field.bytes().await?;
                    form.file = Some((file_name, data.to_vec()));
                }
                Some("target") => form.target = Some(field.text().await?),
                Some("format") => form.format = Some(field.text().await?),
                Some("caller") => form.caller = Some(field.text().await?),
                _ => debug!(field = ?name, "Ignoring unknown multipart field"),
            }
        }
        Ok(form)
    }
}

/// Download name for the converted file: the upload's stem, ASCII only.
fn output_file_name(upload_name: Option<&str>, format: Format) -> String {
    let stem = upload_name
        .and_then(|n| Path::new(n).file_stem())
        .and_then(|s| s.to_str())
        .map(|s| {
            s.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
        })
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "converted".to_string());
    format!("{}.{}", stem.trim(), format.extension())
}

/// Converts an uploaded file and streams the result back.
///
/// Multipart fields: `file` (required), `target` (required), `format`
/// (optional source format override) and `caller` (optional, overrides the
/// `x-caller-id` header).
pub async fn create_conversion(
    State(state): State<Arc<AppState>>,
    Caller(header_caller): Caller,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = UploadForm::read(multipart).await?;

    let (upload_name, data) = form
        .file
        .ok_or_else(|| ApiError::invalid_request("Missing 'file' field"))?;
    if data.is_empty() {
        return Err(ApiError::invalid_request("Uploaded file is empty"));
    }
    if data.len() > state.max_upload_bytes() {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            format!("File exceeds the {} byte limit", state.max_upload_bytes()),
        ));
    }
    let target_name = form
        .target
        .ok_or_else(|| ApiError::invalid_request("Missing 'target' field"))?;
    let target: Format = target_name.parse().map_err(|_| {
        ApiError::invalid_request(format!("Unknown target format: {}", target_name))
    })?;
    let caller = form
        .caller
        .filter(|c| !c.trim().is_empty())
        .map(CallerId::new)
        .unwrap_or(header_caller);

    UPLOAD_BYTES.observe(data.len() as f64);

    let mut request = ConversionRequest::from_bytes(data, target, caller);
    if let Some(name) = &upload_name {
        request = request.with_file_name(name.clone());
    }
    if let Some(format) = form.format.filter(|f| !f.trim().is_empty()) {
        request = request.with_declared_format(format);
    }

    let handle = state.orchestrator().submit(request).await.map_err(|e| {
        CONVERSIONS_REJECTED.with_label_values(&[e.kind().as_str()]).inc();
        ApiError::from(e)
    })?;
    let job_id = handle.job_id();

    let guard = CancelOnDrop(Some(handle.cancellation_token()));
    let output = handle.wait().await;
    guard.disarm();
    let output = output?;

    info!(
        job_id = %job_id,
        format = %output.format(),
        size_bytes = output.size_bytes(),
        "Delivering conversion output"
    );

    let format = output.format();
    let size_bytes = output.size_bytes();
    let file_name = output_file_name(upload_name.as_deref(), format);
    let file = output.into_reader().await.map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "workspace",
            format!("Failed to open output: {}", e),
        )
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, format.mime_type().to_string()),
            (header::CONTENT_LENGTH, size_bytes.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
            (JOB_ID_HEADER, job_id.to_string()),
            (OUTPUT_FORMAT_HEADER, format.extension().to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_file_name_keeps_stem() {
        assert_eq!(
            output_file_name(Some("Quarterly Report.md"), Format::Pdf),
            "Quarterly Report.pdf"
        );
        assert_eq!(output_file_name(Some("song.flac"), Format::Mp3), "song.mp3");
    }

    #[test]
    fn test_output_file_name_sanitizes() {
        assert_eq!(
            output_file_name(Some("re\"port\u{e9}.md"), Format::Docx),
            "re_port_.docx"
        );
        assert_eq!(output_file_name(None, Format::Txt), "converted.txt");
        assert_eq!(output_file_name(Some("\u{4e2d}\u{6587}"), Format::Txt), "__.txt");
    }

    #[test]
    fn test_cancel_on_drop() {
        let token = CancellationToken::new();
        drop(CancelOnDrop(Some(token.clone())));
        assert!(token.is_cancelled());

        let token = CancellationToken::new();
        CancelOnDrop(Some(token.clone())).disarm();
        assert!(!token.is_cancelled());
    }
}
