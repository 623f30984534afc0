//! Input resolution: turn a user-supplied path, URL or upload into PDF bytes.
//!
//! Everything downstream works on an in-memory [`InputDocument`]: pdfium can
//! load straight from a byte slice, and the HTTP service receives uploads as
//! bytes anyway. Every input goes through [`check_upload`] before it reaches
//! the loader, so a 200 MB scan or a renamed `.docx` is rejected with a
//! meaningful error instead of a pdfium failure.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// The only content type accepted for uploads.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A document ready for loading: its display name and raw bytes.
#[derive(Clone)]
pub struct InputDocument {
    /// File name used in logs, results and history rows.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

impl std::fmt::Debug for InputDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputDocument")
            .field("name", &self.name)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or an HTTP(S) URL to a checked [`InputDocument`].
pub async fn resolve_input(input: &str, config: &ExtractionConfig) -> Result<InputDocument, ExtractError> {
    let doc = if is_url(input) {
        download_url(input, config.download_timeout_secs).await?
    } else {
        read_local(Path::new(input)).await?
    };
    check_upload(&doc.name, &doc.bytes, None, config.max_file_size)?;
    Ok(doc)
}

/// Reject documents that are too large, declared as something other than a
/// PDF, or that do not start with the `%PDF` magic bytes.
///
/// `content_type` is only checked when the caller knows one (uploads do,
/// local files don't).
pub fn check_upload(
    name: &str,
    bytes: &[u8],
    content_type: Option<&str>,
    max_file_size: usize,
) -> Result<(), ExtractError> {
    if bytes.len() > max_file_size {
        return Err(ExtractError::FileTooLarge {
            name: name.to_string(),
            size: bytes.len(),
            limit: max_file_size,
        });
    }

    if let Some(ct) = content_type {
        // Ignore parameters such as "; charset=binary".
        let essence = ct.split(';').next().unwrap_or_default().trim();
        if !essence.eq_ignore_ascii_case(PDF_CONTENT_TYPE) {
            return Err(ExtractError::UnsupportedContentType {
                name: name.to_string(),
                content_type: ct.to_string(),
            });
        }
    }

    if !bytes.starts_with(PDF_MAGIC) {
        return Err(ExtractError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        });
    }

    Ok(())
}

/// [`check_upload`] for a multipart form part. A part without a declared
/// content type is rejected like any other non-PDF type.
pub fn check_form_upload(
    name: &str,
    bytes: &[u8],
    content_type: Option<&str>,
    max_file_size: usize,
) -> Result<(), ExtractError> {
    check_upload(name, bytes, Some(content_type.unwrap_or("")), max_file_size)
}

async fn read_local(path: &Path) -> Result<InputDocument, ExtractError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ExtractError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(InputDocument::new(file_name(path), bytes))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<InputDocument, ExtractError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| ExtractError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    let name = filename_from_url(url);
    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(InputDocument::new(name, bytes.to_vec()))
}

/// The last URL path segment when it looks like a file name, else
/// `downloaded.pdf`.
pub fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}
