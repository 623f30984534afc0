//! PDF loading: turn PDF bytes into a [`Document`] via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! [`load_document`] moves the work onto tokio's blocking pool so worker
//! threads never stall on a large filing.
//!
//! ## What is extracted
//!
//! Per page, the plain text (for sentence selection) and the positioned text
//! segments, which [`crate::pipeline::layout`] turns into tables. Document
//! metadata comes from the PDF info dictionary.

use crate::document::{Document, DocumentMetadata, Page};
use crate::error::ExtractError;
use crate::pipeline::layout::{self, TextRun};
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Parses PDF bytes into a [`Document`]. Called from a blocking thread.
pub trait DocumentLoader: Send + Sync {
    /// Parse every page: text, tables and metadata.
    fn load(&self, name: &str, bytes: &[u8], password: Option<&str>) -> Result<Document, ExtractError>;

    /// Metadata only. The default parses the whole document.
    fn metadata(&self, name: &str, bytes: &[u8], password: Option<&str>) -> Result<DocumentMetadata, ExtractError> {
        self.load(name, bytes, password).map(|d| d.metadata)
    }
}

/// Load a document on the blocking pool.
pub async fn load_document(
    loader: Arc<dyn DocumentLoader>,
    name: String,
    bytes: Vec<u8>,
    password: Option<String>,
) -> Result<Document, ExtractError> {
    tokio::task::spawn_blocking(move || loader.load(&name, &bytes, password.as_deref()))
        .await
        .map_err(|e| ExtractError::Internal(format!("Load task panicked: {}", e)))?
}

/// Read metadata on the blocking pool.
pub async fn load_metadata(
    loader: Arc<dyn DocumentLoader>,
    name: String,
    bytes: Vec<u8>,
    password: Option<String>,
) -> Result<DocumentMetadata, ExtractError> {
    tokio::task::spawn_blocking(move || loader.metadata(&name, &bytes, password.as_deref()))
        .await
        .map_err(|e| ExtractError::Internal(format!("Metadata task panicked: {}", e)))?
}

/// The pdfium-backed loader.
///
/// Binds to `libpdfium` on each call, from `lib_dir` when set, else from
/// `PDFIUM_LIB_PATH`, else from the system library path.
#[derive(Debug, Clone, Default)]
pub struct PdfiumLoader {
    lib_dir: Option<PathBuf>,
}

impl PdfiumLoader {
    pub fn new(lib_dir: Option<PathBuf>) -> Self {
        Self { lib_dir }
    }

    fn bind(&self) -> Result<Pdfium, ExtractError> {
        let dir = self
            .lib_dir
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match dir {
            Some(dir) => {
                let path = if dir.is_dir() {
                    Pdfium::pdfium_platform_library_name_at_path(&dir)
                } else {
                    dir
                };
                Pdfium::bind_to_library(&path)
                    .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{}: {}", path.display(), e)))?
            }
            None => Pdfium::bind_to_system_library()
                .map_err(|e| ExtractError::PdfiumBindingFailed(e.to_string()))?,
        };
        Ok(Pdfium::new(bindings))
    }

    fn open<'a>(
        pdfium: &'a Pdfium,
        name: &str,
        bytes: &'a [u8],
        password: Option<&'a str>,
    ) -> Result<PdfDocument<'a>, ExtractError> {
        pdfium.load_pdf_from_byte_slice(bytes, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    ExtractError::WrongPassword { name: name.to_string() }
                } else {
                    ExtractError::PasswordRequired { name: name.to_string() }
                }
            } else {
                ExtractError::CorruptPdf {
                    name: name.to_string(),
                    detail: err_str,
                }
            }
        })
    }
}

impl DocumentLoader for PdfiumLoader {
    fn load(&self, name: &str, bytes: &[u8], password: Option<&str>) -> Result<Document, ExtractError> {
        let pdfium = self.bind()?;
        let document = Self::open(&pdfium, name, bytes, password)?;

        let metadata = read_metadata(&document);
        info!("PDF loaded: {} ({} pages)", name, metadata.page_count);

        let mut pages = Vec::with_capacity(metadata.page_count);
        for (idx, page) in document.pages().iter().enumerate() {
            let text = page.text().map_err(|e| ExtractError::CorruptPdf {
                name: name.to_string(),
                detail: format!("page {}: {:?}", idx + 1, e),
            })?;

            let runs: Vec<TextRun> = text
                .segments()
                .iter()
                .map(|segment| {
                    let bounds = segment.bounds();
                    TextRun::new(
                        segment.text(),
                        bounds.left().value,
                        bounds.bottom().value,
                        bounds.right().value,
                        bounds.top().value,
                    )
                })
                .collect();

            let tables = layout::detect_tables(&runs);
            debug!(
                "Page {}: {} text runs, {} tables",
                idx + 1,
                runs.len(),
                tables.len()
            );

            pages.push(Page {
                text: text.all(),
                tables,
            });
        }

        Ok(Document { pages, metadata })
    }

    fn metadata(&self, name: &str, bytes: &[u8], password: Option<&str>) -> Result<DocumentMetadata, ExtractError> {
        let pdfium = self.bind()?;
        let document = Self::open(&pdfium, name, bytes, password)?;
        Ok(read_metadata(&document))
    }
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().trim().to_string())
            .filter(|v| !v.is_empty())
    };

    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Table;

    struct FixedLoader(Document);

    impl DocumentLoader for FixedLoader {
        fn load(&self, _name: &str, _bytes: &[u8], _password: Option<&str>) -> Result<Document, ExtractError> {
            Ok(self.0.clone())
        }
    }

    struct EncryptedLoader;

    impl DocumentLoader for EncryptedLoader {
        fn load(&self, name: &str, _bytes: &[u8], password: Option<&str>) -> Result<Document, ExtractError> {
            match password {
                Some("secret") => Ok(Document::default()),
                Some(_) => Err(ExtractError::WrongPassword { name: name.to_string() }),
                None => Err(ExtractError::PasswordRequired { name: name.to_string() }),
            }
        }
    }

    #[tokio::test]
    async fn load_runs_on_blocking_pool() {
        let doc = Document::new(vec![Page::new("Revenue was $1.3 billion.")
            .with_table(Table::from_strs(vec![vec!["Revenue", "$1.3B"]]))]);
        let loader: Arc<dyn DocumentLoader> = Arc::new(FixedLoader(doc.clone()));
        let loaded = load_document(loader, "a.pdf".into(), b"%PDF".to_vec(), None)
            .await
            .unwrap();
        assert_eq!(loaded, doc);
    }

    #[tokio::test]
    async fn default_metadata_comes_from_load() {
        let meta = DocumentMetadata {
            title: Some("Q3 2024 Results".into()),
            page_count: 4,
            ..Default::default()
        };
        let loader: Arc<dyn DocumentLoader> =
            Arc::new(FixedLoader(Document::default().with_metadata(meta.clone())));
        let got = load_metadata(loader, "a.pdf".into(), Vec::new(), None).await.unwrap();
        assert_eq!(got, meta);
    }

    #[tokio::test]
    async fn password_errors_propagate() {
        let loader: Arc<dyn DocumentLoader> = Arc::new(EncryptedLoader);
        let err = load_document(Arc::clone(&loader), "x.pdf".into(), Vec::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::PasswordRequired { .. }));

        let err = load_document(Arc::clone(&loader), "x.pdf".into(), Vec::new(), Some("guess".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::WrongPassword { .. }));

        assert!(load_document(loader, "x.pdf".into(), Vec::new(), Some("secret".into()))
            .await
            .is_ok());
    }
}
