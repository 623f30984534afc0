//! Streaming extraction API: emit document rows as they complete.
//!
//! ## Why stream?
//!
//! A batch of long filings takes minutes. A stream lets callers show rows
//! as they arrive, wire up progress output, or append to a file
//! incrementally instead of waiting for the whole batch.
//!
//! Unlike [`crate::extract::Extractor::extract_batch`], which returns only
//! after every document finishes, [`extract_stream`] yields each
//! [`DocumentResult`] as soon as it and every earlier document are done.
//! Rows always arrive in submission order, whatever the concurrency.
//! Dropping the stream aborts the documents still in flight.

use crate::extract::{DocumentSource, Extractor};
use crate::output::DocumentResult;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of document results, in submission order.
pub type DocumentStream = Pin<Box<dyn Stream<Item = DocumentResult> + Send>>;

/// Extract a batch, streaming one result per document.
///
/// # Example
/// ```rust,no_run
/// use edgequake_earnings::{extract_stream, ExtractionConfig, Extractor};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = Arc::new(Extractor::from_config(ExtractionConfig::default())?);
/// let mut rows = extract_stream(extractor, vec!["acme-q3.pdf", "globex-q3.pdf"]);
/// while let Some(row) = rows.next().await {
///     match (&row.record, &row.error) {
///         (Some(r), _) => println!("{}: {:?}", row.name, r.total_revenue),
///         (_, Some(e)) => eprintln!("{e}"),
///         _ => {}
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream<I>(extractor: Arc<Extractor>, inputs: I) -> DocumentStream
where
    I: IntoIterator,
    I::Item: Into<DocumentSource>,
{
    let sources: Vec<DocumentSource> = inputs.into_iter().map(Into::into).collect();
    info!("Starting streaming extraction of {} documents", sources.len());

    let concurrency = extractor.config().concurrency.max(1);
    let s = stream::iter(sources.into_iter().map(move |source| {
        let extractor = Arc::clone(&extractor);
        async move { extractor.extract_source(source).await }
    }))
    .buffered(concurrency);

    Box::pin(s)
}
