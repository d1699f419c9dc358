//! Streaming batch API: emit document outcomes as they are recorded.
//!
//! ## Why stream?
//!
//! A cold batch of a few hundred rosters takes minutes against the
//! extraction service. A stream lets callers show each document as it
//! finishes, or write results incrementally, instead of waiting for the
//! whole batch.
//!
//! Unlike the eager [`crate::batch::process_batch`], which aggregates a
//! [`crate::output::BatchResult`] at the end, [`process_stream`] yields
//! every [`DocumentOutcome`] in completion order (sort by `index` if order
//! matters). Feed the collected outcomes to [`crate::aggregate::aggregate`]
//! to build the unified dataset afterwards.

use crate::batch::{BatchContext, PendingDocument};
use crate::config::BatchConfig;
use crate::error::RollcallError;
use crate::model::SourceDocument;
use crate::output::DocumentOutcome;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of document outcomes.
///
/// An `Err` item means the batch must stop (the extraction service is
/// unavailable); callers should not poll further.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = Result<DocumentOutcome, RollcallError>> + Send>>;

/// Process in-memory documents, streaming outcomes as they complete.
///
/// # Returns
/// - `Ok(OutcomeStream)`: one item per document
/// - `Err(RollcallError)`: no extractor configured or the cache is unusable
///
/// # Example
/// ```rust,no_run
/// use rollcall::{process_stream, BatchConfig, SourceDocument};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let doc = SourceDocument::read("class-3.pdf").await?;
/// let config = BatchConfig::default();
/// let mut outcomes = process_stream(vec![doc], &config)?;
/// while let Some(outcome) = outcomes.next().await {
///     let outcome = outcome?;
///     println!("{}: {} tables", outcome.name, outcome.tables().len());
/// }
/// # Ok(())
/// # }
/// ```
pub fn process_stream(
    documents: Vec<SourceDocument>,
    config: &BatchConfig,
) -> Result<OutcomeStream, RollcallError> {
    build(documents.into_iter().map(PendingDocument::Loaded).collect(), config)
}

/// Streaming counterpart of [`crate::batch::process_files`].
pub fn process_files_stream<P: AsRef<Path>>(
    paths: &[P],
    config: &BatchConfig,
) -> Result<OutcomeStream, RollcallError> {
    let inputs = paths
        .iter()
        .map(|p| PendingDocument::Path(p.as_ref().to_path_buf()))
        .collect();
    build(inputs, config)
}

fn build(inputs: Vec<PendingDocument>, config: &BatchConfig) -> Result<OutcomeStream, RollcallError> {
    let total = inputs.len();
    info!("Starting streaming batch: {} documents", total);

    let ctx = BatchContext::new(config, total)?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let s = stream::iter(inputs.into_iter().enumerate().map(move |(index, input)| {
        let ctx = ctx.clone();
        async move { ctx.process(index, input).await }
    }))
    .buffer_unordered(config.concurrency);

    Ok(Box::pin(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use crate::error::ExtractionError;
    use crate::extract::{Extraction, TableExtractor};
    use crate::model::RawTable;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct OneTable;

    #[async_trait]
    impl TableExtractor for OneTable {
        fn name(&self) -> &str {
            "one-table"
        }

        async fn analyze(&self, document: &SourceDocument) -> Result<Extraction, ExtractionError> {
            if document.name.starts_with("broken") {
                return Err(ExtractionError::permanent("InvalidContent"));
            }
            Ok(Extraction::new(vec![RawTable::new(vec![
                vec!["ID".into(), "Last Name".into()],
                vec!["519499492".into(), "Adar".into()],
            ])]))
        }
    }

    #[tokio::test]
    async fn yields_one_outcome_per_document() {
        let config = BatchConfig::builder()
            .extractor(Arc::new(OneTable))
            .cache(Arc::new(InMemoryCacheStore::new()))
            .build()
            .unwrap();
        let docs = vec![
            SourceDocument::new("a.pdf", b"a".to_vec()),
            SourceDocument::new("broken.pdf", b"b".to_vec()),
            SourceDocument::new("c.pdf", b"c".to_vec()),
        ];
        let mut outcomes: Vec<DocumentOutcome> = process_stream(docs, &config)
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        outcomes.sort_by_key(|o| o.index);

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].tables().len(), 1);
        assert!(outcomes[1].error().is_some());
        assert_eq!(outcomes[2].name, "c.pdf");
    }
}
