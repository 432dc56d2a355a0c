use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use futures::{stream, StreamExt};

use crate::conversions::{row::Row, trigger::CdcRequest};

use super::{Connector, RowStream, Source, SourceError};

/// Serves a fixed set of rows for any query. Clones share their query log and
/// close count, so a clone handed to a pipeline can be inspected afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rows: Arc<Vec<Row>>,
    fail_after: Option<usize>,
    queries: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new(rows: Vec<Row>) -> MemorySource {
        MemorySource {
            rows: Arc::new(rows),
            ..Self::default()
        }
    }

    /// Ends the row stream with an error after `rows` rows.
    pub fn failing_after(mut self, rows: usize) -> MemorySource {
        self.fail_after = Some(rows);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn query_rows<'a>(&'a self, query: &str) -> Result<RowStream<'a>, SourceError> {
        self.queries.lock().unwrap().push(query.to_string());

        let failure: Option<Result<Row, SourceError>> = self
            .fail_after
            .map(|n| Err(SourceError::RowStream(format!("lost connection after {n} rows"))));
        let rows = self
            .rows
            .iter()
            .take(self.fail_after.unwrap_or(usize::MAX))
            .cloned()
            .map(Ok)
            .chain(failure);

        Ok(stream::iter(rows).boxed())
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Connector for MemorySource {
    type Source = MemorySource;

    async fn connect(&self, _request: &CdcRequest) -> Result<MemorySource, SourceError> {
        Ok(self.clone())
    }
}
