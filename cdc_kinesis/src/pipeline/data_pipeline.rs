use std::ops::AddAssign;

use futures::StreamExt;
use tokio::pin;
use tracing::{error, info};

use crate::pipeline::{
    batching::{accumulate, BatchConfig},
    PipelineError,
};

use super::{
    destinations::StreamWriter,
    dispatcher::{Delivery, Dispatcher},
    sources::Source,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: usize,
    pub rows: usize,
}

impl AddAssign for RunSummary {
    fn add_assign(&mut self, other: RunSummary) {
        self.batches += other.batches;
        self.rows += other.rows;
    }
}

/// One query, streamed through the dispatcher batch by batch.
pub struct DataPipeline<'a, Src: Source, W: StreamWriter> {
    source: Src,
    dispatcher: &'a mut Dispatcher<W>,
    batch_config: BatchConfig,
}

impl<'a, Src: Source, W: StreamWriter> DataPipeline<'a, Src, W> {
    pub fn new(source: Src, dispatcher: &'a mut Dispatcher<W>, batch_config: BatchConfig) -> Self {
        DataPipeline {
            source,
            dispatcher,
            batch_config,
        }
    }

    /// Runs `query` to completion or to the first fatal error. The source is
    /// closed either way.
    pub async fn run(mut self, query: &str) -> Result<RunSummary, PipelineError> {
        let res = self.main_loop(query).await;

        if let Err(e) = &res {
            error!("main loop exited with {e}");
        }

        if let Err(e) = self.source.close().await {
            error!("failed to close source: {e}");
        }

        res
    }

    async fn main_loop(&mut self, query: &str) -> Result<RunSummary, PipelineError> {
        info!("query:\n{query}");

        let rows = self.source.query_rows(query).await?;
        let batches = accumulate(rows, self.batch_config.clone());

        pin!(batches);

        let mut summary = RunSummary::default();

        while let Some(batch) = batches.next().await {
            let batch = batch?;
            let rows = batch.len();

            match self.dispatcher.deliver(batch).await? {
                Delivery::Sent { records, .. } => info!("sent batch of {records} records"),
                Delivery::DryRun(_) => info!("logged batch of {rows} records"),
            }

            summary += RunSummary { batches: 1, rows };
        }

        info!("delivered {} rows in {} batches", summary.rows, summary.batches);

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        conversions::row::Row,
        pipeline::{
            destinations::memory::MemoryWriter,
            dispatcher::{DispatchError, DispatcherConfig},
            sources::{memory::MemorySource, SourceError},
        },
    };

    use super::*;

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("id".to_string(), json!(i));
                row.insert("name".to_string(), json!(format!("pet-{i}")));
                row
            })
            .collect()
    }

    fn dispatcher(writer: MemoryWriter, dry_run: bool) -> Dispatcher<MemoryWriter> {
        let config = DispatcherConfig {
            dry_run,
            ..DispatcherConfig::default()
        };
        Dispatcher::new(config, writer)
    }

    fn batch_sizes(writer: &MemoryWriter) -> Vec<usize> {
        writer
            .requests()
            .iter()
            .map(|r| r.records.len())
            .collect()
    }

    #[tokio::test]
    async fn delivers_every_batch_once() {
        let source = MemorySource::new(rows(250));
        let mut dispatcher = dispatcher(MemoryWriter::new(), false);

        let summary = DataPipeline::new(source.clone(), &mut dispatcher, BatchConfig::new(100))
            .run("SELECT id, name\nFROM pet\nWHERE true\n")
            .await
            .unwrap();

        assert_eq!(summary, RunSummary { batches: 3, rows: 250 });
        assert_eq!(dispatcher.writer().calls(), 3);
        assert_eq!(batch_sizes(dispatcher.writer()), [100, 100, 50]);
        assert_eq!(source.queries(), ["SELECT id, name\nFROM pet\nWHERE true\n"]);
        assert_eq!(source.close_count(), 1);

        let delivered: Vec<String> = dispatcher
            .writer()
            .requests()
            .into_iter()
            .flat_map(|r| r.records)
            .map(|r| r.data)
            .collect();
        assert_eq!(delivered.len(), 250);
        assert_eq!(delivered[0], r#"{"id":0,"name":"pet-0"}"#);
        assert_eq!(delivered[249], r#"{"id":249,"name":"pet-249"}"#);
    }

    #[tokio::test]
    async fn dry_run_logs_instead_of_sending() {
        let source = MemorySource::new(rows(250));
        let mut dispatcher = dispatcher(MemoryWriter::new(), true);

        let summary = DataPipeline::new(source, &mut dispatcher, BatchConfig::new(100))
            .run("SELECT 1")
            .await
            .unwrap();

        assert_eq!(summary, RunSummary { batches: 3, rows: 250 });
        assert_eq!(dispatcher.writer().calls(), 0);
    }

    #[tokio::test]
    async fn empty_result_sends_nothing() {
        let source = MemorySource::new(Vec::new());
        let mut dispatcher = dispatcher(MemoryWriter::new(), false);

        let summary = DataPipeline::new(source.clone(), &mut dispatcher, BatchConfig::default())
            .run("SELECT 1")
            .await
            .unwrap();

        assert_eq!(summary, RunSummary::default());
        assert_eq!(dispatcher.writer().calls(), 0);
        assert_eq!(source.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn aborts_at_failing_batch_and_closes_source() {
        let source = MemorySource::new(rows(250));
        let writer = MemoryWriter::with_outcomes([true, false, false, false]);
        let mut dispatcher = dispatcher(writer, false);

        let err = DataPipeline::new(source.clone(), &mut dispatcher, BatchConfig::new(100))
            .run("SELECT 1")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::DispatchError(DispatchError::RetriesExhausted { .. })
        ));
        assert_eq!(dispatcher.writer().calls(), 4);
        assert_eq!(batch_sizes(dispatcher.writer()), [100]);
        assert_eq!(source.close_count(), 1);
    }

    #[tokio::test]
    async fn upstream_failure_propagates_and_closes_source() {
        let source = MemorySource::new(rows(250)).failing_after(120);
        let mut dispatcher = dispatcher(MemoryWriter::new(), false);

        let err = DataPipeline::new(source.clone(), &mut dispatcher, BatchConfig::new(100))
            .run("SELECT 1")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::SourceError(SourceError::RowStream(_))
        ));
        assert_eq!(batch_sizes(dispatcher.writer()), [100]);
        assert_eq!(source.close_count(), 1);
    }
}
