use std::time::Duration;

use backon::Retryable;
use thiserror::Error;
use tracing::{info, warn};

use crate::conversions::{
    delivery_record::{PartitionKeys, PutRecordsRequest},
    row::Row,
};

use super::{
    destinations::{StreamWriter, StreamWriterError},
    retry::RetryPolicy,
};

pub const DEFAULT_REGION_NAME: &str = "us-east-1";
pub const DEFAULT_STREAM_NAME: &str = "cdc-from-mysql";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Log requests instead of writing them.
    pub dry_run: bool,
    pub region_name: String,
    pub stream_name: String,
    /// Fixed seed for partition keys, OS entropy otherwise.
    pub partition_key_seed: Option<u64>,
    pub retry_policy: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            dry_run: false,
            region_name: DEFAULT_REGION_NAME.to_string(),
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            partition_key_seed: None,
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to put records into kinesis stream {stream_name} after {attempts} attempts: {source}")]
    RetriesExhausted {
        stream_name: String,
        attempts: usize,
        #[source]
        source: StreamWriterError,
    },

    #[error("unable to serialize row: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent {
        records: usize,
        failed_records: usize,
    },
    /// The request that would have been sent.
    DryRun(PutRecordsRequest),
}

/// Turns batches of rows into `PutRecords` calls against a [`StreamWriter`].
pub struct Dispatcher<W: StreamWriter> {
    config: DispatcherConfig,
    writer: W,
    partition_keys: PartitionKeys,
}

impl<W: StreamWriter> Dispatcher<W> {
    pub fn new(config: DispatcherConfig, writer: W) -> Self {
        Dispatcher {
            partition_keys: PartitionKeys::new(config.partition_key_seed),
            config,
            writer,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn request_for(&mut self, batch: &[Row]) -> Result<PutRecordsRequest, DispatchError> {
        Ok(PutRecordsRequest::from_rows(
            &self.config.stream_name,
            batch,
            &mut self.partition_keys,
        )?)
    }

    /// Sends one batch in a single call, retrying the whole call per the
    /// retry policy. Exhausting the attempts is fatal.
    pub async fn deliver(&mut self, batch: Vec<Row>) -> Result<Delivery, DispatchError> {
        let request = self.request_for(&batch)?;

        if self.config.dry_run {
            info!(
                "dry run, kinesis PutRecords:\n{}",
                serde_json::to_string(&request)?
            );
            return Ok(Delivery::DryRun(request));
        }

        let writer = &self.writer;
        let stream_name = self.config.stream_name.as_str();
        let policy = self.config.retry_policy;
        let req = &request;

        let response = (move || async move { writer.put_records(req).await })
            .retry(policy.backoff())
            .sleep(tokio::time::sleep)
            .notify(|err: &StreamWriterError, delay: Duration| {
                warn!("put_records into {stream_name} failed: {err}, retrying in {delay:?}");
            })
            .await
            .map_err(|source| DispatchError::RetriesExhausted {
                stream_name: stream_name.to_string(),
                attempts: policy.max_attempts(),
                source,
            })?;

        if response.failed_record_count > 0 {
            warn!(
                "{} of {} records were not accepted by {stream_name}",
                response.failed_record_count,
                request.records.len()
            );
        }

        Ok(Delivery::Sent {
            records: request.records.len(),
            failed_records: response.failed_record_count,
        })
    }
}
