pub mod kinesis;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::conversions::delivery_record::PutRecordsRequest;

#[derive(Debug, Error)]
pub enum StreamWriterError {
    #[error("kinesis error: {0}")]
    Kinesis(String),

    #[error("invalid kinesis record: {0}")]
    InvalidRecord(#[from] aws_sdk_kinesis::error::BuildError),

    #[error("put_records call {0} rejected")]
    Rejected(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutRecordsResponse {
    pub failed_record_count: usize,
}

/// A stream service accepting one batch of records per call. A call is
/// all-or-nothing as far as retries are concerned.
#[async_trait]
pub trait StreamWriter: Send + Sync {
    async fn put_records(
        &self,
        request: &PutRecordsRequest,
    ) -> Result<PutRecordsResponse, StreamWriterError>;
}
