use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::conversions::{
    row::{Row, RowConversionError},
    trigger::CdcRequest,
};

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("tokio_postgres error: {0}")]
    TokioPostgres(#[from] tokio_postgres::Error),

    #[error("row conversion error: {0}")]
    RowConversion(#[from] RowConversionError),

    #[error("row stream failed: {0}")]
    RowStream(String),

    #[error("source is closed")]
    Closed,
}

pub type RowStream<'a> = BoxStream<'a, Result<Row, SourceError>>;

/// Runs a query and yields its result rows lazily.
#[async_trait]
pub trait Source: Send + Sync {
    async fn query_rows<'a>(&'a self, query: &str) -> Result<RowStream<'a>, SourceError>;

    /// Releases the underlying connection. Queries fail afterwards.
    async fn close(&mut self) -> Result<(), SourceError>;
}

/// Opens a [`Source`] for the database a request points at.
#[async_trait]
pub trait Connector: Send + Sync {
    type Source: Source;

    async fn connect(&self, request: &CdcRequest) -> Result<Self::Source, SourceError>;
}
