use dispatcher::DispatchError;
use sources::SourceError;
use thiserror::Error;

use crate::conversions::trigger::TriggerError;

pub mod batching;
pub mod data_pipeline;
pub mod destinations;
pub mod dispatcher;
pub mod retry;
pub mod sources;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("trigger error: {0}")]
    TriggerError(#[from] TriggerError),

    #[error("source error: {0}")]
    SourceError(#[from] SourceError),

    #[error("dispatch error: {0}")]
    DispatchError(#[from] DispatchError),
}
