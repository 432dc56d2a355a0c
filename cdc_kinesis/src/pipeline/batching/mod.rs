use futures::TryStream;
use stream::RowBatchStream;

pub mod stream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    max_batch_size: usize,
}

impl BatchConfig {
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

    /// A zero size is raised to one.
    pub fn new(max_batch_size: usize) -> BatchConfig {
        BatchConfig {
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_BATCH_SIZE)
    }
}

/// Groups a fallible row stream into batches of at most
/// [`BatchConfig::max_batch_size`] rows, lazily.
pub fn accumulate<S: TryStream>(rows: S, batch_config: BatchConfig) -> RowBatchStream<S> {
    RowBatchStream::new(rows, batch_config)
}
