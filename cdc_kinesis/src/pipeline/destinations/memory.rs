use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use tracing::info;

use crate::conversions::delivery_record::PutRecordsRequest;

use super::{PutRecordsResponse, StreamWriter, StreamWriterError};

/// In-process writer which keeps every accepted request. Calls can be
/// scripted to fail.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    requests: Mutex<Vec<PutRecordsRequest>>,
    calls: AtomicUsize,
    outcomes: Mutex<VecDeque<bool>>,
    fail_when_exhausted: bool,
}

impl MemoryWriter {
    pub fn new() -> MemoryWriter {
        Self::default()
    }

    /// Succeeds or fails call by call as given, then succeeds.
    pub fn with_outcomes(outcomes: impl IntoIterator<Item = bool>) -> MemoryWriter {
        MemoryWriter {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Fails the first `times` calls.
    pub fn failing(times: usize) -> MemoryWriter {
        Self::with_outcomes(std::iter::repeat_n(false, times))
    }

    pub fn always_failing() -> MemoryWriter {
        MemoryWriter {
            fail_when_exhausted: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PutRecordsRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamWriter for MemoryWriter {
    async fn put_records(
        &self,
        request: &PutRecordsRequest,
    ) -> Result<PutRecordsResponse, StreamWriterError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let accept = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(!self.fail_when_exhausted);

        if !accept {
            return Err(StreamWriterError::Rejected(call));
        }

        info!(
            "stored {} records for {}",
            request.records.len(),
            request.stream_name
        );
        self.requests.lock().unwrap().push(request.clone());
        Ok(PutRecordsResponse::default())
    }
}
