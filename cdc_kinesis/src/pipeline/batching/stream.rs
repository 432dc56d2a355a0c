use core::pin::Pin;
use core::task::{Context, Poll};
use futures::{Stream, TryStream};
use pin_project_lite::pin_project;

use super::BatchConfig;

pin_project! {
    /// Adapter stream which batches the `Ok` items of the underlying stream,
    /// emitting a batch as soon as it reaches the maximum batch size and the
    /// non-empty remainder once the underlying stream ends.
    ///
    /// At most one batch is buffered at a time. The first `Err` item is passed
    /// through immediately, discarding the pending batch, and ends the stream.
    #[must_use = "streams do nothing unless polled"]
    pub struct RowBatchStream<S: TryStream> {
        #[pin]
        stream: S,
        items: Vec<S::Ok>,
        inner_stream_ended: bool,
        batch_config: BatchConfig,
    }
}

impl<S: TryStream> RowBatchStream<S> {
    pub fn new(stream: S, batch_config: BatchConfig) -> Self {
        RowBatchStream {
            stream,
            items: Vec::with_capacity(batch_config.max_batch_size()),
            inner_stream_ended: false,
            batch_config,
        }
    }
}

impl<S: TryStream> Stream for RowBatchStream<S> {
    type Item = Result<Vec<S::Ok>, S::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if *this.inner_stream_ended {
            return Poll::Ready(None);
        }

        let max_batch_size = this.batch_config.max_batch_size();

        loop {
            if this.items.is_empty() {
                this.items.reserve_exact(max_batch_size);
            }
            match this.stream.as_mut().try_poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(item))) => {
                    this.items.push(item);
                    if this.items.len() >= max_batch_size {
                        return Poll::Ready(Some(Ok(std::mem::take(this.items))));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.items.clear();
                    *this.inner_stream_ended = true;

                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    let last = if this.items.is_empty() {
                        None
                    } else {
                        Some(Ok(std::mem::take(this.items)))
                    };

                    *this.inner_stream_ended = true;

                    return Poll::Ready(last);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::{stream, StreamExt};

    use crate::pipeline::batching::accumulate;

    use super::*;

    async fn batches(rows: u32, max_batch_size: usize) -> Vec<Vec<u32>> {
        accumulate(
            stream::iter((0..rows).map(Ok::<u32, ()>)),
            BatchConfig::new(max_batch_size),
        )
        .map(Result::unwrap)
        .collect()
        .await
    }

    fn sizes(batches: &[Vec<u32>]) -> Vec<usize> {
        batches.iter().map(Vec::len).collect()
    }

    #[tokio::test]
    async fn flushes_partial_final_batch() {
        assert_eq!(sizes(&batches(250, 100).await), [100, 100, 50]);
    }

    #[tokio::test]
    async fn empty_input_yields_no_batches() {
        assert!(batches(0, 100).await.is_empty());
    }

    #[tokio::test]
    async fn exact_multiple_yields_no_trailing_batch() {
        assert_eq!(sizes(&batches(100, 100).await), [100]);
        assert_eq!(sizes(&batches(300, 100).await), [100, 100, 100]);
    }

    #[tokio::test]
    async fn batches_concatenate_to_input() {
        for (rows, max_batch_size) in [(1, 1), (7, 3), (99, 100), (101, 100), (1000, 500)] {
            let batches = batches(rows, max_batch_size).await;

            let (last, full) = batches.split_last().unwrap();
            assert!(full.iter().all(|b| b.len() == max_batch_size));
            assert!((1..=max_batch_size).contains(&last.len()));

            let flat: Vec<u32> = batches.into_iter().flatten().collect();
            assert_eq!(flat, (0..rows).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn grouping_is_repeatable() {
        assert_eq!(batches(237, 17).await, batches(237, 17).await);
    }

    #[tokio::test]
    async fn buffers_across_pending_polls() {
        let rows = stream::iter((0..5).map(Ok::<u32, ()>)).then(|row| async move {
            tokio::task::yield_now().await;
            row
        });
        let batches: Vec<Vec<u32>> = accumulate(rows, BatchConfig::new(2))
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(batches, [vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[tokio::test]
    async fn error_ends_the_stream() {
        let rows = stream::iter(vec![Ok(1), Ok(2), Err("boom"), Ok(3)]);
        let items: Vec<Result<Vec<u32>, &str>> =
            accumulate(rows, BatchConfig::new(10)).collect().await;
        assert_eq!(items, [Err("boom")]);
    }

    #[test]
    fn zero_batch_size_is_raised_to_one() {
        assert_eq!(BatchConfig::new(0).max_batch_size(), 1);
    }
}
