//! Lazy upstream response body for streaming mode.
//!
//! Wraps the raw upstream body and the connection lease behind it. Frames
//! are pulled from the upstream only when the caller's connection polls for
//! the next one, so the proxy never reads ahead of what the caller accepts.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::upstream::error::{BoxError, Phase, UpstreamError};
use crate::upstream::pool::ConnectionLease;

pin_project! {
    /// Single-pass chunk sequence over an upstream response body.
    ///
    /// The lease is released when the upstream body ends cleanly and
    /// discarded on error, timeout, cancellation or early drop.
    pub struct UpstreamBody<B> {
        #[pin]
        inner: B,
        #[pin]
        idle: Sleep,
        lease: Option<ConnectionLease>,
        cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
        read_timeout: Duration,
        waiting: bool,
        done: bool,
    }
}

impl<B> UpstreamBody<B> {
    pub(crate) fn new(
        inner: B,
        lease: Option<ConnectionLease>,
        read_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            idle: tokio::time::sleep(read_timeout),
            lease,
            cancelled: Box::pin(cancel.cancelled_owned()),
            read_timeout,
            waiting: false,
            done: false,
        }
    }
}

impl<B> Body for UpstreamBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = UpstreamError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }

        if this.cancelled.as_mut().poll(cx).is_ready() {
            *this.done = true;
            drop(this.lease.take());
            tracing::debug!("Streaming exchange cancelled");
            return Poll::Ready(Some(Err(UpstreamError::Cancelled)));
        }

        // The idle clock only runs while we are actually waiting on the upstream,
        // not while the caller is slow to ask for the next chunk.
        if !*this.waiting {
            *this.waiting = true;
            let deadline = Instant::now() + *this.read_timeout;
            this.idle.as_mut().reset(deadline);
        }

        match this.inner.as_mut().poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                *this.waiting = false;
                if this.inner.is_end_stream() {
                    *this.done = true;
                    if let Some(lease) = this.lease.take() {
                        lease.release();
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(err))) => {
                *this.done = true;
                drop(this.lease.take());
                let err = UpstreamError::protocol(err);
                tracing::warn!(error = %err, "Upstream body failed mid-stream, aborting caller connection");
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                *this.done = true;
                if let Some(lease) = this.lease.take() {
                    lease.release();
                }
                Poll::Ready(None)
            }
            Poll::Pending => {
                if this.idle.poll(cx).is_ready() {
                    *this.done = true;
                    drop(this.lease.take());
                    let err = UpstreamError::Timeout {
                        phase: Phase::Body,
                        after: *this.read_timeout,
                    };
                    tracing::warn!(error = %err, "Upstream body stalled, aborting caller connection");
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Pending
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> fmt::Debug for UpstreamBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamBody")
            .field("lease", &self.lease.as_ref().map(ConnectionLease::id))
            .field("read_timeout", &self.read_timeout)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Step {
        Chunk(&'static str),
        Fail,
        Stall,
    }

    /// Body that replays a script and counts how often it was polled for data.
    struct ScriptedBody {
        steps: VecDeque<Step>,
        pulls: Arc<AtomicUsize>,
    }

    impl ScriptedBody {
        fn new(steps: Vec<Step>) -> (Self, Arc<AtomicUsize>) {
            let pulls = Arc::new(AtomicUsize::new(0));
            let body = Self {
                steps: steps.into(),
                pulls: Arc::clone(&pulls),
            };
            (body, pulls)
        }
    }

    impl Body for ScriptedBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, std::io::Error>>> {
            match self.steps.front() {
                Some(Step::Stall) => return Poll::Pending,
                None => return Poll::Ready(None),
                _ => {}
            }
            self.pulls.fetch_add(1, Ordering::SeqCst);
            match self.steps.pop_front() {
                Some(Step::Chunk(data)) => Poll::Ready(Some(Ok(Frame::data(Bytes::from_static(data.as_bytes()))))),
                Some(Step::Fail) => Poll::Ready(Some(Err(std::io::Error::other("reset by peer")))),
                _ => Poll::Ready(None),
            }
        }
    }

    type Relay = Pin<Box<UpstreamBody<ScriptedBody>>>;

    fn relay(steps: Vec<Step>, read_timeout: Duration) -> (Relay, Arc<AtomicUsize>, CancellationToken) {
        let (inner, pulls) = ScriptedBody::new(steps);
        let token = CancellationToken::new();
        let body = UpstreamBody::new(inner, None, read_timeout, token.clone());
        (Box::pin(body), pulls, token)
    }

    async fn next_data(body: &mut Relay) -> Option<Result<Bytes, UpstreamError>> {
        body.frame()
            .await
            .map(|frame| frame.map(|f| f.into_data().unwrap_or_default()))
    }

    #[tokio::test]
    async fn pulls_one_chunk_per_poll() {
        let (mut body, pulls, _token) = relay(
            vec![Step::Chunk("a"), Step::Chunk("b"), Step::Chunk("c")],
            Duration::from_secs(5),
        );

        assert_eq!(pulls.load(Ordering::SeqCst), 0, "nothing read before the caller asks");
        for (i, expected) in ["a", "b", "c"].into_iter().enumerate() {
            let chunk = next_data(&mut body).await.unwrap().unwrap();
            assert_eq!(chunk, expected);
            assert_eq!(pulls.load(Ordering::SeqCst), i + 1, "no read-ahead past chunk {}", i);
        }
        assert!(next_data(&mut body).await.is_none());
        assert!(body.is_end_stream());
    }

    #[tokio::test]
    async fn mid_stream_error_is_terminal() {
        let (mut body, _pulls, _token) = relay(vec![Step::Chunk("a"), Step::Fail, Step::Chunk("b")], Duration::from_secs(5));

        assert_eq!(next_data(&mut body).await.unwrap().unwrap(), "a");
        let err = next_data(&mut body).await.unwrap().unwrap_err();
        assert!(matches!(err, UpstreamError::Upstream(_)), "{:?}", err);
        assert!(next_data(&mut body).await.is_none(), "no frames after the error");
    }

    #[tokio::test]
    async fn stalled_upstream_times_out() {
        let (mut body, _pulls, _token) = relay(vec![Step::Chunk("a"), Step::Stall], Duration::from_millis(50));

        assert_eq!(next_data(&mut body).await.unwrap().unwrap(), "a");
        let err = tokio::time::timeout(Duration::from_secs(2), next_data(&mut body))
            .await
            .expect("idle timeout should fire")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout { phase: Phase::Body, .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn slow_caller_does_not_trip_idle_timeout() {
        let (mut body, _pulls, _token) = relay(vec![Step::Chunk("a"), Step::Chunk("b")], Duration::from_millis(50));

        assert_eq!(next_data(&mut body).await.unwrap().unwrap(), "a");
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(next_data(&mut body).await.unwrap().unwrap(), "b");
    }

    #[tokio::test]
    async fn cancellation_ends_stream() {
        let (mut body, _pulls, token) = relay(vec![Step::Chunk("a"), Step::Stall], Duration::from_secs(5));

        assert_eq!(next_data(&mut body).await.unwrap().unwrap(), "a");
        token.cancel();
        let err = next_data(&mut body).await.unwrap().unwrap_err();
        assert!(matches!(err, UpstreamError::Cancelled));
        assert!(next_data(&mut body).await.is_none());
    }
}
