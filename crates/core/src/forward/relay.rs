//! The request body relay task.
//!
//! The inbound body is copied to the upstream on its own task so the engine
//! can read the response at the same time. Neither side can then block the
//! other by filling a socket buffer nobody drains.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use futures::SinkExt;
use tokio::io::{AsyncReadExt, AsyncWrite};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, warn};

use crate::codec::RequestEncoder;
use crate::protocol::{BodyReader, Message, PayloadItem, PayloadSize, ProxyError, RequestHead};

pub(crate) type RequestMessage = Message<(RequestHead, PayloadSize)>;

/// Handle of a running body relay.
///
/// Dropping it cancels the task.
#[derive(Debug)]
pub(crate) struct BodyRelay {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BodyRelay {
    /// Starts relaying `body` into `writer`, which already carries the request head.
    pub(crate) fn spawn<W>(
        body: BodyReader,
        writer: FramedWrite<W, RequestEncoder>,
        buffer_size: usize,
        read_timeout: Duration,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(
            async move {
                match relay_body(body, writer, buffer_size, read_timeout, token).await {
                    Ok(total) => debug!(total, "request body relay finished"),
                    Err(e) => warn!(cause = %e, "request body relay failed"),
                }
            }
            .instrument(Span::current()),
        );
        Self { cancel, handle }
    }

    /// Signals the task to stop, waits up to `wait` for it, then aborts it.
    pub(crate) async fn stop(mut self, wait: Duration) {
        self.cancel.cancel();
        match timeout(wait, &mut self.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(cause = %e, "request body relay terminated abnormally"),
            Err(_) => {
                warn!(?wait, "request body relay did not stop in time, aborting it");
                self.handle.abort();
            }
        }
    }
}

impl Drop for BodyRelay {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

async fn relay_body<W>(
    mut body: BodyReader,
    mut writer: FramedWrite<W, RequestEncoder>,
    buffer_size: usize,
    read_timeout: Duration,
    cancel: CancellationToken,
) -> Result<u64, ProxyError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(buffer_size);
    let mut total = 0u64;

    loop {
        buf.reserve(buffer_size);
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(total, "request body relay stopped");
                return Ok(total);
            }
            read = timeout(read_timeout, body.read_buf(&mut buf)) => read,
        };

        let n = match read {
            Ok(result) => result?,
            Err(_) => return Err(io::Error::new(io::ErrorKind::TimedOut, "reading the request body timed out").into()),
        };

        let message = if n == 0 {
            RequestMessage::Payload(PayloadItem::Eof)
        } else {
            total += n as u64;
            RequestMessage::from(buf.split().freeze())
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(total, "request body relay stopped");
                return Ok(total);
            }
            sent = writer.send(message) => sent?,
        }

        if n == 0 {
            return Ok(total);
        }
    }
}
