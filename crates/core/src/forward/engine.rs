//! One proxied request, end to end.
//!
//! ```text
//! Connecting -> SendingHeaders -> Exchanging -> ReceivingBody -> Done
//!      \              \               \              \
//!       +--------------+---------------+--------------+--> Failed
//! ```
//!
//! While `Exchanging` the request body relay runs on its own task and the
//! upstream response head is parsed at the same time.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use http::{Method, StatusCode, Uri};
use tokio::io::AsyncRead;
use tokio::time::timeout;
use tokio_util::codec::{Encoder, FramedRead, FramedWrite};
use tracing::{Instrument, Level, debug, error, info_span, trace, warn};
use uuid::Uuid;

use crate::codec::header::RequestHeadEncoder;
use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::config::{ForwardConfig, UnframedBodyPolicy};
use crate::forward::Transforms;
use crate::forward::headers::{annotate_response_head, outbound_request_head};
use crate::forward::relay::{BodyRelay, RequestMessage};
use crate::forward::upstream::{self, Upstream};
use crate::protocol::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use crate::protocol::{
    DispatchStatus, ErrorKind, InboundRequest, Message, ParseError, PayloadItem, PayloadSize, ProxyError,
    ResponseSink,
};
use crate::utils::trace_hexdump;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ForwardState {
    Connecting,
    SendingHeaders,
    /// Request body relay and response head parsing run concurrently.
    Exchanging,
    ReceivingBody,
    Done,
}

/// The forwarding engine.
///
/// Cheap to clone, the configuration is shared. Every forward opens its own
/// upstream connection and closes it when done.
#[derive(Debug, Clone, Default)]
pub struct Forwarder {
    config: Arc<ForwardConfig>,
}

impl Forwarder {
    pub fn new(config: ForwardConfig) -> Self {
        Self { config: Arc::new(config) }
    }

    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    /// Forwards `request` to `target` and writes the upstream response to `sink`.
    ///
    /// See [`forward_with`](Self::forward_with).
    pub async fn forward(
        &self,
        target: &str,
        request: &mut (dyn InboundRequest + '_),
        sink: &mut (dyn ResponseSink + '_),
    ) -> Result<DispatchStatus, ProxyError> {
        self.forward_with(target, request, sink, &Transforms::default()).await
    }

    /// Forwards `request` to the upstream named by `target`, applying `transforms`.
    ///
    /// Only the scheme, host and port of `target` are used, the inbound path
    /// and query are sent as they are.
    ///
    /// Failures during the exchange never leave this function. They are
    /// logged and answered with `502` when the upstream is unreachable or
    /// `500` otherwise; a response that is already committed is aborted
    /// instead. The result is then [`DispatchStatus::Completed`].
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] when `target` is not a valid URL.
    pub async fn forward_with(
        &self,
        target: &str,
        request: &mut (dyn InboundRequest + '_),
        sink: &mut (dyn ResponseSink + '_),
        transforms: &Transforms,
    ) -> Result<DispatchStatus, ProxyError> {
        let uri = target.parse::<Uri>().map_err(|e| ProxyError::config(format!("invalid target '{target}': {e}")))?;

        let span = info_span!(
            "forward",
            request_id = %Uuid::new_v4(),
            method = %request.method(),
            path = request.path(),
            upstream = target,
        );

        async move {
            let mut state = ForwardState::Connecting;
            match self.exchange(&uri, request, sink, transforms, &mut state).await {
                Ok(()) => debug!(status = %sink.status(), "forward finished"),
                Err(e) => fail(&e, state, sink).await,
            }
            Ok(DispatchStatus::Completed)
        }
        .instrument(span)
        .await
    }

    async fn exchange(
        &self,
        uri: &Uri,
        request: &mut (dyn InboundRequest + '_),
        sink: &mut (dyn ResponseSink + '_),
        transforms: &Transforms,
        state: &mut ForwardState,
    ) -> Result<(), ProxyError> {
        let config = &*self.config;
        let upstream = Upstream::from_uri(uri)?;
        let stream = upstream::connect(&upstream, config).await?;

        *state = ForwardState::SendingHeaders;
        let head = outbound_request_head(&*request, &upstream, transforms);
        let payload_size = PayloadSize::of_request(request.headers())?;
        let head_request = *head.method() == Method::HEAD;
        let local_addr = request.local_addr();

        if tracing::enabled!(Level::TRACE) {
            let mut raw = BytesMut::new();
            RequestHeadEncoder.encode((head.clone(), payload_size), &mut raw)?;
            trace_hexdump("outbound request head", &raw);
        }

        let (reader, writer) = tokio::io::split(stream);
        let mut writer = FramedWrite::new(writer, RequestEncoder::new());
        timeout(config.read_timeout(), writer.send(RequestMessage::Header((head, payload_size))))
            .await
            .map_err(|_| timed_out("writing the request head"))??;

        *state = ForwardState::Exchanging;
        let relay = match (payload_size, request.take_body()) {
            (PayloadSize::Empty, _) => None,
            (_, Some(body)) => Some(BodyRelay::spawn(body, writer, config.buffer_size(), config.read_timeout())),
            (_, None) => {
                warn!(?payload_size, "request declares a body but none is available");
                writer.send(RequestMessage::Payload(PayloadItem::Eof)).await?;
                None
            }
        };

        let result = relay_response(reader, config, head_request, local_addr, sink, transforms, state).await;

        if let Some(relay) = relay {
            relay.stop(config.relay_stop_timeout()).await;
        }
        result
    }
}

/// Reads the upstream response from `reader` and relays it to `sink`.
pub(crate) async fn relay_response<R>(
    reader: R,
    config: &ForwardConfig,
    head_request: bool,
    local_addr: SocketAddr,
    sink: &mut (dyn ResponseSink + '_),
    transforms: &Transforms,
    state: &mut ForwardState,
) -> Result<(), ProxyError>
where
    R: AsyncRead + Unpin,
{
    let decoder = ResponseDecoder::new(config.max_header_bytes())
        .for_head_request(head_request)
        .read_until_close(config.unframed_body() == UnframedBodyPolicy::ReadUntilClose);
    let mut framed = FramedRead::with_capacity(reader, decoder, config.buffer_size());

    let (result, payload_size) = match timeout(config.read_timeout(), framed.next()).await {
        Ok(Some(Ok(Message::Header(header)))) => header,
        Ok(Some(Ok(Message::Payload(_)))) => {
            return Err(ParseError::invalid_status_line("payload received before the response head").into());
        }
        Ok(Some(Err(e))) => return Err(e.into()),
        Ok(None) => return Err(ParseError::unexpected_eof("status line").into()),
        Err(_) => return Err(timed_out("reading the response head")),
    };
    trace_hexdump("upstream response head", result.raw());

    let mut head = result.into_head();
    let code = head.status().code();
    let status = StatusCode::from_u16(code).map_err(|_| ParseError::invalid_status_line(head.status()))?;
    annotate_response_head(&mut head, local_addr, transforms);

    sink.set_status(status);
    for (name, value) in head.headers().lines() {
        let stale_length = payload_size.is_chunked() && name.eq_ignore_ascii_case(CONTENT_LENGTH);
        if !stale_length && !name.eq_ignore_ascii_case(TRANSFER_ENCODING) {
            sink.add_header(name, value);
        }
    }
    debug!(status = code, ?payload_size, "upstream response head received");

    *state = ForwardState::ReceivingBody;
    let mut total = 0u64;
    loop {
        let message = match timeout(config.read_timeout(), framed.next()).await {
            Ok(message) => message,
            Err(_) if payload_size == PayloadSize::UntilClose => {
                debug!(total, "upstream idle, unframed body considered complete");
                break;
            }
            Err(_) => return Err(timed_out("reading the response body")),
        };

        match message {
            Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                trace!(len = bytes.len(), "relay response body chunk");
                total += bytes.len() as u64;
                sink.write(&bytes).await?;
            }
            Some(Ok(Message::Payload(PayloadItem::Eof))) | None => break,
            Some(Ok(Message::Header(_))) => {
                return Err(ParseError::invalid_status_line("second response head on one exchange").into());
            }
            Some(Err(ParseError::UnexpectedEof { .. })) if matches!(payload_size, PayloadSize::Length(_)) => {
                warn!(?payload_size, received = total, "upstream closed before the declared content length");
                if !sink.is_committed() {
                    sink.set_content_length(total);
                }
                break;
            }
            Some(Err(e)) => return Err(e.into()),
        }
    }

    sink.flush().await?;
    *state = ForwardState::Done;
    Ok(())
}

async fn fail(e: &ProxyError, state: ForwardState, sink: &mut (dyn ResponseSink + '_)) {
    if e.kind() == ErrorKind::BadGateway {
        warn!(?state, cause = %e, "upstream unreachable");
    } else {
        error!(?state, cause = %e, "forward failed");
    }

    if sink.is_committed() {
        sink.abort();
    } else if let Err(send_error) = sink.send_error(e.status_code()).await {
        warn!(cause = %send_error, "can't send error response");
    }
}

fn timed_out(what: &str) -> ProxyError {
    io::Error::new(io::ErrorKind::TimedOut, format!("{what} timed out")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MemoryResponse;
    use indoc::indoc;

    fn crlf(s: &str) -> String {
        s.replace('\n', "\r\n")
    }

    fn local_addr() -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], 8080))
    }

    async fn relay(raw: &str, config: &ForwardConfig, head_request: bool) -> (Result<(), ProxyError>, MemoryResponse) {
        let mut sink = MemoryResponse::new();
        let mut state = ForwardState::Exchanging;
        let result = relay_response(
            raw.as_bytes(),
            config,
            head_request,
            local_addr(),
            &mut sink,
            &Transforms::default(),
            &mut state,
        )
        .await;
        (result, sink)
    }

    #[tokio::test]
    async fn test_content_length_body() {
        let raw = crlf(indoc! {"
        HTTP/1.1 200 OK
        Content-Type: text/plain
        Content-Length: 5

        hello"});

        let (result, sink) = relay(&raw, &ForwardConfig::default(), false).await;
        result.unwrap();

        assert_eq!(sink.status(), StatusCode::OK);
        assert_eq!(sink.body(), b"hello");
        assert_eq!(sink.headers().get("content-length"), Some("5"));
        assert_eq!(sink.headers().get("via"), Some("HTTP/1.1 10.0.0.1:8080"));
        assert!(sink.is_committed());
    }

    #[tokio::test]
    async fn test_short_content_length_rewrites_length() {
        let raw = crlf(indoc! {"
        HTTP/1.1 200 OK
        Content-Length: 10

        "}) + "hello";

        let (result, sink) = relay(&raw, &ForwardConfig::default(), false).await;
        result.unwrap();

        assert_eq!(sink.body(), b"hello");
        assert_eq!(sink.headers().get_all("content-length"), ["5"]);
    }

    #[tokio::test]
    async fn test_chunked_body_is_dechunked() {
        let raw = crlf(indoc! {"
        HTTP/1.1 200 OK
        Transfer-Encoding: chunked
        Content-Length: 99

        5
        hello
        0

        "});

        let (result, sink) = relay(&raw, &ForwardConfig::default(), false).await;
        result.unwrap();

        assert_eq!(sink.body(), b"hello");
        assert!(!sink.headers().contains("transfer-encoding"));
        assert!(!sink.headers().contains("content-length"));
    }

    #[tokio::test]
    async fn test_no_body_for_head_request() {
        let raw = crlf(indoc! {"
        HTTP/1.1 200 OK
        Content-Length: 5

        "});

        let (result, sink) = relay(&raw, &ForwardConfig::default(), true).await;
        result.unwrap();

        assert!(sink.body().is_empty());
        assert_eq!(sink.headers().get("content-length"), Some("5"));
    }

    #[tokio::test]
    async fn test_unframed_body_policies() {
        let raw = crlf(indoc! {"
        HTTP/1.1 200 OK
        Content-Type: text/html

        "}) + "<html></html>";

        let (result, sink) = relay(&raw, &ForwardConfig::default(), false).await;
        result.unwrap();
        assert!(sink.body().is_empty());

        let config = ForwardConfig::builder().unframed_body(UnframedBodyPolicy::ReadUntilClose).build().unwrap();
        let (result, sink) = relay(&raw, &config, false).await;
        result.unwrap();
        assert_eq!(sink.body(), b"<html></html>");
    }

    #[tokio::test]
    async fn test_interim_response_is_relayed() {
        let raw = crlf(indoc! {"
        HTTP/1.1 102 Processing
        X-Step: 1

        HTTP/1.1 204 No Content
        Server: test

        "});

        let (result, sink) = relay(&raw, &ForwardConfig::default(), false).await;
        result.unwrap();
        assert_eq!(sink.status(), StatusCode::PROCESSING);
        assert_eq!(sink.headers().get("x-step"), Some("1"));
        assert_eq!(sink.headers().get("server"), None);
        assert!(sink.body().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_chunk_fails() {
        let raw = crlf(indoc! {"
        HTTP/1.1 200 OK
        Transfer-Encoding: chunked

        zz
        hello
        "});

        let (result, _sink) = relay(&raw, &ForwardConfig::default(), false).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_truncated_head_fails() {
        let (result, _sink) = relay("HTTP/1.1 200 OK\r\nServer: te", &ForwardConfig::default(), false).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Protocol);
    }
}
