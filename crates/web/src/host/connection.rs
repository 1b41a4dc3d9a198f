use std::io;
use std::sync::Arc;

use futures::StreamExt;
use http::{Method, StatusCode};
use rproxy_core::protocol::ResponseSink;
use rproxy_core::protocol::header::EXPECT;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::Gateway;
use crate::host::HostSettings;
use crate::host::request::{HostRequest, body_reader};
use crate::host::request_decoder::RequestHeadDecoder;
use crate::host::response::HostResponse;

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Serves a single request on `stream`, then closes it.
pub(crate) async fn serve_connection(stream: TcpStream, gateway: Arc<Gateway>, settings: HostSettings) -> io::Result<()> {
    let local_addr = stream.local_addr()?;
    let remote_addr = stream.peer_addr()?;
    let (reader, mut writer) = stream.into_split();

    let mut framed = FramedRead::with_capacity(reader, RequestHeadDecoder::new(settings.max_header_bytes), 8 * 1024);
    let (head, payload_size) = match framed.next().await {
        Some(Ok(item)) => item,
        Some(Err(e)) => {
            warn!(cause = %e, "can't parse request head");
            let mut response = HostResponse::new(writer, &Method::GET, settings.response_buffer_size);
            response.send_error(StatusCode::BAD_REQUEST).await?;
            return response.finish().await;
        }
        None => {
            debug!("connection closed before a request arrived");
            return Ok(());
        }
    };

    let expects_continue = head.headers.get(EXPECT).is_some_and(|value| value.eq_ignore_ascii_case("100-continue"));
    if expects_continue && !payload_size.is_empty() {
        writer.write_all(CONTINUE).await?;
        writer.flush().await?;
        debug!("received expect request header, sent continue response");
    }

    let body = if payload_size.is_empty() { None } else { Some(body_reader(framed, payload_size)) };
    let method = head.method.clone();
    let mut request = HostRequest::new(head, local_addr, remote_addr, body);
    let mut response = HostResponse::new(writer, &method, settings.response_buffer_size);

    gateway.dispatch(&mut request, &mut response).await;
    response.finish().await
}
