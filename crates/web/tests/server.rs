use async_trait::async_trait;
use rproxy_core::forward::Forwarder;
use rproxy_core::protocol::{DispatchStatus, InboundRequest, ProxyError, ResponseSink};
use rproxy_web::handler::{DenyHandler, ForwardHandler};
use rproxy_web::router::MatchKind;
use rproxy_web::{HandlerId, RequestHandler, Router, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const BACKEND: HandlerId = HandlerId::new("backend");
const HELLO: HandlerId = HandlerId::new("hello");
const DENY: HandlerId = HandlerId::new("deny");
const SKIP: HandlerId = HandlerId::new("skip");

struct Hello;

#[async_trait]
impl RequestHandler for Hello {
    async fn handle(
        &self,
        request: &mut (dyn InboundRequest + '_),
        response: &mut (dyn ResponseSink + '_),
    ) -> Result<DispatchStatus, ProxyError> {
        response.set_header("Content-Type", "text/plain");
        let body = format!("hello {}", request.query().unwrap_or("anonymous"));
        response.write(body.as_bytes()).await?;
        Ok(DispatchStatus::Completed)
    }
}

struct Skip;

#[async_trait]
impl RequestHandler for Skip {
    async fn handle(
        &self,
        _request: &mut (dyn InboundRequest + '_),
        response: &mut (dyn ResponseSink + '_),
    ) -> Result<DispatchStatus, ProxyError> {
        response.add_header("X-Skipped", "true");
        Ok(DispatchStatus::Continue)
    }
}

/// Answers one connection once the request ends with `until`.
async fn upstream(response: &'static [u8], until: &'static [u8]) -> (String, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        while !received.ends_with(until) {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }
        stream.write_all(response).await.unwrap();
        stream.shutdown().await.unwrap();
        received
    });

    (format!("http://{addr}"), handle)
}

async fn start(target: String) -> String {
    let forwarder = Forwarder::default();
    let router = Router::builder()
        .handler(BACKEND, move || ForwardHandler::new(forwarder.clone(), target.clone()))
        .handler(HELLO, || Hello)
        .handler(DENY, || DenyHandler)
        .handler(SKIP, || Skip)
        .register(MatchKind::Glob, "/api/*", BACKEND)
        .register(MatchKind::Exact, "/hello", SKIP)
        .register(MatchKind::Exact, "/hello", HELLO)
        .register(MatchKind::Regex, "/admin(/.*)?", DENY)
        .build()
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::builder().router(router).address(addr).build().unwrap();
    tokio::spawn(server.serve(listener));
    addr.to_string()
}

async fn send(addr: &str, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_local_handler_after_continue() {
    let addr = start("http://127.0.0.1:9".into()).await;

    let response = send(&addr, b"GET /hello?world HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("X-Skipped: true\r\n"));
    assert!(response.contains("Content-Length: 11\r\n"));
    assert!(response.contains("Connection: close\r\n"));
    assert!(response.ends_with("\r\n\r\nhello world"));
}

#[tokio::test]
async fn test_deny_and_not_found() {
    let addr = start("http://127.0.0.1:9".into()).await;

    let response = send(&addr, b"GET /admin/users HTTP/1.1\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 401 Unauthorized\r\n"));

    let response = send(&addr, b"GET /nowhere HTTP/1.1\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
}

#[tokio::test]
async fn test_bad_request() {
    let addr = start("http://127.0.0.1:9".into()).await;

    let response = send(&addr, b"NOT A REQUEST\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn test_forward_through_server() {
    let (target, upstream) = upstream(
        b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\n\r\n2\r\n{}\r\n0\r\n\r\n",
        b"0\r\n\r\n",
    )
    .await;
    let addr = start(target).await;

    let response = send(
        &addr,
        b"POST /api/items HTTP/1.1\r\nHost: gateway.local\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nname\r\n0\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: application/json\r\n"));
    assert!(response.contains(&format!("Via: HTTP/1.1 {addr}\r\n")));
    assert!(response.ends_with("\r\n\r\n{}"));

    let received = String::from_utf8(upstream.await.unwrap()).unwrap();
    assert!(received.starts_with("POST /api/items HTTP/1.1\r\n"));
    assert!(received.contains("X-Forwarded-Host: gateway.local\r\n"));
    assert!(received.ends_with("\r\n\r\n4\r\nname\r\n0\r\n\r\n"));
}

#[tokio::test]
async fn test_expect_continue() {
    let (target, upstream) = upstream(b"HTTP/1.1 204 No Content\r\n\r\n", b"hello").await;
    let addr = start(target).await;

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(b"PUT /api/item HTTP/1.1\r\nContent-Length: 5\r\nExpect: 100-continue\r\n\r\n")
        .await
        .unwrap();

    let mut interim = [0u8; 25];
    stream.read_exact(&mut interim).await.unwrap();
    assert_eq!(&interim, b"HTTP/1.1 100 Continue\r\n\r\n");

    stream.write_all(b"hello").await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 204 No Content\r\n"));

    let received = String::from_utf8(upstream.await.unwrap()).unwrap();
    assert!(!received.contains("Expect"));
    assert!(received.ends_with("\r\n\r\nhello"));
}
