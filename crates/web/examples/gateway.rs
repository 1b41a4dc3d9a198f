//! A small gateway in front of two local services.
//!
//! ```text
//! curl -v http://127.0.0.1:8080/api/users          # forwarded to 127.0.0.1:9000
//! curl -v http://127.0.0.1:8080/static/index.html  # forwarded to 127.0.0.1:9001, body rewritten
//! curl -v http://127.0.0.1:8080/admin              # 401 without X-Api-Key
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rproxy_core::config::ForwardConfig;
use rproxy_core::forward::{ContentTransform, Forwarder, Transforms};
use rproxy_core::protocol::{DispatchStatus, InboundRequest, ProxyError, ResponseSink};
use rproxy_web::handler::{DenyHandler, ForwardHandler};
use rproxy_web::router::MatchKind;
use rproxy_web::{HandlerId, RequestHandler, Router, Server};

const API: HandlerId = HandlerId::new("api");
const STATIC: HandlerId = HandlerId::new("static");
const API_KEY: HandlerId = HandlerId::new("api-key");
const DENY: HandlerId = HandlerId::new("deny");

/// Lets requests carrying an `X-Api-Key` header through to the next handler.
#[derive(Debug)]
struct ApiKeyCheck;

#[async_trait]
impl RequestHandler for ApiKeyCheck {
    async fn handle(
        &self,
        request: &mut (dyn InboundRequest + '_),
        response: &mut (dyn ResponseSink + '_),
    ) -> Result<DispatchStatus, ProxyError> {
        if request.headers().contains("x-api-key") {
            return Ok(DispatchStatus::Continue);
        }
        DenyHandler.handle(request, response).await
    }
}

/// Serves static content and stamps every html page.
#[derive(Debug)]
struct StaticSite {
    forwarder: Forwarder,
}

#[async_trait]
impl RequestHandler for StaticSite {
    async fn handle(
        &self,
        request: &mut (dyn InboundRequest + '_),
        response: &mut (dyn ResponseSink + '_),
    ) -> Result<DispatchStatus, ProxyError> {
        let stamp = |body: Bytes| {
            let html = std::str::from_utf8(&body).ok()?;
            Some(Bytes::from(html.replace("</body>", "<!-- served by rproxy --></body>")))
        };
        let transforms = Transforms::new().on_response(|head| {
            head.headers_mut().remove("server");
        });
        self.forwarder
            .forward_modify("http://127.0.0.1:9001", request, response, &transforms, Some(&stamp as &ContentTransform))
            .await
    }
}

#[tokio::main]
async fn main() {
    let config = match ForwardConfig::builder().read_timeout(Duration::from_secs(10)).build() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid forward config: {e}");
            return;
        }
    };
    let forwarder = Forwarder::new(config);
    let api_forwarder = forwarder.clone();

    let router = Router::builder()
        .handler(API, move || ForwardHandler::new(api_forwarder.clone(), "http://127.0.0.1:9000"))
        .handler(STATIC, move || StaticSite { forwarder: forwarder.clone() })
        .handler(API_KEY, || ApiKeyCheck)
        .handler(DENY, || DenyHandler)
        .register(MatchKind::Glob, "/api/*", API)
        .register(MatchKind::Regex, r"/static/.+\.html", STATIC)
        .register(MatchKind::Exact, "/admin", API_KEY)
        .register(MatchKind::Exact, "/admin", DENY)
        .build();

    let router = match router {
        Ok(router) => router,
        Err(e) => {
            eprintln!("invalid routes: {e}");
            return;
        }
    };

    match Server::builder().router(router).address("127.0.0.1:8080").build() {
        Ok(server) => server.start().await,
        Err(e) => eprintln!("can't build server: {e}"),
    }
}
