//! The routing stage of a host.

use http::StatusCode;
use rproxy_core::protocol::{DispatchStatus, InboundRequest, ProxyError, ResponseSink};
use tracing::{Level, error, trace, warn};

use crate::handler::{NotFoundHandler, RequestHandler};
use crate::router::Router;

/// Dispatches through the [`Router`] and hands requests no handler completed
/// to the fallback handler.
///
/// Errors never leave the gateway: they are logged and answered with `500`,
/// or the response is aborted when it is already committed.
pub struct Gateway {
    router: Router,
    fallback: Box<dyn RequestHandler>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway").field("router", &self.router).finish_non_exhaustive()
    }
}

impl Gateway {
    /// A gateway answering `404` when no handler completes.
    pub fn new(router: Router) -> Self {
        Self { router, fallback: Box::new(NotFoundHandler) }
    }

    pub fn with_fallback(router: Router, fallback: Box<dyn RequestHandler>) -> Self {
        Self { router, fallback }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub async fn dispatch(&self, request: &mut (dyn InboundRequest + '_), response: &mut (dyn ResponseSink + '_)) {
        if tracing::enabled!(Level::TRACE) {
            log_inbound(&*request);
        }

        match self.router.dispatch(request, response).await {
            Ok(DispatchStatus::Completed) => return,
            Ok(DispatchStatus::Continue) => {}
            Err(e) => return fail(&e, response).await,
        }

        if let Err(e) = self.fallback.handle(request, response).await {
            fail(&e, response).await;
        }
    }
}

async fn fail(e: &ProxyError, response: &mut (dyn ResponseSink + '_)) {
    error!(cause = %e, "failed to process request");
    if response.is_committed() {
        response.abort();
    } else if let Err(send_error) = response.send_error(StatusCode::INTERNAL_SERVER_ERROR).await {
        warn!(cause = %send_error, "can't send error response");
    }
}

fn log_inbound(request: &(dyn InboundRequest + '_)) {
    trace!(
        method = %request.method(),
        path = request.path(),
        query = request.query().unwrap_or_default(),
        scheme = request.scheme(),
        remote_addr = %request.remote_addr(),
        "inbound request"
    );

    let mut lines: Vec<(&str, &str)> = request.headers().lines().collect();
    lines.sort_by_key(|(name, _)| name.to_ascii_lowercase());
    for (name, value) in lines {
        trace!("header {name}: {value}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{DenyHandler, HandlerId};
    use crate::router::MatchKind;
    use async_trait::async_trait;
    use http::Method;
    use rproxy_core::protocol::{MemoryRequest, MemoryResponse};

    const FAILING: HandlerId = HandlerId::new("failing");
    const DENY: HandlerId = HandlerId::new("deny");

    struct Failing;

    #[async_trait]
    impl RequestHandler for Failing {
        async fn handle(
            &self,
            _request: &mut (dyn InboundRequest + '_),
            _response: &mut (dyn ResponseSink + '_),
        ) -> Result<DispatchStatus, ProxyError> {
            Err(ProxyError::config("broken handler"))
        }
    }

    fn gateway() -> Gateway {
        let router = Router::builder()
            .handler(FAILING, || Failing)
            .handler(DENY, || DenyHandler)
            .register(MatchKind::Glob, "/fail/*", FAILING)
            .register(MatchKind::Exact, "/admin", DENY)
            .build()
            .unwrap();
        Gateway::new(router)
    }

    async fn dispatch(path: &str) -> MemoryResponse {
        let mut request = MemoryRequest::new(Method::GET, path);
        let mut response = MemoryResponse::new();
        gateway().dispatch(&mut request, &mut response).await;
        response
    }

    #[tokio::test]
    async fn test_completed_by_handler() {
        assert_eq!(dispatch("/admin").await.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_fallback_not_found() {
        assert_eq!(dispatch("/unknown").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_is_internal_server_error() {
        let response = dispatch("/fail/now").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.is_committed());
    }

    #[tokio::test]
    async fn test_error_after_commit_aborts() {
        let mut request = MemoryRequest::new(Method::GET, "/fail/late");
        let mut response = MemoryResponse::new();
        response.flush().await.unwrap();

        gateway().dispatch(&mut request, &mut response).await;
        assert!(response.is_aborted());
        assert_eq!(response.status(), StatusCode::OK);
    }
}
