//! Request handlers and their factories.
//!
//! The router resolves a handler through its [`HandlerId`]. A
//! [`HandlerFactory`] creates the instance, at most once per inbound request
//! however many rules point at the same identity.

use std::fmt;

use async_trait::async_trait;
use http::StatusCode;
use rproxy_core::forward::{Forwarder, Transforms};
use rproxy_core::protocol::{DispatchStatus, InboundRequest, ProxyError, ResponseSink, deny};

#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handles `request`, returns [`DispatchStatus::Continue`] to let the next
    /// matching handler try.
    async fn handle(
        &self,
        request: &mut (dyn InboundRequest + '_),
        response: &mut (dyn ResponseSink + '_),
    ) -> Result<DispatchStatus, ProxyError>;
}

/// An opaque handler identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId(&'static str);

impl HandlerId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Creates handler instances for one identity.
pub trait HandlerFactory: Send + Sync {
    fn create(&self) -> Box<dyn RequestHandler>;
}

impl<F, H> HandlerFactory for F
where
    F: Fn() -> H + Send + Sync,
    H: RequestHandler + 'static,
{
    fn create(&self) -> Box<dyn RequestHandler> {
        Box::new(self())
    }
}

/// Forwards every request to one upstream.
#[derive(Debug, Clone)]
pub struct ForwardHandler {
    forwarder: Forwarder,
    target: String,
    transforms: Transforms,
}

impl ForwardHandler {
    pub fn new(forwarder: Forwarder, target: impl Into<String>) -> Self {
        Self { forwarder, target: target.into(), transforms: Transforms::default() }
    }

    #[must_use]
    pub fn with_transforms(mut self, transforms: Transforms) -> Self {
        self.transforms = transforms;
        self
    }
}

#[async_trait]
impl RequestHandler for ForwardHandler {
    async fn handle(
        &self,
        request: &mut (dyn InboundRequest + '_),
        response: &mut (dyn ResponseSink + '_),
    ) -> Result<DispatchStatus, ProxyError> {
        self.forwarder.forward_with(&self.target, request, response, &self.transforms).await
    }
}

/// Answers every request with `401 Unauthorized`.
#[derive(Debug, Copy, Clone, Default)]
pub struct DenyHandler;

#[async_trait]
impl RequestHandler for DenyHandler {
    async fn handle(
        &self,
        _request: &mut (dyn InboundRequest + '_),
        response: &mut (dyn ResponseSink + '_),
    ) -> Result<DispatchStatus, ProxyError> {
        Ok(deny(response))
    }
}

/// The default last stage, `404 Not Found`.
#[derive(Debug, Copy, Clone, Default)]
pub struct NotFoundHandler;

#[async_trait]
impl RequestHandler for NotFoundHandler {
    async fn handle(
        &self,
        _request: &mut (dyn InboundRequest + '_),
        response: &mut (dyn ResponseSink + '_),
    ) -> Result<DispatchStatus, ProxyError> {
        response.set_status(StatusCode::NOT_FOUND);
        Ok(DispatchStatus::Completed)
    }
}
