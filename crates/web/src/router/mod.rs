//! Ordered, predicate based request dispatch.
//!
//! A [`Router`] holds [`MatchRule`]s in registration order. For a request
//! every rule whose predicate accepts the path is tried in that order until a
//! handler reports [`DispatchStatus::Completed`].
//!
//! ```
//! use rproxy_web::handler::DenyHandler;
//! use rproxy_web::router::{MatchKind, Router};
//! use rproxy_web::HandlerId;
//!
//! const ADMIN: HandlerId = HandlerId::new("admin");
//!
//! let router = Router::builder()
//!     .handler(ADMIN, || DenyHandler)
//!     .register(MatchKind::Glob, "/admin/*", ADMIN)
//!     .register(MatchKind::Exact, "login", ADMIN)
//!     .build()
//!     .unwrap();
//! assert_eq!(router.rules().len(), 2);
//! ```

mod matcher;

pub use matcher::MatchKind;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use rproxy_core::protocol::{DispatchStatus, InboundRequest, ProxyError, ResponseSink};
use tracing::{debug, info};

use crate::handler::{HandlerFactory, HandlerId, RequestHandler};
use matcher::{PathMatcher, with_leading_slash};

/// A path predicate bound to a handler identity.
#[derive(Debug, Clone)]
pub struct MatchRule {
    kind: MatchKind,
    pattern: String,
    matcher: PathMatcher,
    handler: HandlerId,
}

impl MatchRule {
    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    /// The pattern with its leading `/`.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handler(&self) -> HandlerId {
        self.handler
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matcher.matches(path)
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.pattern)
    }
}

/// The immutable rule list, shared by all request tasks.
pub struct Router {
    rules: Vec<MatchRule>,
    factories: HashMap<HandlerId, Arc<dyn HandlerFactory>>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").field("rules", &self.rules).finish_non_exhaustive()
    }
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    /// Rules accepting `path`, in registration order.
    pub fn matching<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a MatchRule> + 'a {
        self.rules.iter().filter(move |rule| rule.matches(path))
    }

    /// Runs the handlers of all matching rules until one completes.
    ///
    /// Returns [`DispatchStatus::Continue`] when nothing matched or every
    /// handler declined.
    ///
    /// # Errors
    ///
    /// The first handler error ends the dispatch.
    pub async fn dispatch(
        &self,
        request: &mut (dyn InboundRequest + '_),
        response: &mut (dyn ResponseSink + '_),
    ) -> Result<DispatchStatus, ProxyError> {
        let path = request.path().to_string();
        let mut instances: HashMap<HandlerId, Box<dyn RequestHandler>> = HashMap::new();

        for rule in self.matching(&path) {
            let handler = match instances.entry(rule.handler) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let factory = self
                        .factories
                        .get(&rule.handler)
                        .ok_or_else(|| ProxyError::config(format!("no factory for handler '{}'", rule.handler)))?;
                    entry.insert(factory.create())
                }
            };

            debug!(path = %path, rule = %rule, handler = %rule.handler, "request matched, executing handler");
            match handler.handle(request, response).await? {
                DispatchStatus::Completed => return Ok(DispatchStatus::Completed),
                DispatchStatus::Continue => {}
            }
        }

        Ok(DispatchStatus::Continue)
    }
}

enum Registration {
    Rule { kind: MatchKind, pattern: String, handler: HandlerId },
    Factory { id: HandlerId, factory: Arc<dyn HandlerFactory> },
}

/// Collects handlers and rules; [`build`](RouterBuilder::build) validates them.
pub struct RouterBuilder {
    registrations: Vec<Registration>,
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder").field("registrations", &self.registrations.len()).finish()
    }
}

impl RouterBuilder {
    fn new() -> Self {
        Self { registrations: Vec::new() }
    }

    /// Binds `id` to the factory creating its instances.
    pub fn handler<F: HandlerFactory + 'static>(mut self, id: HandlerId, factory: F) -> Self {
        self.registrations.push(Registration::Factory { id, factory: Arc::new(factory) });
        self
    }

    /// Appends a rule, `pattern` gets a leading `/` if it lacks one.
    pub fn register(mut self, kind: MatchKind, pattern: impl AsRef<str>, handler: HandlerId) -> Self {
        let pattern = with_leading_slash(pattern.as_ref());
        self.registrations.push(Registration::Rule { kind, pattern, handler });
        self
    }

    /// Appends a rule accepting every path.
    pub fn register_all(self, handler: HandlerId) -> Self {
        self.register(MatchKind::All, "/", handler)
    }

    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] for an invalid pattern, a handler bound
    /// twice or a rule whose handler has no factory.
    pub fn build(self) -> Result<Router, ProxyError> {
        let mut rules = Vec::new();
        let mut factories: HashMap<HandlerId, Arc<dyn HandlerFactory>> = HashMap::new();

        for registration in self.registrations {
            match registration {
                Registration::Factory { id, factory } => {
                    if factories.insert(id, factory).is_some() {
                        return Err(ProxyError::config(format!("handler '{id}' is bound twice")));
                    }
                }
                Registration::Rule { kind, pattern, handler } => {
                    let matcher = PathMatcher::compile(kind, &pattern)?;
                    rules.push(MatchRule { kind, pattern, matcher, handler });
                }
            }
        }

        for rule in &rules {
            if !factories.contains_key(&rule.handler) {
                return Err(ProxyError::config(format!("can't register rule '{rule}', handler '{}' is unknown", rule.handler)));
            }
            info!(handler = %rule.handler, rule = %rule, "register handler");
        }

        Ok(Router { rules, factories })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::{Method, StatusCode};
    use rproxy_core::protocol::{ErrorKind, MemoryRequest, MemoryResponse};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const H1: HandlerId = HandlerId::new("h1");
    const H2: HandlerId = HandlerId::new("h2");

    /// Records its invocations and answers with a fixed status.
    struct Recording {
        name: &'static str,
        status: DispatchStatus,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl RequestHandler for Recording {
        async fn handle(
            &self,
            _request: &mut (dyn InboundRequest + '_),
            _response: &mut (dyn ResponseSink + '_),
        ) -> Result<DispatchStatus, ProxyError> {
            self.calls.lock().unwrap().push(self.name);
            Ok(self.status)
        }
    }

    fn router(h1_status: DispatchStatus, calls: &Arc<Mutex<Vec<&'static str>>>) -> Router {
        let (c1, c2) = (Arc::clone(calls), Arc::clone(calls));
        Router::builder()
            .handler(H1, move || Recording { name: "h1", status: h1_status, calls: Arc::clone(&c1) })
            .handler(H2, move || Recording { name: "h2", status: DispatchStatus::Completed, calls: Arc::clone(&c2) })
            .register(MatchKind::Glob, "/a/*", H1)
            .register(MatchKind::Exact, "/a/b", H2)
            .build()
            .unwrap()
    }

    async fn dispatch(router: &Router, path: &str) -> DispatchStatus {
        let mut request = MemoryRequest::new(Method::GET, path);
        let mut response = MemoryResponse::new();
        router.dispatch(&mut request, &mut response).await.unwrap()
    }

    #[tokio::test]
    async fn test_continue_falls_through() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let router = router(DispatchStatus::Continue, &calls);

        assert_eq!(dispatch(&router, "/a/b").await, DispatchStatus::Completed);
        assert_eq!(*calls.lock().unwrap(), ["h1", "h2"]);
    }

    #[tokio::test]
    async fn test_completed_stops() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let router = router(DispatchStatus::Completed, &calls);

        assert_eq!(dispatch(&router, "/a/b").await, DispatchStatus::Completed);
        assert_eq!(*calls.lock().unwrap(), ["h1"]);
    }

    #[tokio::test]
    async fn test_no_match_continues() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let router = router(DispatchStatus::Completed, &calls);

        assert_eq!(dispatch(&router, "/b").await, DispatchStatus::Continue);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_instance_per_request() {
        let created = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (counter, recorded) = (Arc::clone(&created), Arc::clone(&calls));

        let router = Router::builder()
            .handler(H1, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Recording { name: "h1", status: DispatchStatus::Continue, calls: Arc::clone(&recorded) }
            })
            .register(MatchKind::Glob, "/*", H1)
            .register(MatchKind::Regex, "/x.*", H1)
            .register_all(H1)
            .build()
            .unwrap();

        assert_eq!(dispatch(&router, "/xyz").await, DispatchStatus::Continue);
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(calls.lock().unwrap().len(), 3);

        dispatch(&router, "/xyz").await;
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_handler_error_ends_dispatch() {
        struct Failing;

        #[async_trait]
        impl RequestHandler for Failing {
            async fn handle(
                &self,
                _request: &mut (dyn InboundRequest + '_),
                response: &mut (dyn ResponseSink + '_),
            ) -> Result<DispatchStatus, ProxyError> {
                response.set_status(StatusCode::IM_A_TEAPOT);
                Err(ProxyError::bad_gateway("nope"))
            }
        }

        let router = Router::builder().handler(H1, || Failing).register_all(H1).build().unwrap();
        let mut request = MemoryRequest::new(Method::GET, "/");
        let mut response = MemoryResponse::new();
        let e = router.dispatch(&mut request, &mut response).await.unwrap_err();
        assert_eq!(e.kind(), ErrorKind::BadGateway);
    }

    #[test]
    fn test_build_errors() {
        let e = Router::builder().register(MatchKind::Exact, "/", H1).build().unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Config);

        let e = Router::builder()
            .handler(H1, || crate::handler::DenyHandler)
            .handler(H1, || crate::handler::DenyHandler)
            .build()
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Config);

        let e = Router::builder()
            .handler(H1, || crate::handler::DenyHandler)
            .register(MatchKind::Regex, "/[", H1)
            .build()
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_patterns_get_leading_slash() {
        let router = Router::builder()
            .handler(H1, || crate::handler::DenyHandler)
            .register(MatchKind::Exact, "index.html", H1)
            .build()
            .unwrap();
        assert_eq!(router.rules()[0].pattern(), "/index.html");
        assert_eq!(router.rules()[0].to_string(), "exact:/index.html");
        assert_eq!(router.matching("/index.html").count(), 1);
    }
}
