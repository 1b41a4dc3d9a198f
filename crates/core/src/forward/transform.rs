use std::fmt;
use std::sync::Arc;

use crate::protocol::{RequestHead, ResponseHead};

type RequestTransform = Arc<dyn Fn(&mut RequestHead) + Send + Sync>;
type ResponseTransform = Arc<dyn Fn(&mut ResponseHead) + Send + Sync>;

/// Optional caller supplied header rewrites of one forward.
///
/// The request transform sees the copied inbound head before the proxy
/// headers are added. The response transform sees the upstream head after
/// `Via` was appended, just before it is handed to the client.
///
/// ```
/// use rproxy_core::forward::Transforms;
///
/// let transforms = Transforms::new()
///     .on_request(|head| head.headers_mut().insert("X-Api-Key", "secret"))
///     .on_response(|head| {
///         head.headers_mut().remove("Server");
///     });
/// ```
#[derive(Clone, Default)]
pub struct Transforms {
    request: Option<RequestTransform>,
    response: Option<ResponseTransform>,
}

impl Transforms {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_request<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RequestHead) + Send + Sync + 'static,
    {
        self.request = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_response<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ResponseHead) + Send + Sync + 'static,
    {
        self.response = Some(Arc::new(f));
        self
    }

    pub(crate) fn apply_request(&self, head: &mut RequestHead) {
        if let Some(transform) = &self.request {
            transform(head);
        }
    }

    pub(crate) fn apply_response(&self, head: &mut ResponseHead) {
        if let Some(transform) = &self.response {
            transform(head);
        }
    }
}

impl fmt::Debug for Transforms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transforms")
            .field("request", &self.request.is_some())
            .field("response", &self.response.is_some())
            .finish()
    }
}
