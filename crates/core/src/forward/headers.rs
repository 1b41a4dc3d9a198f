//! Building the outbound request head and annotating the response head.

use std::net::{IpAddr, SocketAddr};

use crate::forward::Transforms;
use crate::forward::upstream::Upstream;
use crate::protocol::header::{EXPECT, FORWARDED, HOST, VIA, X_FORWARDED_FOR, X_FORWARDED_HOST, X_FORWARDED_PROTO};
use crate::protocol::{InboundRequest, RequestHead, RequestLine, ResponseHead};

/// Copies the inbound request into the head sent upstream.
///
/// Applied in order: the request transform, `Host` rewrite, `Expect` removal,
/// `X-Forwarded-Host`/`X-Forwarded-Proto` when neither is present, then
/// `X-Forwarded-For`, `Forwarded` and `Via` are appended to.
pub(crate) fn outbound_request_head(
    request: &(dyn InboundRequest + '_),
    upstream: &Upstream,
    transforms: &Transforms,
) -> RequestHead {
    let line = RequestLine::new(request.method().clone(), request.path(), request.query());
    let mut head = RequestHead::new(line, request.headers().clone());
    transforms.apply_request(&mut head);

    let local_addr = request.local_addr();
    let remote_addr = request.remote_addr();
    let original_host = request.headers().get(HOST);
    let headers = head.headers_mut();

    headers.insert(HOST, upstream.host_header());
    headers.remove(EXPECT);

    if !headers.contains(X_FORWARDED_HOST) && !headers.contains(X_FORWARDED_PROTO) {
        if let Some(host) = original_host {
            headers.insert(X_FORWARDED_HOST, host);
        }
        headers.insert(X_FORWARDED_PROTO, request.scheme());
    }

    let mut forwarded_for = headers.get_all(X_FORWARDED_FOR).to_vec();
    forwarded_for.push(remote_addr.ip().to_string());
    forwarded_for.push(local_addr.ip().to_string());
    headers.insert(X_FORWARDED_FOR, forwarded_for.join(", "));

    let mut forwarded = format!("by={};for={}", node(local_addr.ip()), node(remote_addr.ip()));
    if let Some(host) = original_host {
        forwarded.push_str(";host=");
        forwarded.push_str(&quote_unless_token(host));
    }
    forwarded.push_str(";proto=");
    forwarded.push_str(&quote_unless_token(request.scheme()));
    headers.append(FORWARDED, forwarded);

    headers.append(VIA, via(local_addr));
    head
}

/// Appends our `Via` token, then hands the head to the response transform.
pub(crate) fn annotate_response_head(head: &mut ResponseHead, local_addr: SocketAddr, transforms: &Transforms) {
    head.headers_mut().append(VIA, via(local_addr));
    transforms.apply_response(head);
}

fn via(local_addr: SocketAddr) -> String {
    format!("HTTP/1.1 {local_addr}")
}

/// A `Forwarded` node, IPv6 addresses are bracketed and quoted (RFC 7239).
fn node(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(ip) => ip.to_string(),
        IpAddr::V6(ip) => format!("\"[{ip}]\""),
    }
}

fn quote_unless_token(value: &str) -> String {
    let is_token = !value.is_empty() && value.bytes().all(is_tchar);
    if is_token { value.to_string() } else { format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"")) }
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HeaderSet, MemoryRequest, ResponseStatus};
    use http::{Method, Uri};

    fn upstream() -> Upstream {
        Upstream::from_uri(&"http://backend:9000".parse::<Uri>().unwrap()).unwrap()
    }

    fn request() -> MemoryRequest {
        MemoryRequest::new(Method::GET, "/app/index.html")
            .with_query("a=1")
            .with_header("Host", "proxy.example.com")
            .with_header("Accept", "*/*")
            .with_addrs(SocketAddr::from(([10, 0, 0, 1], 8080)), SocketAddr::from(([192, 168, 1, 7], 50123)))
    }

    #[test]
    fn test_proxy_headers_are_added() {
        let head = outbound_request_head(&request(), &upstream(), &Transforms::new());

        assert_eq!(head.line().target(), "/app/index.html?a=1");
        let headers = head.headers();
        assert_eq!(headers.get("host"), Some("backend:9000"));
        assert_eq!(headers.get(X_FORWARDED_HOST), Some("proxy.example.com"));
        assert_eq!(headers.get(X_FORWARDED_PROTO), Some("http"));
        assert_eq!(headers.get_all(X_FORWARDED_FOR), ["192.168.1.7, 10.0.0.1"]);
        assert_eq!(headers.get_all(FORWARDED), ["by=10.0.0.1;for=192.168.1.7;host=proxy.example.com;proto=http"]);
        assert_eq!(headers.get_all(VIA), ["HTTP/1.1 10.0.0.1:8080"]);
    }

    #[test]
    fn test_existing_chain_is_appended_to() {
        let request = request()
            .with_header("X-Forwarded-Proto", "https")
            .with_header("X-Forwarded-For", "203.0.113.9")
            .with_header("Forwarded", "for=203.0.113.9")
            .with_header("Via", "HTTP/1.1 edge:443")
            .with_header("Expect", "100-continue");

        let head = outbound_request_head(&request, &upstream(), &Transforms::new());
        let headers = head.headers();

        assert_eq!(headers.get_all(X_FORWARDED_PROTO), ["https"]);
        assert!(!headers.contains(X_FORWARDED_HOST));
        assert!(!headers.contains(EXPECT));
        assert_eq!(headers.get_all(X_FORWARDED_FOR), ["203.0.113.9, 192.168.1.7, 10.0.0.1"]);
        assert_eq!(headers.get_all(FORWARDED).len(), 2);
        assert_eq!(headers.get_all(VIA), ["HTTP/1.1 edge:443", "HTTP/1.1 10.0.0.1:8080"]);
    }

    #[test]
    fn test_request_transform_runs_before_host_rewrite() {
        let transforms = Transforms::new().on_request(|head| {
            head.headers_mut().insert("Host", "ignored");
            head.headers_mut().insert("Authorization", "Bearer t");
        });

        let head = outbound_request_head(&request(), &upstream(), &transforms);
        assert_eq!(head.headers().get(HOST), Some("backend:9000"));
        assert_eq!(head.headers().get("authorization"), Some("Bearer t"));
    }

    #[test]
    fn test_ipv6_forwarded_node() {
        let request = MemoryRequest::new(Method::GET, "/")
            .with_addrs("[::1]:8080".parse().unwrap(), "[2001:db8::7]:4000".parse().unwrap());

        let head = outbound_request_head(&request, &upstream(), &Transforms::new());
        assert_eq!(head.headers().get(FORWARDED), Some("by=\"[::1]\";for=\"[2001:db8::7]\";proto=http"));
        assert_eq!(head.headers().get(VIA), Some("HTTP/1.1 [::1]:8080"));
    }

    #[test]
    fn test_response_via_precedes_transform() {
        let mut head = ResponseHead::new(ResponseStatus::new("HTTP/1.1", 200, Some("OK".into())), HeaderSet::new());
        let transforms = Transforms::new().on_response(|head| {
            let count = head.headers().get_all(VIA).len();
            head.headers_mut().insert("X-Via-Count", count.to_string());
        });

        annotate_response_head(&mut head, SocketAddr::from(([10, 0, 0, 1], 8080)), &transforms);
        assert_eq!(head.headers().get("x-via-count"), Some("1"));
    }
}
