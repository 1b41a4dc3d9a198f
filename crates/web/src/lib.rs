//! Request routing and a minimal HTTP/1.1 host for the `rproxy-core`
//! forwarding engine.
//!
//! A [`Router`] holds an ordered list of match rules, each binding a path
//! pattern to a [`HandlerId`]. On dispatch every matching rule runs its
//! handler in registration order until one reports
//! [`DispatchStatus::Completed`](rproxy_core::protocol::DispatchStatus::Completed).
//! The [`Gateway`] turns handler errors into `500` responses and the
//! [`Server`] hosts the gateway on a TCP listener.
//!
//! ```no_run
//! use rproxy_core::forward::Forwarder;
//! use rproxy_web::handler::ForwardHandler;
//! use rproxy_web::router::MatchKind;
//! use rproxy_web::{HandlerId, Router, Server};
//!
//! const BACKEND: HandlerId = HandlerId::new("backend");
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let forwarder = Forwarder::default();
//! let router = Router::builder()
//!     .handler(BACKEND, move || ForwardHandler::new(forwarder.clone(), "http://127.0.0.1:9000"))
//!     .register(MatchKind::Glob, "/api/*", BACKEND)
//!     .build()?;
//!
//! Server::builder().router(router).address("127.0.0.1:8080").build()?.start().await;
//! # Ok(())
//! # }
//! ```

mod gateway;
mod host;
mod server;

pub mod handler;
pub mod router;

pub use gateway::Gateway;
pub use handler::HandlerFactory;
pub use handler::HandlerId;
pub use handler::RequestHandler;
pub use router::Router;
pub use server::Server;
pub use server::ServerBuildError;
pub use server::ServerBuilder;
