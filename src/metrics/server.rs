//! `/metrics` HTTP endpoint

use super::Registry;
use crate::{Error, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// HTTP server exposing a [`Registry`] to Prometheus scrapers
pub struct MetricsServer {
    registry: Arc<Registry>,
    addr: SocketAddr,
}

impl MetricsServer {
    /// Server listening on all interfaces
    pub fn new(registry: Arc<Registry>, port: u16) -> Self {
        Self {
            registry,
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
        }
    }

    pub fn with_addr(registry: Arc<Registry>, addr: SocketAddr) -> Self {
        Self { registry, addr }
    }

    async fn handle_request(
        req: Request<Body>,
        registry: Arc<Registry>,
    ) -> std::result::Result<Response<Body>, Infallible> {
        debug!("HTTP request: {} {}", req.method(), req.uri().path());

        let response = match (req.method(), req.uri().path()) {
            (&Method::GET, "/metrics") => Response::builder()
                .status(StatusCode::OK)
                .header(hyper::header::CONTENT_TYPE, TEXT_FORMAT)
                .body(Body::from(registry.render())),

            (&Method::GET, "/health") => Response::builder()
                .status(StatusCode::OK)
                .body(Body::from("ok")),

            _ => Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::from("not found")),
        };

        Ok(response.unwrap_or_else(|e| {
            error!("Failed to build metrics response: {}", e);
            let mut fallback = Response::new(Body::empty());
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }))
    }

    /// Bind and serve in a background task; returns the bound address
    pub fn spawn(self) -> Result<SocketAddr> {
        let registry = self.registry;
        let make_svc = make_service_fn(move |_conn| {
            let registry = Arc::clone(&registry);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    Self::handle_request(req, Arc::clone(&registry))
                }))
            }
        });

        let server = Server::try_bind(&self.addr)
            .map_err(|e| Error::Metrics(format!("Failed to bind {}: {}", self.addr, e)))?
            .serve(make_svc);
        let addr = server.local_addr();

        info!(endpoint = %format!("http://{}/metrics", addr), "Prometheus metrics exposed");

        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("Metrics server error: {}", e);
            }
        });

        Ok(addr)
    }
}
