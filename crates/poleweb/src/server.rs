//! HTTP/1.1 server on tokio and hyper.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::request::Request;
use crate::response::Response;

/// Accepts connections on `listener` until `shutdown` resolves, one task per
/// connection.
///
/// Connections already accepted are left to finish on their own.
///
/// # Errors
///
/// Reading the listener's local address failed.
pub async fn serve<F>(engine: Engine, listener: TcpListener, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    let engine = Arc::new(engine);
    info!(address = %listener.local_addr()?, routes = engine.routes().len(), "listening");
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let engine = Arc::clone(&engine);
                        async move { Ok::<_, Infallible>(respond(&engine, req, peer).await) }
                    });
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!(%peer, error = %err, "connection closed with error");
                    }
                });
            }
            () = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

async fn respond(
    engine: &Engine,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
) -> http::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, engine.max_body_bytes()).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            debug!(%peer, path = parts.uri.path(), "request body over limit");
            return Response::payload_too_large().into();
        }
        Err(err) => {
            debug!(%peer, error = %err, "failed to read request body");
            return Response::text(http::StatusCode::BAD_REQUEST, "Bad Request\n").into();
        }
    };

    let request = Request {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
        remote_addr: Some(peer),
    };
    engine.handle_request(request).into()
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
}

impl Engine {
    /// Binds `addr` and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// The address cannot be bound.
    pub async fn run(self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        serve(self, listener, shutdown_signal()).await
    }
}
