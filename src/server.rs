//! HTTP/1 accept loop shared by the peer and API servers

use std::convert::Infallible;
use std::future::Future;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{Error, Result};

/// Serve every connection accepted on `listener` with `handler`.
///
/// Runs until accepting fails. Each connection is driven on its own task.
pub async fn serve<H, Fut>(listener: TcpListener, name: &'static str, handler: H) -> Result<()>
where
    H: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("{} server listening on {}", name, addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("{} server accept error: {}", name, e)))?;

        let io = TokioIo::new(stream);
        let handler = handler.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let response = handler(req);
                async move { Ok::<_, Infallible>(response.await) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("{} server connection error: {}", name, e);
            }
        });
    }
}

/// Bind `addr` and [`serve`] it
pub async fn listen<H, Fut>(addr: &str, name: &'static str, handler: H) -> Result<()>
where
    H: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Config(format!("Failed to bind {} server on {}: {}", name, addr, e)))?;
    serve(listener, name, handler).await
}

/// Response with a `text/plain` body
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    with_body(status, "text/plain; charset=utf-8", body)
}

/// Response with an explicit content type
pub fn with_body(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
