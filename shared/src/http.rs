use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;

pub type ResponseBody<E> = BoxBody<Bytes, E>;

/// Accepts connections on `host:port` forever, serving each one with `service`.
pub async fn run_http_service<S, E>(host: &str, port: u16, service: S) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(host, port, "Listening");
    let service_arc = Arc::new(service);

    loop {
        let (stream, _peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service_arc.clone();

        // Hand the connection to hyper; auto-detect h1/h2 on this socket
        tokio::spawn(async move {
            if let Err(err) = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await
            {
                tracing::debug!(error = %err, "Connection closed with error");
            }
        });
    }
}

pub fn full_body<E>(bytes: impl Into<Bytes>) -> ResponseBody<E> {
    Full::new(bytes.into()).map_err(|e| match e {}).boxed()
}

/// Plain text response carrying the canonical reason phrase of `status`.
pub fn make_error_response<E>(status: StatusCode) -> Response<ResponseBody<E>> {
    let reason = status.canonical_reason().unwrap_or("error");
    let mut response = Response::new(full_body(format!("{reason}\n")));
    *response.status_mut() = status;
    response
}

/// Serializes `value` as the JSON body of a response with the given status.
///
/// Serialization failures degrade to an empty 500 response.
pub fn make_json_response<T, E>(status: StatusCode, value: &T) -> Response<ResponseBody<E>>
where
    T: Serialize + ?Sized,
{
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let mut response = Response::new(full_body(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize response body");
            make_error_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
