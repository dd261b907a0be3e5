//! HTTP front for the entries service.

pub mod config;
mod content_entries;
pub mod errors;

pub use content_entries::{CONTENT_ENTRIES_PATH, ContentEntriesRequest};
pub use errors::GatewayError;

use entries::EntryService;
use hyper::body::Incoming;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode, Uri};
use shared::admin_service::AdminService;
use shared::http::{ResponseBody, make_error_response, run_http_service};
use std::future::Future;
use std::pin::Pin;

pub async fn run(config: config::Config, entries: EntryService) -> Result<(), GatewayError> {
    config.validate()?;

    let readiness = entries.clone();
    let gateway_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        GatewayService::new(entries),
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::<_, GatewayError>::new(move || readiness.is_ready()),
    );

    tokio::try_join!(gateway_task, admin_task)?;
    Ok(())
}

pub struct GatewayService {
    entries: EntryService,
}

impl GatewayService {
    pub fn new(entries: EntryService) -> Self {
        GatewayService { entries }
    }
}

impl Service<Request<Incoming>> for GatewayService {
    type Response = Response<ResponseBody<GatewayError>>;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let entries = self.entries.clone();
        let method = req.method().clone();
        let uri = req.uri().clone();
        Box::pin(async move { Ok(route(&entries, &method, &uri).await) })
    }
}

async fn route<E>(
    entries: &EntryService,
    method: &Method,
    uri: &Uri,
) -> Response<ResponseBody<E>> {
    let path = uri.path();
    let path = path.strip_suffix('/').unwrap_or(path);

    if path != CONTENT_ENTRIES_PATH {
        return make_error_response(StatusCode::NOT_FOUND);
    }
    if *method != Method::GET {
        return make_error_response(StatusCode::METHOD_NOT_ALLOWED);
    }
    content_entries::handle(entries, uri.query()).await
}
