use crate::errors::GatewayError;
use entries::{ContentQuery, EntryService, ErrorEnvelope};
use hyper::{Response, StatusCode};
use serde::Serialize;
use shared::http::{ResponseBody, make_json_response};
use url::form_urlencoded;

pub const CONTENT_ENTRIES_PATH: &str = "/content-entries";

const DEFAULT_INCLUDE: i64 = 1;
const MAX_INCLUDE: i64 = 10;

/// Parameters of a `/content-entries` request.
#[derive(Debug, PartialEq)]
pub struct ContentEntriesRequest {
    pub query: ContentQuery,
    pub include: i64,
}

impl ContentEntriesRequest {
    /// Reads `contentID`, `contentType` and `include` from a raw query string.
    /// Other parameters are ignored.
    pub fn parse(query_string: Option<&str>) -> Result<Self, GatewayError> {
        let mut content_id = String::new();
        let mut content_type = String::new();
        let mut include = None;

        let pairs = form_urlencoded::parse(query_string.unwrap_or_default().as_bytes());
        for (name, value) in pairs {
            match name.as_ref() {
                "contentID" => content_id = value.into_owned(),
                "contentType" => content_type = value.into_owned(),
                "include" => include = Some(value.into_owned()),
                _ => {}
            }
        }

        let include = match include.as_deref() {
            None | Some("") => DEFAULT_INCLUDE,
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|depth| (0..=MAX_INCLUDE).contains(depth))
                .ok_or(GatewayError::InvalidParameter("include"))?,
        };

        Ok(ContentEntriesRequest {
            query: ContentQuery::from_params(&content_id, &content_type),
            include,
        })
    }
}

#[derive(Serialize)]
struct RejectedRequest {
    success: bool,
    message: String,
}

pub async fn handle<E>(
    entries: &EntryService,
    query_string: Option<&str>,
) -> Response<ResponseBody<E>> {
    let request = match ContentEntriesRequest::parse(query_string) {
        Ok(request) => request,
        Err(err) => {
            return make_json_response(
                StatusCode::BAD_REQUEST,
                &RejectedRequest {
                    success: false,
                    message: err.to_string(),
                },
            );
        }
    };

    match entries.query(&request.query, request.include).await {
        Ok(payload) => make_json_response(StatusCode::OK, &payload),
        Err(err) => {
            tracing::error!(
                error = %err,
                query = ?request.query,
                "Failed to retrieve content entries"
            );
            make_json_response(err.status_code(), &ErrorEnvelope::new(err.to_string()))
        }
    }
}
