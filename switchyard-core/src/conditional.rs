// Last-modified checks for conditional GET/HEAD

use crate::http::{HttpRequest, HttpResponse};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Whether the request method allows a 304 answer.
pub fn is_conditional_method(request: &HttpRequest) -> bool {
    request.is_method("GET") || request.is_method("HEAD")
}

/// `If-Modified-Since` of the request, if present and well formed.
pub fn if_modified_since(request: &HttpRequest) -> Option<SystemTime> {
    request
        .header("If-Modified-Since")
        .and_then(|h| httpdate::parse_http_date(h).ok())
}

/// Compare `last_modified` with `If-Modified-Since` and prepare the response.
///
/// Returns `true` when the resource is unchanged; the response then carries
/// 304. HTTP dates have second precision, so sub-second parts of
/// `last_modified` are dropped before comparing. The `Last-Modified` header is
/// written either way.
pub fn check_not_modified(
    request: &HttpRequest,
    response: &mut HttpResponse,
    last_modified: SystemTime,
) -> bool {
    let last_modified = truncate_to_seconds(last_modified);
    if response.status == 200 {
        response.set_header("Last-Modified", httpdate::fmt_http_date(last_modified));
    }

    let not_modified = if_modified_since(request).is_some_and(|since| last_modified <= since);
    if not_modified {
        response.status = 304;
        response.body.clear();
    }
    not_modified
}

fn truncate_to_seconds(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH + Duration::from_secs(d.as_secs()),
        Err(_) => time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn request_since(secs: u64) -> HttpRequest {
        HttpRequest::new("GET", "/doc").with_header("If-Modified-Since", httpdate::fmt_http_date(at(secs)))
    }

    #[test]
    fn test_unchanged_resource_is_304() {
        let mut res = HttpResponse::ok();
        assert!(check_not_modified(&request_since(1_000_000), &mut res, at(999_000)));
        assert_eq!(res.status, 304);
    }

    #[test]
    fn test_newer_resource_is_served() {
        let mut res = HttpResponse::ok();
        assert!(!check_not_modified(&request_since(1_000_000), &mut res, at(1_000_001)));
        assert_eq!(res.status, 200);
        assert!(res.has_header("Last-Modified"));
    }

    #[test]
    fn test_subsecond_precision_ignored() {
        let mut res = HttpResponse::ok();
        let modified = at(1_000_000) + Duration::from_millis(750);
        assert!(check_not_modified(&request_since(1_000_000), &mut res, modified));
    }

    #[test]
    fn test_malformed_header_ignored() {
        let req = HttpRequest::new("GET", "/").with_header("If-Modified-Since", "yesterday");
        let mut res = HttpResponse::ok();
        assert!(!check_not_modified(&req, &mut res, at(1)));
        assert!(is_conditional_method(&req));
        assert!(!is_conditional_method(&HttpRequest::new("POST", "/")));
    }
}
