// Lookup-path extraction for route tables

use crate::http::HttpRequest;
use std::collections::HashMap;

/// Derives the path route tables match against from a request.
///
/// By default the context path is stripped, `;`-delimited path parameters
/// (such as `;jsessionid=...`) are removed and the result is percent-decoded.
#[derive(Debug, Clone)]
pub struct PathHelper {
    pub always_use_full_path: bool,
    pub url_decode: bool,
    pub remove_semicolon_content: bool,
}

impl Default for PathHelper {
    fn default() -> Self {
        Self {
            always_use_full_path: false,
            url_decode: true,
            remove_semicolon_content: true,
        }
    }
}

impl PathHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path used for route lookup.
    pub fn lookup_path(&self, request: &HttpRequest) -> String {
        let path = if self.always_use_full_path {
            request.path.as_str()
        } else {
            self.path_within_application(request)
        };
        let path = if self.remove_semicolon_content {
            remove_semicolon_content(path)
        } else {
            path.to_string()
        };
        let path = if self.url_decode {
            self.decode(&path)
        } else {
            path
        };
        if path.is_empty() {
            "/".to_string()
        } else {
            path
        }
    }

    fn path_within_application<'a>(&self, request: &'a HttpRequest) -> &'a str {
        let context = request.context_path.trim_end_matches('/');
        if context.is_empty() {
            return &request.path;
        }
        match request.path.strip_prefix(context) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => &request.path,
        }
    }

    /// Percent-decode a value; malformed input is returned unchanged.
    pub fn decode(&self, value: &str) -> String {
        urlencoding::decode(value)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string())
    }

    /// Decode template variables captured from the lookup path.
    ///
    /// When `url_decode` is on the lookup path was already decoded, so the
    /// values are returned as-is rather than decoded twice.
    pub fn decode_path_variables(&self, vars: HashMap<String, String>) -> HashMap<String, String> {
        if self.url_decode {
            return vars;
        }
        vars.into_iter().map(|(k, v)| (k, self.decode(&v))).collect()
    }
}

/// Strip `;name=value` parameters from every path segment.
pub fn remove_semicolon_content(path: &str) -> String {
    if !path.contains(';') {
        return path.to_string();
    }
    path.split('/')
        .map(|segment| segment.split(';').next().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_path_strips_context() {
        let helper = PathHelper::new();
        let req = HttpRequest::new("GET", "/app/users/1").with_context_path("/app");
        assert_eq!(helper.lookup_path(&req), "/users/1");

        let root = HttpRequest::new("GET", "/app").with_context_path("/app");
        assert_eq!(helper.lookup_path(&root), "/");
    }

    #[test]
    fn test_full_path() {
        let helper = PathHelper {
            always_use_full_path: true,
            ..Default::default()
        };
        let req = HttpRequest::new("GET", "/app/users").with_context_path("/app");
        assert_eq!(helper.lookup_path(&req), "/app/users");
    }

    #[test]
    fn test_context_prefix_must_end_at_segment() {
        let helper = PathHelper::new();
        let req = HttpRequest::new("GET", "/application/x").with_context_path("/app");
        assert_eq!(helper.lookup_path(&req), "/application/x");
    }

    #[test]
    fn test_semicolon_and_decoding() {
        let helper = PathHelper::new();
        let req = HttpRequest::new("GET", "/files;jsessionid=abc/my%20doc.txt");
        assert_eq!(helper.lookup_path(&req), "/files/my doc.txt");

        let raw = PathHelper {
            url_decode: false,
            remove_semicolon_content: false,
            ..Default::default()
        };
        assert_eq!(raw.lookup_path(&req), "/files;jsessionid=abc/my%20doc.txt");
    }

    #[test]
    fn test_decode_path_variables_once() {
        let raw = PathHelper {
            url_decode: false,
            ..Default::default()
        };
        let vars = HashMap::from([("name".to_string(), "J%C3%BCrgen".to_string())]);
        assert_eq!(raw.decode_path_variables(vars)["name"], "Jürgen");

        let decoding = PathHelper::new();
        let already = HashMap::from([("v".to_string(), "100%25".to_string())]);
        assert_eq!(decoding.decode_path_variables(already)["v"], "100%25");
    }
}
