// Test assertions for dispatch responses

use crate::TestResponse;

/// Assert that a response has a specific status code
pub fn assert_status(response: &TestResponse, expected: u16) {
    let actual = response.status();
    assert_eq!(
        actual,
        Some(expected),
        "Expected status {}, got {:?}",
        expected,
        response
    );
}

/// Assert that a response body deserializes to the expected value
pub fn assert_json<T>(response: &TestResponse, expected: &T)
where
    T: serde::de::DeserializeOwned + PartialEq + std::fmt::Debug,
{
    let actual: T = match response.body_json() {
        Ok(value) => value,
        Err(e) => panic!("Failed to deserialize response body: {}", e),
    };
    assert_eq!(actual, *expected, "JSON bodies do not match");
}

/// Assert that a response has a specific header
pub fn assert_header(response: &TestResponse, key: &str, expected: &str) {
    let actual = response.header(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected header '{}' to be '{}', got {:?}",
        key,
        expected,
        actual
    );
}

/// Assert that a response body contains a string
pub fn assert_body_contains(response: &TestResponse, expected: &str) {
    let body = response.body_string().unwrap_or_default();
    assert!(
        body.contains(expected),
        "Expected body to contain '{}', but it didn't. Body: {}",
        expected,
        body
    );
}

/// Assert that dispatch failed with an error of the given kind
pub fn assert_error_kind(response: &TestResponse, kind: &str) {
    let error = response.assert_failed();
    assert_eq!(error.kind(), kind, "Unexpected error: {}", error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{Error, HttpResponse};

    fn json_response() -> TestResponse {
        TestResponse::Completed(
            HttpResponse::ok()
                .with_header("Content-Type", "application/json")
                .with_body(br#"{"status":"ok"}"#.to_vec()),
        )
    }

    #[test]
    fn test_completed_assertions() {
        let response = json_response();
        assert_status(&response, 200);
        assert_header(&response, "content-type", "application/json");
        assert_body_contains(&response, "ok");
        assert_json(&response, &serde_json::json!({"status": "ok"}));
    }

    #[test]
    fn test_error_kind() {
        let response = TestResponse::Failed(Error::NoAdapter("odd".into()));
        assert_error_kind(&response, "NoAdapter");
        assert_eq!(response.status(), None);
    }

    #[test]
    #[should_panic(expected = "Expected status 404")]
    fn test_status_mismatch_panics() {
        assert_status(&json_response(), 404);
    }
}
