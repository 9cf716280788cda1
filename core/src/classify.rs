//! Maps failed exchanges onto the [`ApiError`] taxonomy.
//!
//! Rules are checked in order and the first match wins. Matching is on
//! case-sensitive containment because the API appends detail to its messages
//! (`"requires scope inventories"`, `"page out of range. Use page values 0 - 4."`).

use crate::error::{ApiError, AuthorizationKind, BadRequestKind, ErrorDetails};
use crate::http::{HttpRequest, HttpResponse};
use crate::types::ErrorObject;

/// Outcome of the status/text table, without the exchange attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    BadRequest(BadRequestKind),
    AuthorizationRequired(AuthorizationKind),
    NotFound,
    ServerError,
    ServiceUnavailable,
    UnexpectedStatus,
}

/// Classify a status code and error text. Total: never fails.
pub fn classify_status(status: u16, text: Option<&str>) -> Classification {
    let Some(text) = text else {
        return Classification::UnexpectedStatus;
    };
    match status {
        400 if text.contains("bad request") => Classification::BadRequest(BadRequestKind::Generic),
        400 if text.contains("page") && text.contains("out of range") => {
            Classification::BadRequest(BadRequestKind::PageOutOfRange)
        }
        403 if text.contains("authorization failed") => {
            Classification::AuthorizationRequired(AuthorizationKind::Generic)
        }
        403 if text.contains("invalid key") => {
            Classification::AuthorizationRequired(AuthorizationKind::InvalidAccessToken)
        }
        403 if text.contains("requires scope") => {
            Classification::AuthorizationRequired(AuthorizationKind::MissingScopes)
        }
        403 if text.contains("membership required") => {
            Classification::AuthorizationRequired(AuthorizationKind::MembershipRequired)
        }
        403 if text.contains("access restricted to guild leaders") => {
            Classification::AuthorizationRequired(AuthorizationKind::RestrictedToGuildLeaders)
        }
        404 if text.contains("not found") => Classification::NotFound,
        500 if text.contains("server error") => Classification::ServerError,
        503 if text.contains("service unavailable") => Classification::ServiceUnavailable,
        _ => Classification::UnexpectedStatus,
    }
}

/// Build the error for a failed exchange. The body is decoded as an
/// [`ErrorObject`] on a best-effort basis; a missing or malformed payload
/// classifies as `UnexpectedStatus`.
pub fn classify(request: HttpRequest, response: HttpResponse) -> ApiError {
    let text = ErrorObject::parse(&response.body).text;
    let classification = classify_status(response.status, text.as_deref());
    let details = Box::new(ErrorDetails {
        request,
        response,
        text,
    });

    match classification {
        Classification::BadRequest(kind) => ApiError::BadRequest { kind, details },
        Classification::AuthorizationRequired(kind) => {
            ApiError::AuthorizationRequired { kind, details }
        }
        Classification::NotFound => ApiError::NotFound { details },
        Classification::ServerError => ApiError::ServerError { details },
        Classification::ServiceUnavailable => ApiError::ServiceUnavailable { details },
        Classification::UnexpectedStatus => ApiError::UnexpectedStatus {
            status: details.response.status,
            body: details.response.body.clone(),
            details,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn request() -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: "v2/account".to_string(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn table_rows() {
        use AuthorizationKind::*;
        let cases = [
            (400, "bad request", Classification::BadRequest(BadRequestKind::Generic)),
            (
                400,
                "page out of range. Use page values 0 - 4.",
                Classification::BadRequest(BadRequestKind::PageOutOfRange),
            ),
            (403, "authorization failed", Classification::AuthorizationRequired(Generic)),
            (403, "invalid key", Classification::AuthorizationRequired(InvalidAccessToken)),
            (
                403,
                "requires scope inventories",
                Classification::AuthorizationRequired(MissingScopes),
            ),
            (403, "membership required", Classification::AuthorizationRequired(MembershipRequired)),
            (
                403,
                "access restricted to guild leaders",
                Classification::AuthorizationRequired(RestrictedToGuildLeaders),
            ),
            (404, "not found", Classification::NotFound),
            (500, "server error", Classification::ServerError),
            (503, "service unavailable", Classification::ServiceUnavailable),
        ];
        for (status, text, expected) in cases {
            assert_eq!(classify_status(status, Some(text)), expected, "{status} {text}");
        }
    }

    #[test]
    fn text_must_match_the_status() {
        assert_eq!(classify_status(404, Some("invalid key")), Classification::UnexpectedStatus);
        assert_eq!(classify_status(403, Some("not found")), Classification::UnexpectedStatus);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(classify_status(404, Some("Not Found")), Classification::UnexpectedStatus);
    }

    #[test]
    fn first_rule_wins() {
        assert_eq!(
            classify_status(400, Some("bad request: page out of range")),
            Classification::BadRequest(BadRequestKind::Generic)
        );
    }

    #[test]
    fn unlisted_status_keeps_raw_body() {
        let body = r#"{"error":"Some nice error message"}"#;
        let err = classify(request(), response(499, body));
        match err {
            ApiError::UnexpectedStatus { status, body: raw, details } => {
                assert_eq!(status, 499);
                assert_eq!(raw, body);
                assert_eq!(details.text, None);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn invalid_key_is_invalid_access_token() {
        let err = classify(request(), response(403, r#"{"text":"invalid key"}"#));
        assert!(matches!(
            err,
            ApiError::AuthorizationRequired {
                kind: AuthorizationKind::InvalidAccessToken,
                ..
            }
        ));
        assert_eq!(err.details().unwrap().text.as_deref(), Some("invalid key"));
    }

    #[test]
    fn missing_text_is_unexpected() {
        let err = classify(request(), response(404, "{}"));
        assert!(matches!(err, ApiError::UnexpectedStatus { status: 404, .. }));
    }

    #[test]
    fn non_json_body_is_unexpected() {
        let err = classify(request(), response(503, "<html>maintenance</html>"));
        match err {
            ApiError::UnexpectedStatus { body, .. } => assert_eq!(body, "<html>maintenance</html>"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
