//! Error types for the tasks API client.
//!
//! # Design
//! One enum covers every failure the core can surface. Callers distinguish
//! "the server rejected the call" (`Api`) from "the call succeeded but the
//! payload was unreadable" (`Decode`) and from "a revision was created but
//! never activated" (`Consistency`), which needs manual reconciliation.

use serde::Deserialize;
use thiserror::Error;

use crate::http::{HttpResponse, TransportError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by `TasksClient` and `TokenStore`.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid construction input, such as a malformed endpoint URL.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The token endpoint was unreachable or refused the credentials.
    #[error("cannot fetch token: {message}")]
    Authentication { status: Option<u16>, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A resource endpoint answered with an unexpected status.
    #[error(
        "{context}, expected status code {expected} but got {actual}.{}",
        .detail.as_deref().map(|d| format!(" {d}")).unwrap_or_default()
    )]
    Api {
        context: String,
        expected: u16,
        actual: u16,
        detail: Option<String>,
    },

    /// A response body could not be decoded.
    #[error("cannot decode response: {0}")]
    Decode(String),

    /// A request payload could not be encoded.
    #[error("cannot encode request: {0}")]
    Serialization(String),

    /// The update created `revision_id` but promoting it to active failed.
    /// The task keeps its previous active revision until reconciled.
    #[error("revision {revision_id} of task {task_id} was created but could not be activated: {source}")]
    Consistency {
        task_id: String,
        revision_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("could not find {which} revision for task {task_id}")]
    RevisionNotFound { task_id: String, which: &'static str },

    #[error("cannot find model {0}")]
    ModelNotFound(String),
}

impl Error {
    /// True when a resource endpoint answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api { actual: 404, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { actual, .. } => Some(*actual),
            Error::Authentication { status, .. } => *status,
            Error::Consistency { source, .. } => source.status(),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ValidationBody {
    #[serde(default)]
    details: Vec<ValidationDetail>,
}

#[derive(Deserialize)]
struct ValidationDetail {
    message: Option<String>,
}

#[derive(Deserialize)]
struct MessageBody {
    message: Option<String>,
}

/// Extract the server's explanation from an error body.
///
/// 422 bodies carry `{"details":[{"message":...}]}`, every other status
/// `{"message":...}`. An empty body carries no message.
fn extract_detail(status: u16, body: &str) -> Result<Option<String>> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let decode = |e: serde_json::Error| Error::Decode(e.to_string());
    if status == 422 {
        let parsed: ValidationBody = serde_json::from_str(body).map_err(decode)?;
        Ok(parsed.details.into_iter().next().and_then(|d| d.message))
    } else {
        let parsed: MessageBody = serde_json::from_str(body).map_err(decode)?;
        Ok(parsed.message)
    }
}

/// Turn a response with an unexpected status into an `Error`.
pub(crate) fn classify_status(context: &str, expected: u16, response: &HttpResponse) -> Error {
    tracing::warn!(
        expected,
        actual = response.status,
        body = %response.body,
        "status code was not as expected"
    );
    match extract_detail(response.status, &response.body) {
        Ok(detail) => Error::Api {
            context: context.to_string(),
            expected,
            actual: response.status,
            detail,
        },
        Err(err) => err,
    }
}

/// Pass the response through when it has the expected status.
pub(crate) fn check_status(context: &str, expected: u16, response: &HttpResponse) -> Result<()> {
    if response.status == expected {
        return Ok(());
    }
    Err(classify_status(context, expected, response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn validation_body_message_is_appended() {
        let response = HttpResponse::new(422, r#"{"details":[{"message":"name required"}]}"#);
        let err = classify_status("cannot create task", 200, &response);
        assert_eq!(
            err.to_string(),
            "cannot create task, expected status code 200 but got 422. name required"
        );
    }

    #[test]
    fn first_validation_detail_wins() {
        let response = HttpResponse::new(
            422,
            r#"{"details":[{"message":"first"},{"message":"second"}]}"#,
        );
        let err = classify_status("cannot create task", 200, &response);
        assert!(err.to_string().ends_with(" first"));
    }

    #[rstest]
    #[case(404, r#"{"message":"task not found"}"#, "cannot fetch task, expected status code 200 but got 404. task not found")]
    #[case(500, "", "cannot fetch task, expected status code 200 but got 500.")]
    #[case(403, r#"{"error":"nope"}"#, "cannot fetch task, expected status code 200 but got 403.")]
    #[case(422, r#"{"details":[]}"#, "cannot fetch task, expected status code 200 but got 422.")]
    fn api_error_messages(#[case] status: u16, #[case] body: &str, #[case] expected: &str) {
        let err = classify_status("cannot fetch task", 200, &HttpResponse::new(status, body));
        assert!(matches!(err, Error::Api { .. }));
        assert_eq!(err.to_string(), expected);
    }

    #[rstest]
    #[case(500, "<html>bad gateway</html>")]
    #[case(422, "not json")]
    #[case(400, "[1,2,3]")]
    fn unparseable_bodies_surface_decode_errors(#[case] status: u16, #[case] body: &str) {
        let err = classify_status("cannot fetch task", 200, &HttpResponse::new(status, body));
        assert!(matches!(err, Error::Decode(_)), "got {err:?}");
    }

    #[test]
    fn check_status_accepts_expected() {
        assert!(check_status("ctx", 200, &HttpResponse::new(200, "")).is_ok());
    }

    #[test]
    fn not_found_helper() {
        let err = classify_status("ctx", 200, &HttpResponse::new(404, ""));
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(404));
        let err = classify_status("ctx", 200, &HttpResponse::new(500, ""));
        assert!(!err.is_not_found());
    }

    #[test]
    fn consistency_reports_inner_status() {
        let inner = classify_status("cannot make revision active", 200, &HttpResponse::new(409, ""));
        let err = Error::Consistency {
            task_id: "t1".to_string(),
            revision_id: "r2".to_string(),
            source: Box::new(inner),
        };
        assert_eq!(err.status(), Some(409));
        assert!(err.to_string().starts_with("revision r2 of task t1 was created"));
    }
}
