use thiserror::Error;

/// Application error taxonomy. Upstream variants carry the raw spotify
/// error payload which is passed through to the caller verbatim.
/// Nothing here is retried or locally recovered.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("spotify credentials not found")]
    CredentialNotFound,

    #[error("spotify token exchange rejected: {0}")]
    UpstreamAuth(String),

    #[error("spotify read failed: {0}")]
    UpstreamFetch(String),

    #[error("spotify write failed: {0}")]
    UpstreamWrite(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status(&self) -> tide::StatusCode {
        match self {
            Error::MissingInput(_) => tide::StatusCode::BadRequest,
            Error::Unauthenticated => tide::StatusCode::Unauthorized,
            Error::CredentialNotFound => tide::StatusCode::NotFound,
            Error::UpstreamAuth(_)
            | Error::UpstreamFetch(_)
            | Error::UpstreamWrite(_)
            | Error::Persistence(_)
            | Error::Internal(_) => tide::StatusCode::InternalServerError,
        }
    }

    /// Render as an http response. Upstream failures echo the raw
    /// upstream body, everything else gets a small json error object.
    pub fn into_response(self) -> tide::Response {
        match self {
            Error::UpstreamAuth(body)
            | Error::UpstreamFetch(body)
            | Error::UpstreamWrite(body) => tide::Response::builder(500)
                .content_type(tide::http::mime::JSON)
                .body(body)
                .build(),
            e => tide::Response::builder(e.status())
                .body(serde_json::json!({ "error": e.to_string() }))
                .build(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            Error::MissingInput("code".into()).status(),
            tide::StatusCode::BadRequest
        );
        assert_eq!(Error::Unauthenticated.status(), tide::StatusCode::Unauthorized);
        assert_eq!(Error::CredentialNotFound.status(), tide::StatusCode::NotFound);
        for e in vec![
            Error::UpstreamAuth("{}".into()),
            Error::UpstreamFetch("{}".into()),
            Error::UpstreamWrite("{}".into()),
            Error::Persistence("db".into()),
        ] {
            assert_eq!(e.status(), tide::StatusCode::InternalServerError);
        }
    }

    #[test]
    fn upstream_bodies_pass_through_verbatim() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#;
        let resp = Error::UpstreamAuth(body.to_string()).into_response();
        assert_eq!(resp.status(), tide::StatusCode::InternalServerError);
    }
}
