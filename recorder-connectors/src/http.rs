//! Shared request plumbing for the sink clients.

use reqwest::{RequestBuilder, Response, Url};
use std::time::Duration;
use tokio::time::timeout;

use crate::error::ConnectorError;

/// Join a base URL and a fixed path with exactly one `/` between parts.
pub(crate) fn join_url(base: &str, path: &str) -> Result<String, ConnectorError> {
    join_url_with(base, path, &[])
}

/// Like [`join_url`], then append each of `params` as one percent-encoded
/// path segment, so a `/` or `?` inside a parameter stays inside it.
pub(crate) fn join_url_with(base: &str, path: &str, params: &[&str]) -> Result<String, ConnectorError> {
    let base = base.trim();
    if base.is_empty() {
        return Err(ConnectorError::InvalidUrl("base URL is empty".to_string()));
    }
    let mut url = Url::parse(base).map_err(|e| ConnectorError::InvalidUrl(format!("{}: {}", base, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConnectorError::InvalidUrl(format!("unsupported scheme: {}", base)));
    }

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| ConnectorError::InvalidUrl(format!("cannot be a base: {}", base)))?;
        segments.pop_if_empty();
        segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
        segments.extend(params);
    }
    Ok(url.into())
}

/// Send a request under `limit` and return the response if it is 2xx.
pub(crate) async fn send(
    request: RequestBuilder,
    url: &str,
    limit: Duration,
) -> Result<Response, ConnectorError> {
    let response = timeout(limit, request.send())
        .await
        .map_err(|_| ConnectorError::Timeout)?
        .map_err(|e| ConnectorError::RequestFailed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ConnectorError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body: body.trim().to_string(),
        });
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://no.example/", "/v1/api/push-txn-logs").unwrap(),
            "https://no.example/v1/api/push-txn-logs"
        );
        assert_eq!(
            join_url("http://db:8080/prefix/", "api/sessions").unwrap(),
            "http://db:8080/prefix/api/sessions"
        );
        assert_eq!(
            join_url_with("http://db:8080", "/api/sessions/check", &["abc"]).unwrap(),
            "http://db:8080/api/sessions/check/abc"
        );
    }

    #[test]
    fn test_join_url_encodes_params() {
        assert_eq!(
            join_url_with("http://db:8080", "/api/sessions/check", &["a/b?c d"]).unwrap(),
            "http://db:8080/api/sessions/check/a%2Fb%3Fc%20d"
        );
    }

    #[test]
    fn test_join_url_rejects_bad_base() {
        assert!(matches!(join_url("  ", "x"), Err(ConnectorError::InvalidUrl(_))));
        assert!(matches!(join_url("ftp://x", "x"), Err(ConnectorError::InvalidUrl(_))));
        assert!(matches!(join_url("db.example", "x"), Err(ConnectorError::InvalidUrl(_))));
    }
}
