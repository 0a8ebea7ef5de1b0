use std::time::Duration;

use reqwest::StatusCode;

use crate::http_client::http_client;
use crate::reconcile::{FetchError, RejectReason, SnapshotSource};
use crate::state::MatchSnapshot;

/// Pulls authoritative snapshots from `{base_url}/matches/{id}/snapshot`.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    base_url: String,
    timeout: Duration,
}

impl HttpSnapshotSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn snapshot_url(&self, match_id: &str) -> String {
        format!("{}/matches/{match_id}/snapshot", self.base_url)
    }
}

impl SnapshotSource for HttpSnapshotSource {
    fn fetch(&mut self, match_id: &str) -> Result<MatchSnapshot, FetchError> {
        let client = http_client(self.timeout).map_err(|err| FetchError::Transport(err.to_string()))?;
        let resp = client
            .get(self.snapshot_url(match_id))
            .header("Accept", "application/json")
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Transport(err.to_string())
                }
            })?;
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|err| FetchError::Transport(format!("failed reading snapshot body: {err}")))?;
        classify_status(status, &body)?;
        parse_snapshot_json(&body)
    }
}

/// Maps a non-success status to the fetch error the reconciler acts on.
pub fn classify_status(status: StatusCode, body: &str) -> Result<(), FetchError> {
    if status == StatusCode::OK {
        return Ok(());
    }
    let detail = snippet(body);
    let err = match status.as_u16() {
        202 | 204 | 409 | 425 | 503 => FetchError::NotReady(format!("http {status}: {detail}")),
        408 | 504 => FetchError::Timeout,
        401 | 403 => FetchError::Rejected {
            reason: RejectReason::PermissionDenied,
            detail,
        },
        404 | 410 => FetchError::Rejected {
            reason: RejectReason::NotFound,
            detail,
        },
        500..=599 => FetchError::Transport(format!("http {status}: {detail}")),
        _ => FetchError::Rejected {
            reason: RejectReason::InvalidState,
            detail: format!("http {status}: {detail}"),
        },
    };
    Err(err)
}

pub fn parse_snapshot_json(raw: &str) -> Result<MatchSnapshot, FetchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Err(FetchError::NotReady("no snapshot published yet".to_string()));
    }
    serde_json::from_str(trimmed).map_err(|err| FetchError::Malformed(err.to_string()))
}

fn snippet(body: &str) -> String {
    body.trim()
        .replace(['\n', '\r'], " ")
        .chars()
        .take(220)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_split_transient_from_terminal() {
        assert!(classify_status(StatusCode::OK, "").is_ok());
        let not_ready = classify_status(StatusCode::CONFLICT, "innings changing over").unwrap_err();
        assert!(not_ready.is_transient());
        let bad_gateway = classify_status(StatusCode::BAD_GATEWAY, "").unwrap_err();
        assert!(bad_gateway.is_transient());
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, "nope").unwrap_err(),
            FetchError::Rejected {
                reason: RejectReason::PermissionDenied,
                detail: "nope".to_string()
            }
        );
        assert!(!classify_status(StatusCode::NOT_FOUND, "").unwrap_err().is_transient());
    }

    #[test]
    fn empty_body_is_not_ready_and_garbage_is_malformed() {
        assert!(matches!(parse_snapshot_json("  "), Err(FetchError::NotReady(_))));
        assert!(matches!(parse_snapshot_json("{\"phase\":"), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let source = HttpSnapshotSource::new("http://scores.local/api/", Duration::from_secs(1));
        assert_eq!(source.snapshot_url("m1"), "http://scores.local/api/matches/m1/snapshot");
    }
}
