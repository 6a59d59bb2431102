//! Dispatcher (C6): fan-out of one batch to every configured target, with
//! per-target failure isolation.

use crate::error::ShipperError;
use crate::target::{Target, TargetKind};
use bytes::Bytes;
use futures::future::join_all;
use reqwest::Client;

/// Fans `body` out to every target concurrently and waits for all of them to
/// settle. Returns success only if every target reported success; individual
/// failures are logged at debug level and never propagated — dispatch is
/// always a side concern to the caller (the flush loop only needs to know
/// whether to bump its failure counter).
pub async fn dispatch(
    http: &Client,
    session_client: Option<&(dyn crate::target::SessionApiClient)>,
    path: &str,
    body: Bytes,
    targets: &[Target],
) -> bool {
    let attempts = targets.iter().map(|target| {
        let body = body.clone();
        async move {
            let outcome = match target.kind {
                TargetKind::Enterprise => match session_client {
                    Some(client) => client
                        .post(
                            path,
                            body,
                            true,
                            target.retry.max_attempts,
                            &target.retry.description,
                        )
                        .await,
                    None => Err(ShipperError::Dispatch {
                        target: target.retry.description.clone(),
                        message: "no session API client configured".to_string(),
                    }),
                },
                TargetKind::External => dispatch_external(http, target, path, body).await,
            };

            if let Err(ref err) = outcome {
                tracing::debug!(target_desc = %target.retry.description, error = %err, "dispatch failed");
            }
            outcome.is_ok()
        }
    });

    join_all(attempts).await.into_iter().all(|ok| ok)
}

/// A single raw HTTP POST to `<address>/<path>` with a bearer-style
/// authorization header built from the target's token. No retry at this
/// layer (§4.3) — retry, where it exists, belongs to the remote client the
/// target delegates to, and external targets have none.
async fn dispatch_external(
    http: &Client,
    target: &Target,
    path: &str,
    body: Bytes,
) -> Result<(), ShipperError> {
    let address = target.address.as_deref().unwrap_or_default();
    let url = format!("{}/{}", address.trim_end_matches('/'), path);
    let token = target.auth_token.as_deref().unwrap_or_default();

    http.post(&url)
        .bearer_auth(token)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await?
        .error_for_status()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::RetryPolicy;

    #[tokio::test]
    async fn dispatch_with_no_targets_is_vacuously_successful() {
        let http = Client::new();
        let ok = dispatch(&http, None, "events", Bytes::from_static(b"{}"), &[]).await;
        assert!(ok);
    }

    #[tokio::test]
    async fn enterprise_target_without_client_fails() {
        let http = Client::new();
        let target = Target {
            kind: TargetKind::Enterprise,
            address: None,
            auth_token: None,
            retry: RetryPolicy {
                max_attempts: 1,
                description: "enterprise".into(),
            },
        };
        let ok = dispatch(&http, None, "events", Bytes::from_static(b"{}"), &[target]).await;
        assert!(!ok);
    }
}
