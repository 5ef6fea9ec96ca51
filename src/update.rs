//! Remote version check.

use std::time::Duration;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub fn local_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Any difference from the local version counts as an update, matching how
/// releases are published (a single `version.txt`).
pub fn newer_version(local: &str, remote: &str) -> Option<String> {
    let remote = remote.trim();
    if remote.is_empty() || remote == local.trim() {
        None
    } else {
        Some(remote.to_string())
    }
}

pub async fn fetch_remote_version(url: &str) -> Option<String> {
    let client = match reqwest::Client::builder().timeout(CHECK_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "failed to build update client");
            return None;
        }
    };

    let response = match client.get(url).send().await.and_then(|r| r.error_for_status()) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(url, error = %e, "update check failed");
            return None;
        }
    };

    match response.text().await {
        Ok(text) => Some(text.trim().to_string()),
        Err(e) => {
            tracing::debug!(error = %e, "unreadable update response");
            None
        }
    }
}

/// Returns the remote version when it differs from ours; network trouble is silent
pub async fn check_for_update(url: &str) -> Option<String> {
    let remote = fetch_remote_version(url).await?;
    newer_version(local_version(), &remote)
}
