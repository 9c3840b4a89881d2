//! Resolver address list download.

use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::FuzzError;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Make sure the resolver list exists at `path`, fetching it from `url` when
/// missing or when `refresh` is set.
pub async fn ensure_resolvers(url: &str, path: &Path, refresh: bool) -> Result<(), FuzzError> {
    if path.is_file() && !refresh {
        info!(path = %path.display(), "using cached resolver list");
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?;
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &body).await?;

    info!(
        url,
        path = %path.display(),
        bytes = body.len(),
        "resolver list downloaded"
    );
    Ok(())
}
