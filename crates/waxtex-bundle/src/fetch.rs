//! Bundle download and preparation.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use waxtex_common::names;

use crate::ProgressReporter;
use crate::error::BundleError;
use crate::extract::extract_itar;

/// One progress message per this many downloaded bytes.
const PROGRESS_BYTE_INTERVAL: u64 = 10 * 1024 * 1024;

/// Options for [`prepare_bundle`].
#[derive(Default)]
pub struct PrepareOptions {
    /// Receives progress messages during the download and extraction.
    pub progress: Option<Arc<dyn ProgressReporter>>,

    /// Cancellation token, observed between network reads.
    pub cancel: Option<CancellationToken>,
}

impl PrepareOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a progress reporter.
    pub fn progress(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(reporter);
        self
    }

    /// Attach a cancellation token.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl std::fmt::Debug for PrepareOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrepareOptions")
            .field("progress", &self.progress.as_ref().map(|_| ".."))
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// Ensure a ready-to-use support bundle exists in `dest_dir`.
///
/// A `SHA256SUM` marker file left by a previous extraction short-circuits
/// the whole operation unless `force` is set. An empty `bundle_url` selects
/// the default public bundle.
///
/// The archive is spooled to an anonymous temp file and extracted from
/// there, so a download that dies halfway never leaves partial entries in
/// `dest_dir` alongside a marker.
///
/// # Errors
///
/// Fails on network or filesystem errors, on a malformed archive, and when
/// the extracted archive holds fewer than [`names::MIN_BUNDLE_FILES`]
/// files, which indicates a truncated or wrong download.
#[instrument(skip_all, fields(dest = %dest_dir.display(), force))]
pub async fn prepare_bundle(
    dest_dir: &Path,
    bundle_url: &str,
    force: bool,
    options: PrepareOptions,
) -> Result<(), BundleError> {
    let PrepareOptions { progress, cancel } = options;
    let cancel = cancel.unwrap_or_default();

    if !force && dest_dir.join(names::BUNDLE_MARKER).is_file() {
        debug!("bundle marker present, skipping download");
        return Ok(());
    }

    std::fs::create_dir_all(dest_dir)
        .map_err(|e| BundleError::io("creating bundle dir", e))?;

    let raw_url = if bundle_url.is_empty() {
        names::DEFAULT_BUNDLE_URL
    } else {
        bundle_url
    };
    let url = Url::parse(raw_url).map_err(|source| BundleError::Url {
        url: raw_url.to_owned(),
        source,
    })?;

    info!(%url, "downloading support bundle");
    let spool = download_to_spool(url, progress.as_deref(), &cancel).await?;

    let dest = dest_dir.to_owned();
    let extract_progress = progress.clone();
    let extracted = tokio::task::spawn_blocking(move || {
        extract_itar(
            std::io::BufReader::new(spool),
            &dest,
            extract_progress.as_deref(),
        )
    })
    .await
    .map_err(|e| BundleError::io("joining extraction task", std::io::Error::other(e)))??;

    if extracted < names::MIN_BUNDLE_FILES {
        return Err(BundleError::Incomplete {
            extracted,
            minimum: names::MIN_BUNDLE_FILES,
        });
    }

    info!(extracted, "support bundle ready");
    Ok(())
}

/// Stream the archive into an anonymous temp file and rewind it.
async fn download_to_spool(
    url: Url,
    progress: Option<&dyn ProgressReporter>,
    cancel: &CancellationToken,
) -> Result<std::fs::File, BundleError> {
    if cancel.is_cancelled() {
        return Err(BundleError::Cancelled);
    }

    let mut response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(BundleError::Cancelled),
        r = reqwest::get(url) => r.map_err(|source| BundleError::Request { source })?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(BundleError::HttpStatus {
            status: status.as_u16(),
        });
    }
    let total = response.content_length();

    let spool = tempfile::tempfile().map_err(|e| BundleError::io("creating spool file", e))?;
    let mut spool = tokio::fs::File::from_std(spool);
    let mut received: u64 = 0;
    let mut last_report: u64 = 0;

    loop {
        let chunk = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(BundleError::Cancelled),
            c = response.chunk() => c.map_err(|source| BundleError::Request { source })?,
        };
        let Some(chunk) = chunk else { break };

        spool
            .write_all(&chunk)
            .await
            .map_err(|e| BundleError::io("writing spool file", e))?;
        received += chunk.len() as u64;

        if received - last_report >= PROGRESS_BYTE_INTERVAL {
            last_report = received;
            if let Some(progress) = progress {
                let message = match total {
                    Some(total) => {
                        format!("downloaded {} / {} MiB", received >> 20, total >> 20)
                    }
                    None => format!("downloaded {} MiB", received >> 20),
                };
                progress.report(&message);
            }
        }
    }

    spool
        .flush()
        .await
        .map_err(|e| BundleError::io("flushing spool file", e))?;
    spool
        .seek(SeekFrom::Start(0))
        .await
        .map_err(|e| BundleError::io("rewinding spool file", e))?;

    Ok(spool.into_std().await)
}
