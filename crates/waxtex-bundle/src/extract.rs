//! Itar archive extraction.

use std::borrow::Cow;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::debug;

use crate::ProgressReporter;
use crate::error::BundleError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One progress message per this many extracted files.
const PROGRESS_FILE_INTERVAL: usize = 10_000;

/// Extract an itar archive into `dest_dir`, returning the number of files
/// written.
///
/// Regular entries only; every entry lands under its basename in
/// `dest_dir`, so the archive's internal directory layout is discarded.
pub(crate) fn extract_itar<R: Read>(
    reader: R,
    dest_dir: &Path,
    progress: Option<&dyn ProgressReporter>,
) -> Result<usize, BundleError> {
    let mut archive = tar::Archive::new(reader);
    let mut extracted = 0usize;

    let entries = archive
        .entries()
        .map_err(|e| BundleError::archive("reading archive", e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| BundleError::archive("reading archive entry", e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| BundleError::archive("decoding entry path", e))?;
        let Some(name) = path.file_name().map(std::ffi::OsStr::to_os_string) else {
            continue;
        };

        let mut payload = Vec::new();
        entry
            .read_to_end(&mut payload)
            .map_err(|e| BundleError::archive("reading entry payload", e))?;

        let contents = maybe_gunzip(&payload)
            .map_err(|e| BundleError::archive(format!("entry '{}'", name.to_string_lossy()), e))?;
        std::fs::write(dest_dir.join(&name), contents).map_err(|e| {
            BundleError::io(format!("writing '{}'", name.to_string_lossy()), e)
        })?;

        extracted += 1;
        if extracted % PROGRESS_FILE_INTERVAL == 0 {
            report(progress, &format!("extracted {extracted} files"));
        }
    }

    report(progress, &format!("extracted {extracted} files (done)"));
    debug!(extracted, "bundle extraction finished");
    Ok(extracted)
}

/// Decompress gzipped payloads, pass everything else through untouched.
///
/// The decision is keyed on the gzip magic bytes: a payload that lacks them
/// is a raw entry, while one that carries them but fails to decode is a
/// corrupt entry rather than a raw file.
fn maybe_gunzip(payload: &[u8]) -> Result<Cow<'_, [u8]>, std::io::Error> {
    if !payload.starts_with(&GZIP_MAGIC) {
        return Ok(Cow::Borrowed(payload));
    }

    let mut decoded = Vec::new();
    GzDecoder::new(payload).read_to_end(&mut decoded)?;
    Ok(Cow::Owned(decoded))
}

fn report(progress: Option<&dyn ProgressReporter>, message: &str) {
    if let Some(progress) = progress {
        progress.report(message);
    }
}
