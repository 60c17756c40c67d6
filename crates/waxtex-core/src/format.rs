//! One-time format-cache generation.
//!
//! The engine starts much faster from a precomputed format file
//! (`latex.fmt`). Generation runs the same isolated-instance pattern as a
//! compile job, but calls the format entry point and harvests the artifact
//! from the scratch-cache mount into the bundle directory.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use wasmtime_wasi::pipe::MemoryOutputPipe;

use waxtex_common::{CompileError, FormatOptions, names};

use crate::compile::{forward_log, settle};
use crate::job::{self, JobDirs, STDERR_CAPACITY};
use crate::runtime::TexRuntime;

/// Prefix of format-generation working directories.
const FMT_JOB_PREFIX: &str = "waxtex-fmt-";

impl TexRuntime {
    /// Generate the format artifact (`latex.fmt`) into the bundle directory.
    ///
    /// Must run once after a bundle is extracted, before compilations can
    /// succeed. Idempotent: if the artifact already exists, this returns
    /// immediately without touching the sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::MissingBundleDir`] for an empty path,
    /// classification errors as [`TexRuntime::compile`], and
    /// [`CompileError::MissingOutput`] when the engine reported success but
    /// left no format file in the cache mount.
    #[instrument(skip(self, options), fields(bundle_dir = %bundle_dir.display()))]
    pub async fn generate_format(
        &self,
        bundle_dir: &Path,
        options: FormatOptions,
    ) -> Result<(), CompileError> {
        if bundle_dir.as_os_str().is_empty() {
            return Err(CompileError::MissingBundleDir);
        }

        let target = bundle_dir.join(names::FORMAT_FILE);
        if target.is_file() {
            debug!("Format artifact already present, skipping generation");
            return Ok(());
        }

        let FormatOptions {
            mut log_sink,
            cancel,
        } = options;
        let cancel = cancel.unwrap_or_default();

        let dirs = JobDirs::create(FMT_JOB_PREFIX, None)?;
        let stderr = MemoryOutputPipe::new(STDERR_CAPACITY);
        let wasi = job::build_wasi(&dirs, bundle_dir, &stderr)?;

        let outcome = self.invoke_entry(wasi, names::FORMAT_ENTRY, &cancel).await;
        let result = match settle(outcome, &stderr) {
            Err(err) => Err(err),
            Ok(log) => install_artifact(&dirs, &target, log),
        };

        forward_log(&mut log_sink, &stderr);
        result
    }
}

/// Locate the generated format file in the cache mount and copy it to the
/// bundle directory under the fixed name.
///
/// The expected fixed filename is checked first; failing that, the cache is
/// scanned for any `.fmt` file, tolerating the engine renaming its output.
fn install_artifact(dirs: &JobDirs, target: &Path, log: String) -> Result<(), CompileError> {
    let fixed = dirs.cache().join(names::FORMAT_FILE);
    let produced = if fixed.is_file() {
        fixed
    } else {
        match scan_for_artifact(dirs.cache()) {
            Some(path) => path,
            None => {
                return Err(CompileError::MissingOutput {
                    log,
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("no .{} file in cache", names::FORMAT_EXTENSION),
                    ),
                });
            }
        }
    };

    let data = std::fs::read(&produced)
        .map_err(|e| CompileError::io("reading generated format file", e))?;
    std::fs::write(target, data)
        .map_err(|e| CompileError::io("writing format file to bundle directory", e))?;

    debug!(artifact = %produced.display(), "Format artifact installed");
    Ok(())
}

/// Find the first file with the format extension in `dir`.
fn scan_for_artifact(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == names::FORMAT_EXTENSION) && path.is_file() {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_for_artifact_finds_fmt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("xelatex.fmt"), b"fmt").unwrap();

        let found = scan_for_artifact(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "xelatex.fmt");
    }

    #[test]
    fn test_scan_for_artifact_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_for_artifact(dir.path()).is_none());
    }

    #[test]
    fn test_scan_for_artifact_ignores_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("latex.log"), b"x").unwrap();
        assert!(scan_for_artifact(dir.path()).is_none());
    }
}
