//! Per-job working directories and sandbox filesystem configuration.
//!
//! Every job owns a [`JobDirs`] arena: one temporary directory tree holding
//! the input, output, and scratch-cache directories (plus a fresh empty
//! fonts directory when the caller supplied none). The tree is removed when
//! the arena drops, on every exit path.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use wasmtime_wasi::pipe::MemoryOutputPipe;
use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::{DirPerms, FilePerms, WasiCtxBuilder};

use waxtex_common::{CompileError, names};

/// Capacity of the in-memory stderr capture buffer.
///
/// The engine's diagnostics on a failing document run to a few hundred
/// kilobytes at most; writes beyond this are refused to the guest.
pub(crate) const STDERR_CAPACITY: usize = 4 * 1024 * 1024;

/// The private directory tree of a single job.
///
/// Dropping the arena removes the whole tree. Directories handed to a
/// sandbox instance must outlive the instance, so the arena is dropped only
/// after the invocation has settled.
pub(crate) struct JobDirs {
    // Held for its Drop; the path fields below all point into it.
    _root: TempDir,
    input: PathBuf,
    output: PathBuf,
    cache: PathBuf,
    fonts: PathBuf,
}

impl JobDirs {
    /// Allocate a fresh, uniquely named working directory tree.
    ///
    /// `external_fonts` substitutes a caller-supplied fonts directory for
    /// the arena-local one; an empty fonts directory is created inside the
    /// arena otherwise.
    pub fn create(
        prefix: &str,
        external_fonts: Option<PathBuf>,
    ) -> Result<Self, CompileError> {
        let root = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(|e| CompileError::io("creating job working directory", e))?;

        let input = root.path().join("input");
        let output = root.path().join("output");
        let cache = root.path().join("cache");

        for dir in [&input, &output, &cache] {
            std::fs::create_dir(dir).map_err(|e| {
                CompileError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }

        let fonts = match external_fonts {
            Some(dir) => dir,
            None => {
                let dir = root.path().join("fonts");
                std::fs::create_dir(&dir).map_err(|e| {
                    CompileError::io(format!("creating directory {}", dir.display()), e)
                })?;
                dir
            }
        };

        Ok(Self {
            _root: root,
            input,
            output,
            cache,
            fonts,
        })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn cache(&self) -> &Path {
        &self.cache
    }

    pub fn fonts(&self) -> &Path {
        &self.fonts
    }
}

/// Build the WASI context for one sandbox instance.
///
/// Mounts, in fixed order: input, output, bundle, fonts, cache. All are
/// read-write except the shared bundle directory, which is mounted
/// read-only so no job can mutate shared support data. Sets the two
/// environment variables the engine reads, leaves stdout at the default
/// sink (discarded), and captures stderr into `stderr`.
pub(crate) fn build_wasi(
    dirs: &JobDirs,
    bundle_dir: &Path,
    stderr: &MemoryOutputPipe,
) -> Result<WasiP1Ctx, CompileError> {
    let mut builder = WasiCtxBuilder::new();
    builder
        .stderr(stderr.clone())
        .env(names::ENV_FONT_DIR, names::GUEST_FONTS_DIR)
        .env(names::ENV_CACHE_DIR, names::GUEST_CACHE_DIR);

    let preopen = |builder: &mut WasiCtxBuilder,
                   host: &Path,
                   guest: &str,
                   dir_perms: DirPerms,
                   file_perms: FilePerms|
     -> Result<(), CompileError> {
        builder
            .preopened_dir(host, guest, dir_perms, file_perms)
            .map_err(|e| {
                CompileError::io(format!("mounting {} at {guest}", host.display()), io::Error::other(e))
            })?;
        Ok(())
    };

    preopen(
        &mut builder,
        dirs.input(),
        names::GUEST_INPUT_DIR,
        DirPerms::all(),
        FilePerms::all(),
    )?;
    preopen(
        &mut builder,
        dirs.output(),
        names::GUEST_OUTPUT_DIR,
        DirPerms::all(),
        FilePerms::all(),
    )?;
    preopen(
        &mut builder,
        bundle_dir,
        names::GUEST_BUNDLE_DIR,
        DirPerms::READ,
        FilePerms::READ,
    )?;
    preopen(
        &mut builder,
        dirs.fonts(),
        names::GUEST_FONTS_DIR,
        DirPerms::all(),
        FilePerms::all(),
    )?;
    preopen(
        &mut builder,
        dirs.cache(),
        names::GUEST_CACHE_DIR,
        DirPerms::all(),
        FilePerms::all(),
    )?;

    Ok(builder.build_p1())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_dirs_layout() {
        let dirs = JobDirs::create("waxtex-test-", None).unwrap();

        assert!(dirs.input().is_dir());
        assert!(dirs.output().is_dir());
        assert!(dirs.cache().is_dir());
        assert!(dirs.fonts().is_dir());
        // The fonts dir is arena-local when no external dir was supplied
        assert_eq!(dirs.fonts().parent(), dirs.input().parent());
    }

    #[test]
    fn test_job_dirs_external_fonts() {
        let fonts = tempfile::tempdir().unwrap();
        let dirs = JobDirs::create("waxtex-test-", Some(fonts.path().to_path_buf())).unwrap();

        assert_eq!(dirs.fonts(), fonts.path());
        // No arena-local fonts dir was created
        assert!(!dirs.input().parent().unwrap().join("fonts").exists());
    }

    #[test]
    fn test_job_dirs_removed_on_drop() {
        let dirs = JobDirs::create("waxtex-test-", None).unwrap();
        let root = dirs.input().parent().unwrap().to_path_buf();
        assert!(root.is_dir());

        drop(dirs);
        assert!(!root.exists());
    }

    #[test]
    fn test_two_arenas_never_share_paths() {
        let a = JobDirs::create("waxtex-test-", None).unwrap();
        let b = JobDirs::create("waxtex-test-", None).unwrap();
        assert_ne!(a.input(), b.input());
        assert_ne!(a.output(), b.output());
    }

    #[test]
    fn test_build_wasi_with_valid_mounts() {
        let dirs = JobDirs::create("waxtex-test-", None).unwrap();
        let bundle = tempfile::tempdir().unwrap();
        let stderr = MemoryOutputPipe::new(STDERR_CAPACITY);

        let ctx = build_wasi(&dirs, bundle.path(), &stderr);
        assert!(ctx.is_ok());
    }

    #[test]
    fn test_build_wasi_missing_bundle_dir_fails() {
        let dirs = JobDirs::create("waxtex-test-", None).unwrap();
        let stderr = MemoryOutputPipe::new(STDERR_CAPACITY);

        let ctx = build_wasi(&dirs, Path::new("/nonexistent/bundle"), &stderr);
        assert!(matches!(ctx, Err(CompileError::Io { .. })));
    }
}
