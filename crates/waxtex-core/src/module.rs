//! Engine module compilation and AOT caching.
//!
//! This module provides [`EngineModule`], a wrapper around Wasmtime's
//! [`Module`] holding the precompiled Tectonic engine. Compilation is a
//! measurable one-time cost; with a cache directory configured, the
//! serialized artifact is reused across initializations.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, instrument};
use wasmtime::{Engine, Module};

use waxtex_common::RuntimeError;

/// The precompiled Tectonic engine module.
///
/// Immutable after construction and safe to share across unlimited
/// concurrent jobs; every job instantiates its own instance from it.
#[derive(Clone)]
pub struct EngineModule {
    inner: Module,
    content_hash: String,
}

impl EngineModule {
    /// Compile the engine module from WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a WebAssembly module or
    /// compilation fails.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        validate_wasm_header(bytes)?;

        let module = Module::new(engine, bytes)
            .map_err(|e| RuntimeError::module_compile(e.to_string()))?;

        let content_hash = compute_hash(bytes);
        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "Engine module compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
        })
    }

    /// Compile or load the engine module, reusing an AOT artifact when a
    /// cache directory is given.
    ///
    /// Artifacts are named `{content_hash}.cwasm`. A cache miss compiles
    /// from `bytes` and deposits the serialized module; a failed deposit is
    /// logged but does not fail initialization.
    pub fn load_or_compile(
        engine: &Engine,
        bytes: &[u8],
        cache_dir: Option<&Path>,
    ) -> Result<Self, RuntimeError> {
        let Some(cache_dir) = cache_dir else {
            return Self::from_bytes(engine, bytes);
        };

        validate_wasm_header(bytes)?;
        let content_hash = compute_hash(bytes);
        let artifact = cache_dir.join(format!("{content_hash}.cwasm"));

        if artifact.is_file() {
            return Self::from_precompiled(engine, &artifact, content_hash);
        }

        let module = Self::from_bytes(engine, bytes)?;
        match module.serialize() {
            Ok(serialized) => {
                if let Err(e) = std::fs::create_dir_all(cache_dir)
                    .and_then(|()| std::fs::write(&artifact, serialized))
                {
                    debug!(path = %artifact.display(), error = %e, "Failed to cache AOT artifact");
                }
            }
            Err(e) => debug!(error = %e, "Module serialization failed, skipping cache"),
        }

        Ok(module)
    }

    /// Load a pre-compiled module artifact from disk.
    ///
    /// # Safety
    ///
    /// Deserializing executes no code but trusts the artifact to be machine
    /// code produced by the same Wasmtime version; only artifacts this host
    /// wrote into its own cache directory are loaded.
    #[allow(unsafe_code)]
    fn from_precompiled(
        engine: &Engine,
        path: &Path,
        content_hash: String,
    ) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        // SAFETY: the artifact was serialized by this host's own cache path
        let module = unsafe { Module::deserialize_file(engine, path) }.map_err(|e| {
            RuntimeError::module_compile(format!(
                "loading precompiled module from {}: {e}",
                path.display()
            ))
        })?;

        debug!(
            path = %path.display(),
            duration_us = start.elapsed().as_micros(),
            "Precompiled engine module loaded"
        );

        Ok(Self {
            inner: module,
            content_hash,
        })
    }

    /// Compile a module from WAT (WebAssembly Text Format).
    ///
    /// This is primarily for testing with stub engine modules.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails.
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, RuntimeError> {
        let module =
            Module::new(engine, wat).map_err(|e| RuntimeError::module_compile(e.to_string()))?;

        Ok(Self {
            inner: module,
            content_hash: compute_hash(wat.as_bytes()),
        })
    }

    /// Serialize the compiled module for AOT caching.
    pub fn serialize(&self) -> Result<Vec<u8>, RuntimeError> {
        self.inner
            .serialize()
            .map_err(|e| RuntimeError::module_compile(format!("serialization failed: {e}")))
    }

    /// Get the content hash of the original module bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.inner
    }
}

impl std::fmt::Debug for EngineModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineModule")
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// Validate the WebAssembly header (magic number).
fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
    if bytes.len() < 8 {
        return Err(RuntimeError::module_compile("invalid Wasm: file too small"));
    }

    if &bytes[0..4] != b"\0asm" {
        return Err(RuntimeError::module_compile(
            "invalid Wasm: bad magic number",
        ));
    }

    Ok(())
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
