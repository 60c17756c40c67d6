//! Error types for waxtex.
//!
//! This module defines two error hierarchies using `thiserror`:
//! - [`RuntimeError`]: failures while initializing the runtime host
//! - [`CompileError`]: failures of a single compile or format-generation job,
//!   including the numeric exit-code classification of sandbox outcomes
//!
//! Diagnostic text captured from the engine's stderr is attached to every
//! sandbox-related [`CompileError`] verbatim. It is never parsed to decide
//! classification; only the numeric outcome code does that.

use std::io;

use thiserror::Error;

/// A wrapped lower-level cause, kept type-erased so this crate stays off the
/// wasmtime dependency. `wasmtime::Error` converts into this losslessly.
pub type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Failures while initializing the runtime host.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Invalid or rejected engine/runtime configuration.
    #[error("invalid configuration: {reason}")]
    Config {
        /// Description of the configuration error.
        reason: String,
    },

    /// Installing the WASI OS-emulation layer failed.
    #[error("WASI setup failed: {reason}")]
    Wasi {
        /// Description of the WASI setup failure.
        reason: String,
    },

    /// Precompiling the engine's WebAssembly module failed.
    #[error("engine module compilation failed: {reason}")]
    ModuleCompile {
        /// Description of the compilation failure.
        reason: String,
    },

    /// I/O operation failed during initialization.
    #[error("{context}: {source}")]
    Io {
        /// What was being done when the I/O failed.
        context: String,
        #[source]
        source: io::Error,
    },
}

impl RuntimeError {
    /// Create a new `Config` error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a new `Wasi` error.
    pub fn wasi(reason: impl Into<String>) -> Self {
        Self::Wasi {
            reason: reason.into(),
        }
    }

    /// Create a new `ModuleCompile` error.
    pub fn module_compile(reason: impl Into<String>) -> Self {
        Self::ModuleCompile {
            reason: reason.into(),
        }
    }

    /// Create a new `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Failures of a single compile or format-generation job.
///
/// The sandbox-related variants carry the diagnostic text captured from the
/// engine's stderr in `log`. Exit codes map to variants as follows:
/// `1` is a content-level failure in the document ([`CompileError::Tex`]),
/// `2` is a fault in the engine itself ([`CompileError::EngineFault`]), and
/// any other non-zero code is surfaced raw ([`CompileError::UnrecognizedExit`]).
#[derive(Error, Debug)]
pub enum CompileError {
    /// No bundle directory was configured on the runtime or the call.
    ///
    /// Raised before any filesystem or sandbox work is done.
    #[error("no bundle directory configured (set RuntimeConfig::bundle_dir or CompileOptions::bundle_dir)")]
    MissingBundleDir,

    /// Local I/O failed while preparing or collecting job files.
    #[error("{context}: {source}")]
    Io {
        /// What was being done when the I/O failed.
        context: String,
        #[source]
        source: io::Error,
    },

    /// The job's cancellation token fired before or during the sandbox call.
    #[error("compilation cancelled")]
    Cancelled,

    /// Creating the sandbox instance for this job failed.
    #[error("instantiating engine module failed: {source}")]
    Instantiate {
        /// Diagnostic text captured up to the failure.
        log: String,
        #[source]
        source: Cause,
    },

    /// The document failed to compile (exit code 1).
    ///
    /// Recoverable by the caller by fixing their input.
    #[error("TeX compilation failed (exit code 1)\n--- engine output ---\n{log}")]
    Tex {
        /// Diagnostic text captured from the engine.
        log: String,
    },

    /// The sandboxed engine itself faulted (exit code 2 or a WASM trap).
    ///
    /// `source` carries the underlying trap when there was one; a plain
    /// exit code 2 has no lower-level cause.
    #[error("engine fault (exit code 2)\n--- engine output ---\n{log}")]
    EngineFault {
        /// Diagnostic text captured from the engine.
        log: String,
        #[source]
        source: Option<Cause>,
    },

    /// The sandbox returned a non-zero code outside the known taxonomy.
    #[error("engine exited with unrecognized code {code}\n--- engine output ---\n{log}")]
    UnrecognizedExit {
        /// The raw exit code.
        code: i32,
        /// Diagnostic text captured from the engine.
        log: String,
    },

    /// The engine reported success but the expected output file is missing.
    #[error("engine reported success but produced no output\n--- engine output ---\n{log}")]
    MissingOutput {
        /// Diagnostic text captured from the engine.
        log: String,
        #[source]
        source: io::Error,
    },
}

impl CompileError {
    /// Create a new `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Classify a numeric sandbox outcome code.
    ///
    /// Returns `None` for `0` (not an error). The diagnostic text is attached
    /// to the resulting variant verbatim, never inspected.
    pub fn from_exit_code(code: i32, log: impl Into<String>) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(Self::Tex { log: log.into() }),
            2 => Some(Self::EngineFault {
                log: log.into(),
                source: None,
            }),
            other => Some(Self::UnrecognizedExit {
                code: other,
                log: log.into(),
            }),
        }
    }

    /// Returns `true` if this is a content-level failure in the document
    /// (exit code 1), recoverable by the caller.
    pub fn is_tex_error(&self) -> bool {
        matches!(self, Self::Tex { .. })
    }

    /// Returns `true` if the sandboxed engine itself faulted (exit code 2
    /// or a WASM trap).
    pub fn is_engine_fault(&self) -> bool {
        matches!(self, Self::EngineFault { .. })
    }

    /// The numeric exit code behind this error, where one exists.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Tex { .. } => Some(1),
            Self::EngineFault { .. } => Some(2),
            Self::UnrecognizedExit { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Diagnostic text captured from the engine's stderr, where any was.
    pub fn log(&self) -> Option<&str> {
        match self {
            Self::Instantiate { log, .. }
            | Self::Tex { log }
            | Self::EngineFault { log, .. }
            | Self::UnrecognizedExit { log, .. }
            | Self::MissingOutput { log, .. } => Some(log),
            _ => None,
        }
    }
}
