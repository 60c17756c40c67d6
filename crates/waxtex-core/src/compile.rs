//! Per-request compile orchestration.
//!
//! Each call to [`TexRuntime::compile`] gets a brand-new sandbox instance
//! and a private working directory tree; nothing is shared between jobs
//! except the read-only bundle mount and the precompiled module.

use std::io::Write;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use wasmtime::Store;
use wasmtime_wasi::pipe::MemoryOutputPipe;
use wasmtime_wasi::preview1::WasiP1Ctx;

use waxtex_common::config::LogSink;
use waxtex_common::{CompileError, CompileOptions, names};

use crate::job::{self, JobDirs, STDERR_CAPACITY};
use crate::runtime::TexRuntime;

/// Prefix of compile job working directories.
const JOB_PREFIX: &str = "waxtex-";

impl TexRuntime {
    /// Compile the given LaTeX source to PDF.
    ///
    /// Each call creates an isolated sandbox instance with its own
    /// filesystem; the working directory tree is removed before returning,
    /// regardless of outcome. The bundle directory is resolved from
    /// `options`, falling back to the runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::MissingBundleDir`] when no bundle directory
    /// is resolvable, [`CompileError::Tex`] when the document itself fails
    /// to compile, [`CompileError::EngineFault`] when the engine traps, and
    /// [`CompileError::MissingOutput`] when a reported success produced no
    /// PDF.
    #[instrument(skip_all, fields(job_id = %Uuid::new_v4(), source_len = tex_source.len()))]
    pub async fn compile(
        &self,
        tex_source: &[u8],
        options: CompileOptions,
    ) -> Result<Vec<u8>, CompileError> {
        let CompileOptions {
            bundle_dir,
            fonts_dir,
            mut log_sink,
            cancel,
        } = options;

        let bundle_dir = bundle_dir
            .or_else(|| self.config().bundle_dir.clone())
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or(CompileError::MissingBundleDir)?;
        let fonts_dir = fonts_dir.or_else(|| self.config().fonts_dir.clone());
        let cancel = cancel.unwrap_or_default();

        let dirs = JobDirs::create(JOB_PREFIX, fonts_dir)?;

        let input_path = dirs.input().join(names::INPUT_FILE);
        std::fs::write(&input_path, tex_source)
            .map_err(|e| CompileError::io(format!("writing {}", names::INPUT_FILE), e))?;

        let stderr = MemoryOutputPipe::new(STDERR_CAPACITY);
        let wasi = job::build_wasi(&dirs, &bundle_dir, &stderr)?;

        let outcome = self.invoke_entry(wasi, names::COMPILE_ENTRY, &cancel).await;
        let result = match settle(outcome, &stderr) {
            Err(err) => Err(err),
            Ok(log) => {
                let output_path = dirs.output().join(names::OUTPUT_FILE);
                std::fs::read(&output_path).map_err(|e| CompileError::MissingOutput {
                    log,
                    source: e,
                })
            }
        };

        forward_log(&mut log_sink, &stderr);

        match &result {
            Ok(pdf) => debug!(pdf_len = pdf.len(), "Compile succeeded"),
            Err(err) => debug!(error = %err, "Compile failed"),
        }

        // `dirs` drops here: the working tree is removed on every path
        result
    }

    /// Instantiate a fresh sandbox instance and call `entry`.
    ///
    /// The token is checked before instantiation, and both the
    /// instantiation and the call are raced against it; the engine's epoch
    /// ticker guarantees the executing guest reaches a yield point, so a
    /// cancelled call is dropped (and its instance closed) within one tick.
    pub(crate) async fn invoke_entry(
        &self,
        wasi: WasiP1Ctx,
        entry: &str,
        cancel: &CancellationToken,
    ) -> Result<i32, InvokeError> {
        if cancel.is_cancelled() {
            return Err(InvokeError::Cancelled);
        }

        let mut store = Store::new(self.engine(), wasi);
        // Yield to the executor on every epoch tick instead of trapping
        store.epoch_deadline_async_yield_and_update(1);

        let instance = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(InvokeError::Cancelled),
            result = self.linker().instantiate_async(&mut store, self.module().inner()) => {
                result.map_err(InvokeError::Instantiate)?
            }
        };

        let func = instance
            .get_typed_func::<(), i32>(&mut store, entry)
            .map_err(InvokeError::Instantiate)?;

        let exit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(InvokeError::Cancelled),
            result = func.call_async(&mut store, ()) => result.map_err(InvokeError::Trap)?,
        };

        Ok(exit)
    }
}

/// A failed or unfinished sandbox invocation, before classification.
pub(crate) enum InvokeError {
    /// The cancellation token fired at or inside the sandbox boundary.
    Cancelled,
    /// Instance creation or entry-point lookup failed.
    Instantiate(anyhow::Error),
    /// The engine trapped or panicked during the call.
    Trap(anyhow::Error),
}

/// Turn a raw invocation outcome into the classified result.
///
/// On a zero exit the captured diagnostic text is returned for the caller
/// to attach to any post-success consistency error.
pub(crate) fn settle(
    outcome: Result<i32, InvokeError>,
    stderr: &MemoryOutputPipe,
) -> Result<String, CompileError> {
    let log = String::from_utf8_lossy(&stderr.contents()).into_owned();

    match outcome {
        Err(InvokeError::Cancelled) => Err(CompileError::Cancelled),
        Err(InvokeError::Instantiate(e)) => Err(CompileError::Instantiate {
            log,
            source: e.into(),
        }),
        Err(InvokeError::Trap(e)) => {
            warn!(error = %e, "Engine trapped");
            Err(CompileError::EngineFault {
                log,
                source: Some(e.into()),
            })
        }
        Ok(code) => match CompileError::from_exit_code(code, log.clone()) {
            Some(err) => Err(err),
            None => Ok(log),
        },
    }
}

/// Forward the captured diagnostic text to the caller's sink, if any.
pub(crate) fn forward_log(sink: &mut Option<LogSink>, stderr: &MemoryOutputPipe) {
    if let Some(sink) = sink.as_mut() {
        let contents = stderr.contents();
        if let Err(e) = sink.write_all(&contents).and_then(|()| sink.flush()) {
            warn!(error = %e, "Failed to forward engine diagnostics to log sink");
        }
    }
}

