//! Runtime host lifecycle.
//!
//! The [`TexRuntime`] is the long-lived host behind every job. It is:
//! - Initialized once: wasmtime engine, WASI layer, precompiled engine module
//! - Immutable after construction and shared read-only across all jobs
//! - Torn down explicitly; teardown consumes the runtime

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::info;
use wasmtime::{Config, Engine, Linker, OptLevel};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};

use waxtex_common::{RuntimeConfig, RuntimeError};

use crate::module::EngineModule;

/// The long-lived sandbox runtime host.
///
/// Holds the wasmtime engine, the WASI linker, and the precompiled Tectonic
/// module. Creating it pays the module compilation cost once; every compile
/// or format job then instantiates a fresh, isolated instance from the
/// precompiled module.
///
/// # Thread Safety
///
/// All job entry points take `&self`; the runtime is safe to share across
/// unlimited concurrent jobs because nothing in it is mutated after
/// construction.
pub struct TexRuntime {
    engine: Engine,
    linker: Linker<WasiP1Ctx>,
    module: EngineModule,
    config: RuntimeConfig,
    ticker: EpochTicker,
}

impl TexRuntime {
    /// Initialize the runtime host from raw engine module bytes.
    ///
    /// Instantiates the wasmtime engine, installs WASI preview 1, and
    /// precompiles the engine module (honouring
    /// [`RuntimeConfig::module_cache_dir`]). Any failure releases what was
    /// already acquired.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, WASI installation
    /// fails, or the module cannot be compiled.
    pub fn initialize(config: RuntimeConfig, module_bytes: &[u8]) -> Result<Self, RuntimeError> {
        Self::initialize_inner(config, |engine, cfg| {
            EngineModule::load_or_compile(engine, module_bytes, cfg.module_cache_dir.as_deref())
        })
    }

    /// Initialize the runtime host from an engine module file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, or as [`Self::initialize`].
    pub fn initialize_from_file(
        config: RuntimeConfig,
        module_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, RuntimeError> {
        let path = module_path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            RuntimeError::io(format!("reading engine module '{}'", path.display()), e)
        })?;
        Self::initialize(config, &bytes)
    }

    /// Initialize the runtime host from WAT text.
    ///
    /// This is primarily for testing with stub engine modules.
    ///
    /// # Errors
    ///
    /// Returns an error as [`Self::initialize`].
    pub fn initialize_from_wat(config: RuntimeConfig, wat: &str) -> Result<Self, RuntimeError> {
        Self::initialize_inner(config, |engine, _| EngineModule::from_wat(engine, wat))
    }

    fn initialize_inner(
        config: RuntimeConfig,
        compile: impl FnOnce(&Engine, &RuntimeConfig) -> Result<EngineModule, RuntimeError>,
    ) -> Result<Self, RuntimeError> {
        if config.epoch_tick_ms == 0 {
            return Err(RuntimeError::config("epoch_tick_ms must be non-zero"));
        }

        let mut wasmtime_config = Config::new();

        // Async support so sandbox calls can be raced against cancellation
        wasmtime_config.async_support(true);

        // Epoch interruption gives running guests periodic yield points
        wasmtime_config.epoch_interruption(true);

        wasmtime_config.cranelift_opt_level(OptLevel::Speed);

        let engine = Engine::new(&wasmtime_config)
            .map_err(|e| RuntimeError::config(format!("creating wasmtime engine: {e}")))?;

        let mut linker = Linker::new(&engine);
        preview1::add_to_linker_async(&mut linker, |cx: &mut WasiP1Ctx| cx)
            .map_err(|e| RuntimeError::wasi(e.to_string()))?;

        let module = compile(&engine, &config)?;

        let ticker = EpochTicker::start(
            engine.clone(),
            Duration::from_millis(config.epoch_tick_ms),
        )?;

        info!(
            content_hash = %module.content_hash(),
            epoch_tick_ms = config.epoch_tick_ms,
            "TexRuntime initialized"
        );

        Ok(Self {
            engine,
            linker,
            module,
            config,
            ticker,
        })
    }

    /// Tear down the runtime, releasing the sandbox environment and
    /// everything derived from it.
    ///
    /// Consuming `self` makes double-teardown unrepresentable. Leaking the
    /// runtime instead is not a correctness problem: `Drop` stops the epoch
    /// ticker as well.
    pub fn teardown(mut self) {
        self.ticker.stop();
        info!("TexRuntime torn down");
    }

    /// Get the runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get the precompiled engine module.
    pub fn module(&self) -> &EngineModule {
        &self.module
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn linker(&self) -> &Linker<WasiP1Ctx> {
        &self.linker
    }
}

impl std::fmt::Debug for TexRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TexRuntime")
            .field("module", &self.module)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Background thread that increments the engine epoch at a fixed interval.
///
/// Every job store registers an epoch callback that yields the executing
/// guest back to the async executor, so a tick bounds how long a cancelled
/// sandbox call keeps running.
struct EpochTicker {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl EpochTicker {
    fn start(engine: Engine, interval: Duration) -> Result<Self, RuntimeError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("waxtex-epoch".into())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    engine.increment_epoch();
                }
            })
            .map_err(|e| RuntimeError::io("spawning epoch ticker", e))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            // The thread sleeps at most one interval before seeing the flag
            let _ = handle.join();
        }
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_MODULE_WAT: &str = "(module)";

    #[test]
    fn test_runtime_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TexRuntime>();
    }

    #[test]
    fn test_initialize_and_teardown() {
        let runtime =
            TexRuntime::initialize_from_wat(RuntimeConfig::default(), EMPTY_MODULE_WAT).unwrap();
        assert!(runtime.config().bundle_dir.is_none());
        runtime.teardown();
    }

    #[test]
    fn test_initialize_rejects_zero_tick() {
        let config = RuntimeConfig {
            epoch_tick_ms: 0,
            ..Default::default()
        };
        let result = TexRuntime::initialize_from_wat(config, EMPTY_MODULE_WAT);
        assert!(matches!(result, Err(RuntimeError::Config { .. })));
    }

    #[test]
    fn test_initialize_rejects_invalid_module() {
        let result = TexRuntime::initialize(RuntimeConfig::default(), b"not wasm");
        assert!(matches!(result, Err(RuntimeError::ModuleCompile { .. })));
    }

    #[test]
    fn test_drop_without_teardown() {
        let runtime =
            TexRuntime::initialize_from_wat(RuntimeConfig::default(), EMPTY_MODULE_WAT).unwrap();
        // Dropping must stop the ticker without an explicit teardown
        drop(runtime);
    }

    #[test]
    fn test_runtime_debug() {
        let runtime =
            TexRuntime::initialize_from_wat(RuntimeConfig::default(), EMPTY_MODULE_WAT).unwrap();
        let debug_str = format!("{runtime:?}");
        assert!(debug_str.contains("TexRuntime"));
        runtime.teardown();
    }
}
