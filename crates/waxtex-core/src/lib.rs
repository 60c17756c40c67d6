//! Sandboxed Tectonic engine host for waxtex.
//!
//! This crate compiles LaTeX to PDF by running the Tectonic engine, built as
//! a WASI preview-1 WebAssembly module, inside a wasmtime sandbox:
//! - [`TexRuntime`]: long-lived host owning the engine and the precompiled
//!   module; initialized once, shared across all jobs
//! - [`EngineModule`]: precompiled engine module wrapper
//! - per-job orchestration: fresh sandbox instance, private working
//!   directories, read-only bundle mount, exit-code classification
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      TexRuntime                         │
//! │  (Initialized once, shared read-only by all jobs)       │
//! │  - wasmtime Engine + WASI linker                        │
//! │  - precompiled Tectonic module                          │
//! │  - epoch ticker (cancellation preemption)               │
//! └─────────────────────────────────────────────────────────┘
//!                            │  per compile / format job
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │           Store<WasiP1Ctx> + fresh Instance             │
//! │  (Private, destroyed at job end)                        │
//! │  - /input /output /fonts /cache  (read-write mounts)    │
//! │  - /bundle                       (read-only mount)      │
//! │  - stderr captured, stdout discarded                    │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod compile;
mod format;
mod job;
pub mod module;
pub mod runtime;

pub use module::EngineModule;
pub use runtime::TexRuntime;
