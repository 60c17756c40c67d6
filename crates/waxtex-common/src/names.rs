//! The fixed names of the sandbox surface.
//!
//! The Tectonic engine module is built against exactly these mount paths,
//! environment variables, file names, and exported entry points. They are
//! part of the contract with the WASM artifact and must not drift.

/// In-sandbox path the job's source directory is mounted at.
pub const GUEST_INPUT_DIR: &str = "/input";

/// In-sandbox path the job's output directory is mounted at.
pub const GUEST_OUTPUT_DIR: &str = "/output";

/// In-sandbox path the shared support-data bundle is mounted at (read-only).
pub const GUEST_BUNDLE_DIR: &str = "/bundle";

/// In-sandbox path the fonts directory is mounted at.
pub const GUEST_FONTS_DIR: &str = "/fonts";

/// In-sandbox path the job's scratch/cache directory is mounted at.
pub const GUEST_CACHE_DIR: &str = "/cache";

/// Environment variable pointing the engine at the fonts mount.
pub const ENV_FONT_DIR: &str = "TECTONIC_FONT_DIR";

/// Environment variable pointing the engine at the cache mount.
pub const ENV_CACHE_DIR: &str = "TECTONIC_CACHE_DIR";

/// File name the caller's LaTeX source is written to inside the input mount.
pub const INPUT_FILE: &str = "input.tex";

/// File name of the PDF the engine produces inside the output mount.
pub const OUTPUT_FILE: &str = "input.pdf";

/// File name of the precomputed format artifact inside the bundle directory.
pub const FORMAT_FILE: &str = "latex.fmt";

/// Extension the engine uses for format artifacts, without the dot.
pub const FORMAT_EXTENSION: &str = "fmt";

/// Exported entry point that compiles whatever is mounted at `/input`.
pub const COMPILE_ENTRY: &str = "tectonic_compile_defaults";

/// Exported entry point that generates the format artifact into `/cache`.
pub const FORMAT_ENTRY: &str = "tectonic_generate_format";

/// Marker file whose presence signals an already-extracted bundle.
///
/// The bundle archive always carries a SHA256SUM entry, so its presence in
/// the destination directory means a previous extraction ran to completion.
pub const BUNDLE_MARKER: &str = "SHA256SUM";

/// Default location of the TeX Live support-data bundle.
pub const DEFAULT_BUNDLE_URL: &str =
    "https://relay.fullyjustified.net/default_bundle_v33.tar";

/// Minimum number of extracted files for a bundle to be considered complete.
///
/// A heuristic, not a format guarantee: a real bundle holds tens of
/// thousands of files, so anything below this is a truncated download.
pub const MIN_BUNDLE_FILES: usize = 100;
