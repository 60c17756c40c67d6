//! Support-data bundle acquisition for waxtex.
//!
//! The TeX engine needs a local directory of support files (class files,
//! fonts, format sources). This crate downloads the bundle archive over
//! HTTP and extracts it into that directory.
//!
//! The archive is an "itar": a plain tar stream in which most entries are
//! individually gzip-compressed so they can also be fetched one at a time
//! by range requests. Extraction flattens every entry to its basename,
//! decompressing the gzipped ones and copying the rest through raw.
//!
//! A `SHA256SUM` file in the destination directory marks a completed
//! extraction; [`prepare_bundle`] short-circuits when it is present.

mod error;
mod extract;
mod fetch;

pub use error::BundleError;
pub use fetch::{PrepareOptions, prepare_bundle};

/// Receives human-readable progress messages during long downloads and
/// extractions.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, message: &str);
}
