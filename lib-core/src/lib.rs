//! Jar-Repack is initially built as a CLI app, but can also be used as a library.
//! This crate contains everything needed to shrink JAR (and plain ZIP) archives
//! without touching their contents.
//!
//! You should be interested in the `optimizer` module. Its [`optimizer::Repacker`]
//! parses an archive, re-encodes every entry with the configured codecs and
//! serializes a smaller, structurally equivalent archive.

/// Deflate stream measurement for bit-exact size comparison.
pub mod bits;
/// Repacking configuration and policies.
pub mod cfg;
/// Compression codecs and checksums.
pub mod codec;
/// Error collecting for entries.
pub mod errors;
/// Archive signatures, header layouts and special names.
pub mod format;
/// Archive optimization driver.
pub mod optimizer;
/// Manifest-first entry ordering.
pub mod order;
/// Archive parsing into an in-memory model.
pub mod read;
/// Registry bridging the local and central serialization passes.
pub mod registry;
/// Compression selection across codec trials.
pub mod select;
/// Archive serialization with field-removal policies.
pub mod write;

/// A progress state to update information about currently optimized entry
#[derive(Debug, Clone)]
pub enum ProgressState {
    /// Starts a progress with a step count
    Start(usize),
    /// Pushes a new step with text
    Push(usize, std::sync::Arc<str>),
    /// Marks a progress as finished
    Finish
}
