use std::{error::Error, fmt::Display, sync::Arc};

/// Collects per-entry soft failures (codec errors, failed flatten attempts)
/// that must not abort the archive rewrite.
pub struct ErrorCollector {
    silent: bool,
    vec: Vec<EntryError>,
    name: Arc<str>,
}
impl ErrorCollector {
    /// Creates a new `ErrorCollector` with a `silent` option.
    #[must_use]
    pub fn new(silent: bool) -> Self {
        Self { silent, vec: Vec::new(), name: "".into() }
    }

    /// Sets the new prefix name for collected entries.
    pub fn rename(&mut self, name: &str) {
        self.name = name.into();
    }

    /// Collects an error for an entry based on its name (path).
    pub fn collect(&mut self, name: impl Into<Arc<str>>, e: anyhow::Error) {
        if !self.silent {
            self.vec.push(EntryError {
                parent: self.name.clone(),
                name: name.into(),
                inner: e,
            });
        }
    }

    /// Returns all currently gathered results.
    #[must_use]
    pub fn results(&self) -> &[EntryError] {
        &self.vec
    }
}

/// An error thrown while one entry was processed, tagged with its path.
#[derive(Debug)]
pub struct EntryError {
    /// A parent path (the archive being rewritten).
    pub parent: Arc<str>,
    /// The entry name the error belongs to.
    pub name: Arc<str>,
    inner: anyhow::Error,
}
impl EntryError {
    /// Returns the inner error.
    #[must_use]
    pub fn inner_error(&self) -> &(dyn Error + 'static) {
        self.inner.as_ref()
    }
}
impl Display for EntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.parent, self.name, self.inner)
    }
}
