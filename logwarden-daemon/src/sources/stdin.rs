//! Standard input source.

use logwarden_core::error::SourceError;
use logwarden_core::pipeline::{LineReader, LineSource};

/// Reads the daemon's own standard input.
///
/// Standard input cannot be reopened, so monitors on this source always
/// stop at EOF.
pub struct StdinSource {
    name: String,
}

impl StdinSource {
    /// Create a stdin source.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl LineSource for StdinSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self) -> Result<LineReader, SourceError> {
        Ok(Box::new(tokio::io::stdin()))
    }

    async fn close(&self) -> Result<(), SourceError> {
        Ok(())
    }
}
