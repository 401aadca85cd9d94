//! Error types for SoundFont loading.

use thiserror::Error;

/// Errors that abort SoundFont construction.
///
/// Loading is all-or-nothing: any of these leaves no partial graph behind.
#[derive(Debug, Error)]
pub enum Sf2Error {
    /// Structural corruption: truncated data, a chunk size past the end of its
    /// parent, an unexpected chunk tag, or a record table with a bad length.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// An index stored in one table points outside the table it refers to.
    #[error("broken reference: {table} index {index} out of range (table length {len})")]
    BrokenReference {
        /// Name of the table being indexed (e.g. `"shdr"`).
        table: &'static str,
        /// The offending index.
        index: usize,
        /// Number of usable entries in the table.
        len: usize,
    },

    /// Failed to read the source stream.
    #[error("failed to read soundfont: {0}")]
    Io(#[from] std::io::Error),
}

impl Sf2Error {
    /// Create a malformed container error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Sf2Error::MalformedContainer(reason.into())
    }

    /// Create a broken reference error.
    pub fn broken(table: &'static str, index: usize, len: usize) -> Self {
        Sf2Error::BrokenReference { table, index, len }
    }
}

/// Convenience result type for SoundFont parsing.
pub type Result<T> = std::result::Result<T, Sf2Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn malformed_display() {
        let err = Sf2Error::malformed("expected 'RIFF', found 'RIFX'");
        assert_eq!(
            err.to_string(),
            "malformed container: expected 'RIFF', found 'RIFX'"
        );
    }

    #[test]
    fn broken_reference_display() {
        let err = Sf2Error::broken("shdr", 12, 4);
        let msg = err.to_string();
        assert!(msg.contains("shdr"), "got: {msg}");
        assert!(msg.contains("12"), "got: {msg}");
        assert!(msg.contains('4'), "got: {msg}");
    }

    #[test]
    fn io_source_is_some() {
        let err: Sf2Error = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(err.source().is_some());
    }

    #[test]
    fn structural_errors_have_no_source() {
        assert!(Sf2Error::malformed("x").source().is_none());
        assert!(Sf2Error::broken("inst", 1, 0).source().is_none());
    }
}
