//! Error type shared by ingestion, rendering and the host adapter.

use thiserror::Error;

/// Errors raised while ingesting bar data, rendering an overlay or handling host callbacks.
#[derive(Error, Debug)]
pub enum CsuError {
    /// A status file line is empty, has the wrong number of fields, or a field is not numeric.
    #[error("malformed status line {line_no} ({reason}): {line:?}")]
    MalformedLine {
        /// 1-based line number.
        line_no: usize,
        /// Offending line content.
        line: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// A status code that has no entry in the status code table.
    #[error("unknown status code {code} on status line {line_no}: {line:?}")]
    MalformedStatusCode {
        /// 1-based line number.
        line_no: usize,
        /// Offending line content.
        line: String,
        /// The unmapped code.
        code: i32,
    },

    /// Per-bar position key absent from the image header.
    #[error("image header has no B{0:02}POS key")]
    MissingBarKey(u32),

    /// Header key present but its value is not a number.
    #[error("header key {key} has non-numeric value {value:?}")]
    MalformedHeaderValue {
        /// Header key.
        key: String,
        /// Raw value.
        value: String,
    },

    /// Per-slit table has no row for this slit.
    #[error("slit table has no row for slit {0}")]
    MissingSlitRecord(u32),

    /// Per-slit table row with a non-finite centre or width.
    #[error("slit table row for slit {0} has a non-finite centre or width")]
    MalformedSlitRecord(u32),

    /// Per-slit table has more than one row for this slit.
    #[error("slit table has more than one row for slit {0}")]
    DuplicateSlitRecord(u32),

    /// A bar needed for a footprint has no position.
    #[error("no position known for bar {0}")]
    MissingBarPosition(u32),

    /// A text-entry value that cannot be used for a plugin setting.
    #[error("invalid value {value:?} for setting {name}")]
    InvalidSetting {
        /// Setting name.
        name: &'static str,
        /// Rejected text.
        value: String,
    },

    /// Reading a status or configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file is not valid JSON for [`Config`](crate::config::Config).
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, CsuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_bar_key_names_header_key() {
        assert_eq!(
            CsuError::MissingBarKey(5).to_string(),
            "image header has no B05POS key"
        );
        assert_eq!(
            CsuError::MissingBarKey(92).to_string(),
            "image header has no B92POS key"
        );
    }

    #[test]
    fn malformed_line_carries_content() {
        let err = CsuError::MalformedLine {
            line_no: 3,
            line: "3,abc,2".to_string(),
            reason: "position is not a number",
        };
        let msg = err.to_string();
        assert!(msg.contains("3,abc,2"));
        assert!(msg.contains("line 3"));
    }
}
