//! Domain error types.
//!
//! Configuration problems fail fast before any simulation starts. Data gaps
//! are not errors at this level: the engine records them as [`DataGap`]
//! values and keeps going.
//!
//! [`DataGap`]: crate::domain::backtest::DataGap

use chrono::NaiveDate;

/// Top-level error type for strider.
#[derive(Debug, thiserror::Error)]
pub enum StriderError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid strategy parameters: {reason}")]
    InvalidParams { reason: String },

    #[error("unknown strategy '{name}'")]
    UnknownStrategy { name: String },

    #[error("no data for {symbol} between {start} and {end}")]
    DataUnavailable {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("bad data for {symbol}: {reason}")]
    DataIntegrity { symbol: String, reason: String },

    #[error("computation error: {reason}")]
    Computation { reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("run {run_id} not found")]
    RunNotFound { run_id: String },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StriderError {
    /// True for errors raised before a simulation starts because the
    /// requested configuration can never succeed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StriderError::ConfigParse { .. }
                | StriderError::ConfigMissing { .. }
                | StriderError::ConfigInvalid { .. }
                | StriderError::InvalidParams { .. }
                | StriderError::UnknownStrategy { .. }
        )
    }
}

impl From<&StriderError> for std::process::ExitCode {
    fn from(err: &StriderError) -> Self {
        let code: u8 = match err {
            StriderError::Io(_) => 1,
            StriderError::ConfigParse { .. }
            | StriderError::ConfigMissing { .. }
            | StriderError::ConfigInvalid { .. }
            | StriderError::InvalidParams { .. }
            | StriderError::UnknownStrategy { .. } => 2,
            StriderError::Database { .. }
            | StriderError::DatabaseQuery { .. }
            | StriderError::RunNotFound { .. } => 3,
            StriderError::DataUnavailable { .. }
            | StriderError::DataIntegrity { .. } => 5,
            StriderError::Computation { .. }
            | StriderError::Cancelled
            | StriderError::Serialization(_) => 1,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_classified() {
        let err = StriderError::InvalidParams {
            reason: "holding_horizon must be positive".into(),
        };
        assert!(err.is_configuration());
        assert!(!StriderError::Cancelled.is_configuration());
    }

    #[test]
    fn data_unavailable_message_names_symbol_and_range() {
        let err = StriderError::DataUnavailable {
            symbol: "AAA".into(),
            start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "no data for AAA between 2023-01-01 and 2023-06-30"
        );
    }

    #[test]
    fn exit_codes_differ_by_family() {
        use std::process::ExitCode;
        let config = StriderError::ConfigMissing {
            section: "backtest".into(),
            key: "start_date".into(),
        };
        let data = StriderError::DataIntegrity {
            symbol: "AAA".into(),
            reason: "duplicate date 2024-01-02".into(),
        };
        assert_eq!(ExitCode::from(&config), ExitCode::from(2));
        assert_eq!(ExitCode::from(&data), ExitCode::from(5));
    }
}
