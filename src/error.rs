use thiserror::Error;

pub type Result<T> = std::result::Result<T, RiskError>;

// Zero denominators and unseen categories are recovered in place and never
// surface here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    #[error("schema error on column `{column}`: {reason}")]
    Schema { column: String, reason: String },

    #[error("training error: {0}")]
    Training(String),

    #[error("configuration error on `{field}`: {reason}")]
    Configuration { field: String, reason: String },
}

impl RiskError {
    pub fn schema(column: impl Into<String>, reason: impl Into<String>) -> Self {
        RiskError::Schema {
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::schema(column, "column is absent")
    }

    pub fn training(reason: impl Into<String>) -> Self {
        RiskError::Training(reason.into())
    }

    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RiskError::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
