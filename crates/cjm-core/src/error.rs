pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Invalid markup JSON: {message}")]
    Json { message: String },

    #[error("Procedure `{procedure}` references unknown block `{block}`")]
    UnknownBlock { procedure: String, block: String },

    #[error("Procedure graph references unknown procedure `{procedure}`")]
    UnknownProcedure { procedure: String },

    #[error("Procedure `{procedure}` has an invalid end specification `{spec}`")]
    InvalidEndSpec { procedure: String, spec: String },

    #[error("Procedure `{procedure}` is defined more than once")]
    DuplicateProcedure { procedure: String },

    #[error("Empty {what} identifier in procedure `{procedure}`")]
    EmptyIdentifier {
        procedure: String,
        what: &'static str,
    },

    #[error("Invalid configuration value for `{key}`: {message}")]
    InvalidConfig { key: String, message: String },
}

impl Error {
    pub(crate) fn invalid_config(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.to_string(),
            message: message.into(),
        }
    }
}
