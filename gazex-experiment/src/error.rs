use std::path::PathBuf;
use thiserror::Error;

/// A malformed row in a trial specification
#[derive(Debug, Clone, PartialEq, Error)]
#[error("trial specification row {row}, column {column}: {kind}")]
pub struct ParseError {
    /// 1-based line number in the specification
    pub row: usize,
    /// 1-based field position
    pub column: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("expected {expected} fields, found {found}")]
    Arity { expected: usize, found: usize },

    #[error("{value:?} is not an integer")]
    Int { value: String },

    #[error("{value:?} is not a number")]
    Float { value: String },

    #[error("empty stimulus name")]
    EmptyStimulus,
}

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("trial index {index} is out of range for a list of {len} trials")]
    OutOfRange { index: usize, len: usize },

    #[error("training prefix of {prefix} trials exceeds the {len} trials specified")]
    TrainingPrefix { prefix: usize, len: usize },

    #[error("media phase is enabled but trial {index} has no media stimulus")]
    MissingMedia { index: usize },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value {value} for {field}")]
    InvalidSetting { field: &'static str, value: String },

    #[error("unknown paradigm {0:?}")]
    UnknownParadigm(String),

    #[error("invalid session config: {0}")]
    Config(#[from] toml::de::Error),
}
