use thiserror::Error;

/// Failures of the harvest and clean stages.
///
/// Which variants are fatal depends on where they surface: a `Transport` error on the
/// entry page aborts one source, an `Extraction` error skips one posting, a
/// `ConfigLoad` error stops the whole clean stage.
#[derive(Error, Debug)]
pub enum Error {
    #[error("transport failed for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("posting extraction failed: {0}")]
    Extraction(String),

    #[error("cannot determine next page from {url}: {reason}")]
    PaginationParse { url: String, reason: String },

    #[error("cannot load {path}: {reason}")]
    ConfigLoad { path: String, reason: String },

    #[error("row {row} has an empty `{column}` field")]
    RecordIncomplete { row: usize, column: String },

    #[error("title is missing and no fallback was given")]
    MissingFallback,

    #[error("raw artifact {0} not found")]
    MissingArtifact(String),

    #[error("{artifact} has no `{column}` column")]
    MissingColumn { artifact: String, column: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn transport(url: &str, reason: impl ToString) -> Self {
        Error::Transport {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn pagination(url: &str, reason: impl ToString) -> Self {
        Error::PaginationParse {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn config_load(path: &str, reason: impl ToString) -> Self {
        Error::ConfigLoad {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}
