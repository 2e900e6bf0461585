use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Column '{column}' not found in {path}")]
    MissingColumn { column: String, path: String },

    #[error("Invalid label '{value}' on line {line}")]
    InvalidLabel { line: u64, value: String },

    #[error("Length mismatch: {inputs} inputs but {labels} labels")]
    LengthMismatch { inputs: usize, labels: usize },

    #[error("Configuration error in {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("Checkpoint error: {message}")]
    Checkpoint { message: String },

    #[error("Dataset is empty: {message}")]
    EmptyDataset { message: String },

    #[error("Unknown model '{0}', expected one of: simple_nn, big_conv_nn, boosted")]
    UnknownModel(String),

    #[error("Backward pass through {layer} without a training forward pass")]
    MissingActivation { layer: &'static str },
}

impl DetectorError {
    pub fn config(field: &str, reason: impl Into<String>) -> Self {
        DetectorError::Config {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn checkpoint(message: impl Into<String>) -> Self {
        DetectorError::Checkpoint {
            message: message.into(),
        }
    }

    pub fn empty(message: impl Into<String>) -> Self {
        DetectorError::EmptyDataset {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;
