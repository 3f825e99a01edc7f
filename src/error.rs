use std::fmt;

use crate::models::{CellResolution, Stratum};

/// Fatal or per-call failures raised by the generation and indexing stages.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no addresses with coordinates matched either stratum (requested {requested})")]
    InsufficientSourceData { requested: usize },

    #[error("invalid coordinate ({latitude:?}, {longitude:?})")]
    InvalidCoordinate {
        latitude: Option<f64>,
        longitude: Option<f64>,
    },

    #[error("hex grid unavailable at {resolution} resolution: {reason}")]
    SpatialFunctionUnavailable {
        resolution: CellResolution,
        reason: String,
    },

    #[error("invalid cell id {cell_id:?}: {reason}")]
    InvalidCellId { cell_id: String, reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientSourceData { .. } => "INSUFFICIENT_SOURCE_DATA",
            Self::InvalidCoordinate { .. } => "INVALID_COORDINATE",
            Self::SpatialFunctionUnavailable { .. } => "SPATIAL_FUNCTION_UNAVAILABLE",
            Self::InvalidCellId { .. } => "INVALID_CELL_ID",
            Self::Config(_) => "INVALID_CONFIG",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("{field} {message}")]
    Validation { field: String, message: String },
}

impl ConfigError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Recoverable conditions collected alongside a generation result.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    MissingData {
        stratum: Stratum,
        requested: usize,
        available: usize,
    },
    InvalidCoordinate {
        address_id: String,
        latitude: f64,
        longitude: f64,
    },
    SpatialFunctionUnavailable {
        resolution: CellResolution,
        affected_records: usize,
    },
}

impl PipelineWarning {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingData { .. } => "MISSING_DATA",
            Self::InvalidCoordinate { .. } => "INVALID_COORDINATE",
            Self::SpatialFunctionUnavailable { .. } => "SPATIAL_FUNCTION_UNAVAILABLE",
        }
    }

    pub fn shortfall(&self) -> usize {
        match self {
            Self::MissingData {
                requested,
                available,
                ..
            } => requested.saturating_sub(*available),
            _ => 0,
        }
    }
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingData {
                stratum,
                requested,
                available,
            } => write!(
                f,
                "{}: {stratum} stratum filled {available} of {requested} (short {})",
                self.code(),
                self.shortfall()
            ),
            Self::InvalidCoordinate {
                address_id,
                latitude,
                longitude,
            } => write!(
                f,
                "{}: address {address_id} at ({latitude}, {longitude}) left unindexed",
                self.code()
            ),
            Self::SpatialFunctionUnavailable {
                resolution,
                affected_records,
            } => write!(
                f,
                "{}: {affected_records} records fell back to the approximate grid at {resolution} resolution",
                self.code()
            ),
        }
    }
}
