//! Error types for Synheart Focus

use thiserror::Error;

/// Errors raised by collaborators and the ambient layers around the engine.
///
/// `BioEngine::update` never returns one of these: collaborator failures are
/// logged and the affected step is skipped.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("History repository error: {0}")]
    Repository(String),

    #[error("Coefficient store error: {0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
