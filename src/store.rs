//! Persistence of the shadow heart-rate coefficients
//!
//! The engine loads coefficients once at construction and saves them after
//! every learning event through a [`CoefficientStore`]. It never touches
//! files itself.

use crate::error::EngineError;
use crate::shadow_hr::ShadowCoefficients;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Load/save capability for learned coefficients
pub trait CoefficientStore {
    /// Previously saved coefficients, `None` if nothing was saved yet
    fn load(&self) -> Result<Option<ShadowCoefficients>, EngineError>;

    fn save(&self, coefficients: &ShadowCoefficients) -> Result<(), EngineError>;
}

/// Store that keeps coefficients in memory.
///
/// Clones share storage so the caller can observe what the engine saved.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCoefficientStore {
    slot: Rc<RefCell<Option<ShadowCoefficients>>>,
    saves: Rc<RefCell<usize>>,
}

impl InMemoryCoefficientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coefficients(coefficients: ShadowCoefficients) -> Self {
        let store = Self::default();
        *store.slot.borrow_mut() = Some(coefficients);
        store
    }

    /// Last saved (or seeded) coefficients
    pub fn current(&self) -> Option<ShadowCoefficients> {
        self.slot.borrow().clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        *self.saves.borrow()
    }
}

impl CoefficientStore for InMemoryCoefficientStore {
    fn load(&self) -> Result<Option<ShadowCoefficients>, EngineError> {
        Ok(self.current())
    }

    fn save(&self, coefficients: &ShadowCoefficients) -> Result<(), EngineError> {
        *self.slot.borrow_mut() = Some(coefficients.clone());
        *self.saves.borrow_mut() += 1;
        Ok(())
    }
}

/// Store backed by a JSON file holding `{alpha, beta, gamma, last_updated}`
#[derive(Debug, Clone)]
pub struct JsonFileCoefficientStore {
    path: PathBuf,
}

impl JsonFileCoefficientStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CoefficientStore for JsonFileCoefficientStore {
    fn load(&self) -> Result<Option<ShadowCoefficients>, EngineError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| EngineError::Store(format!("{}: {}", self.path.display(), e)))?;
        let coefficients = serde_json::from_str(&content)
            .map_err(|e| EngineError::Store(format!("{}: {}", self.path.display(), e)))?;
        Ok(Some(coefficients))
    }

    fn save(&self, coefficients: &ShadowCoefficients) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| EngineError::Store(e.to_string()))?;
            }
        }
        let content = serde_json::to_string_pretty(coefficients)?;
        std::fs::write(&self.path, content)
            .map_err(|e| EngineError::Store(format!("{}: {}", self.path.display(), e)))
    }
}
