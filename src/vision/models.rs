//! ONNX Runtime session handling
//!
//! Sessions for the optional helper models (orientation classifier,
//! super-resolution) are opened on first use, not at construction.

use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// ONNX Runtime session wrapper
pub struct OnnxSession {
    session: Session,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl OnnxSession {
    /// Create a new ONNX session from a model file
    pub fn new(model_path: &Path) -> Result<Self> {
        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model {:?}", model_path))?;

        let input_names: Vec<String> = session
            .inputs
            .iter()
            .map(|input| input.name.clone())
            .collect();

        let output_names: Vec<String> = session
            .outputs
            .iter()
            .map(|output| output.name.clone())
            .collect();

        info!(
            "Model loaded. Inputs: {:?}, Outputs: {:?}",
            input_names, output_names
        );

        Ok(Self {
            session,
            input_names,
            output_names,
        })
    }

    /// Get the underlying session mutably for running inference
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// First input name
    pub fn primary_input(&self) -> Result<&str> {
        self.input_names
            .first()
            .map(String::as_str)
            .context("Model declares no inputs")
    }

    /// First output name
    pub fn primary_output(&self) -> Result<&str> {
        self.output_names
            .first()
            .map(String::as_str)
            .context("Model declares no outputs")
    }
}

/// A model file whose session is opened on first use
///
/// Load failures are remembered so a missing or corrupt model is reported
/// once instead of on every frame.
pub struct LazyModel {
    path: PathBuf,
    state: Mutex<LoadState>,
}

enum LoadState {
    Pending,
    Ready(OnnxSession),
    Failed,
}

impl LazyModel {
    /// Create a handle for the model at `path` without opening it
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(LoadState::Pending),
        }
    }

    /// Model file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the model can be used, without forcing a load
    pub fn is_available(&self) -> bool {
        match *self.state.lock() {
            LoadState::Pending => self.path.exists(),
            LoadState::Ready(_) => true,
            LoadState::Failed => false,
        }
    }

    /// Open the session if it is not open yet
    pub fn ensure_loaded(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::load_locked(&self.path, &mut *state)
    }

    fn load_locked(path: &Path, state: &mut LoadState) -> Result<()> {
        match *state {
            LoadState::Ready(_) => Ok(()),
            LoadState::Failed => anyhow::bail!("Model {:?} failed to load earlier", path),
            LoadState::Pending => match OnnxSession::new(path) {
                Ok(session) => {
                    *state = LoadState::Ready(session);
                    Ok(())
                }
                Err(e) => {
                    warn!("Model {:?} unavailable: {:#}", path, e);
                    *state = LoadState::Failed;
                    Err(e)
                }
            },
        }
    }

    /// Run `f` against the loaded session, loading it first if needed
    pub fn with_session<T>(&self, f: impl FnOnce(&mut OnnxSession) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        Self::load_locked(&self.path, &mut *state)?;
        match &mut *state {
            LoadState::Ready(session) => f(session),
            _ => anyhow::bail!("Model {:?} is not loaded", self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_unavailable() {
        let model = LazyModel::new("/nonexistent/model.onnx");
        assert!(!model.is_available());
        assert_eq!(model.path(), Path::new("/nonexistent/model.onnx"));
    }

    #[test]
    fn test_corrupt_model_fails_once_and_stays_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"not an onnx graph").unwrap();

        let model = LazyModel::new(&path);
        assert!(model.is_available());
        assert!(model.ensure_loaded().is_err());
        assert!(!model.is_available());
        assert!(model.with_session(|_| Ok(())).is_err());
    }
}
