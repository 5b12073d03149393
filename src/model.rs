// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the dynamics-model interface and checkpoint loading.
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::exception::{MpcException, MpcResult};
use crate::state::{Observation, State};
use crate::utils::ActionSequence;

/// Predicts future observations conditioned on actions.
pub trait DynamicsModel {
    /// Predicts one trajectory per action sequence in a single batched call.
    ///
    /// The result must contain `action_sequences.len()` trajectories, each with one observation
    /// per row of its action sequence. The whole batch either succeeds or fails.
    fn predict(
        &self,
        start: &State,
        action_sequences: &[ActionSequence],
    ) -> MpcResult<Vec<Vec<Observation>>>;

    /// Dimension of a single action.
    fn action_dim(&self) -> usize;
}

/// Immutable, cheaply clonable handle to a loaded dynamics model.
///
/// The model can only be accessed by shared reference, so planning never changes it.
#[derive(Debug)]
pub struct ModelHandle<M> {
    model: Arc<M>,
    checkpoint: Option<PathBuf>,
}

impl<M> Clone for ModelHandle<M> {
    fn clone(&self) -> Self {
        ModelHandle {
            model: self.model.clone(),
            checkpoint: self.checkpoint.clone(),
        }
    }
}

impl<M> ModelHandle<M> {
    /// Wraps an in-memory model.
    pub fn new(model: M) -> Self {
        ModelHandle {
            model: Arc::new(model),
            checkpoint: None,
        }
    }
    /// Path of the checkpoint the model was loaded from, if any.
    pub fn checkpoint(&self) -> Option<&Path> {
        self.checkpoint.as_deref()
    }
}

impl<M> Deref for ModelHandle<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.model
    }
}

/// Loads the parameters of a model from a checkpoint written by [`save_checkpoint`].
/// # Errors
/// * [`ModelException`](`crate::exception::MpcException::ModelException`) if the file cannot be
/// opened or does not contain a model of type `M`.
pub fn load_checkpoint<M: DeserializeOwned, P: AsRef<Path>>(path: P) -> MpcResult<ModelHandle<M>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| MpcException::ModelException {
        message: format!("could not open checkpoint {:?}: {}", path, e),
    })?;
    let model: M =
        bincode::deserialize_from(BufReader::new(file)).map_err(|e| MpcException::ModelException {
            message: format!("could not decode checkpoint {:?}: {}", path, e),
        })?;
    info!("loaded dynamics model from {:?}", path);
    Ok(ModelHandle {
        model: Arc::new(model),
        checkpoint: Some(path.to_path_buf()),
    })
}

/// Stores the parameters of a model.
pub fn save_checkpoint<M: Serialize, P: AsRef<Path>>(path: P, model: &M) -> MpcResult<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| MpcException::ModelException {
        message: format!("could not create checkpoint {:?}: {}", path, e),
    })?;
    bincode::serialize_into(BufWriter::new(file), model).map_err(|e| {
        MpcException::ModelException {
            message: format!("could not write checkpoint {:?}: {}", path, e),
        }
    })
}
