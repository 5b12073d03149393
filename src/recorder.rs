// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the writers of debug and episode recordings.
//!
//! Recordings are best-effort. Planning and execution continue if a file cannot be written.
use std::fs::{create_dir_all, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame};
use log::{info, warn};

use crate::exception::{create_rollout_exception, MpcException, MpcResult};
use crate::model::DynamicsModel;
use crate::rollout::{Simulator, SnapshotGuard};
use crate::state::{goal_index, GoalState, Image, Observation, State};
use crate::utils::ActionSequence;

/// Display time of a single frame.
pub const FRAME_DELAY_MS: u32 = 200;

fn persistence_error<E: std::fmt::Display>(path: &Path, error: E) -> MpcException {
    MpcException::PersistenceException {
        message: format!("could not write {:?}: {}", path, error),
    }
}

/// Writes the frames as an endlessly repeating GIF. Missing parent directories are created.
/// # Errors
/// * [`PersistenceException`](`crate::exception::MpcException::PersistenceException`) if the
/// file cannot be written.
pub fn save_gif<P: AsRef<Path>>(path: P, frames: &[Image]) -> MpcResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        create_dir_all(parent).map_err(|e| persistence_error(path, e))?;
    }
    let file = File::create(path).map_err(|e| persistence_error(path, e))?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| persistence_error(path, e))?;
    let frames = frames.iter().map(|image| {
        Frame::from_parts(
            DynamicImage::ImageRgb8(image.to_rgb_image()).into_rgba8(),
            0,
            0,
            Delay::from_numer_denom_ms(FRAME_DELAY_MS, 1),
        )
    });
    encoder
        .encode_frames(frames)
        .map_err(|e| persistence_error(path, e))
}

/// Like [`save_gif`] but only logs a warning on failure.
pub fn save_gif_or_warn<P: AsRef<Path>>(path: P, frames: &[Image]) {
    let path = path.as_ref();
    match save_gif(path, frames) {
        Ok(()) => info!("wrote {:?}", path),
        Err(e) => warn!("skipping recording: {}", e),
    }
}

/// Location of the debug recording of candidate `candidate` in planning step `step`.
pub fn debug_rollout_path(dir: &Path, episode: usize, candidate: usize, step: usize) -> PathBuf {
    dir.join(format!("ep_{}", episode))
        .join(format!("{}_step_{}.gif", candidate, step))
}

/// Side-by-side frames of a predicted trajectory and the goal it is scored against.
///
/// The first frame pairs the start image with the first goal frame, frame `t + 1` pairs the
/// prediction of step `t` with its clamped goal frame.
pub fn rollout_frames(
    start: &Image,
    trajectory: &[Observation],
    goal: &GoalState,
) -> MpcResult<Vec<Image>> {
    let mut frames = Vec::with_capacity(trajectory.len() + 1);
    frames.push(start.concat_horizontal(&goal.imgs()[goal_index(0, goal.len())])?);
    for (t, observation) in trajectory.iter().enumerate() {
        let goal_img = &goal.imgs()[goal_index(t, goal.len())];
        frames.push(observation.image.concat_horizontal(goal_img)?);
    }
    Ok(frames)
}

/// Writes one GIF per candidate showing its rollout next to the goal.
pub fn record_debug_rollouts(
    dir: &Path,
    episode: usize,
    step: usize,
    start: &Image,
    observations: &[Vec<Observation>],
    goal: &GoalState,
) {
    for (candidate, trajectory) in observations.iter().enumerate() {
        match rollout_frames(start, trajectory, goal) {
            Ok(frames) => {
                save_gif_or_warn(debug_rollout_path(dir, episode, candidate, step), &frames);
            }
            Err(e) => warn!("skipping debug rollout {}: {}", candidate, e),
        }
    }
}

/// Replays a demonstration action sequence in the simulator and in the dynamics model and
/// writes the model prediction next to the simulated frames.
///
/// The simulator is restored afterwards.
/// # Errors
/// * [`RolloutException`](`crate::exception::MpcException::RolloutException`) if the simulator
/// or the model fails.
/// * [`PersistenceException`](`crate::exception::MpcException::PersistenceException`) if the
/// GIF cannot be written.
pub fn compare_rollouts<S: Simulator, M: DynamicsModel + ?Sized, P: AsRef<Path>>(
    simulator: &mut S,
    model: &M,
    start: &State,
    actions: &ActionSequence,
    path: P,
) -> MpcResult<()> {
    let predicted = model
        .predict(start, std::slice::from_ref(actions))?
        .into_iter()
        .next()
        .ok_or_else(|| create_rollout_exception("model returned no trajectory"))?;
    if predicted.len() != actions.nrows() {
        return Err(create_rollout_exception(format!(
            "model predicted {} steps for {} actions",
            predicted.len(),
            actions.nrows()
        )));
    }
    let mut simulator = SnapshotGuard::new(simulator);
    simulator.load_state(start)?;
    let mut frames = Vec::with_capacity(actions.nrows());
    for (t, prediction) in predicted.iter().enumerate() {
        let action: Vec<f64> = actions.row(t).iter().copied().collect();
        let observed = simulator.step(&action)?;
        frames.push(prediction.image.concat_horizontal(&observed.image)?);
    }
    save_gif(path, &frames)
}
