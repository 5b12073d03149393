// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the parallel collection of random pushing trajectories.
//!
//! Every worker thread owns its own [`PushEnv`] and writes its own file. Workers share nothing.
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::thread;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::exception::{create_configuration_exception, MpcException, MpcResult};
use crate::sim::{PushEnv, PushEnvConfig};
use crate::state::Observation;

/// One recorded episode: `actions.len() + 1` observations and simulator states.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub observations: Vec<Observation>,
    pub sim_states: Vec<Vec<f64>>,
    pub actions: Vec<Vec<f64>>,
}

/// Parameters of a collection run.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionConfig {
    pub workers: usize,
    pub episodes_per_worker: usize,
    pub episode_length: usize,
    /// standard deviation of the random actions \[m\]
    pub action_std: f64,
    /// worker `n` is seeded with `seed + n`
    pub seed: u64,
    pub output_dir: PathBuf,
    pub env: PushEnvConfig,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        CollectionConfig {
            workers: 4,
            episodes_per_worker: 10,
            episode_length: 15,
            action_std: 0.03,
            seed: 0,
            output_dir: PathBuf::from("push_data"),
            env: PushEnvConfig::default(),
        }
    }
}

fn persistence_exception<E: ToString>(path: &Path, error: E) -> MpcException {
    MpcException::PersistenceException {
        message: format!("{:?}: {}", path, error.to_string()),
    }
}

/// Location of the file written by worker `id`.
pub fn worker_file(output_dir: &Path, id: usize) -> PathBuf {
    output_dir.join(format!("worker_{}.bin", id))
}

/// Records random pushing episodes in a single environment.
pub fn record_episodes(
    env: &mut PushEnv,
    episodes: usize,
    episode_length: usize,
    action_std: f64,
    seed: u64,
) -> MpcResult<Vec<Trajectory>> {
    let distribution = Normal::new(0., action_std).map_err(create_configuration_exception)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut trajectories = Vec::with_capacity(episodes);
    for _ in 0..episodes {
        env.reset();
        let mut trajectory = Trajectory {
            observations: vec![env.render()],
            sim_states: vec![env.state().to_flat()],
            actions: Vec::with_capacity(episode_length),
        };
        for _ in 0..episode_length {
            let action = vec![distribution.sample(&mut rng), distribution.sample(&mut rng)];
            env.apply(&action)?;
            trajectory.observations.push(env.render());
            trajectory.sim_states.push(env.state().to_flat());
            trajectory.actions.push(action);
        }
        trajectories.push(trajectory);
    }
    Ok(trajectories)
}

/// Runs the configured number of workers in parallel.
/// # Return
/// The written files, ordered by worker.
/// # Errors
/// * [`ConfigurationException`](`crate::exception::MpcException::ConfigurationException`) if
/// no worker is configured, the environment configuration is invalid or the action standard
/// deviation is invalid.
/// * [`PersistenceException`](`crate::exception::MpcException::PersistenceException`) if a file
/// cannot be written or a worker panicked.
pub fn collect(config: &CollectionConfig) -> MpcResult<Vec<PathBuf>> {
    if config.workers == 0 {
        return Err(create_configuration_exception("at least one worker is required"));
    }
    config.env.validate()?;
    create_dir_all(&config.output_dir)
        .map_err(|e| persistence_exception(&config.output_dir, e))?;
    let handles: Vec<_> = (0..config.workers)
        .map(|id| {
            let config = config.clone();
            thread::spawn(move || -> MpcResult<PathBuf> {
                let seed = config.seed + id as u64;
                let mut env = PushEnv::new(config.env.clone(), seed)?;
                let trajectories = record_episodes(
                    &mut env,
                    config.episodes_per_worker,
                    config.episode_length,
                    config.action_std,
                    seed,
                )?;
                let path = worker_file(&config.output_dir, id);
                save_trajectories(&path, &trajectories)?;
                info!("worker {} wrote {} episodes to {:?}", id, trajectories.len(), path);
                Ok(path)
            })
        })
        .collect();
    handles
        .into_iter()
        .enumerate()
        .map(|(id, handle)| {
            handle.join().map_err(|_| MpcException::PersistenceException {
                message: format!("dataset worker {} panicked", id),
            })?
        })
        .collect()
}

pub fn save_trajectories(path: &Path, trajectories: &[Trajectory]) -> MpcResult<()> {
    let file = File::create(path).map_err(|e| persistence_exception(path, e))?;
    bincode::serialize_into(BufWriter::new(file), trajectories)
        .map_err(|e| persistence_exception(path, e))
}

pub fn load_trajectories<P: AsRef<Path>>(path: P) -> MpcResult<Vec<Trajectory>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| persistence_exception(path, e))?;
    bincode::deserialize_from(BufReader::new(file)).map_err(|e| persistence_exception(path, e))
}

#[cfg(test)]
mod tests {
    use crate::dataset::{collect, load_trajectories, record_episodes, worker_file, CollectionConfig};
    use crate::sim::{PushEnv, PushEnvConfig};

    fn small_env() -> PushEnvConfig {
        PushEnvConfig {
            width: 8,
            height: 8,
            ..PushEnvConfig::default()
        }
    }

    #[test]
    fn episodes_have_consistent_lengths() {
        let mut env = PushEnv::new(small_env(), 5).unwrap();
        let trajectories = record_episodes(&mut env, 3, 4, 0.02, 5).unwrap();
        assert_eq!(trajectories.len(), 3);
        for trajectory in trajectories.iter() {
            assert_eq!(trajectory.actions.len(), 4);
            assert_eq!(trajectory.observations.len(), 5);
            assert_eq!(trajectory.sim_states.len(), 5);
        }
        assert!(record_episodes(&mut env, 1, 1, -1., 0).is_err());
    }

    #[test]
    fn workers_write_distinct_files() {
        let output_dir =
            std::env::temp_dir().join(format!("visual_mpc_dataset_{}", std::process::id()));
        let config = CollectionConfig {
            workers: 3,
            episodes_per_worker: 2,
            episode_length: 3,
            output_dir: output_dir.clone(),
            env: small_env(),
            ..CollectionConfig::default()
        };
        let files = collect(&config).unwrap();
        assert_eq!(files.len(), 3);
        for (id, file) in files.iter().enumerate() {
            assert_eq!(*file, worker_file(&output_dir, id));
            assert_eq!(load_trajectories(file).unwrap().len(), 2);
        }
        let first = load_trajectories(&files[0]).unwrap();
        let second = load_trajectories(&files[1]).unwrap();
        assert_ne!(first, second);
        std::fs::remove_dir_all(&output_dir).unwrap();
    }

    #[test]
    fn zero_workers_are_rejected() {
        let config = CollectionConfig {
            workers: 0,
            ..CollectionConfig::default()
        };
        assert!(collect(&config).is_err());
    }

    #[test]
    fn invalid_environment_is_rejected_before_writing() {
        let output_dir =
            std::env::temp_dir().join(format!("visual_mpc_bad_env_{}", std::process::id()));
        let config = CollectionConfig {
            output_dir: output_dir.clone(),
            env: PushEnvConfig {
                pusher_radius: -0.01,
                ..small_env()
            },
            ..CollectionConfig::default()
        };
        assert!(collect(&config).is_err());
        assert!(!output_dir.exists());
    }
}
