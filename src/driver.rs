// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the closed-loop driver which plans with the CEM optimizer, executes the planned
//! pushes on the robot and replans from the observed state.
use std::path::PathBuf;

use log::{info, warn};
#[cfg(test)]
use mockall::automock;
use nalgebra::UnitQuaternion;

use crate::cem::{CemConfig, CemPolicy, Plan};
use crate::exception::{create_configuration_exception, MpcResult};
use crate::recorder::save_gif_or_warn;
use crate::robot::{ControlResult, RobotControl};
use crate::rollout::RolloutGenerator;
use crate::state::{GoalState, Image, Observation, State};
use crate::utils::{downward_orientation, push_pose, ActionSequence};

/// Source of camera observations.
#[cfg_attr(test, automock)]
pub trait Camera {
    /// Takes a picture of the scene.
    fn capture(&mut self) -> MpcResult<Observation>;

    /// Full simulator state if the camera looks into a simulation.
    fn simulator_state(&self) -> Option<Vec<f64>> {
        None
    }

    /// Distance of the pushed object to its position in `goal` \[m\], if the camera can
    /// measure it.
    fn object_distance(&self, _goal: &GoalState) -> Option<f64> {
        None
    }
}

/// Parameters of the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// height of the end effector while pushing \[m\]
    pub push_height: f64,
    /// end-effector orientation while pushing
    pub orientation: UnitQuaternion<f64>,
    /// number of planning steps per closed-loop episode
    pub max_episode_length: usize,
    /// optimize once and execute the whole plan
    pub open_loop: bool,
    /// directory for the episode recording. Nothing is recorded if `None`.
    pub log_dir: Option<PathBuf>,
    /// an episode succeeds if the object ends closer than this to its goal position \[m\]
    pub success_threshold: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            push_height: 0.12,
            orientation: downward_orientation(),
            max_episode_length: 10,
            open_loop: false,
            log_dir: None,
            success_threshold: 0.01,
        }
    }
}

/// Summary of an executed episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeLog {
    /// executed actions in order
    pub executed_actions: Vec<Vec<f64>>,
    /// number of planning calls
    pub planning_steps: usize,
    /// state after the last executed action
    pub final_state: State,
    /// final distance of the object to its goal position, if the camera can measure it
    pub object_distance: Option<f64>,
    /// whether the object ended within the success threshold. `None` without a distance.
    pub success: Option<bool>,
}

/// Visual model-predictive controller for planar pushing.
pub struct VisualMpc<R: RobotControl, C: Camera, G: RolloutGenerator> {
    robot: R,
    camera: C,
    generator: G,
    policy: CemPolicy,
    config: DriverConfig,
}

impl<R: RobotControl, C: Camera, G: RolloutGenerator> VisualMpc<R, C, G> {
    /// Creates a new driver.
    /// # Errors
    /// * [`ConfigurationException`](`crate::exception::MpcException::ConfigurationException`)
    /// if the optimizer configuration is invalid, the actions are not planar displacements or
    /// the episode length is zero.
    pub fn new(
        robot: R,
        camera: C,
        generator: G,
        cem_config: CemConfig,
        config: DriverConfig,
    ) -> MpcResult<Self> {
        if cem_config.action_dim != 2 {
            return Err(create_configuration_exception(format!(
                "pushing needs planar displacements but actions have {} dimensions",
                cem_config.action_dim
            )));
        }
        if config.max_episode_length == 0 {
            return Err(create_configuration_exception(
                "max_episode_length must be at least 1",
            ));
        }
        if !config.push_height.is_finite() {
            return Err(create_configuration_exception("push height must be finite"));
        }
        if !config.success_threshold.is_finite() || config.success_threshold < 0. {
            return Err(create_configuration_exception(
                "success threshold must be finite and non-negative",
            ));
        }
        let policy = CemPolicy::new(cem_config, &generator)?;
        Ok(VisualMpc {
            robot,
            camera,
            generator,
            policy,
            config,
        })
    }

    pub fn robot_mut(&mut self) -> &mut R {
        &mut self.robot
    }

    pub fn generator_mut(&mut self) -> &mut G {
        &mut self.generator
    }

    /// Sets a reference action sequence whose cost is reported with every plan.
    /// # Errors
    /// See [`CemPolicy::set_reference`].
    pub fn set_reference(&mut self, reference: Option<ActionSequence>) -> MpcResult<()> {
        self.policy.set_reference(reference)
    }

    /// Queries the robot and takes a picture.
    pub fn get_state(&mut self) -> MpcResult<State> {
        let result = self.robot.send_target(None)?;
        let observation = self.camera.capture()?;
        Ok(state_from(
            &result,
            observation,
            self.camera.simulator_state(),
        ))
    }

    /// Pushes by `action`: the end effector moves from its current planar position by
    /// `(action[0], action[1])` at the push height.
    /// # Errors
    /// Any error of the robot. Nothing is retried.
    pub fn execute_action(&mut self, action: &[f64]) -> MpcResult<ControlResult> {
        let current = self.robot.send_target(None)?;
        let target = push_pose(
            current.end_pose.translation.x + action[0],
            current.end_pose.translation.y + action[1],
            self.config.push_height,
            self.config.orientation,
        );
        info!("executing action [{:.4}, {:.4}]", action[0], action[1]);
        self.robot.send_target(Some(target))
    }

    /// Plans once from the current state.
    pub fn plan(
        &mut self,
        state: &State,
        goal: &GoalState,
        episode: usize,
        step: usize,
    ) -> MpcResult<Plan> {
        self.policy
            .get_action(&mut self.generator, state, goal, episode, step)
    }

    /// Runs one episode in closed or open loop, depending on the configuration.
    ///
    /// A failed robot command or planning call aborts the episode immediately. The last
    /// successful command stands.
    pub fn run_episode(&mut self, goal: &GoalState, episode: usize) -> MpcResult<EpisodeLog> {
        let steps = if self.config.open_loop {
            1
        } else {
            self.config.max_episode_length
        };
        let mut state = self.get_state()?;
        let goal_img = goal.final_img();
        let mut frames = vec![side_by_side(&state.image, goal_img)];
        let mut executed_actions = Vec::new();
        for step in 0..steps {
            let plan = self.plan(&state, goal, episode, step)?;
            for row in 0..plan.actions.nrows() {
                let action = plan.action(row);
                self.execute_action(&action)?;
                executed_actions.push(action);
                state = self.get_state()?;
                frames.push(side_by_side(&state.image, goal_img));
            }
        }
        if let Some(log_dir) = self.config.log_dir.as_ref() {
            let name = if self.config.open_loop {
                "open_loop.gif"
            } else {
                "closed_loop.gif"
            };
            let frames: Vec<Image> = frames.into_iter().flatten().collect();
            save_gif_or_warn(log_dir.join(name), &frames);
        }
        let object_distance = self.camera.object_distance(goal);
        let success = object_distance.map(|distance| distance < self.config.success_threshold);
        info!(
            "episode {} finished after {} actions",
            episode,
            executed_actions.len()
        );
        if let (Some(distance), Some(success)) = (object_distance, success) {
            info!("object distance to goal {:.4} m, success: {}", distance, success);
        }
        Ok(EpisodeLog {
            executed_actions,
            planning_steps: steps,
            final_state: state,
            object_distance,
            success,
        })
    }
}

fn state_from(
    result: &ControlResult,
    observation: Observation,
    sim_state: Option<Vec<f64>>,
) -> State {
    let translation = result.end_pose.translation.vector;
    State {
        image: observation.image,
        end_effector: vec![translation.x, translation.y, translation.z],
        joint_positions: result.joint_angles.iter().copied().collect(),
        mask: observation.mask,
        sim_state,
    }
}

fn side_by_side(image: &Image, goal: &Image) -> Option<Image> {
    match image.concat_horizontal(goal) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("cannot record frame: {}", e);
            None
        }
    }
}
