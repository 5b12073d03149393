// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains a planar pushing simulation: a round pusher held by the robot and a round block
//! on a table seen by a top-down camera.
//!
//! The simulation serves as ground-truth dynamics for planning, as simulated robot and camera
//! for the driver and as the basis of the checkpointable [`AnalyticPushModel`].
use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::{Isometry3, Vector2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::driver::Camera;
use crate::exception::{create_configuration_exception, create_rollout_exception, MpcResult};
use crate::model::DynamicsModel;
use crate::robot::{ControlResult, RobotControl};
use crate::rollout::Simulator;
use crate::state::{GoalState, Image, Mask, Observation, State};
use crate::utils::{downward_orientation, push_pose, ActionSequence, Vector7};

const TABLE_COLOR: [u8; 3] = [200, 200, 200];
const BLOCK_COLOR: [u8; 3] = [200, 30, 30];
const PUSHER_COLOR: [u8; 3] = [40, 40, 40];
/// joint configuration reported by the simulated robot
pub const RESET_JOINT_ANGLES: [f64; 7] = [0., -0.4, 0., -2.2, 0., 1.8, 0.8];

/// Geometry and rendering parameters of a [`PushEnv`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PushEnvConfig {
    /// image width in pixel
    pub width: usize,
    /// image height in pixel
    pub height: usize,
    /// center of the workspace in the robot base frame \[m\]
    pub center: [f64; 2],
    /// half of the side length of the square workspace \[m\]
    pub half_extent: f64,
    /// \[m\]
    pub pusher_radius: f64,
    /// \[m\]
    pub block_radius: f64,
    /// maximal displacement of the pusher per action \[m\]
    pub max_step: f64,
    /// number of contact resolution steps per action
    pub substeps: usize,
    /// height of the end effector while pushing \[m\]
    pub push_height: f64,
    /// pusher position after a robot reset
    pub home: [f64; 2],
}

impl Default for PushEnvConfig {
    fn default() -> Self {
        PushEnvConfig {
            width: 48,
            height: 48,
            center: [0.5, 0.],
            half_extent: 0.2,
            pusher_radius: 0.015,
            block_radius: 0.035,
            max_step: 0.05,
            substeps: 10,
            push_height: 0.12,
            home: [0.5, -0.15],
        }
    }
}

impl PushEnvConfig {
    /// Checks that the geometry can be rendered and that [`PushEnv::reset`] always finds
    /// non-overlapping positions.
    /// # Errors
    /// * [`ConfigurationException`](`crate::exception::MpcException::ConfigurationException`)
    /// if any of the parameters is out of range.
    pub fn validate(&self) -> MpcResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(create_configuration_exception(format!(
                "images must not be empty, but are {}x{}",
                self.width, self.height
            )));
        }
        let lengths = [
            self.half_extent,
            self.pusher_radius,
            self.block_radius,
            self.max_step,
        ];
        if !lengths.iter().all(|x| x.is_finite() && *x > 0.) {
            return Err(create_configuration_exception(
                "workspace extent, radii and step length must be finite and positive",
            ));
        }
        let points = [self.center, self.home];
        if !points.iter().flatten().all(|x| x.is_finite()) || !self.push_height.is_finite() {
            return Err(create_configuration_exception(
                "workspace center, home position and push height must be finite",
            ));
        }
        if self.substeps == 0 {
            return Err(create_configuration_exception("substeps must be at least 1"));
        }
        let min_distance = reset_distance(self);
        if self.half_extent - self.block_radius <= 0.
            || self.half_extent - self.pusher_radius <= min_distance
        {
            return Err(create_configuration_exception(format!(
                "a workspace with half extent {} is too small for a pusher of radius {} and a block of radius {}",
                self.half_extent, self.pusher_radius, self.block_radius
            )));
        }
        Ok(())
    }
}

/// Minimal distance between pusher and block after a reset.
fn reset_distance(config: &PushEnvConfig) -> f64 {
    2. * (config.pusher_radius + config.block_radius)
}

/// Complete dynamic state of a [`PushEnv`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PushEnvState {
    pub pusher: Vector2<f64>,
    pub block: Vector2<f64>,
}

impl PushEnvState {
    /// `[pusher_x, pusher_y, block_x, block_y]`
    pub fn to_flat(&self) -> Vec<f64> {
        vec![self.pusher.x, self.pusher.y, self.block.x, self.block.y]
    }

    pub fn from_flat(flat: &[f64]) -> MpcResult<PushEnvState> {
        match flat {
            [px, py, bx, by] => Ok(PushEnvState {
                pusher: Vector2::new(*px, *py),
                block: Vector2::new(*bx, *by),
            }),
            _ => Err(create_rollout_exception(format!(
                "a push state has 4 entries but {} were given",
                flat.len()
            ))),
        }
    }
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole > 1e-12 {
        part / whole
    } else {
        1.
    }
}

/// Planar pushing simulation.
#[derive(Debug, Clone)]
pub struct PushEnv {
    config: PushEnvConfig,
    state: PushEnvState,
    rng: StdRng,
}

impl PushEnv {
    /// Creates an environment with the pusher at its home position and the block in the
    /// center of the workspace.
    /// # Errors
    /// * [`ConfigurationException`](`crate::exception::MpcException::ConfigurationException`)
    /// if the configuration does not pass [`PushEnvConfig::validate`].
    pub fn new(config: PushEnvConfig, seed: u64) -> MpcResult<PushEnv> {
        config.validate()?;
        let state = PushEnvState {
            pusher: Vector2::from(config.home),
            block: Vector2::from(config.center),
        };
        Ok(PushEnv {
            config,
            state,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn config(&self) -> &PushEnvConfig {
        &self.config
    }

    pub fn state(&self) -> PushEnvState {
        self.state
    }

    /// Sets the state. The block is moved out of the pusher if they overlap.
    pub fn set_state(&mut self, state: PushEnvState) {
        self.state = state;
        self.resolve_contact();
    }

    /// Places pusher and block at random, non-overlapping positions.
    pub fn reset(&mut self) {
        let margin = self.config.block_radius;
        let min_distance = reset_distance(&self.config);
        let block = self.random_position(margin);
        let mut pusher = self.random_position(self.config.pusher_radius);
        while (pusher - block).norm() < min_distance {
            pusher = self.random_position(self.config.pusher_radius);
        }
        self.state = PushEnvState { pusher, block };
    }

    fn random_position(&mut self, margin: f64) -> Vector2<f64> {
        let half = self.config.half_extent - margin;
        Vector2::new(
            self.config.center[0] + self.rng.gen_range(-half..half),
            self.config.center[1] + self.rng.gen_range(-half..half),
        )
    }

    /// Moves the pusher by the planar displacement `action`, clamped to the maximal step length
    /// and to the workspace. The block is pushed along on contact.
    pub fn apply(&mut self, action: &[f64]) -> MpcResult<()> {
        if action.len() != 2 {
            return Err(create_rollout_exception(format!(
                "push actions are planar but {} entries were given",
                action.len()
            )));
        }
        let mut displacement = Vector2::new(action[0], action[1]);
        if !displacement.iter().all(|x| x.is_finite()) {
            return Err(create_rollout_exception("push action is not finite"));
        }
        let length = displacement.norm();
        if length > self.config.max_step {
            displacement *= self.config.max_step / length;
        }
        let substeps = self.config.substeps.max(1);
        let increment = displacement / substeps as f64;
        for _ in 0..substeps {
            let pusher = self.state.pusher + increment;
            self.state.pusher = self.clamp_to_workspace(pusher, self.config.pusher_radius);
            self.resolve_contact();
        }
        Ok(())
    }

    /// Moves the pusher to `target` like a sequence of actions would.
    pub fn move_pusher_to(&mut self, target: Vector2<f64>) -> MpcResult<()> {
        let mut remaining = target - self.state.pusher;
        while remaining.norm() > 1e-9 {
            let before = self.state.pusher;
            self.apply(&[remaining.x, remaining.y])?;
            if (self.state.pusher - before).norm() < 1e-12 {
                break;
            }
            remaining = target - self.state.pusher;
        }
        Ok(())
    }

    fn resolve_contact(&mut self) {
        let contact = self.config.pusher_radius + self.config.block_radius;
        let offset = self.state.block - self.state.pusher;
        let distance = offset.norm();
        if distance >= contact {
            return;
        }
        let normal = if distance > 1e-12 {
            offset / distance
        } else {
            Vector2::new(1., 0.)
        };
        let block = self.state.pusher + normal * contact;
        self.state.block = self.clamp_to_workspace(block, self.config.block_radius);
    }

    fn clamp_to_workspace(&self, position: Vector2<f64>, margin: f64) -> Vector2<f64> {
        let half = self.config.half_extent - margin;
        Vector2::new(
            position.x.max(self.config.center[0] - half).min(self.config.center[0] + half),
            position.y.max(self.config.center[1] - half).min(self.config.center[1] + half),
        )
    }

    /// Position of the pixel center `(x, y)` on the table.
    fn pixel_position(&self, x: usize, y: usize) -> Vector2<f64> {
        let size = 2. * self.config.half_extent;
        Vector2::new(
            self.config.center[0] - self.config.half_extent
                + (x as f64 + 0.5) / self.config.width as f64 * size,
            self.config.center[1] - self.config.half_extent
                + (y as f64 + 0.5) / self.config.height as f64 * size,
        )
    }

    /// The empty table.
    pub fn background(&self) -> Image {
        Image::new(self.config.width, self.config.height, TABLE_COLOR)
    }

    /// Renders the scene from above. The mask marks the pusher pixels.
    pub fn render(&self) -> Observation {
        let mut image = self.background();
        let mut mask = Mask::empty(self.config.width, self.config.height);
        for y in 0..self.config.height {
            for x in 0..self.config.width {
                let p = self.pixel_position(x, y);
                if (p - self.state.pusher).norm() <= self.config.pusher_radius {
                    image.set_pixel(x, y, PUSHER_COLOR);
                    mask.set(x, y, true);
                } else if (p - self.state.block).norm() <= self.config.block_radius {
                    image.set_pixel(x, y, BLOCK_COLOR);
                }
            }
        }
        Observation {
            image,
            mask: Some(mask),
        }
    }

    /// Creates a goal by pushing the block `push_dist` meters into a random direction.
    ///
    /// The goal shows the pusher behind the block, as left after the push, and carries the
    /// simulator state it was rendered from. The state of the environment is not changed.
    /// # Errors
    /// * [`ConfigurationException`](`crate::exception::MpcException::ConfigurationException`)
    /// if `push_dist` is not finite.
    pub fn generate_goal(&mut self, push_dist: f64) -> MpcResult<GoalState> {
        if !push_dist.is_finite() {
            return Err(create_configuration_exception(format!(
                "push distance must be finite, but is {}",
                push_dist
            )));
        }
        let angle = self.rng.gen_range(0.0..std::f64::consts::TAU);
        let direction = Vector2::new(angle.cos(), angle.sin());
        let before = self.state;
        let block = self.clamp_to_workspace(
            self.state.block + direction * push_dist,
            self.config.block_radius,
        );
        let contact = self.config.pusher_radius + self.config.block_radius;
        self.state = PushEnvState {
            pusher: self.clamp_to_workspace(block - direction * contact, self.config.pusher_radius),
            block,
        };
        let observation = self.render();
        let goal_state = self.state.to_flat();
        self.state = before;
        Ok(GoalState::single(observation.image, observation.mask)?.with_sim_state(goal_state))
    }

    /// Distance between the block and its position in `goal` \[m\]. `None` if the goal was not
    /// rendered from a simulator state.
    pub fn object_distance(&self, goal: &GoalState) -> Option<f64> {
        let target = PushEnvState::from_flat(goal.sim_state()?).ok()?;
        Some((self.state.block - target.block).norm())
    }

    /// A straight demonstration towards `goal`: the pusher first moves behind the block, then
    /// pushes it in a straight line. The displacement is spread evenly over `horizon` actions.
    /// `None` if the goal carries no simulator state.
    pub fn reference_actions(&self, goal: &GoalState, horizon: usize) -> Option<ActionSequence> {
        if horizon == 0 {
            return None;
        }
        let target = PushEnvState::from_flat(goal.sim_state()?).ok()?;
        let push = target.block - self.state.block;
        if push.norm() <= 1e-12 {
            return Some(ActionSequence::zeros(horizon, 2));
        }
        let direction = push / push.norm();
        let contact = self.config.pusher_radius + self.config.block_radius;
        let behind = self.state.block - direction * contact;
        let waypoints = [self.state.pusher, behind, target.pusher];
        let approach = (behind - self.state.pusher).norm();
        let total = approach + (target.pusher - behind).norm();
        let mut actions = ActionSequence::zeros(horizon, 2);
        let mut previous = self.state.pusher;
        for t in 0..horizon {
            let travelled = total * (t + 1) as f64 / horizon as f64;
            let position = if travelled <= approach {
                waypoints[0] + (waypoints[1] - waypoints[0]) * ratio(travelled, approach)
            } else {
                waypoints[1]
                    + (waypoints[2] - waypoints[1]) * ratio(travelled - approach, total - approach)
            };
            let displacement = position - previous;
            actions[(t, 0)] = displacement.x;
            actions[(t, 1)] = displacement.y;
            previous = position;
        }
        Some(actions)
    }

    /// Full state as seen by a camera.
    pub fn observe(&self) -> State {
        let observation = self.render();
        State {
            image: observation.image,
            end_effector: vec![self.state.pusher.x, self.state.pusher.y, self.config.push_height],
            joint_positions: RESET_JOINT_ANGLES.to_vec(),
            mask: observation.mask,
            sim_state: Some(self.state.to_flat()),
        }
    }
}

impl Simulator for PushEnv {
    type Snapshot = PushEnvState;

    fn snapshot(&self) -> PushEnvState {
        self.state
    }

    fn restore(&mut self, snapshot: &PushEnvState) {
        self.state = *snapshot;
    }

    fn load_state(&mut self, state: &State) -> MpcResult<()> {
        let flat = state
            .sim_state
            .as_ref()
            .ok_or_else(|| create_rollout_exception("start state carries no simulator state"))?;
        self.state = PushEnvState::from_flat(flat)?;
        Ok(())
    }

    fn step(&mut self, action: &[f64]) -> MpcResult<Observation> {
        self.apply(action)?;
        Ok(self.render())
    }

    fn action_dim(&self) -> usize {
        2
    }
}

/// The robot of a shared [`PushEnv`]. Targets are approached in steps of at most the maximal
/// step length.
pub struct SimulatedRobot {
    env: Rc<RefCell<PushEnv>>,
}

impl SimulatedRobot {
    pub fn new(env: Rc<RefCell<PushEnv>>) -> Self {
        SimulatedRobot { env }
    }

    fn current(&self) -> ControlResult {
        let env = self.env.borrow();
        let pusher = env.state().pusher;
        ControlResult {
            end_pose: push_pose(
                pusher.x,
                pusher.y,
                env.config().push_height,
                downward_orientation(),
            ),
            joint_angles: Vector7::from_column_slice(&RESET_JOINT_ANGLES),
        }
    }
}

impl RobotControl for SimulatedRobot {
    fn send_target(&mut self, target: Option<Isometry3<f64>>) -> MpcResult<ControlResult> {
        if let Some(target) = target {
            let goal = Vector2::new(target.translation.x, target.translation.y);
            self.env.borrow_mut().move_pusher_to(goal)?;
        }
        Ok(self.current())
    }

    fn reset(&mut self) -> MpcResult<ControlResult> {
        {
            let mut env = self.env.borrow_mut();
            let home = Vector2::from(env.config().home);
            let block = env.state().block;
            env.set_state(PushEnvState {
                pusher: home,
                block,
            });
        }
        Ok(self.current())
    }
}

/// Top-down camera of a shared [`PushEnv`].
pub struct SimulatedCamera {
    env: Rc<RefCell<PushEnv>>,
}

impl SimulatedCamera {
    pub fn new(env: Rc<RefCell<PushEnv>>) -> Self {
        SimulatedCamera { env }
    }
}

impl Camera for SimulatedCamera {
    fn capture(&mut self) -> MpcResult<Observation> {
        Ok(self.env.borrow().render())
    }

    fn simulator_state(&self) -> Option<Vec<f64>> {
        Some(self.env.borrow().state().to_flat())
    }

    fn object_distance(&self, goal: &GoalState) -> Option<f64> {
        self.env.borrow().object_distance(goal)
    }
}

/// Dynamics model which predicts pushes with its own copy of the push simulation.
///
/// Its parameters are stored in checkpoints with [`save_checkpoint`](`crate::model::save_checkpoint`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalyticPushModel {
    pub config: PushEnvConfig,
}

impl AnalyticPushModel {
    pub fn new(config: PushEnvConfig) -> Self {
        AnalyticPushModel { config }
    }
}

impl DynamicsModel for AnalyticPushModel {
    fn predict(
        &self,
        start: &State,
        action_sequences: &[ActionSequence],
    ) -> MpcResult<Vec<Vec<Observation>>> {
        let mut env = PushEnv::new(self.config.clone(), 0)?;
        env.load_state(start)?;
        let initial = env.state();
        action_sequences
            .iter()
            .map(|actions| {
                env.restore(&initial);
                (0..actions.nrows())
                    .map(|t| {
                        let action: Vec<f64> = actions.row(t).iter().copied().collect();
                        env.step(&action)
                    })
                    .collect::<MpcResult<Vec<Observation>>>()
            })
            .collect()
    }

    fn action_dim(&self) -> usize {
        2
    }
}
