// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! # visual-mpc-rs
//! visual-mpc-rs is a library for visual model-predictive control of a robot arm which pushes
//! objects until the camera image matches a goal image.
//!
//! **ALWAYS HAVE THE USER STOP BUTTON AT
//! HAND WHILE CONTROLLING THE ROBOT!**
//!
//! ## Design
//! A Cross-Entropy-Method optimizer samples candidate action sequences, rolls them out with a
//! simulator or a dynamics model, scores the predicted images against the goal and refits its
//! sampling distribution to the best candidates. The driver executes the first actions of the
//! result on the robot and replans.
//!
//! The library is divided into these modules:
//! * [cem](`crate::cem`) - the optimizer.
//! * [rollout](`crate::rollout`) - rollout generation with a simulator or a dynamics model.
//! * [cost](`crate::cost`) - goal-matching costs and their aggregation.
//! * [driver](`crate::driver`) - the closed-loop controller.
//! * [robot](`crate::robot`) - the client of the robot-control endpoint.
//! * [model](`crate::model`) - the dynamics-model interface and checkpoints.
//! * [sim](`crate::sim`) - a planar pushing simulation.
//! * [dataset](`crate::dataset`) - parallel collection of pushing data.
//!
//! # Example:
//!```no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use visual_mpc::{
//!     CemConfig, CostFunction, DriverConfig, GroundTruthRollouts, MpcResult, PushEnv,
//!     PushEnvConfig, SimulatedCamera, SimulatedRobot, VisualMpc,
//! };
//! fn main() -> MpcResult<()> {
//!     let env = Rc::new(RefCell::new(PushEnv::new(PushEnvConfig::default(), 0)?));
//!     env.borrow_mut().reset();
//!     let goal = env.borrow_mut().generate_goal(0.1)?;
//!     let generator = GroundTruthRollouts::new(env.clone(), CostFunction::Dense);
//!     let mut mpc = VisualMpc::new(
//!         SimulatedRobot::new(env.clone()),
//!         SimulatedCamera::new(env.clone()),
//!         generator,
//!         CemConfig::default(),
//!         DriverConfig::default(),
//!     )?;
//!     let log = mpc.run_episode(&goal, 0)?;
//!     println!("executed {} pushes", log.executed_actions.len());
//!     Ok(())
//! }
//! ```
//!
//! All fallible functions return a [`MpcResult`] whose error type
//! [`MpcException`](`crate::exception::MpcException`) tells which part failed: configuration,
//! network, robot command, rollout, cost aggregation, model checkpoint or persistence.
pub mod cem;
pub mod cost;
pub mod dataset;
pub mod driver;
pub mod exception;
pub mod model;
mod network;
pub mod recorder;
pub mod robot;
pub mod rollout;
pub mod sim;
pub mod state;
pub mod utils;

pub use cem::{CemConfig, CemPolicy, Plan};
pub use cost::CostFunction;
pub use driver::{Camera, DriverConfig, EpisodeLog, VisualMpc};
pub use exception::{MpcException, MpcResult};
pub use model::{load_checkpoint, save_checkpoint, DynamicsModel, ModelHandle};
pub use robot::{ControlClient, ControlResult, RobotControl};
pub use rollout::{GroundTruthRollouts, ModelRollouts, RolloutGenerator, Rollouts, Simulator};
pub use sim::{AnalyticPushModel, PushEnv, PushEnvConfig, SimulatedCamera, SimulatedRobot};
pub use state::{GoalState, Image, Mask, Observation, StartGoal, State};
pub use utils::*;
