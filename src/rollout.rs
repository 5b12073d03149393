// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the rollout generators which turn candidate action sequences into per-step costs,
//! either by stepping a simulator or by querying a dynamics model.
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use nalgebra::{DMatrix, DVector};

use crate::cost::{aggregate, CostFunction, PreparedGoal};
use crate::exception::{create_rollout_exception, MpcResult};
use crate::model::{DynamicsModel, ModelHandle};
use crate::state::{goal_index, GoalState, Observation, State};
use crate::utils::ActionSequence;

/// A simulator whose complete state can be saved and restored.
pub trait Simulator {
    /// Opaque value holding everything needed to restore the simulator.
    type Snapshot;
    fn snapshot(&self) -> Self::Snapshot;
    fn restore(&mut self, snapshot: &Self::Snapshot);
    /// Puts the simulator into the state the planning call starts from.
    fn load_state(&mut self, state: &State) -> MpcResult<()>;
    /// Applies one action and returns what the camera sees afterwards.
    fn step(&mut self, action: &[f64]) -> MpcResult<Observation>;
    fn action_dim(&self) -> usize;
}

/// Restores a snapshot of the simulator when it goes out of scope, including early returns
/// with `?` and panics.
pub struct SnapshotGuard<'a, S: Simulator> {
    simulator: &'a mut S,
    snapshot: S::Snapshot,
}

impl<'a, S: Simulator> SnapshotGuard<'a, S> {
    pub fn new(simulator: &'a mut S) -> Self {
        let snapshot = simulator.snapshot();
        SnapshotGuard {
            simulator,
            snapshot,
        }
    }
}

impl<'a, S: Simulator> Deref for SnapshotGuard<'a, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.simulator
    }
}

impl<'a, S: Simulator> DerefMut for SnapshotGuard<'a, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.simulator
    }
}

impl<'a, S: Simulator> Drop for SnapshotGuard<'a, S> {
    fn drop(&mut self) {
        self.simulator.restore(&self.snapshot);
    }
}

/// Result of evaluating a batch of J action sequences with horizon L.
#[derive(Debug, Clone)]
pub struct Rollouts {
    /// cost of every candidate at every step (J x L)
    pub per_step_cost: DMatrix<f64>,
    /// summed cost of every candidate (J)
    pub cumulative_cost: DVector<f64>,
    /// predicted observations (J x L). Only filled if requested.
    pub observations: Option<Vec<Vec<Observation>>>,
}

/// Evaluates batches of candidate action sequences.
pub trait RolloutGenerator {
    /// Dimension of a single action.
    fn action_dim(&self) -> usize;

    /// Rolls out every action sequence from `start` and scores it against `goal`.
    ///
    /// # Arguments
    /// * `action_sequences` - J candidates, each L x A.
    /// * `start` - state the rollouts start from.
    /// * `goal` - goal sequence. The goal index clamps to its last frame.
    /// * `record` - whether the predicted observations should be returned.
    /// # Errors
    /// * [`RolloutException`](`crate::exception::MpcException::RolloutException`) if any
    /// candidate fails. There is no partial result.
    /// * [`AggregationException`](`crate::exception::MpcException::AggregationException`) if no
    /// candidate has a finite cost.
    fn generate(
        &mut self,
        action_sequences: &[ActionSequence],
        start: &State,
        goal: &GoalState,
        record: bool,
    ) -> MpcResult<Rollouts>;
}

/// Preprocesses every goal frame for the cost function.
pub fn prepare_goals(cost: &CostFunction, goal: &GoalState) -> MpcResult<Vec<PreparedGoal>> {
    if goal.is_empty() {
        return Err(create_rollout_exception("the goal has no frames"));
    }
    goal.imgs()
        .iter()
        .zip(goal.masks().iter())
        .map(|(img, mask)| cost.prepare_goal(img, mask.as_ref()))
        .collect()
}

/// Scores a single trajectory step by step.
fn score_trajectory(
    cost: &CostFunction,
    trajectory: &[Observation],
    goals: &[PreparedGoal],
    horizon: usize,
) -> MpcResult<Vec<f64>> {
    trajectory
        .iter()
        .enumerate()
        .map(|(t, observation)| {
            let goal = &goals[goal_index(t, goals.len())];
            cost.cost(observation, goal, t, horizon)
        })
        .collect()
}

fn check_candidates(action_sequences: &[ActionSequence], action_dim: usize) -> MpcResult<usize> {
    let horizon = match action_sequences.first() {
        Some(first) => first.nrows(),
        None => return Err(create_rollout_exception("no action sequences to roll out")),
    };
    for (n, actions) in action_sequences.iter().enumerate() {
        if actions.nrows() != horizon || actions.ncols() != action_dim {
            return Err(create_rollout_exception(format!(
                "candidate {} has shape {}x{} but {}x{} was expected",
                n,
                actions.nrows(),
                actions.ncols(),
                horizon,
                action_dim
            )));
        }
    }
    Ok(horizon)
}

fn collect_rollouts(
    per_step_cost: DMatrix<f64>,
    observations: Option<Vec<Vec<Observation>>>,
) -> MpcResult<Rollouts> {
    let cumulative_cost = aggregate(&per_step_cost)?;
    Ok(Rollouts {
        per_step_cost,
        cumulative_cost,
        observations,
    })
}

/// Generates rollouts by stepping a simulator.
///
/// The simulator can be shared with other users, e.g. the simulated robot the driver commands.
/// Its state is restored after every batch.
pub struct GroundTruthRollouts<S: Simulator> {
    simulator: Rc<RefCell<S>>,
    cost: CostFunction,
}

impl<S: Simulator> GroundTruthRollouts<S> {
    pub fn new(simulator: Rc<RefCell<S>>, cost: CostFunction) -> Self {
        GroundTruthRollouts { simulator, cost }
    }
    pub fn cost_function(&self) -> &CostFunction {
        &self.cost
    }
}

impl<S: Simulator> RolloutGenerator for GroundTruthRollouts<S> {
    fn action_dim(&self) -> usize {
        self.simulator.borrow().action_dim()
    }

    fn generate(
        &mut self,
        action_sequences: &[ActionSequence],
        start: &State,
        goal: &GoalState,
        record: bool,
    ) -> MpcResult<Rollouts> {
        let action_dim = self.action_dim();
        let horizon = check_candidates(action_sequences, action_dim)?;
        let goals = prepare_goals(&self.cost, goal)?;
        let mut per_step_cost = DMatrix::zeros(action_sequences.len(), horizon);
        let mut observations = Vec::new();

        let mut simulator = self.simulator.borrow_mut();
        let mut simulator = SnapshotGuard::new(&mut *simulator);
        for (n, actions) in action_sequences.iter().enumerate() {
            simulator.load_state(start)?;
            let mut trajectory = Vec::with_capacity(horizon);
            for t in 0..horizon {
                let action: Vec<f64> = actions.row(t).iter().copied().collect();
                trajectory.push(simulator.step(&action)?);
            }
            let costs = score_trajectory(&self.cost, &trajectory, &goals, horizon)?;
            for (t, c) in costs.into_iter().enumerate() {
                per_step_cost[(n, t)] = c;
            }
            if record {
                observations.push(trajectory);
            }
        }
        drop(simulator);
        collect_rollouts(per_step_cost, if record { Some(observations) } else { None })
    }
}

/// Generates rollouts with a dynamics model in one batched prediction.
pub struct ModelRollouts<M: DynamicsModel> {
    model: ModelHandle<M>,
    cost: CostFunction,
}

impl<M: DynamicsModel> ModelRollouts<M> {
    pub fn new(model: ModelHandle<M>, cost: CostFunction) -> Self {
        ModelRollouts { model, cost }
    }
    pub fn cost_function(&self) -> &CostFunction {
        &self.cost
    }
}

impl<M: DynamicsModel> RolloutGenerator for ModelRollouts<M> {
    fn action_dim(&self) -> usize {
        self.model.action_dim()
    }

    fn generate(
        &mut self,
        action_sequences: &[ActionSequence],
        start: &State,
        goal: &GoalState,
        record: bool,
    ) -> MpcResult<Rollouts> {
        let horizon = check_candidates(action_sequences, self.model.action_dim())?;
        let goals = prepare_goals(&self.cost, goal)?;
        let predictions = self.model.predict(start, action_sequences)?;
        if predictions.len() != action_sequences.len() {
            return Err(create_rollout_exception(format!(
                "model returned {} trajectories for {} candidates",
                predictions.len(),
                action_sequences.len()
            )));
        }
        let mut per_step_cost = DMatrix::zeros(action_sequences.len(), horizon);
        for (n, trajectory) in predictions.iter().enumerate() {
            if trajectory.len() != horizon {
                return Err(create_rollout_exception(format!(
                    "model predicted {} steps for candidate {} but the horizon is {}",
                    trajectory.len(),
                    n,
                    horizon
                )));
            }
            let costs = score_trajectory(&self.cost, trajectory, &goals, horizon)?;
            for (t, c) in costs.into_iter().enumerate() {
                per_step_cost[(n, t)] = c;
            }
        }
        collect_rollouts(per_step_cost, if record { Some(predictions) } else { None })
    }
}
