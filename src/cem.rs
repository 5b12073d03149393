// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the Cross-Entropy-Method optimizer which searches for the action sequence whose
//! rollout matches the goal best.
//!
//! Every planning call runs the same cycle:
//! ```text
//! INIT -> SAMPLE -> EVALUATE -> SELECT -> REFIT -> (SAMPLE | DONE)
//! ```
//! The belief is a diagonal Gaussian with a mean and a standard deviation of shape `L x A`
//! which is reset at the start of every call.
use std::cmp::Ordering;
use std::path::PathBuf;

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use crate::exception::{create_configuration_exception, create_rollout_exception, MpcResult};
use crate::recorder::record_debug_rollouts;
use crate::rollout::{RolloutGenerator, Rollouts};
use crate::state::{GoalState, State};
use crate::utils::ActionSequence;

/// Parameters of the optimizer. They are fixed for the lifetime of a [`CemPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub struct CemConfig {
    /// planning horizon L
    pub horizon: usize,
    /// number of iterations I
    pub opt_iter: usize,
    /// candidates sampled per iteration J
    pub action_candidates: usize,
    /// elite candidates used for refitting K
    pub topk: usize,
    /// leading actions returned per call R
    pub replan_every: usize,
    /// dimension of a single action A
    pub action_dim: usize,
    /// initial standard deviation of every action entry
    pub init_std: f64,
    /// seed of the sampling RNG
    pub seed: u64,
    /// directory for debug rollout GIFs. Nothing is recorded if `None`.
    pub debug_dir: Option<PathBuf>,
}

impl Default for CemConfig {
    fn default() -> Self {
        CemConfig {
            horizon: 3,
            opt_iter: 10,
            action_candidates: 30,
            topk: 5,
            replan_every: 1,
            action_dim: 2,
            init_std: 1.,
            seed: 0,
            debug_dir: None,
        }
    }
}

impl CemConfig {
    /// Checks the configuration for consistency.
    /// # Errors
    /// * [`ConfigurationException`](`crate::exception::MpcException::ConfigurationException`)
    /// if any of the parameters is out of range.
    pub fn validate(&self) -> MpcResult<()> {
        if self.horizon == 0 {
            return Err(create_configuration_exception("horizon must be at least 1"));
        }
        if self.action_candidates == 0 {
            return Err(create_configuration_exception(
                "at least one action candidate is required",
            ));
        }
        if self.topk == 0 || self.topk > self.action_candidates {
            return Err(create_configuration_exception(format!(
                "topk must be between 1 and the number of candidates ({}), but is {}",
                self.action_candidates, self.topk
            )));
        }
        if self.replan_every == 0 || self.replan_every > self.horizon {
            return Err(create_configuration_exception(format!(
                "replan_every must be between 1 and the horizon ({}), but is {}",
                self.horizon, self.replan_every
            )));
        }
        if self.action_dim == 0 {
            return Err(create_configuration_exception(
                "action dimension must be at least 1",
            ));
        }
        if !self.init_std.is_finite() || self.init_std < 0. {
            return Err(create_configuration_exception(format!(
                "initial standard deviation must be finite and non-negative, but is {}",
                self.init_std
            )));
        }
        Ok(())
    }
}

/// Diagnostics of a single CEM iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationLog {
    /// per-step cost of every candidate (J x L)
    pub per_step_cost: DMatrix<f64>,
    /// mean cumulative cost of the elite candidates
    pub elite_mean_cost: f64,
    /// mean after refitting
    pub mean: DMatrix<f64>,
    /// standard deviation after refitting
    pub std: DMatrix<f64>,
}

/// Result of a planning call.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// the first R rows of the final mean (R x A)
    pub actions: ActionSequence,
    /// final mean (L x A)
    pub mean: DMatrix<f64>,
    /// final standard deviation (L x A)
    pub std: DMatrix<f64>,
    /// one entry per iteration
    pub iterations: Vec<IterationLog>,
    /// cumulative cost of the reference sequence if one is set
    pub reference_cost: Option<f64>,
}

impl Plan {
    /// Returns the action at row `index` as a vector.
    pub fn action(&self, index: usize) -> Vec<f64> {
        self.actions.row(index).iter().copied().collect()
    }
}

/// Cross-Entropy-Method planner with its own seeded random number generator.
pub struct CemPolicy {
    config: CemConfig,
    rng: StdRng,
    reference: Option<ActionSequence>,
}

impl CemPolicy {
    /// Creates a new optimizer for the given rollout generator.
    /// # Arguments
    /// * `config` - optimizer parameters.
    /// * `generator` - the generator the policy will be used with. Only its action dimension
    /// is checked here.
    /// # Errors
    /// * [`ConfigurationException`](`crate::exception::MpcException::ConfigurationException`)
    /// if the configuration is inconsistent or its action dimension does not match the one of
    /// the generator.
    pub fn new<G: RolloutGenerator + ?Sized>(config: CemConfig, generator: &G) -> MpcResult<Self> {
        config.validate()?;
        if generator.action_dim() != config.action_dim {
            return Err(create_configuration_exception(format!(
                "the optimizer is configured for {} dimensional actions but the environment uses {}",
                config.action_dim,
                generator.action_dim()
            )));
        }
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(CemPolicy {
            config,
            rng,
            reference: None,
        })
    }

    pub fn config(&self) -> &CemConfig {
        &self.config
    }

    /// Sets a reference action sequence, e.g. a demonstration, which is scored alongside every
    /// planning call. Its cost is reported in [`Plan::reference_cost`] and never influences
    /// the optimization.
    /// # Errors
    /// * [`ConfigurationException`](`crate::exception::MpcException::ConfigurationException`)
    /// if the reference is not of shape `horizon x action_dim`.
    pub fn set_reference(&mut self, reference: Option<ActionSequence>) -> MpcResult<()> {
        if let Some(reference) = reference.as_ref() {
            let expected = (self.config.horizon, self.config.action_dim);
            if reference.shape() != expected {
                return Err(create_configuration_exception(format!(
                    "the reference has shape {:?} but plans have shape {:?}",
                    reference.shape(),
                    expected
                )));
            }
        }
        self.reference = reference;
        Ok(())
    }

    /// Optimizes an action sequence starting from `start` towards `goal`.
    ///
    /// # Arguments
    /// * `generator` - produces the rollouts of the candidates.
    /// * `start` - current state.
    /// * `goal` - goal state or goal sequence.
    /// * `episode` - only used to name debug recordings.
    /// * `step` - only used to name debug recordings.
    /// # Return
    /// The plan whose `actions` are the first `replan_every` rows of the final mean.
    /// # Errors
    /// * [`RolloutException`](`crate::exception::MpcException::RolloutException`) if the
    /// generator fails or returns costs of the wrong shape.
    /// * [`AggregationException`](`crate::exception::MpcException::AggregationException`) if no
    /// candidate of an iteration has a finite cost.
    pub fn get_action<G: RolloutGenerator + ?Sized>(
        &mut self,
        generator: &mut G,
        start: &State,
        goal: &GoalState,
        episode: usize,
        step: usize,
    ) -> MpcResult<Plan> {
        let horizon = self.config.horizon;
        let action_dim = self.config.action_dim;
        let mut mean = DMatrix::zeros(horizon, action_dim);
        let mut std = DMatrix::from_element(horizon, action_dim, self.config.init_std);
        let mut iterations = Vec::with_capacity(self.config.opt_iter);

        for iteration in 0..self.config.opt_iter {
            let candidates = self.sample(&mean, &std);
            let record = self.config.debug_dir.is_some() && iteration + 1 == self.config.opt_iter;
            let rollouts = generator.generate(&candidates, start, goal, record)?;
            check_rollouts(&rollouts, candidates.len(), horizon)?;
            let elites = select_elites(&rollouts.cumulative_cost, self.config.topk);
            let elite_mean_cost = elites
                .iter()
                .map(|&n| rollouts.cumulative_cost[n])
                .sum::<f64>()
                / elites.len() as f64;
            debug!(
                "CEM iteration {}: best cost {:.4}, elite mean cost {:.4}",
                iteration, rollouts.cumulative_cost[elites[0]], elite_mean_cost
            );
            if let (Some(dir), Some(observations)) =
                (self.config.debug_dir.as_ref(), rollouts.observations.as_ref())
            {
                record_debug_rollouts(dir, episode, step, &start.image, observations, goal);
            }
            let (new_mean, new_std) = refit(&candidates, &elites);
            mean = new_mean;
            std = new_std;
            iterations.push(IterationLog {
                per_step_cost: rollouts.per_step_cost,
                elite_mean_cost,
                mean: mean.clone(),
                std: std.clone(),
            });
        }

        let reference_cost = match self.reference.as_ref() {
            Some(reference) => {
                let rollouts =
                    generator.generate(std::slice::from_ref(reference), start, goal, false)?;
                check_rollouts(&rollouts, 1, horizon)?;
                Some(rollouts.cumulative_cost[0])
            }
            None => None,
        };
        let actions = mean.rows(0, self.config.replan_every).into_owned();
        if let Some(last) = iterations.last() {
            info!(
                "planned {} actions after {} iterations, elite mean cost {:.4}",
                actions.nrows(),
                iterations.len(),
                last.elite_mean_cost
            );
        }
        if let Some(cost) = reference_cost {
            info!("reference cost {:.4}", cost);
        }
        Ok(Plan {
            actions,
            mean,
            std,
            iterations,
            reference_cost,
        })
    }

    /// Draws J candidates from N(mean, std).
    fn sample(&mut self, mean: &DMatrix<f64>, std: &DMatrix<f64>) -> Vec<ActionSequence> {
        let rng = &mut self.rng;
        (0..self.config.action_candidates)
            .map(|_| {
                mean.zip_map(std, |m, s| {
                    let z: f64 = StandardNormal.sample(&mut *rng);
                    m + s * z
                })
            })
            .collect()
    }
}

fn check_rollouts(rollouts: &Rollouts, candidates: usize, horizon: usize) -> MpcResult<()> {
    if rollouts.per_step_cost.shape() != (candidates, horizon) {
        return Err(create_rollout_exception(format!(
            "expected per-step costs of shape {:?} but got {:?}",
            (candidates, horizon),
            rollouts.per_step_cost.shape()
        )));
    }
    if rollouts.cumulative_cost.len() != candidates {
        return Err(create_rollout_exception(format!(
            "expected {} cumulative costs but got {}",
            candidates,
            rollouts.cumulative_cost.len()
        )));
    }
    Ok(())
}

/// Orders costs ascending with all non-finite costs after every finite one.
fn rank_cost(a: f64, b: f64) -> Ordering {
    match (a.is_finite(), b.is_finite()) {
        (true, true) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    }
}

/// Returns the indices of the `k` lowest costs, lowest first.
///
/// Ties keep ascending index order. NaN and infinite costs rank after every finite cost so an
/// invalid rollout never ranks as best.
pub fn select_elites(costs: &DVector<f64>, k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..costs.len()).collect();
    indices.sort_by(|&a, &b| rank_cost(costs[a], costs[b]));
    indices.truncate(k);
    indices
}

/// Computes the elementwise mean and population standard deviation of the elite candidates.
///
/// `elites` must not be empty.
pub fn refit(candidates: &[ActionSequence], elites: &[usize]) -> (DMatrix<f64>, DMatrix<f64>) {
    let (rows, cols) = candidates[elites[0]].shape();
    let count = elites.len() as f64;
    let mut mean = DMatrix::zeros(rows, cols);
    for &n in elites {
        mean += &candidates[n];
    }
    mean /= count;
    let mut variance = DMatrix::zeros(rows, cols);
    for &n in elites {
        let diff = &candidates[n] - &mean;
        variance += diff.component_mul(&diff);
    }
    variance /= count;
    (mean, variance.map(f64::sqrt))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use nalgebra::{DMatrix, DVector};

    use crate::cem::{refit, select_elites, CemConfig, CemPolicy};
    use crate::cost::{aggregate, CostFunction};
    use crate::exception::{MpcException, MpcResult};
    use crate::model::ModelHandle;
    use crate::recorder::debug_rollout_path;
    use crate::rollout::{ModelRollouts, RolloutGenerator, Rollouts};
    use crate::sim::{AnalyticPushModel, PushEnv, PushEnvConfig};
    use crate::state::{GoalState, Image, State};
    use crate::utils::ActionSequence;

    /// Scores every step by its squared distance to a target sequence.
    struct Quadratic {
        target: DMatrix<f64>,
        batch_sizes: Vec<usize>,
    }

    impl Quadratic {
        fn new(target: DMatrix<f64>) -> Self {
            Quadratic {
                target,
                batch_sizes: Vec::new(),
            }
        }
    }

    impl RolloutGenerator for Quadratic {
        fn action_dim(&self) -> usize {
            self.target.ncols()
        }

        fn generate(
            &mut self,
            action_sequences: &[ActionSequence],
            _start: &State,
            _goal: &GoalState,
            _record: bool,
        ) -> MpcResult<Rollouts> {
            self.batch_sizes.push(action_sequences.len());
            let horizon = self.target.nrows();
            let mut per_step_cost = DMatrix::zeros(action_sequences.len(), horizon);
            for (n, actions) in action_sequences.iter().enumerate() {
                assert_eq!(actions.shape(), self.target.shape());
                let diff = actions - &self.target;
                for t in 0..horizon {
                    per_step_cost[(n, t)] = diff.row(t).norm_squared();
                }
            }
            let cumulative_cost = aggregate(&per_step_cost)?;
            Ok(Rollouts {
                per_step_cost,
                cumulative_cost,
                observations: None,
            })
        }
    }

    /// Every rollout produces NaN.
    struct Diverging;

    impl RolloutGenerator for Diverging {
        fn action_dim(&self) -> usize {
            2
        }

        fn generate(
            &mut self,
            action_sequences: &[ActionSequence],
            _start: &State,
            _goal: &GoalState,
            _record: bool,
        ) -> MpcResult<Rollouts> {
            let per_step_cost = DMatrix::from_element(action_sequences.len(), 3, f64::NAN);
            let cumulative_cost = aggregate(&per_step_cost)?;
            Ok(Rollouts {
                per_step_cost,
                cumulative_cost,
                observations: None,
            })
        }
    }

    fn start() -> State {
        State {
            image: Image::new(1, 1, [0, 0, 0]),
            end_effector: vec![0.; 3],
            joint_positions: vec![0.; 7],
            mask: None,
            sim_state: None,
        }
    }

    fn goal() -> GoalState {
        GoalState::single(Image::new(1, 1, [0, 0, 0]), None).unwrap()
    }

    fn target() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 2, &[0.5, -0.3, 0.2, 0.1, -0.4, 0.6])
    }

    fn config(action_candidates: usize, topk: usize, opt_iter: usize) -> CemConfig {
        CemConfig {
            horizon: 3,
            opt_iter,
            action_candidates,
            topk,
            replan_every: 2,
            action_dim: 2,
            seed: 42,
            ..CemConfig::default()
        }
    }

    #[test]
    fn cem_converges_on_quadratic_cost() {
        let mut generator = Quadratic::new(target());
        let mut policy = CemPolicy::new(config(200, 20, 20), &generator).unwrap();
        let plan = policy
            .get_action(&mut generator, &start(), &goal(), 0, 0)
            .unwrap();
        assert!((&plan.mean - target()).norm() < 0.05);
        assert_eq!(plan.actions.shape(), (2, 2));
        assert_eq!(plan.actions, plan.mean.rows(0, 2).into_owned());
        assert_eq!(plan.iterations.len(), 20);
        assert!(generator.batch_sizes.iter().all(|&j| j == 200));
        let first = plan.iterations.first().unwrap().elite_mean_cost;
        let last = plan.iterations.last().unwrap().elite_mean_cost;
        assert!(last < first);
    }

    #[test]
    fn shapes_are_kept() {
        let mut generator = Quadratic::new(target());
        let mut policy = CemPolicy::new(config(7, 3, 2), &generator).unwrap();
        let candidates = policy.sample(&DMatrix::zeros(3, 2), &DMatrix::from_element(3, 2, 1.));
        assert_eq!(candidates.len(), 7);
        assert!(candidates.iter().all(|c| c.shape() == (3, 2)));
        let plan = policy
            .get_action(&mut generator, &start(), &goal(), 0, 0)
            .unwrap();
        for log in plan.iterations.iter() {
            assert_eq!(log.per_step_cost.shape(), (7, 3));
            assert_eq!(log.mean.shape(), (3, 2));
            assert_eq!(log.std.shape(), (3, 2));
            assert!(log.std.iter().all(|&s| s >= 0.));
        }
    }

    #[test]
    fn zero_iterations_return_zero_prefix() {
        for &(candidates, topk) in &[(1, 1), (30, 5), (100, 100)] {
            let mut generator = Quadratic::new(target());
            let mut policy = CemPolicy::new(config(candidates, topk, 0), &generator).unwrap();
            let plan = policy
                .get_action(&mut generator, &start(), &goal(), 0, 0)
                .unwrap();
            assert_eq!(plan.actions, DMatrix::zeros(2, 2));
            assert!(plan.iterations.is_empty());
            assert!(generator.batch_sizes.is_empty());
        }
    }

    #[test]
    fn same_seed_gives_same_iterations() {
        let run = |seed: u64| {
            let mut generator = Quadratic::new(target());
            let mut policy = CemPolicy::new(
                CemConfig {
                    seed,
                    ..config(50, 5, 5)
                },
                &generator,
            )
            .unwrap();
            policy
                .get_action(&mut generator, &start(), &goal(), 0, 0)
                .unwrap()
        };
        let a = run(7);
        let b = run(7);
        assert_eq!(a, b);
        for (x, y) in a.iterations.iter().zip(b.iterations.iter()) {
            assert_eq!(x.mean, y.mean);
            assert_eq!(x.std, y.std);
        }
        assert_ne!(a.mean, run(8).mean);
    }

    #[test]
    fn elites_are_lowest_costs_with_stable_ties() {
        let costs = DVector::from_vec(vec![3., 1., 2., 1., 0.5, 2.]);
        assert_eq!(select_elites(&costs, 3), vec![4, 1, 3]);
        assert_eq!(select_elites(&costs, 5), vec![4, 1, 3, 2, 5]);
        assert_eq!(select_elites(&costs, 6).len(), 6);
    }

    #[test]
    fn invalid_costs_never_rank_first() {
        let costs = DVector::from_vec(vec![f64::NAN, 5., f64::NEG_INFINITY, 4., f64::INFINITY]);
        assert_eq!(select_elites(&costs, 2), vec![3, 1]);
        assert_eq!(select_elites(&costs, 5), vec![3, 1, 0, 2, 4]);
    }

    #[test]
    fn refit_uses_population_std() {
        let candidates = vec![
            DMatrix::from_element(1, 2, 1.),
            DMatrix::from_element(1, 2, 3.),
            DMatrix::from_element(1, 2, 100.),
        ];
        let (mean, std) = refit(&candidates, &[0, 1]);
        assert_eq!(mean, DMatrix::from_element(1, 2, 2.));
        assert_eq!(std, DMatrix::from_element(1, 2, 1.));
    }

    #[test]
    fn all_nan_costs_abort_planning() {
        let mut generator = Diverging;
        let mut policy = CemPolicy::new(config(10, 2, 3), &generator).unwrap();
        match policy.get_action(&mut generator, &start(), &goal(), 0, 0) {
            Err(MpcException::AggregationException { .. }) => {}
            other => panic!("expected aggregation error, found {:?}", other),
        }
    }

    #[test]
    fn inconsistent_configurations_are_rejected() {
        let generator = Quadratic::new(target());
        let invalid = vec![
            CemConfig {
                topk: 31,
                ..CemConfig::default()
            },
            CemConfig {
                topk: 0,
                ..CemConfig::default()
            },
            CemConfig {
                replan_every: 4,
                ..CemConfig::default()
            },
            CemConfig {
                horizon: 0,
                ..CemConfig::default()
            },
            CemConfig {
                action_candidates: 0,
                topk: 0,
                ..CemConfig::default()
            },
            CemConfig {
                init_std: -1.,
                ..CemConfig::default()
            },
            CemConfig {
                init_std: f64::NAN,
                ..CemConfig::default()
            },
            CemConfig {
                action_dim: 3,
                ..CemConfig::default()
            },
        ];
        for config in invalid {
            match CemPolicy::new(config.clone(), &generator) {
                Err(MpcException::ConfigurationException { .. }) => {}
                Err(e) => panic!("unexpected error {} for {:?}", e, config),
                Ok(_) => panic!("{:?} was accepted", config),
            }
        }
        assert!(CemPolicy::new(CemConfig::default(), &generator).is_ok());
    }

    /// Returns one cost row less than requested.
    struct Truncated {
        drop_cumulative: bool,
    }

    impl RolloutGenerator for Truncated {
        fn action_dim(&self) -> usize {
            2
        }

        fn generate(
            &mut self,
            action_sequences: &[ActionSequence],
            _start: &State,
            _goal: &GoalState,
            _record: bool,
        ) -> MpcResult<Rollouts> {
            let rows = action_sequences.len();
            let per_step_cost = if self.drop_cumulative {
                DMatrix::from_element(rows, 3, 1.)
            } else {
                DMatrix::from_element(rows - 1, 3, 1.)
            };
            let cumulative_cost = DVector::from_element(rows - 1, 3.);
            Ok(Rollouts {
                per_step_cost,
                cumulative_cost,
                observations: None,
            })
        }
    }

    #[test]
    fn malformed_rollouts_are_rejected() {
        for &drop_cumulative in &[false, true] {
            let mut generator = Truncated { drop_cumulative };
            let mut policy = CemPolicy::new(config(10, 2, 1), &generator).unwrap();
            match policy.get_action(&mut generator, &start(), &goal(), 0, 0) {
                Err(MpcException::RolloutException { .. }) => {}
                other => panic!("expected rollout error, found {:?}", other),
            }
        }
    }

    #[test]
    fn reference_is_scored_without_steering_the_plan() {
        let mut generator = Quadratic::new(target());
        let mut policy = CemPolicy::new(config(50, 5, 3), &generator).unwrap();
        assert!(policy.set_reference(Some(DMatrix::zeros(2, 2))).is_err());
        policy.set_reference(Some(target())).unwrap();
        let with_reference = policy
            .get_action(&mut generator, &start(), &goal(), 0, 0)
            .unwrap();
        assert_eq!(with_reference.reference_cost, Some(0.));
        assert_eq!(generator.batch_sizes, vec![50, 50, 50, 1]);

        let mut generator = Quadratic::new(target());
        let mut policy = CemPolicy::new(config(50, 5, 3), &generator).unwrap();
        let without_reference = policy
            .get_action(&mut generator, &start(), &goal(), 0, 0)
            .unwrap();
        assert_eq!(without_reference.reference_cost, None);
        assert_eq!(without_reference.mean, with_reference.mean);
    }

    #[test]
    fn model_rollouts_are_recorded_per_candidate() {
        let dir = std::env::temp_dir().join(format!("visual_mpc_cem_debug_{}", std::process::id()));
        let env_config = PushEnvConfig {
            width: 8,
            height: 8,
            ..PushEnvConfig::default()
        };
        let mut env = PushEnv::new(env_config.clone(), 3).unwrap();
        env.reset();
        let start = env.observe();
        let goal = env.generate_goal(0.05).unwrap();
        let model = ModelHandle::new(AnalyticPushModel::new(env_config));
        let mut generator = ModelRollouts::new(model, CostFunction::Dense);
        let debug_config = CemConfig {
            init_std: 0.02,
            debug_dir: Some(dir.clone()),
            ..config(6, 2, 2)
        };
        let mut policy = CemPolicy::new(debug_config.clone(), &generator).unwrap();
        let plan = policy
            .get_action(&mut generator, &start, &goal, 0, 0)
            .unwrap();
        assert_eq!(plan.iterations.len(), 2);
        for candidate in 0..6 {
            assert!(debug_rollout_path(&dir, 0, candidate, 0).exists());
        }
        std::fs::remove_dir_all(&dir).unwrap();

        let unwritable = CemConfig {
            debug_dir: Some(PathBuf::from("/proc/visual_mpc_debug")),
            ..debug_config
        };
        let mut policy = CemPolicy::new(unwritable, &generator).unwrap();
        assert!(policy
            .get_action(&mut generator, &start, &goal, 0, 1)
            .is_ok());
    }
}
