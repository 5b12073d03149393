// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, ValueEnum};
use log::{info, warn};
use nalgebra::DMatrix;

use visual_mpc::recorder::compare_rollouts;
use visual_mpc::{
    load_checkpoint, AnalyticPushModel, CemConfig, CostFunction, DriverConfig, GoalState,
    GroundTruthRollouts, ModelHandle, ModelRollouts, MpcResult, PushEnv, PushEnvConfig,
    RolloutGenerator, SimulatedCamera, SimulatedRobot, Simulator, StartGoal, VisualMpc,
};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RewardType {
    Weighted,
    Dense,
    Sparse,
    Inpaint,
    Blackrobot,
    InpaintBlur,
}

/// Pushes a simulated block until the camera image matches a goal image
#[derive(Parser, Debug)]
#[clap(author, version, name = "visual_mpc")]
struct CommandLineArguments {
    /// Planning horizon
    #[clap(long, default_value_t = 3)]
    horizon: usize,
    /// CEM iterations per planning call
    #[clap(long, default_value_t = 10)]
    opt_iter: usize,
    /// Candidates sampled per iteration
    #[clap(long, default_value_t = 30)]
    action_candidates: usize,
    /// Elite candidates used for refitting
    #[clap(long, default_value_t = 5)]
    topk: usize,
    /// Actions executed before replanning
    #[clap(long, default_value_t = 1)]
    replan_every: usize,
    /// Initial standard deviation of the sampled actions
    #[clap(long, default_value_t = 1.0)]
    cem_init_std: f64,
    #[clap(long, default_value_t = 0)]
    seed: u64,
    /// Plan with this dynamics-model checkpoint instead of the simulator
    #[clap(long)]
    dynamics_model_ckpt: Option<PathBuf>,
    /// Optimize once and execute the whole plan
    #[clap(long, action)]
    cem_open_loop: bool,
    /// Start from a saved start/goal pair
    #[clap(long)]
    load_start_goal: Option<PathBuf>,
    /// Save the start/goal pair of this run
    #[clap(long)]
    save_start_goal: Option<PathBuf>,
    #[clap(long, value_enum, default_value = "weighted")]
    reward_type: RewardType,
    #[clap(long, default_value_t = 0.0)]
    robot_pixel_weight: f64,
    /// Dense distance above which the sparse cost is 1
    #[clap(long, default_value_t = 1000.0)]
    sparse_threshold: f64,
    #[clap(long, default_value_t = 10.0)]
    blur_sigma: f64,
    #[clap(long, default_value_t = 3.0)]
    unblur_cost_scale: f64,
    /// Remaining horizon from which on the unblurred cost is used
    #[clap(long, default_value_t = 1.0)]
    unblur_timestep: f64,
    #[clap(long, default_value_t = 10)]
    max_episode_length: usize,
    /// Write GIFs of the candidate rollouts of every planning call
    #[clap(long, action)]
    debug_cem: bool,
    #[clap(long, default_value = "logs")]
    log_dir: PathBuf,
    /// Distance the block is pushed to create the goal [m]
    #[clap(long, default_value_t = 0.2)]
    push_dist: f64,
    /// The episode succeeds if the block ends closer than this to its goal position [m]
    #[clap(long, default_value_t = 0.01)]
    object_dist_threshold: f64,
}

fn main() -> MpcResult<()> {
    env_logger::init();
    let args: CommandLineArguments = CommandLineArguments::parse();
    let env = Rc::new(RefCell::new(PushEnv::new(PushEnvConfig::default(), args.seed)?));
    let start_goal = match args.load_start_goal.as_ref() {
        Some(path) => {
            let start_goal = StartGoal::load(path)?;
            env.borrow_mut().load_state(&start_goal.start)?;
            start_goal
        }
        None => {
            let mut env = env.borrow_mut();
            env.reset();
            let goal = env.generate_goal(args.push_dist)?;
            StartGoal {
                start: env.observe(),
                goal,
            }
        }
    };
    if let Some(path) = args.save_start_goal.as_ref() {
        start_goal.save(path)?;
        info!("saved start and goal to {:?}", path);
    }
    let cost = cost_function(&args, &env.borrow());
    match args.dynamics_model_ckpt.as_ref() {
        Some(path) => {
            let model: ModelHandle<AnalyticPushModel> = load_checkpoint(path)?;
            if args.debug_cem {
                let demo = DMatrix::from_row_slice(3, 2, &[0.03, 0., 0.03, 0., 0., 0.03]);
                if let Err(e) = compare_rollouts(
                    &mut *env.borrow_mut(),
                    &*model,
                    &start_goal.start,
                    &demo,
                    args.log_dir.join("model_vs_env.gif"),
                ) {
                    warn!("could not compare model and environment: {}", e);
                }
            }
            run(&args, env, ModelRollouts::new(model, cost), &start_goal.goal)
        }
        None => {
            let generator = GroundTruthRollouts::new(env.clone(), cost);
            run(&args, env, generator, &start_goal.goal)
        }
    }
}

fn cost_function(args: &CommandLineArguments, env: &PushEnv) -> CostFunction {
    match args.reward_type {
        RewardType::Weighted => CostFunction::Weighted {
            robot_pixel_weight: args.robot_pixel_weight,
        },
        RewardType::Dense => CostFunction::Dense,
        RewardType::Sparse => CostFunction::Sparse {
            threshold: args.sparse_threshold,
        },
        RewardType::Inpaint => CostFunction::Inpaint {
            background: env.background(),
        },
        RewardType::Blackrobot => CostFunction::BlackRobot,
        RewardType::InpaintBlur => CostFunction::InpaintBlur {
            background: env.background(),
            sigma: args.blur_sigma,
            unblur_cost_scale: args.unblur_cost_scale,
            unblur_timestep: args.unblur_timestep,
        },
    }
}

fn run<G: RolloutGenerator>(
    args: &CommandLineArguments,
    env: Rc<RefCell<PushEnv>>,
    generator: G,
    goal: &GoalState,
) -> MpcResult<()> {
    let cem_config = CemConfig {
        horizon: args.horizon,
        opt_iter: args.opt_iter,
        action_candidates: args.action_candidates,
        topk: args.topk,
        replan_every: match args.cem_open_loop {
            true => args.horizon,
            false => args.replan_every,
        },
        action_dim: generator.action_dim(),
        init_std: args.cem_init_std,
        seed: args.seed,
        debug_dir: match args.debug_cem {
            true => Some(args.log_dir.join("debug_cem")),
            false => None,
        },
    };
    let driver_config = DriverConfig {
        push_height: env.borrow().config().push_height,
        max_episode_length: args.max_episode_length,
        open_loop: args.cem_open_loop,
        log_dir: Some(args.log_dir.clone()),
        success_threshold: args.object_dist_threshold,
        ..DriverConfig::default()
    };
    let reference = env.borrow().reference_actions(goal, args.horizon);
    let mut mpc = VisualMpc::new(
        SimulatedRobot::new(env.clone()),
        SimulatedCamera::new(env.clone()),
        generator,
        cem_config,
        driver_config,
    )?;
    mpc.set_reference(reference)?;
    let log = mpc.run_episode(goal, 0)?;
    let final_state = env.borrow().state();
    println!(
        "executed {} actions in {} planning steps, block at ({:.3}, {:.3})",
        log.executed_actions.len(),
        log.planning_steps,
        final_state.block.x,
        final_state.block.y
    );
    if let (Some(distance), Some(success)) = (log.object_distance, log.success) {
        println!("distance to goal {:.4} m, success: {}", distance, success);
    }
    Ok(())
}
