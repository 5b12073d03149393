// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later
use std::path::PathBuf;

use clap::Parser;

use visual_mpc::dataset::{collect, CollectionConfig};
use visual_mpc::{save_checkpoint, AnalyticPushModel, MpcResult, PushEnvConfig};

/// Records random pushing episodes in parallel simulations.
///
/// Every worker writes its episodes to its own file in the output directory.
#[derive(Parser, Debug)]
#[clap(author, version, name = "collect_push_data")]
struct CommandLineArguments {
    #[clap(long, default_value = "push_data")]
    pub output_dir: PathBuf,
    /// Number of parallel workers
    #[clap(long, default_value_t = 4)]
    pub workers: usize,
    #[clap(long, default_value_t = 10)]
    pub episodes_per_worker: usize,
    #[clap(long, default_value_t = 15)]
    pub episode_length: usize,
    /// Standard deviation of the random pusher displacements [m]
    #[clap(long, default_value_t = 0.03)]
    pub action_std: f64,
    #[clap(long, default_value_t = 0)]
    pub seed: u64,
    /// Also write a checkpoint of the analytic push model for the recorded environment
    #[clap(long)]
    pub model_ckpt: Option<PathBuf>,
}

fn main() -> MpcResult<()> {
    env_logger::init();
    let args = CommandLineArguments::parse();
    let config = CollectionConfig {
        workers: args.workers,
        episodes_per_worker: args.episodes_per_worker,
        episode_length: args.episode_length,
        action_std: args.action_std,
        seed: args.seed,
        output_dir: args.output_dir.clone(),
        env: PushEnvConfig::default(),
    };
    let files = collect(&config)?;
    for file in files.iter() {
        println!("{}", file.display());
    }
    if let Some(path) = args.model_ckpt.as_ref() {
        save_checkpoint(path, &AnalyticPushModel::new(config.env.clone()))?;
        println!("model checkpoint written to {}", path.display());
    }
    Ok(())
}
