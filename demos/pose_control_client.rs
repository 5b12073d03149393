// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later
use clap::Parser;

use visual_mpc::{downward_orientation, push_pose, ControlClient, ControlResult, MpcResult};

/// Moves the end effector of a robot behind a pose-control server or queries its pose.
///
/// WARNING: Before executing this example, make sure there is enough space around the robot.
#[derive(Parser, Debug)]
#[clap(author, version, name = "pose_control_client")]
struct CommandLineArguments {
    /// IP-Address or hostname of the pose-control server
    pub server_ip: String,
    /// Port of the pose-control server
    #[clap(long)]
    pub port: Option<u16>,
    /// Target position of the end effector as x y z [m]. The gripper points downwards.
    #[clap(long, number_of_values = 3, allow_hyphen_values = true)]
    pub target: Option<Vec<f64>>,
    /// Move the robot to its reset configuration
    #[clap(short, long, action)]
    pub reset: bool,
}

fn main() -> MpcResult<()> {
    env_logger::init();
    let args = CommandLineArguments::parse();
    let mut client = ControlClient::new(args.server_ip.as_str(), args.port, None)?;
    println!("connected to server version {}", client.server_version());
    let result = match (args.reset, args.target.as_ref()) {
        (true, _) => {
            println!("WARNING: This example will move the robot! Please make sure to have the user stop button at hand!");
            client.send_target_eef_request(None, true)?
        }
        (false, Some(target)) => {
            println!("WARNING: This example will move the robot! Please make sure to have the user stop button at hand!");
            let pose = push_pose(target[0], target[1], target[2], downward_orientation());
            client.send_target_eef_request(Some(&pose), false)?
        }
        (false, None) => client.query()?,
    };
    print_result(&result);
    Ok(())
}

fn print_result(result: &ControlResult) {
    let translation = result.end_pose.translation.vector;
    println!(
        "end effector at ({:.4}, {:.4}, {:.4})",
        translation.x, translation.y, translation.z
    );
    println!("joint angles {:?}", result.joint_angles.as_slice());
}
