// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the client of the robot-control endpoint.
//!
//! The endpoint accepts an end-effector target pose, or no target to only query the current pose,
//! and answers with the resulting end-effector pose and joint configuration.
use std::time::Duration;

use log::info;
#[cfg(test)]
use mockall::automock;
use nalgebra::Isometry3;

use crate::exception::{create_command_exception, MpcException, MpcResult};
use crate::network::Network;
use crate::robot::service_types::{
    CommandEnum, ConnectRequest, ConnectResponse, ConnectStatus, PoseControlRequest,
    PoseControlResponse, PoseControlStatus, COMMAND_PORT, DEFAULT_TIMEOUT, VERSION,
};
use crate::utils::{array_to_isometry, isometry_to_array, Vector7};

pub mod service_types;

/// Pose and configuration reported by the endpoint after a request.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlResult {
    pub end_pose: Isometry3<f64>,
    pub joint_angles: Vector7,
}

impl From<&PoseControlResponse> for ControlResult {
    fn from(response: &PoseControlResponse) -> Self {
        ControlResult {
            end_pose: array_to_isometry(&response.end_pose),
            joint_angles: Vector7::from_column_slice(&response.joint_angles),
        }
    }
}

/// Anything which moves the end effector to a target pose.
#[cfg_attr(test, automock)]
pub trait RobotControl {
    /// Moves the end effector to `target` or only reports the current pose if `target` is `None`.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::MpcException::NetworkException`) if the endpoint
    /// does not answer in time.
    /// * [`CommandException`](`crate::exception::MpcException::CommandException`) if the endpoint
    /// could not execute the command.
    fn send_target(&mut self, target: Option<Isometry3<f64>>) -> MpcResult<ControlResult>;

    /// Moves the robot to its reset configuration.
    fn reset(&mut self) -> MpcResult<ControlResult>;
}

/// Maintains a network connection to the robot-control endpoint.
pub struct ControlClient {
    network: Network,
    server_version: u16,
}

impl ControlClient {
    /// Establishes a connection with the robot-control endpoint.
    /// # Arguments
    /// * `address` - IP/hostname of the endpoint.
    /// * `port` - defaults to [`COMMAND_PORT`].
    /// * `timeout` - bound for waiting on the server and on every response. Defaults to 10 s.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::MpcException::NetworkException`) if the server
    /// is not available within the timeout.
    /// * [`IncompatibleVersionException`](`crate::exception::MpcException::IncompatibleVersionException`)
    /// if the server speaks another protocol version.
    pub fn new(address: &str, port: Option<u16>, timeout: Option<Duration>) -> MpcResult<Self> {
        let network = Network::new(
            address,
            port.unwrap_or(COMMAND_PORT),
            timeout.unwrap_or(DEFAULT_TIMEOUT),
        )?;
        let mut client = ControlClient {
            network,
            server_version: 0,
        };
        client.connect()?;
        info!(
            "connected to robot-control server {} (protocol version {})",
            address, client.server_version
        );
        Ok(client)
    }

    fn connect(&mut self) -> MpcResult<()> {
        let command_id = self
            .network
            .tcp_send_request(CommandEnum::Connect, ConnectRequest::new())?;
        let response: ConnectResponse = self.network.tcp_blocking_receive_response(command_id)?;
        match response.status {
            ConnectStatus::Success if response.version == VERSION => {
                self.server_version = response.version;
                Ok(())
            }
            _ => Err(MpcException::IncompatibleVersionException {
                server_version: response.version,
                library_version: VERSION,
            }),
        }
    }

    /// Sends one pose-control request and waits for its completion.
    /// # Arguments
    /// * `target` - target end-effector pose. `None` only queries the current pose.
    /// * `should_reset` - moves the robot to its reset configuration instead.
    pub fn send_target_eef_request(
        &mut self,
        target: Option<&Isometry3<f64>>,
        should_reset: bool,
    ) -> MpcResult<ControlResult> {
        let request = PoseControlRequest::new(target.map(isometry_to_array), should_reset);
        let command_id = self
            .network
            .tcp_send_request(CommandEnum::PoseControl, request)?;
        let response: PoseControlResponse =
            self.network.tcp_blocking_receive_response(command_id)?;
        handle_response_status(&response.status)?;
        Ok((&response).into())
    }

    /// Returns the current end-effector pose and joint configuration.
    pub fn query(&mut self) -> MpcResult<ControlResult> {
        self.send_target_eef_request(None, false)
    }

    /// Returns the protocol version reported by the connected server.
    pub fn server_version(&self) -> u16 {
        self.server_version
    }
}

impl RobotControl for ControlClient {
    fn send_target(&mut self, target: Option<Isometry3<f64>>) -> MpcResult<ControlResult> {
        self.send_target_eef_request(target.as_ref(), false)
    }

    fn reset(&mut self) -> MpcResult<ControlResult> {
        self.send_target_eef_request(None, true)
    }
}

fn handle_response_status(status: &PoseControlStatus) -> MpcResult<()> {
    match status {
        PoseControlStatus::Success => Ok(()),
        PoseControlStatus::Unreachable => Err(create_command_exception(
            "visual-mpc-rs: target pose is unreachable!",
        )),
        PoseControlStatus::Aborted => Err(create_command_exception(
            "visual-mpc-rs: pose control aborted!",
        )),
        PoseControlStatus::Rejected => Err(create_command_exception(
            "visual-mpc-rs: pose control rejected!",
        )),
    }
}
