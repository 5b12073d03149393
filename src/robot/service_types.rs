// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Wire messages of the robot-control protocol.
use std::fmt::Debug;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::network::MessageCommand;

pub const VERSION: u16 = 1;
pub const COMMAND_PORT: u16 = 1337;
/// Default bound for waiting on the server and on every response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq)]
#[repr(u32)]
pub enum CommandEnum {
    Connect,
    PoseControl,
}

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
pub enum ConnectStatus {
    Success,
    IncompatibleLibraryVersion,
}

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
pub enum PoseControlStatus {
    Success,
    Unreachable,
    Aborted,
    Rejected,
}

/// Precedes every message. `size` is the size of the whole message including the header.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct CommandHeader {
    pub command: CommandEnum,
    pub command_id: u32,
    pub size: u32,
}

impl CommandHeader {
    pub fn new(command: CommandEnum, command_id: u32, size: u32) -> CommandHeader {
        CommandHeader {
            command,
            command_id,
            size,
        }
    }
}

impl MessageCommand for CommandHeader {
    fn get_command_message_id(&self) -> u32 {
        self.command_id
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct RequestWithHeader<T> {
    pub header: CommandHeader,
    pub request: T,
}

impl<T> MessageCommand for RequestWithHeader<T> {
    fn get_command_message_id(&self) -> u32 {
        self.header.get_command_message_id()
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct ConnectRequest {
    pub version: u16,
}

impl ConnectRequest {
    pub fn new() -> Self {
        ConnectRequest { version: VERSION }
    }
}

impl Default for ConnectRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct ConnectResponse {
    pub header: CommandHeader,
    pub status: ConnectStatus,
    pub version: u16,
}

/// Commands the end effector to `target_pose` (4x4 column-major homogeneous transformation).
/// Without a target the server only reports the current pose.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct PoseControlRequest {
    pub target_pose: [f64; 16],
    pub has_target: bool,
    pub should_reset: bool,
}

impl PoseControlRequest {
    pub fn new(target_pose: Option<[f64; 16]>, should_reset: bool) -> Self {
        PoseControlRequest {
            target_pose: target_pose.unwrap_or([0.; 16]),
            has_target: target_pose.is_some(),
            should_reset,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct PoseControlResponse {
    pub header: CommandHeader,
    pub status: PoseControlStatus,
    pub end_pose: [f64; 16],
    pub joint_angles: [f64; 7],
}
