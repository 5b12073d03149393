// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains exception and Result definitions
use thiserror::Error;

/// Represents all kind of errors which can occur while planning and executing pushes.
#[derive(Error, Debug)]
pub enum MpcException {
    /// ConfigurationException is returned if the optimizer, the driver or a goal is set up with
    /// inconsistent parameters. These errors are detected at construction and never corrected silently.
    #[error("configuration error: {message}")]
    ConfigurationException { message: String },

    /// NetworkException is returned if the robot-control server cannot be reached,
    /// the connection is lost or a request times out.
    #[error("{message:?}")]
    NetworkException { message: String },

    /// CommandException is returned if the robot-control server reports that a command failed.
    #[error("{message:?}")]
    CommandException { message: String },

    /// IncompatibleVersionException is returned if the robot-control server speaks another protocol version.
    #[error("Incompatible protocol version: server has version {server_version:?} and visual-mpc-rs has {library_version:?}")]
    IncompatibleVersionException {
        /// Server protocol version.
        server_version: u16,
        /// visual-mpc-rs protocol version.
        library_version: u16,
    },

    /// RolloutException is returned if the simulator or the dynamics model fails for any
    /// candidate of a batch. The whole batch is discarded.
    #[error("rollout failed: {message}")]
    RolloutException { message: String },

    /// AggregationException is returned if no candidate of an iteration has a finite cost.
    #[error("cost aggregation failed: {message}")]
    AggregationException { message: String },

    /// ModelException is returned if a dynamics-model checkpoint cannot be loaded or stored.
    #[error("{message:?}")]
    ModelException { message: String },

    /// PersistenceException is returned if start/goal pairs or dataset files cannot be read or written.
    #[error("{message:?}")]
    PersistenceException { message: String },
}

/// creates a ConfigurationException from anything printable
pub(crate) fn create_configuration_exception<S: ToString>(message: S) -> MpcException {
    MpcException::ConfigurationException {
        message: message.to_string(),
    }
}

/// creates a RolloutException from anything printable
pub(crate) fn create_rollout_exception<S: ToString>(message: S) -> MpcException {
    MpcException::RolloutException {
        message: message.to_string(),
    }
}

/// creates a CommandException from a static string slice
pub(crate) fn create_command_exception(message: &'static str) -> MpcException {
    MpcException::CommandException {
        message: message.to_string(),
    }
}

/// Result type which can have MpcException as Error
pub type MpcResult<T> = Result<T, MpcException>;
