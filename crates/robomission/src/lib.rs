//! Robomission: runs inspection missions on a robot.
//!
//! A mission is an ordered list of tasks. The [`machine`] worker drives a
//! [`driver::RobotDriver`] through the tasks one at a time, and hands every
//! captured inspection to the [`collector`], which persists results through
//! [`storage`] handlers without ever holding up the mission.
//! [`scheduling::SchedulingUtilities`] is the entry point for starting missions
//! from a [`mission_source::MissionSource`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]

pub mod collector;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod machine;
pub mod mission_source;
pub mod model;
pub mod scheduling;
pub mod service;
pub mod storage;

pub use crate::model::*;

pub use crate::collector::{CollectorReport, ResultSender};
pub use crate::config::{CollectorConfig, MachineConfig, Settings};
pub use crate::driver::{RobotDriver, SimulatedDriver, SimulatedOutcome, SimulationConfig};
pub use crate::error::{DriverError, LoadError, RejectionError, StorageError, TaskFailure};
pub use crate::events::{Event, EventBus};
pub use crate::machine::{MachineSnapshot, State, StateMachine, StateMachineHandle};
pub use crate::scheduling::{SchedulingUtilities, StartAccepted};
pub use crate::service::Service;
