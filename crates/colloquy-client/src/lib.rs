#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! Client side of Colloquy meetings
//!
//! [`TurnController`] runs one participant turn at a time per meeting on
//! top of any [`MeetingBackend`]; [`HttpBackend`] talks to the meeting API
//! over HTTP and [`TurnCoordinator`] keys controllers by meeting id

pub mod backend;
mod controller;
mod coordinator;
pub mod error;
pub mod types;

pub use backend::{ByteStream, HttpBackend, MeetingBackend};
pub use controller::{TurnController, TurnPhase, TurnResolution, TurnStream, TurnUpdate};
pub use coordinator::TurnCoordinator;
pub use error::{ClientError, Result, TurnError};
pub use types::*;
