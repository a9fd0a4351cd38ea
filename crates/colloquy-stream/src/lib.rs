#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! Streaming turn pipeline for meeting participants
//!
//! Raw bytes from the turn endpoint flow through three stages:
//! [`FrameDecoder`] splits them into `data:` frames, [`parse_event`] turns
//! each frame into a [`StreamEvent`], and [`InFlightTurn`] folds the events
//! into the message being generated

pub mod error;
pub mod event;
pub mod frame;
pub mod turn;

pub use error::{AccumulateError, ParseError, StreamError};
pub use event::{Citation, EventKind, StreamEvent, events, parse_event};
pub use frame::{Frame, FrameDecoder, decode_frames};
pub use turn::{InFlightTurn, ParticipantSnapshot, Progress, ToolInvocation};
