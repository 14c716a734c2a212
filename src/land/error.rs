use std::error::Error;
use std::fmt;

/// Mirrors the teacher's per-subsystem error enums (`server/error.rs`'s
/// `ThundersServerError`): a flat variant list with a manual `Display`,
/// never `thiserror`.
#[derive(Debug)]
pub enum JoinError {
    Denied(String),
    RoomFull,
    RoomNotFound,
    LandIdMismatch,
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::Denied(reason) => write!(f, "join denied: {reason}"),
            JoinError::RoomFull => write!(f, "room is full"),
            JoinError::RoomNotFound => write!(f, "room not found"),
            JoinError::LandIdMismatch => write!(f, "land id mismatch"),
        }
    }
}

impl Error for JoinError {}

#[derive(Debug)]
pub enum ActionError {
    NotRegistered,
    InvalidPayload,
    HandlerError(String),
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionError::NotRegistered => write!(f, "action not registered"),
            ActionError::InvalidPayload => write!(f, "invalid action payload"),
            ActionError::HandlerError(reason) => write!(f, "action handler error: {reason}"),
        }
    }
}

impl Error for ActionError {}

#[derive(Debug)]
pub enum EventError {
    NotRegistered,
    InvalidPayload,
    HandlerError(String),
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::NotRegistered => write!(f, "event not registered"),
            EventError::InvalidPayload => write!(f, "invalid event payload"),
            EventError::HandlerError(reason) => write!(f, "event handler error: {reason}"),
        }
    }
}

impl Error for EventError {}
