//! Errors reported back to the host

use serde::Serialize;

use crate::playback::PlaybackError;

/// Category of a failed command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandErrorKind {
    InvalidArgument,
    MediaOpenFailure,
    UnknownCommand,
    SessionNotOpen,
    AlreadyInitialized,
}

/// A failed command, named after the method that failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{command}: {message}")]
pub struct CommandError {
    pub command: String,
    pub kind: CommandErrorKind,
    pub message: String,
}

impl CommandError {
    pub fn new(command: impl Into<String>, kind: CommandErrorKind, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_argument(command: &str, message: impl Into<String>) -> Self {
        Self::new(command, CommandErrorKind::InvalidArgument, message)
    }

    pub fn unknown(command: &str) -> Self {
        Self::new(command, CommandErrorKind::UnknownCommand, "not implemented")
    }

    pub fn from_playback(command: &str, error: PlaybackError) -> Self {
        let kind = match &error {
            PlaybackError::SessionNotOpen | PlaybackError::Disposed => CommandErrorKind::SessionNotOpen,
            PlaybackError::AlreadyInitialized => CommandErrorKind::AlreadyInitialized,
            PlaybackError::InvalidTime(_) => CommandErrorKind::InvalidArgument,
            PlaybackError::Media(_) => CommandErrorKind::MediaOpenFailure,
        };
        Self::new(command, kind, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::MediaError;

    #[test]
    fn test_playback_error_mapping() {
        let err = CommandError::from_playback("play", PlaybackError::Disposed);
        assert_eq!(err.kind, CommandErrorKind::SessionNotOpen);
        assert_eq!(err.command, "play");

        let err = CommandError::from_playback(
            "init",
            PlaybackError::Media(MediaError::OpenFailed {
                uri: "x".into(),
                reason: "404".into(),
            }),
        );
        assert_eq!(err.kind, CommandErrorKind::MediaOpenFailure);
        assert_eq!(err.to_string(), "init: failed to open x: 404");
    }

    #[test]
    fn test_serializes_for_host() {
        let err = CommandError::invalid_argument("onPanUpdate", "x out of range");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["command"], "onPanUpdate");
        assert_eq!(json["kind"], "InvalidArgument");
    }
}
