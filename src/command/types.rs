//! Inbound method calls and their validated form

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::CommandError;
use crate::viewport::Viewport;

pub const INIT: &str = "init";
pub const PLAY: &str = "play";
pub const STOP: &str = "stop";
pub const RESET: &str = "reset";
pub const JUMP_TO: &str = "jumpTo";
pub const SEEK_TO: &str = "seekTo";
pub const PAN_UPDATE: &str = "onPanUpdate";
pub const DISPOSE: &str = "dispose";
pub const UPDATE_TIME: &str = "updateTime";

/// A named call with a JSON argument map, as carried by a method channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// Call without arguments
    pub fn bare(method: impl Into<String>) -> Self {
        Self::new(method, Value::Null)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitArgs {
    url: String,
    is_auto_play: bool,
    is_repeat: bool,
    width: f64,
    height: f64,
}

#[derive(Deserialize)]
struct TimeArgs {
    millisecond: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PanArgs {
    is_start: bool,
    x: f64,
    y: f64,
}

/// A validated command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Init {
        url: String,
        autoplay: bool,
        repeat: bool,
        viewport: Viewport,
    },
    Play,
    Stop,
    Reset,
    JumpTo {
        millisecond: f64,
    },
    SeekTo {
        millisecond: f64,
    },
    PanUpdate {
        is_start: bool,
        x: f64,
        y: f64,
    },
    Dispose,
}

fn arguments<T: DeserializeOwned>(call: &MethodCall) -> Result<T, CommandError> {
    T::deserialize(&call.arguments)
        .map_err(|e| CommandError::invalid_argument(&call.method, format!("missing argument: {e}")))
}

fn finite(command: &str, name: &str, value: f64) -> Result<f64, CommandError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CommandError::invalid_argument(command, format!("{name} must be a finite number")))
    }
}

impl Command {
    /// Validate a call's name and argument shapes
    ///
    /// Range checks that depend on session state (pan coordinates against the
    /// viewport) are done by the surface.
    pub fn parse(call: &MethodCall) -> Result<Self, CommandError> {
        let method = call.method.as_str();
        match method {
            INIT => {
                let args: InitArgs = arguments(call)?;
                if args.url.trim().is_empty() {
                    return Err(CommandError::invalid_argument(method, "url must not be empty"));
                }
                let viewport = Viewport::new(args.width, args.height).ok_or_else(|| {
                    CommandError::invalid_argument(
                        method,
                        format!("width and height must be positive, got {}x{}", args.width, args.height),
                    )
                })?;
                Ok(Command::Init {
                    url: args.url,
                    autoplay: args.is_auto_play,
                    repeat: args.is_repeat,
                    viewport,
                })
            }
            PLAY => Ok(Command::Play),
            STOP => Ok(Command::Stop),
            RESET => Ok(Command::Reset),
            DISPOSE => Ok(Command::Dispose),
            JUMP_TO => {
                let args: TimeArgs = arguments(call)?;
                Ok(Command::JumpTo {
                    millisecond: finite(method, "millisecond", args.millisecond)?,
                })
            }
            SEEK_TO => {
                let args: TimeArgs = arguments(call)?;
                Ok(Command::SeekTo {
                    millisecond: finite(method, "millisecond", args.millisecond)?,
                })
            }
            PAN_UPDATE => {
                let args: PanArgs = arguments(call)?;
                Ok(Command::PanUpdate {
                    is_start: args.is_start,
                    x: finite(method, "x", args.x)?,
                    y: finite(method, "y", args.y)?,
                })
            }
            _ => Err(CommandError::unknown(method)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Init { .. } => INIT,
            Command::Play => PLAY,
            Command::Stop => STOP,
            Command::Reset => RESET,
            Command::JumpTo { .. } => JUMP_TO,
            Command::SeekTo { .. } => SEEK_TO,
            Command::PanUpdate { .. } => PAN_UPDATE,
            Command::Dispose => DISPOSE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandErrorKind;
    use serde_json::json;

    fn parse(method: &str, arguments: Value) -> Result<Command, CommandError> {
        Command::parse(&MethodCall::new(method, arguments))
    }

    #[test]
    fn test_parse_init() {
        let command = parse(
            "init",
            json!({"url": "https://example.com/a.mp4", "isAutoPlay": true, "isRepeat": false, "width": 300, "height": 300.0}),
        )
        .unwrap();
        assert_eq!(
            command,
            Command::Init {
                url: "https://example.com/a.mp4".into(),
                autoplay: true,
                repeat: false,
                viewport: Viewport::new(300.0, 300.0).unwrap(),
            }
        );
    }

    #[test]
    fn test_init_requires_every_field() {
        let err = parse("init", json!({"url": "a.mp4", "isAutoPlay": true, "width": 1, "height": 1})).unwrap_err();
        assert_eq!(err.kind, CommandErrorKind::InvalidArgument);
        assert_eq!(err.command, "init");
    }

    #[test]
    fn test_init_rejects_bad_values() {
        let base = |url: &str, width: f64| json!({"url": url, "isAutoPlay": false, "isRepeat": false, "width": width, "height": 100});
        assert_eq!(parse("init", base("", 100.0)).unwrap_err().kind, CommandErrorKind::InvalidArgument);
        assert_eq!(parse("init", base("a.mp4", 0.0)).unwrap_err().kind, CommandErrorKind::InvalidArgument);
        assert_eq!(parse("init", base("a.mp4", -3.0)).unwrap_err().kind, CommandErrorKind::InvalidArgument);
    }

    #[test]
    fn test_wrong_type_is_invalid() {
        let err = parse("jumpTo", json!({"millisecond": "soon"})).unwrap_err();
        assert_eq!(err.kind, CommandErrorKind::InvalidArgument);
        let err = parse("onPanUpdate", json!({"isStart": 1, "x": 0, "y": 0})).unwrap_err();
        assert_eq!(err.kind, CommandErrorKind::InvalidArgument);
    }

    #[test]
    fn test_parse_time_and_pan() {
        assert_eq!(
            parse("seekTo", json!({"millisecond": -1500})).unwrap(),
            Command::SeekTo { millisecond: -1500.0 }
        );
        assert_eq!(
            parse("onPanUpdate", json!({"isStart": true, "x": -5, "y": 10})).unwrap(),
            Command::PanUpdate {
                is_start: true,
                x: -5.0,
                y: 10.0
            }
        );
    }

    #[test]
    fn test_commands_without_arguments() {
        assert_eq!(Command::parse(&MethodCall::bare("play")).unwrap(), Command::Play);
        assert_eq!(Command::parse(&MethodCall::bare("stop")).unwrap(), Command::Stop);
        assert_eq!(Command::parse(&MethodCall::bare("dispose")).unwrap().name(), "dispose");
    }

    #[test]
    fn test_unknown_method() {
        let err = Command::parse(&MethodCall::bare("rewind")).unwrap_err();
        assert_eq!(err.kind, CommandErrorKind::UnknownCommand);
        assert_eq!(err.command, "rewind");
    }

    #[test]
    fn test_method_call_deserializes_without_arguments() {
        let call: MethodCall = serde_json::from_str(r#"{"method": "play"}"#).unwrap();
        assert_eq!(call.arguments, Value::Null);
    }
}
