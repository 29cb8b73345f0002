//! 命令解析
//!
//! 外部来源（标准输入、远程消息）传入 `(action, params)`，或一行以空白分隔的文本：
//!
//! | 命令 | 参数 | 说明 |
//! |------|------|------|
//! | `move` | `up\|down [ms]` | 定时升降，默认 1000ms，范围 0 ~ 10000 |
//! | `set` | `<height>` | 调高，范围 28.1 ~ 47.5 |
//! | `belltoll` | `enable\|disable` | 整点敲钟模式 |
//! | `fixheight` | `enable\|disable\|<height>` | 固定高度模式 |
//! | `height` | | 查询当前高度 |
//!
//! 所有校验都在这里完成，越界的命令不会到达驱动层。

use sitdown_driver::Direction;
use sitdown_protocol::{DEFAULT_MOVE_DURATION_MS, is_valid_move_duration, is_valid_target_height};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// 命令解析错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unrecognized command '{0}'")]
    UnknownAction(String),

    #[error("Missing {name} for {action} command")]
    MissingParameter {
        action: &'static str,
        name: &'static str,
    },

    #[error("Invalid {name} '{value}' for {action} command")]
    InvalidParameter {
        action: &'static str,
        name: &'static str,
        value: String,
    },

    #[error("Height {0} outside [28.1, 47.5]")]
    HeightOutOfRange(f32),

    #[error("Duration {0}ms outside [0, 10000]")]
    DurationOutOfRange(i64),
}

/// 开关参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Enable,
    Disable,
}

/// `fixheight` 的参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixHeight {
    /// 固定在当前高度
    Enable,
    Disable,
    /// 固定在指定高度
    At(f32),
}

/// 已校验的命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Move {
        direction: Direction,
        duration: Duration,
    },
    Set {
        height: f32,
    },
    BellToll(Toggle),
    FixHeight(FixHeight),
    Height,
}

impl Command {
    /// 从动作名与参数列表解析；多余参数忽略
    pub fn parse<S: AsRef<str>>(action: &str, params: &[S]) -> Result<Self, CommandError> {
        let param = |i: usize| params.get(i).map(|p| p.as_ref());

        match action.to_ascii_lowercase().as_str() {
            "" => Err(CommandError::Empty),
            "move" => {
                let direction = match param(0) {
                    Some("up") => Direction::Up,
                    Some("down") => Direction::Down,
                    Some(other) => {
                        return Err(CommandError::InvalidParameter {
                            action: "move",
                            name: "direction",
                            value: other.to_string(),
                        });
                    },
                    None => {
                        return Err(CommandError::MissingParameter {
                            action: "move",
                            name: "direction",
                        });
                    },
                };
                let duration_ms = match param(1) {
                    Some(raw) => parse_duration_ms(raw)?,
                    None => DEFAULT_MOVE_DURATION_MS,
                };
                Ok(Command::Move {
                    direction,
                    duration: Duration::from_millis(duration_ms),
                })
            },
            "set" => {
                let raw = param(0).ok_or(CommandError::MissingParameter {
                    action: "set",
                    name: "height",
                })?;
                Ok(Command::Set {
                    height: parse_height("set", raw)?,
                })
            },
            "belltoll" => match param(0) {
                Some("enable") => Ok(Command::BellToll(Toggle::Enable)),
                Some("disable") => Ok(Command::BellToll(Toggle::Disable)),
                Some(other) => Err(CommandError::InvalidParameter {
                    action: "belltoll",
                    name: "mode",
                    value: other.to_string(),
                }),
                None => Err(CommandError::MissingParameter {
                    action: "belltoll",
                    name: "mode",
                }),
            },
            "fixheight" => match param(0) {
                Some("enable") => Ok(Command::FixHeight(FixHeight::Enable)),
                Some("disable") => Ok(Command::FixHeight(FixHeight::Disable)),
                Some(raw) => Ok(Command::FixHeight(FixHeight::At(parse_height(
                    "fixheight",
                    raw,
                )?))),
                None => Err(CommandError::MissingParameter {
                    action: "fixheight",
                    name: "mode or height",
                }),
            },
            "height" => Ok(Command::Height),
            _ => Err(CommandError::UnknownAction(action.to_string())),
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    /// 解析一行文本，例如 `move up 500`
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let action = words.next().ok_or(CommandError::Empty)?;
        let params: Vec<&str> = words.collect();
        Command::parse(action, &params)
    }
}

fn parse_duration_ms(raw: &str) -> Result<u64, CommandError> {
    let value: i64 = raw.parse().map_err(|_| CommandError::InvalidParameter {
        action: "move",
        name: "duration",
        value: raw.to_string(),
    })?;
    u64::try_from(value)
        .ok()
        .filter(|ms| is_valid_move_duration(*ms))
        .ok_or(CommandError::DurationOutOfRange(value))
}

fn parse_height(action: &'static str, raw: &str) -> Result<f32, CommandError> {
    let height: f32 = raw.parse().map_err(|_| CommandError::InvalidParameter {
        action,
        name: "height",
        value: raw.to_string(),
    })?;
    if !is_valid_target_height(height) {
        return Err(CommandError::HeightOutOfRange(height));
    }
    Ok(height)
}

/// 格式化高度：一位小数，未知时为 `unknown`
pub fn format_height(height: Option<f32>) -> String {
    match height {
        Some(h) => format!("{h:.1}"),
        None => "unknown".to_string(),
    }
}
