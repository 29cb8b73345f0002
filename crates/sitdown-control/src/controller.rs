//! 命令分发
//!
//! [`Controller`] 把已校验的 [`Command`] 映射到 Desk 操作与后台模式。
//! 命令来源只会收到可选的文本回复，失败只记录日志，不回传给发送方。

use crate::command::{Command, CommandError, FixHeight, Toggle, format_height};
use crate::fixheight::{FixHeightConfig, FixHeightMode};
use crate::toll::{BellToll, Clock, TollConfig};
use sitdown_driver::{Desk, DeskError, Direction};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// 命令执行错误
#[derive(Error, Debug)]
pub enum ControlError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Desk(#[from] DeskError),

    /// `fixheight enable` 需要已知的当前高度
    #[error("Current height is unknown")]
    UnknownHeight,
}

/// 命令分发器
pub struct Controller {
    desk: Arc<Desk>,
    toll: BellToll,
    fixheight: FixHeightMode,
}

impl Controller {
    pub fn new(
        desk: Arc<Desk>,
        clock: Arc<dyn Clock>,
        toll: TollConfig,
        fixheight: FixHeightConfig,
    ) -> Self {
        Self {
            toll: BellToll::new(desk.clone(), clock, toll),
            fixheight: FixHeightMode::new(desk.clone(), fixheight),
            desk,
        }
    }

    pub fn desk(&self) -> &Arc<Desk> {
        &self.desk
    }

    pub fn bell_toll(&self) -> &BellToll {
        &self.toll
    }

    pub fn fix_height(&self) -> &FixHeightMode {
        &self.fixheight
    }

    /// 执行一条命令，返回给命令来源的回复
    pub fn execute(&self, command: Command) -> Result<String, ControlError> {
        match command {
            Command::Move {
                direction,
                duration,
            } => {
                match direction {
                    Direction::Up => self.desk.raise_for(duration)?,
                    Direction::Down => self.desk.lower_for(duration)?,
                }
                Ok(format!("Moved to {}", format_height(self.desk.height())))
            },
            Command::Set { height } => {
                self.desk.change_to_height(height)?;
                Ok(format!("Changed to {}", format_height(self.desk.height())))
            },
            Command::BellToll(Toggle::Enable) => {
                self.toll.enable()?;
                Ok("Bell toll enabled".to_string())
            },
            Command::BellToll(Toggle::Disable) => {
                self.toll.disable();
                Ok("Bell toll disabled".to_string())
            },
            Command::FixHeight(FixHeight::Enable) => {
                let height = self.desk.height().ok_or(ControlError::UnknownHeight)?;
                self.fixheight.enable(height);
                Ok(format!("Fixed height at {height:.1}"))
            },
            Command::FixHeight(FixHeight::At(height)) => {
                self.fixheight.enable(height);
                Ok(format!("Fixed height at {height:.1}"))
            },
            Command::FixHeight(FixHeight::Disable) => {
                self.fixheight.disable();
                Ok("Fixed height disabled".to_string())
            },
            Command::Height => Ok(format_height(self.desk.height())),
        }
    }

    /// 解析并执行一行文本命令
    ///
    /// 解析或执行失败时记录日志并返回 `None`。
    pub fn dispatch(&self, line: &str) -> Option<String> {
        let result = line
            .parse::<Command>()
            .map_err(ControlError::from)
            .and_then(|command| {
                info!("Received command: {:?}", command);
                self.execute(command)
            });

        match result {
            Ok(reply) => Some(reply),
            Err(ControlError::Command(e)) => {
                warn!("Rejected command '{}': {}", line.trim(), e);
                None
            },
            Err(e) => {
                warn!("Command '{}' failed: {}", line.trim(), e);
                None
            },
        }
    }

    /// 关闭所有后台模式并停止桌子
    pub fn shutdown(&self) {
        self.toll.disable();
        self.fixheight.disable();
        if let Err(e) = self.desk.stop() {
            warn!("Failed to stop desk: {}", e);
        }
    }
}
