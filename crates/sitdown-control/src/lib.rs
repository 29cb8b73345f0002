//! # Sitdown Control
//!
//! 建立在驱动层之上的控制逻辑：
//!
//! - `command`: 命令解析与边界校验
//! - `controller`: 命令分发
//! - `toll`: 整点敲钟后台任务
//! - `fixheight`: 固定高度（防漂移复位）监听器

pub mod command;
pub mod controller;
pub mod fixheight;
pub mod toll;

pub use command::{Command, CommandError, FixHeight, Toggle, format_height};
pub use controller::{ControlError, Controller};
pub use fixheight::{FixHeightConfig, FixHeightMode, FixedHeightListener};
pub use toll::{BellToll, Clock, LocalClock, TollConfig};
