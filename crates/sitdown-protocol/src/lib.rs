//! # Sitdown Protocol
//!
//! 升降桌控制盒串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 帧格式常量与高度/时长边界
//! - `feedback`: 反馈帧解析

pub mod constants;
pub mod feedback;

// 重新导出常用类型
pub use constants::*;
pub use feedback::*;

use thiserror::Error;

/// 协议解析错误类型
///
/// 这些错误都属于"可忽略"的类别：监控线程遇到时记录后跳过该帧。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Not a height report frame (tag {tag})")]
    NotHeightReport { tag: u8 },

    #[error("Raw height {raw} outside [25, 219]")]
    RawOutOfRange { raw: u8 },
}

/// 目标高度是否在允许范围内（[`MIN_TARGET_HEIGHT`], [`MAX_TARGET_HEIGHT`]）
///
/// NaN 与无穷大视为无效。
pub fn is_valid_target_height(height: f32) -> bool {
    height.is_finite() && (MIN_TARGET_HEIGHT..=MAX_TARGET_HEIGHT).contains(&height)
}

/// 定时升降时长是否在允许范围内（0 ~ [`MAX_MOVE_DURATION_MS`]）
pub fn is_valid_move_duration(duration_ms: u64) -> bool {
    duration_ms <= MAX_MOVE_DURATION_MS
}
