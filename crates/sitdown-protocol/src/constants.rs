//! 协议常量定义
//!
//! 桌腿控制盒串口反馈的帧格式常量，以及整个系统共用的高度/时长边界。

/// 单个反馈帧的字节数
pub const FRAME_LEN: usize = 4;

/// byte[1] 取该值时表示高度报告帧
pub const HEIGHT_REPORT_TAG: u8 = 1;

/// 原始高度单位下限（对应 [`BASE_HEIGHT`]）
pub const MIN_RAW_HEIGHT: u8 = 25;

/// 原始高度单位上限
pub const MAX_RAW_HEIGHT: u8 = 219;

/// 原始值为 [`MIN_RAW_HEIGHT`] 时的物理高度
pub const BASE_HEIGHT: f32 = 28.1;

/// 每个原始单位对应 1/10 物理单位
pub const RAW_UNITS_PER_HEIGHT: f32 = 10.0;

/// `set` 命令允许的最低目标高度
pub const MIN_TARGET_HEIGHT: f32 = 28.1;

/// `set` 命令允许的最高目标高度
pub const MAX_TARGET_HEIGHT: f32 = 47.5;

/// 定时升降允许的最长时长（毫秒）
pub const MAX_MOVE_DURATION_MS: u64 = 10_000;

/// `move` 命令省略时长时使用的默认值（毫秒）
pub const DEFAULT_MOVE_DURATION_MS: u64 = 1_000;
