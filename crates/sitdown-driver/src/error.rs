//! 驱动层错误类型定义

use sitdown_hw::HwError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DeskError {
    /// 继电器/串口硬件错误
    #[error("Hardware error: {0}")]
    Hw(#[from] HwError),

    /// 串口出现非 EOF 的 IO 错误，反馈链路视为已断开
    #[error("Serial feedback link lost: {0}")]
    SerialLink(#[source] io::Error),

    /// 位置监控线程已退出，无法继续闭环控制
    #[error("Position monitor stopped")]
    MonitorStopped,

    /// 已执行 cleanup，不再接受移动
    #[error("Desk has been shut down")]
    Halted,

    /// 调高在超时时间内未收敛
    #[error("Did not converge to {target:.1} within {elapsed:?} (last height: {last_height:?})")]
    DidNotConverge {
        target: f32,
        last_height: Option<f32>,
        elapsed: Duration,
    },

    /// 参数越界（目标高度、时长等）
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 后台线程错误
    #[error("Thread error: {0}")]
    Thread(String),
}
