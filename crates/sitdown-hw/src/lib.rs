//! # Sitdown Hardware Adapter Layer
//!
//! 硬件抽象层：串口反馈端口与两路继电器输出。
//!
//! - [`FeedbackPort`]: 读取控制盒上报的 4 字节反馈帧
//! - [`RelayOutputs`]: 驱动"升"/"降"两路低电平有效的输出
//!
//! Linux 下提供基于 termios 的 [`SerialPort`] 与基于 sysfs 的 [`SysfsRelays`]；
//! 启用 `mock` feature 后提供无硬件依赖的模拟实现。

use std::io;
use thiserror::Error;

#[cfg(target_os = "linux")]
pub mod serial;

#[cfg(target_os = "linux")]
pub use serial::{SerialConfig, SerialPort};

#[cfg(target_os = "linux")]
pub mod gpio;

#[cfg(target_os = "linux")]
pub use gpio::{RelayPins, SysfsRelays};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// 硬件层统一错误类型
#[derive(Error, Debug)]
pub enum HwError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[cfg(target_os = "linux")]
    #[error("Termios error: {0}")]
    Termios(#[from] nix::Error),

    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    #[error("GPIO {pin}: {message}")]
    Gpio { pin: u32, message: String },
}

impl HwError {
    pub fn gpio(pin: u32, message: impl Into<String>) -> Self {
        Self::Gpio {
            pin,
            message: message.into(),
        }
    }
}

/// 继电器通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relay {
    /// 升
    Raise,
    /// 降
    Lower,
}

/// 输出电平（逻辑层面）
///
/// 硬件为低电平有效：`Active` 对应物理低电平，`Inactive` 对应物理高电平。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Active,
    Inactive,
}

impl Level {
    /// 写入 sysfs `value` 文件的物理电平
    pub fn physical(self) -> &'static [u8] {
        match self {
            Level::Active => b"0",
            Level::Inactive => b"1",
        }
    }
}

/// 反馈端口
///
/// 对串口读取的最小抽象。语义与 [`io::Read::read`] 相同：
/// - `Ok(0)` 表示 EOF 或读超时（无数据）
/// - `Ok(n)` 且 `n < buf.len()` 表示短读
/// - `Err(_)` 由调用方按 [`is_transient`] 区分瞬时与致命错误
pub trait FeedbackPort: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<R: io::Read + Send> FeedbackPort for R {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }
}

/// 该 IO 错误是否属于可重试的瞬时错误
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
    )
}

/// 继电器输出
pub trait RelayOutputs: Send {
    /// 设置单路输出电平
    fn set(&mut self, relay: Relay, level: Level) -> Result<(), HwError>;

    /// 释放硬件资源（进程退出前调用）
    ///
    /// 默认实现将两路都置为无效电平。
    fn release(&mut self) -> Result<(), HwError> {
        self.set(Relay::Raise, Level::Inactive)?;
        self.set(Relay::Lower, Level::Inactive)
    }
}

impl<T: RelayOutputs + ?Sized> RelayOutputs for Box<T> {
    fn set(&mut self, relay: Relay, level: Level) -> Result<(), HwError> {
        (**self).set(relay, level)
    }

    fn release(&mut self) -> Result<(), HwError> {
        (**self).release()
    }
}
