//! # Sitdown Driver
//!
//! 升降桌驱动层：
//! - 位置监控（后台线程解码串口反馈，原子存储当前高度）
//! - 继电器执行（移动锁保护的定时升降与停止）
//! - 闭环调高（收缩容差带 + 可配置超时）
//! - 监听器系统（升/降/调高完成/高度变化事件）
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use sitdown_driver::{Desk, DeskConfig, MonitorConfig, PositionMonitor};
//! use sitdown_hw::{RelayPins, SerialConfig, SerialPort, SysfsRelays};
//! use std::sync::Arc;
//!
//! let relays = SysfsRelays::open(RelayPins::default())?;
//! let desk = Arc::new(Desk::new(relays, DeskConfig::default())?);
//! let port = SerialPort::open(&SerialConfig::default())?;
//! let monitor = PositionMonitor::start(desk.clone(), port, MonitorConfig::default())?;
//!
//! desk.change_to_height(40.0)?;
//! ```

pub mod actuator;
pub mod convergence;
mod desk;
mod error;
pub mod hooks;
pub mod monitor;
pub mod state;

pub use actuator::{Actuator, Direction, MovementGuard};
pub use convergence::{ConvergenceConfig, DEFAULT_CONVERGENCE_TIMEOUT, ToleranceBand};
pub use desk::{Desk, DeskConfig};
pub use error::DeskError;
pub use hooks::{DeskListener, ListenerRegistry, NoopListener};
pub use monitor::{MonitorConfig, PositionMonitor};
pub use state::HeightState;
