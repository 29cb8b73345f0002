//! Linux 串口适配器
//!
//! 以原始模式打开控制盒所在的 UART（树莓派上为 `/dev/serial0`），
//! 8N1、无流控，`VMIN = 0` + `VTIME` 实现字符间超时：
//! 没有数据时 `read` 在超时后返回 `Ok(0)`，由监控线程按 EOF 处理。

use crate::HwError;
use nix::sys::termios::{self, BaudRate, ControlFlags, SetArg, SpecialCharacterIndices};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// 串口配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// 设备路径
    pub port: PathBuf,
    /// 波特率（bps）
    pub baud_rate: u32,
    /// 字符间超时
    pub inter_char_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: PathBuf::from("/dev/serial0"),
            baud_rate: 9600,
            inter_char_timeout: Duration::from_millis(100),
        }
    }
}

fn baud_rate(rate: u32) -> Result<BaudRate, HwError> {
    Ok(match rate {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        other => return Err(HwError::UnsupportedBaudRate(other)),
    })
}

/// `VTIME` 以 0.1s 为单位，取值 1..=255
fn vtime(timeout: Duration) -> u8 {
    let deciseconds = timeout.as_millis().div_ceil(100);
    deciseconds.clamp(1, u128::from(u8::MAX)) as u8
}

/// 原始模式串口
#[derive(Debug)]
pub struct SerialPort {
    file: File,
}

impl SerialPort {
    /// 打开并配置串口
    ///
    /// # 错误
    /// - `HwError::Io`: 设备不存在或无权限
    /// - `HwError::Termios`: termios 配置失败
    /// - `HwError::UnsupportedBaudRate`: 波特率不在支持列表中
    pub fn open(config: &SerialConfig) -> Result<Self, HwError> {
        let speed = baud_rate(config.baud_rate)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&config.port)?;

        let mut tio = termios::tcgetattr(&file)?;
        termios::cfmakeraw(&mut tio);
        termios::cfsetspeed(&mut tio, speed)?;

        // 8N1，无硬件流控，忽略调制解调器控制线
        tio.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
        tio.control_flags &=
            !(ControlFlags::CSTOPB | ControlFlags::PARENB | ControlFlags::CRTSCTS);

        tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        tio.control_chars[SpecialCharacterIndices::VTIME as usize] =
            vtime(config.inter_char_timeout);

        termios::tcsetattr(&file, SetArg::TCSANOW, &tio)?;
        termios::tcflush(&file, termios::FlushArg::TCIFLUSH)?;

        info!(
            "Serial port {} opened at {} bps",
            config.port.display(),
            config.baud_rate
        );

        Ok(Self { file })
    }
}

impl io::Read for SerialPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.file, buf)
    }
}
