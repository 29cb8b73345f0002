//! sitdownd 主入口
//!
//! 启动流程：加载配置 → 接管继电器 GPIO → 打开串口 → 启动位置监控 → 读取命令。

mod config;
mod daemon;

use anyhow::{Context, Result};
use clap::Parser;
use config::DaemonConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// 升降桌控制守护进程
///
/// 从标准输入逐行读取命令：`move up|down [ms]`、`set <height>`、
/// `belltoll enable|disable`、`fixheight enable|disable|<height>`、`height`、`exit`。
#[derive(Parser, Debug)]
#[command(name = "sitdownd", version)]
#[command(about = "Sitdown desk controller daemon", long_about = None)]
struct Args {
    /// 配置文件路径
    ///
    /// 默认依次查找 ./sitdown.toml 与用户配置目录下的 sitdown/sitdown.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 只把继电器复位为无效电平后退出（继电器卡住时使用）
    #[arg(short, long)]
    reset: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let (config, source) = DaemonConfig::load(args.config.as_deref())?;
    match source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    start(&config, args.reset)
}

#[cfg(target_os = "linux")]
fn start(config: &DaemonConfig, reset_only: bool) -> Result<()> {
    use sitdown_hw::{SerialPort, SysfsRelays};

    let relays = SysfsRelays::open(config.relay_pins()).context("Failed to claim relay GPIOs")?;
    if reset_only {
        return daemon::reset(relays);
    }

    let serial = config.serial_config();
    let port = SerialPort::open(&serial)
        .with_context(|| format!("Failed to open serial port {}", serial.port.display()))?;
    daemon::run(config, relays, port)
}

#[cfg(not(target_os = "linux"))]
fn start(_config: &DaemonConfig, _reset_only: bool) -> Result<()> {
    anyhow::bail!("sitdownd drives sysfs GPIO and termios serial, which require Linux")
}
