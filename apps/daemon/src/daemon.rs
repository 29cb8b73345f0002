//! 守护进程主循环
//!
//! 线程划分：
//! - 监控线程：`PositionMonitor`，解码串口反馈
//! - 输入线程：逐行读取标准输入并同步分发命令（移动命令会阻塞该线程）
//! - 主线程：等待退出事件（`exit`、信号、反馈链路断开）后清理

use crate::config::DaemonConfig;
use anyhow::{Context, Result};
use crossbeam_channel::{Sender, select, unbounded};
use sitdown_control::{Controller, LocalClock};
use sitdown_driver::{Desk, DeskError, PositionMonitor};
use sitdown_hw::{FeedbackPort, RelayOutputs};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

/// 主线程等待的事件
#[derive(Debug)]
enum Event {
    /// 收到 Ctrl+C / SIGTERM
    Signal,
    /// 输入 `exit`
    Exit,
}

/// 仅复位继电器后退出（继电器卡住时使用）
pub fn reset(relays: impl RelayOutputs + 'static) -> Result<()> {
    let desk = Desk::new(relays, Default::default()).context("Failed to drive relays inactive")?;
    desk.cleanup().context("Failed to release relays")?;
    info!("Relays reset to inactive");
    Ok(())
}

/// 桌面控制模式：阻塞直到退出
pub fn run(
    config: &DaemonConfig,
    relays: impl RelayOutputs + 'static,
    port: impl FeedbackPort + 'static,
) -> Result<()> {
    let desk = Arc::new(Desk::new(relays, config.desk_config()).context("Failed to set up desk")?);
    let monitor = PositionMonitor::start(desk.clone(), port, config.monitor_config())?;
    let controller = Arc::new(Controller::new(
        desk.clone(),
        Arc::new(LocalClock),
        config.toll_config(),
        config.fixheight_config(),
    ));

    let (events_tx, events) = unbounded();
    let signal_tx = events_tx.clone();
    ctrlc::set_handler(move || {
        let _ = signal_tx.send(Event::Signal);
    })
    .context("Failed to install signal handler")?;

    spawn_command_reader(controller.clone(), events_tx)?;
    info!("Desk control ready, reading commands from stdin");

    let outcome = select! {
        recv(events) -> event => {
            match event {
                Ok(Event::Signal) => info!("Cleaning up from signal handler"),
                Ok(Event::Exit) => info!("Exit requested"),
                Err(_) => warn!("Event channel closed"),
            }
            Ok(())
        },
        recv(monitor.failures()) -> failure => {
            let err = failure.unwrap_or(DeskError::MonitorStopped);
            error!("Position monitor failed: {}", err);
            Err(anyhow::Error::new(err).context("Serial feedback link lost"))
        },
    };

    controller.shutdown();
    monitor.shutdown();
    if let Err(e) = desk.cleanup() {
        warn!("Cleanup failed: {}", e);
    }
    outcome
}

fn spawn_command_reader(controller: Arc<Controller>, events: Sender<Event>) -> Result<()> {
    thread::Builder::new()
        .name("sitdown-stdin".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Failed to read command: {}", e);
                        break;
                    },
                };
                let command = line.trim();
                if command.is_empty() {
                    continue;
                }
                if command.eq_ignore_ascii_case("exit") {
                    let _ = events.send(Event::Exit);
                    return;
                }
                if let Some(reply) = controller.dispatch(command) {
                    let mut stdout = io::stdout().lock();
                    let _ = writeln!(stdout, "{reply}");
                }
            }
            // 以服务方式运行时 stdin 通常立即关闭，继续等待信号
            debug!("stdin closed, commands disabled");
        })
        .context("Failed to spawn command reader")?;
    Ok(())
}
