//! 位置监控（PositionMonitor）
//!
//! 后台线程不断从串口读取 4 字节反馈帧，解码出高度写入 [`HeightState`]，
//! 高度变化时在本线程上同步通知所有监听器。
//!
//! 错误分类：
//! - 短读 / EOF / 瞬时 IO 错误：等待 `idle_delay` 后重试，永不致命
//! - 非高度报告帧、原始值越界：忽略
//! - 其他 IO 错误：反馈链路断开，停止桌子、标记 `feedback_lost`，
//!   通过 [`PositionMonitor::failures`] 上报给宿主进程，然后线程退出
//!
//! [`HeightState`]: crate::state::HeightState

use crate::desk::Desk;
use crate::error::DeskError;
use crossbeam_channel::{Receiver, Sender, bounded};
use sitdown_hw::{FeedbackPort, is_transient};
use sitdown_protocol::{FRAME_LEN, HeightFrame};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 监控配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// 短读 / EOF 后的等待时间
    pub idle_delay: Duration,
    /// 连续无有效帧超过该时长时告警（每段空闲期只告警一次）
    pub idle_warn_after: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            idle_delay: Duration::from_millis(50),
            idle_warn_after: Duration::from_secs(30),
        }
    }
}

/// 位置监控线程句柄
///
/// drop 时请求线程退出并等待其结束（最多等待一次串口读超时）。
pub struct PositionMonitor {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    failures: Receiver<DeskError>,
}

impl PositionMonitor {
    /// 启动监控线程
    pub fn start(
        desk: Arc<Desk>,
        port: impl FeedbackPort + 'static,
        config: MonitorConfig,
    ) -> Result<Self, DeskError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (failure_tx, failures) = bounded(1);

        let shutdown_clone = shutdown.clone();
        let handle = thread::Builder::new()
            .name("sitdown-monitor".into())
            .spawn(move || {
                monitor_loop(port, &desk, config, &shutdown_clone, &failure_tx);
            })
            .map_err(|e| DeskError::Thread(format!("failed to spawn monitor thread: {e}")))?;

        info!("Position monitor started");
        Ok(Self {
            handle: Some(handle),
            shutdown,
            failures,
        })
    }

    /// 致命错误通道
    ///
    /// 监控线程因链路断开退出时会发送一次 [`DeskError::SerialLink`]。
    pub fn failures(&self) -> &Receiver<DeskError> {
        &self.failures
    }

    /// 监控线程是否仍在运行
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 请求退出并等待线程结束
    pub fn shutdown(mut self) {
        self.stop_thread();
    }

    fn stop_thread(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("Position monitor thread panicked");
        }
    }
}

impl Drop for PositionMonitor {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

fn monitor_loop(
    mut port: impl FeedbackPort,
    desk: &Desk,
    config: MonitorConfig,
    shutdown: &AtomicBool,
    failures: &Sender<DeskError>,
) {
    let mut buf = [0u8; FRAME_LEN];
    let mut last_frame = Instant::now();
    let mut idle_reported = false;

    while !shutdown.load(Ordering::Acquire) {
        match port.read(&mut buf) {
            Ok(FRAME_LEN) => match HeightFrame::try_from(&buf[..]) {
                Ok(frame) => {
                    last_frame = Instant::now();
                    if idle_reported {
                        info!("Serial feedback resumed");
                        idle_reported = false;
                    }
                    desk.record_height(frame.height());
                },
                Err(e) => trace!("Ignoring frame {:02x?}: {}", buf, e),
            },
            Ok(n) => {
                trace!("Short read ({} bytes), retrying", n);
                idle(&config, last_frame, &mut idle_reported);
            },
            Err(e) if is_transient(&e) => {
                debug!("Transient serial error: {}", e);
                idle(&config, last_frame, &mut idle_reported);
            },
            Err(e) => {
                error!("Serial feedback link lost: {}", e);
                desk.feedback_lost();
                // 容量为 1 且只发送一次，不会阻塞
                let _ = failures.try_send(DeskError::SerialLink(e));
                return;
            },
        }
    }

    debug!("Position monitor stopped");
}

fn idle(config: &MonitorConfig, last_frame: Instant, idle_reported: &mut bool) {
    let elapsed = last_frame.elapsed();
    if !*idle_reported && elapsed >= config.idle_warn_after {
        warn!("No height report from serial feedback for {:?}", elapsed);
        *idle_reported = true;
    }
    thread::sleep(config.idle_delay);
}
