//! 整点"敲钟"模式（Bell Toll）
//!
//! 启用后后台线程每隔 `check_interval` 醒来一次，比较当前小时（12 小时制，`hour % 12`）
//! 与上次记录的小时；变化时执行 `hour` 次"升-停-降-停"循环。
//!
//! 取消信号通过通道送达线程的等待点：正在进行的循环不会被打断，
//! 线程在下一次等待时收到信号后退出。

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use sitdown_driver::{Desk, DeskError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 时钟抽象（测试中替换为固定小时）
pub trait Clock: Send + Sync {
    /// 当前本地小时（0..=23）
    fn hour(&self) -> u32;
}

/// 系统本地时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn hour(&self) -> u32 {
        use chrono::Timelike;
        chrono::Local::now().hour()
    }
}

/// 敲钟配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TollConfig {
    /// 检查小时的间隔
    pub check_interval: Duration,
    /// 每次上升时长
    pub raise: Duration,
    /// 每次下降时长
    pub lower: Duration,
    /// 升、降之后的停顿
    pub pause: Duration,
}

impl Default for TollConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            raise: Duration::from_millis(800),
            lower: Duration::from_millis(850),
            pause: Duration::from_millis(500),
        }
    }
}

struct TollTask {
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

/// 敲钟任务控制器
///
/// 同一时刻最多运行一个任务实例；禁用后再启用会启动一个全新的实例。
pub struct BellToll {
    desk: Arc<Desk>,
    clock: Arc<dyn Clock>,
    config: TollConfig,
    task: Mutex<Option<TollTask>>,
}

impl BellToll {
    pub fn new(desk: Arc<Desk>, clock: Arc<dyn Clock>, config: TollConfig) -> Self {
        Self {
            desk,
            clock,
            config,
            task: Mutex::new(None),
        }
    }

    /// 启动敲钟任务
    ///
    /// 已在运行时不做任何事并返回 `Ok(false)`。
    pub fn enable(&self) -> Result<bool, DeskError> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            debug!("Bell toll already enabled");
            return Ok(false);
        }

        let (cancel, cancelled) = bounded(1);
        let desk = self.desk.clone();
        let clock = self.clock.clone();
        let config = self.config;
        let handle = thread::Builder::new()
            .name("sitdown-toll".into())
            .spawn(move || toll_loop(&desk, clock.as_ref(), config, &cancelled))
            .map_err(|e| DeskError::Thread(format!("failed to spawn toll thread: {e}")))?;

        *task = Some(TollTask { cancel, handle });
        info!("Bell toll enabled");
        Ok(true)
    }

    /// 发送一次性取消信号，不等待线程退出
    ///
    /// 未运行时返回 `false`。
    pub fn disable(&self) -> bool {
        match self.task.lock().take() {
            Some(task) => {
                let _ = task.cancel.try_send(());
                info!("Bell toll disabled");
                true
            },
            None => false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }
}

impl Drop for BellToll {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            let _ = task.cancel.try_send(());
            if task.handle.join().is_err() {
                error!("Bell toll thread panicked");
            }
        }
    }
}

fn toll_loop(desk: &Desk, clock: &dyn Clock, config: TollConfig, cancelled: &Receiver<()>) {
    let mut last_hour: Option<u32> = None;
    loop {
        match cancelled.recv_timeout(config.check_interval) {
            Err(RecvTimeoutError::Timeout) => {},
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let hour = clock.hour() % 12;
        if last_hour == Some(hour) {
            continue;
        }
        last_hour = Some(hour);

        info!("Tolling {} times", hour);
        for cycle in 1..=hour {
            if let Err(e) = toll_once(desk, &config) {
                warn!("Bell toll cycle {}/{} failed: {}", cycle, hour, e);
                break;
            }
        }
    }
    debug!("Bell toll task exited");
}

fn toll_once(desk: &Desk, config: &TollConfig) -> Result<(), DeskError> {
    desk.raise_for(config.raise)?;
    thread::sleep(config.pause);
    desk.lower_for(config.lower)?;
    thread::sleep(config.pause);
    Ok(())
}
