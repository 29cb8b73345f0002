//! Desk 上下文
//!
//! 一个 `Desk` 拥有高度状态、移动锁、继电器和监听器注册表，
//! 通过 `Arc<Desk>` 在命令分发、位置监控和后台任务之间共享。

use crate::actuator::{Actuator, Direction};
use crate::convergence::ConvergenceConfig;
use crate::error::DeskError;
use crate::hooks::ListenerRegistry;
use crate::state::HeightState;
use sitdown_hw::RelayOutputs;
use sitdown_protocol::MAX_MOVE_DURATION_MS;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Desk 配置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeskConfig {
    pub convergence: ConvergenceConfig,
}

/// 升降桌
pub struct Desk {
    pub(crate) state: HeightState,
    pub(crate) actuator: Actuator,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) config: DeskConfig,
    // cleanup 之后拒绝一切移动
    halted: AtomicBool,
}

impl std::fmt::Debug for Desk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Desk")
            .field("height", &self.state.get())
            .field("actuator", &self.actuator)
            .field("listeners", &self.listeners)
            .field("config", &self.config)
            .finish()
    }
}

impl Desk {
    /// 接管继电器并立即停止桌子
    ///
    /// 继电器无法写入时返回错误（启动阶段的致命错误）。
    pub fn new(relays: impl RelayOutputs + 'static, config: DeskConfig) -> Result<Self, DeskError> {
        Ok(Self {
            state: HeightState::new(),
            actuator: Actuator::new(relays)?,
            listeners: ListenerRegistry::new(),
            config,
            halted: AtomicBool::new(false),
        })
    }

    /// 当前高度；尚未收到反馈时为 `None`
    pub fn height(&self) -> Option<f32> {
        self.state.get()
    }

    /// 高度状态（只读）
    pub fn state(&self) -> &HeightState {
        &self.state
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    /// 是否有移动操作正在进行
    pub fn is_moving(&self) -> bool {
        self.actuator.is_moving()
    }

    /// 反馈链路是否已断开
    pub fn is_feedback_lost(&self) -> bool {
        self.state.is_feedback_lost()
    }

    /// 是否已执行 [`Desk::cleanup`]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// 上升指定时长
    pub fn raise_for(&self, duration: Duration) -> Result<(), DeskError> {
        self.move_for(Direction::Up, duration)
    }

    /// 下降指定时长
    pub fn lower_for(&self, duration: Duration) -> Result<(), DeskError> {
        self.move_for(Direction::Down, duration)
    }

    /// 朝指定方向移动指定时长（0 ~ 10 秒）
    ///
    /// 持有移动锁期间阻塞休眠，结束后停止、释放锁，
    /// 再通知 `on_raised` / `on_lowered`。
    pub fn move_for(&self, direction: Direction, duration: Duration) -> Result<(), DeskError> {
        if duration > Duration::from_millis(MAX_MOVE_DURATION_MS) {
            return Err(DeskError::InvalidInput(format!(
                "move duration {duration:?} exceeds {MAX_MOVE_DURATION_MS}ms"
            )));
        }

        {
            let guard = self.actuator.lock();
            if self.is_halted() {
                return Err(DeskError::Halted);
            }
            info!("Moving {} for {:?}", direction, duration);
            if let Err(e) = guard.press(direction) {
                guard.stop_quietly();
                return Err(e.into());
            }
            spin_sleep::sleep(duration);
            guard.stop()?;
        }

        match direction {
            Direction::Up => self.listeners.notify_raised(),
            Direction::Down => self.listeners.notify_lowered(),
        }
        Ok(())
    }

    /// 立即停止（不需要移动锁，幂等）
    pub fn stop(&self) -> Result<(), DeskError> {
        self.actuator.stop()?;
        Ok(())
    }

    /// 停止桌子并释放继电器资源
    ///
    /// 之后所有移动操作返回 [`DeskError::Halted`]。进行中的调高在下一轮退出，
    /// 进行中的定时移动已被停止，本方法等它释放移动锁后再释放继电器。
    pub fn cleanup(&self) -> Result<(), DeskError> {
        self.halted.store(true, Ordering::Release);
        self.actuator.stop()?;
        let guard = self.actuator.lock();
        guard.stop()?;
        self.actuator.release()?;
        drop(guard);
        info!("Desk relays released");
        Ok(())
    }

    /// 由位置监控调用：记录新高度，变化时通知监听器
    pub(crate) fn record_height(&self, height: f32) {
        if let Some(previous) = self.state.update(height) {
            info!("Height changed to {:.1} from {:.1}", height, previous);
            self.listeners.notify_height_changed(height);
        }
    }

    /// 由位置监控调用：反馈链路断开
    pub(crate) fn feedback_lost(&self) {
        self.state.mark_feedback_lost();
        if let Err(e) = self.actuator.stop() {
            warn!("Failed to stop desk after feedback loss: {}", e);
        }
    }
}

impl Drop for Desk {
    fn drop(&mut self) {
        if let Err(e) = self.actuator.stop() {
            warn!("Failed to stop desk on drop: {}", e);
        }
    }
}
