//! 固定高度模式（Fixed Height）
//!
//! [`FixedHeightListener`] 监听高度变化：每次变化都取消该监听器所有待执行的复位，
//! 若新高度偏离目标超过噪声阈值，则安排一次随机延迟后的复位
//! （停止 → 短暂停顿 → 调高回目标）。
//!
//! 待执行的复位保存在按 id 索引的表中，每个复位持有自己的一次性取消通道，
//! 触发或取消时从表中移除。复位一旦开始调高，取消不再生效。

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use rand::Rng;
use sitdown_driver::{Desk, DeskError, DeskListener};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 固定高度配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixHeightConfig {
    /// 偏离不超过该值视为噪声，不安排复位
    pub noise_threshold: f32,
    /// 复位延迟下界（含）
    pub min_delay: Duration,
    /// 复位延迟上界（不含）
    pub max_delay: Duration,
    /// 复位前停止后的停顿
    pub settle_pause: Duration,
}

impl Default for FixHeightConfig {
    fn default() -> Self {
        Self {
            noise_threshold: 0.3,
            min_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(30),
            settle_pause: Duration::from_millis(500),
        }
    }
}

impl FixHeightConfig {
    /// 在 `[min_delay, max_delay)` 内随机取一个延迟；区间为空时取下界
    fn random_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..self.max_delay)
    }
}

/// 固定高度监听器
pub struct FixedHeightListener {
    inner: Arc<Inner>,
}

struct Inner {
    // 弱引用：Desk 的监听器表持有本监听器
    desk: Weak<Desk>,
    target: f32,
    config: FixHeightConfig,
    resets: Mutex<PendingResets>,
    next_id: AtomicU64,
}

struct PendingResets {
    // 停用后不再安排新的复位
    active: bool,
    timers: HashMap<u64, Sender<()>>,
}

impl FixedHeightListener {
    pub fn new(desk: &Arc<Desk>, target: f32, config: FixHeightConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                desk: Arc::downgrade(desk),
                target,
                config,
                resets: Mutex::new(PendingResets {
                    active: true,
                    timers: HashMap::new(),
                }),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// 目标高度
    pub fn target(&self) -> f32 {
        self.inner.target
    }

    /// 尚未触发也未取消的复位数量
    pub fn pending(&self) -> usize {
        self.inner.resets.lock().timers.len()
    }

    /// 取消所有待执行的复位
    pub fn cancel_all(&self) {
        self.inner.cancel_all();
    }

    /// 停用：取消所有待执行的复位，之后的高度变化不再安排复位
    pub fn deactivate(&self) {
        self.inner.resets.lock().active = false;
        self.inner.cancel_all();
    }

    pub fn is_active(&self) -> bool {
        self.inner.resets.lock().active
    }
}

impl DeskListener for FixedHeightListener {
    fn on_height_changed(&self, height: f32) {
        self.inner.cancel_all();

        let deviation = (height - self.inner.target).abs();
        if deviation <= self.inner.config.noise_threshold {
            return;
        }
        Inner::schedule(&self.inner, deviation);
    }
}

impl Inner {
    fn cancel_all(&self) {
        let cancelled: Vec<_> = self.resets.lock().timers.drain().collect();
        for (id, cancel) in cancelled {
            debug!("Cancelling pending reset #{}", id);
            let _ = cancel.try_send(());
        }
    }

    fn schedule(this: &Arc<Self>, deviation: f32) {
        let id = this.next_id.fetch_add(1, Ordering::Relaxed);
        let delay = this.config.random_delay();
        let (cancel, cancelled) = bounded(1);
        {
            let mut resets = this.resets.lock();
            if !resets.active {
                return;
            }
            resets.timers.insert(id, cancel);
        }

        let inner = this.clone();
        let spawned = thread::Builder::new()
            .name(format!("sitdown-reset-{id}"))
            .spawn(move || match cancelled.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => inner.fire(id),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    debug!("Reset #{} abandoned", id);
                },
            });

        match spawned {
            Ok(_) => debug!(
                "Scheduled reset #{} to {:.1} in {:?} (off by {:.2})",
                id, this.target, delay, deviation
            ),
            Err(e) => {
                this.resets.lock().timers.remove(&id);
                warn!("Failed to schedule reset: {}", e);
            },
        }
    }

    fn fire(&self, id: u64) {
        // 已被取消（取消与超时竞争）则放弃
        if self.resets.lock().timers.remove(&id).is_none() {
            return;
        }
        let Some(desk) = self.desk.upgrade() else {
            return;
        };

        info!("Resetting desk to fixed height {:.1}", self.target);
        if let Err(e) = reset(&desk, self.target, self.config.settle_pause) {
            warn!("Fixed height reset failed: {}", e);
        }
    }
}

fn reset(desk: &Desk, target: f32, pause: Duration) -> Result<(), DeskError> {
    desk.stop()?;
    thread::sleep(pause);
    desk.change_to_height(target)?;
    Ok(())
}

/// 固定高度模式开关
///
/// 启用与禁用都会清空 Desk 的全部监听器；禁用同时取消当前监听器的待执行复位。
pub struct FixHeightMode {
    desk: Arc<Desk>,
    config: FixHeightConfig,
    active: Mutex<Option<Arc<FixedHeightListener>>>,
}

impl FixHeightMode {
    pub fn new(desk: Arc<Desk>, config: FixHeightConfig) -> Self {
        Self {
            desk,
            config,
            active: Mutex::new(None),
        }
    }

    /// 固定到 `target`（调用方负责校验范围）
    pub fn enable(&self, target: f32) {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            previous.deactivate();
        }
        self.desk.listeners().clear();

        let listener = Arc::new(FixedHeightListener::new(&self.desk, target, self.config));
        self.desk.listeners().add(listener.clone());
        *active = Some(listener);
        info!("Fixed height enabled at {:.1}", target);
    }

    pub fn disable(&self) {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            previous.deactivate();
        }
        self.desk.listeners().clear();
        info!("Fixed height disabled");
    }

    /// 当前固定的目标高度
    pub fn target(&self) -> Option<f32> {
        self.active.lock().as_ref().map(|l| l.target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitdown_driver::{ConvergenceConfig, DeskConfig, NoopListener};
    use sitdown_hw::Level;
    use sitdown_hw::mock::MockRelays;
    use std::time::Instant;

    fn config(delay: Duration) -> FixHeightConfig {
        FixHeightConfig {
            min_delay: delay,
            max_delay: delay,
            settle_pause: Duration::ZERO,
            ..Default::default()
        }
    }

    fn desk(relays: &MockRelays) -> Arc<Desk> {
        Arc::new(Desk::new(relays.clone(), DeskConfig::default()).unwrap())
    }

    #[test]
    fn test_random_delay_range() {
        let defaults = FixHeightConfig::default();
        for _ in 0..100 {
            let delay = defaults.random_delay();
            assert!(delay >= Duration::from_secs(10) && delay < Duration::from_secs(30));
        }
        assert_eq!(
            config(Duration::from_millis(5)).random_delay(),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_small_deviation_schedules_nothing() {
        let relays = MockRelays::new();
        let desk = desk(&relays);
        let listener = FixedHeightListener::new(&desk, 40.0, config(Duration::from_secs(60)));

        listener.on_height_changed(40.3);
        listener.on_height_changed(39.8);
        assert_eq!(listener.pending(), 0);
    }

    #[test]
    fn test_large_deviation_schedules_exactly_one() {
        let relays = MockRelays::new();
        let desk = desk(&relays);
        let listener = FixedHeightListener::new(&desk, 40.0, config(Duration::from_secs(60)));

        listener.on_height_changed(41.0);
        assert_eq!(listener.pending(), 1);

        // 新事件取消旧复位并重新安排
        listener.on_height_changed(41.1);
        assert_eq!(listener.pending(), 1);

        // 回到阈值内：全部取消
        listener.on_height_changed(40.1);
        assert_eq!(listener.pending(), 0);
    }

    #[test]
    fn test_cancelled_reset_never_fires() {
        let relays = MockRelays::new();
        let desk = desk(&relays);
        let listener = FixedHeightListener::new(&desk, 40.0, config(Duration::from_millis(50)));
        relays.clear_writes();

        listener.on_height_changed(42.0);
        listener.cancel_all();
        thread::sleep(Duration::from_millis(150));

        assert!(relays.writes().is_empty());
    }

    #[test]
    fn test_reset_fires_after_delay() {
        let relays = MockRelays::new();
        let desk = Arc::new(
            Desk::new(
                relays.clone(),
                DeskConfig {
                    convergence: ConvergenceConfig {
                        timeout: Some(Duration::from_millis(50)),
                    },
                },
            )
            .unwrap(),
        );
        let listener = FixedHeightListener::new(&desk, 40.0, config(Duration::from_millis(20)));
        relays.clear_writes();

        // 高度未知：调高空转到超时，这里只验证复位开始时先停止了桌子
        listener.on_height_changed(42.0);
        let deadline = Instant::now() + Duration::from_secs(2);
        while relays.writes().is_empty() {
            assert!(Instant::now() < deadline, "reset never fired");
            thread::sleep(Duration::from_millis(5));
        }

        let writes = relays.writes();
        assert!(writes[..2].iter().all(|w| w.level == Level::Inactive));
        assert_eq!(listener.pending(), 0);
    }

    #[test]
    fn test_replaced_reset_fires_once() {
        let relays = MockRelays::new();
        // 高度未知：每次复位 = 停止 2 次写入 + 调高超时后停止 2 次写入
        let desk = Arc::new(
            Desk::new(
                relays.clone(),
                DeskConfig {
                    convergence: ConvergenceConfig {
                        timeout: Some(Duration::from_millis(10)),
                    },
                },
            )
            .unwrap(),
        );
        let listener = FixedHeightListener::new(&desk, 40.0, config(Duration::from_millis(60)));
        relays.clear_writes();

        listener.on_height_changed(42.0);
        thread::sleep(Duration::from_millis(20));
        let replaced_at = Instant::now();
        listener.on_height_changed(42.5);
        assert_eq!(listener.pending(), 1);

        thread::sleep(Duration::from_millis(300));
        assert_eq!(listener.pending(), 0);
        let writes = relays.writes();
        assert_eq!(writes.len(), 4);
        assert!(writes.iter().all(|w| w.level == Level::Inactive));
        // 唯一一次复位来自第二个事件
        assert!(writes[0].at.duration_since(replaced_at) >= Duration::from_millis(60));
    }

    #[test]
    fn test_deactivated_listener_schedules_nothing() {
        let desk = desk(&MockRelays::new());
        let listener = FixedHeightListener::new(&desk, 40.0, config(Duration::from_secs(60)));
        listener.on_height_changed(45.0);
        assert_eq!(listener.pending(), 1);

        listener.deactivate();
        assert!(!listener.is_active());
        assert_eq!(listener.pending(), 0);
        listener.on_height_changed(46.0);
        assert_eq!(listener.pending(), 0);
    }

    #[test]
    fn test_mode_enable_and_disable_clear_listeners() {
        let desk = desk(&MockRelays::new());
        desk.listeners().add(Arc::new(NoopListener));
        desk.listeners().add(Arc::new(NoopListener));

        let mode = FixHeightMode::new(desk.clone(), config(Duration::from_secs(60)));
        mode.enable(41.0);
        assert_eq!(desk.listeners().len(), 1);
        assert_eq!(mode.target(), Some(41.0));

        mode.disable();
        assert!(desk.listeners().is_empty());
        assert_eq!(mode.target(), None);
    }
}
