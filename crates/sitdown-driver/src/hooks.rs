//! 监听器系统（Listener Registry）
//!
//! 桌子状态变化时按注册顺序同步调用各监听器：
//!
//! | 事件 | 触发方 | 线程 |
//! |------|--------|------|
//! | `on_raised` / `on_lowered` | 定时升降结束、释放移动锁之后 | 调用方线程 |
//! | `on_height_set` | 调高收敛后、释放移动锁之前 | 调用方线程 |
//! | `on_height_changed` | 位置监控解码出新高度 | 监控线程 |
//!
//! # 性能要求
//!
//! 回调在产生事件的线程上同步执行，必须尽快返回。
//! 需要做耗时工作（例如再次移动桌子）的监听器应当自行派发到其他线程。
//!
//! # 实现
//!
//! 列表存放在 `ArcSwap` 中：触发时读取快照后在锁外调用，
//! 因此回调内部再调用 `add()` / `clear()` 不会死锁，修改只影响下一次触发。
//!
//! ```rust
//! use sitdown_driver::hooks::{DeskListener, ListenerRegistry};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! #[derive(Default)]
//! struct CountRaises(AtomicU32);
//!
//! impl DeskListener for CountRaises {
//!     fn on_raised(&self) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//! }
//!
//! let registry = ListenerRegistry::new();
//! let counter = Arc::new(CountRaises::default());
//! registry.add(counter.clone());
//! registry.notify_raised();
//! assert_eq!(counter.0.load(Ordering::Relaxed), 1);
//! ```

use arc_swap::ArcSwap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// 桌子事件监听器
///
/// 所有方法都有空实现，只需覆盖关心的事件。
pub trait DeskListener: Send + Sync {
    /// 定时上升结束
    fn on_raised(&self) {}

    /// 定时下降结束
    fn on_lowered(&self) {}

    /// 调高完成
    ///
    /// 参数为最终容差带的上界，而不是目标高度或实际高度。
    fn on_height_set(&self, height: f32) {
        let _ = height;
    }

    /// 高度发生变化（监控线程调用，频率很高）
    fn on_height_changed(&self, height: f32) {
        let _ = height;
    }
}

/// 空监听器
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl DeskListener for NoopListener {}

/// 监听器注册表
pub struct ListenerRegistry {
    listeners: ArcSwap<Vec<Arc<dyn DeskListener>>>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// 追加监听器（保持注册顺序）
    pub fn add(&self, listener: Arc<dyn DeskListener>) {
        self.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(listener.clone());
            next
        });
    }

    /// 移除所有监听器
    pub fn clear(&self) {
        self.listeners.store(Arc::new(Vec::new()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.load().is_empty()
    }

    pub fn notify_raised(&self) {
        self.each("on_raised", |l| l.on_raised());
    }

    pub fn notify_lowered(&self) {
        self.each("on_lowered", |l| l.on_lowered());
    }

    pub fn notify_height_set(&self, height: f32) {
        self.each("on_height_set", |l| l.on_height_set(height));
    }

    pub fn notify_height_changed(&self, height: f32) {
        self.each("on_height_changed", |l| l.on_height_changed(height));
    }

    /// 依次调用每个监听器；单个监听器 panic 不影响其余监听器和调用线程
    fn each(&self, event: &str, f: impl Fn(&dyn DeskListener)) {
        let snapshot = self.listeners.load_full();
        for (index, listener) in snapshot.iter().enumerate() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(listener.as_ref())));
            if result.is_err() {
                error!("Listener #{} panicked in {}", index, event);
            }
        }
    }
}
