//! 桌面高度状态
//!
//! 只有位置监控线程写入，其他组件通过原子读取获取最新值。
//! 以 `f32` 的位模式存放在 `AtomicU32` 中，未收到第一帧之前为 NaN。

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// 当前高度（原子存储）
#[derive(Debug)]
pub struct HeightState {
    bits: AtomicU32,
    feedback_lost: AtomicBool,
}

impl Default for HeightState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeightState {
    pub fn new() -> Self {
        Self {
            bits: AtomicU32::new(f32::NAN.to_bits()),
            feedback_lost: AtomicBool::new(false),
        }
    }

    /// 当前高度，尚未收到有效帧时返回 `None`
    pub fn get(&self) -> Option<f32> {
        let height = self.raw();
        (!height.is_nan()).then_some(height)
    }

    /// 原始存储值（未知时为 NaN）
    ///
    /// 闭环控制直接使用 NaN：它与任何目标比较都为 false，控制循环自然保持空转。
    #[inline]
    pub fn raw(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// 写入新高度，返回旧值；新旧值完全相等时不写入并返回 `None`
    ///
    /// 比较为精确相等（非 epsilon），NaN 与任何值都不相等。
    pub(crate) fn update(&self, height: f32) -> Option<f32> {
        let previous = self.raw();
        if previous == height {
            return None;
        }
        self.bits.store(height.to_bits(), Ordering::Release);
        Some(previous)
    }

    /// 反馈链路是否已判定为断开
    pub fn is_feedback_lost(&self) -> bool {
        self.feedback_lost.load(Ordering::Acquire)
    }

    pub(crate) fn mark_feedback_lost(&self) {
        self.feedback_lost.store(true, Ordering::Release);
    }
}
