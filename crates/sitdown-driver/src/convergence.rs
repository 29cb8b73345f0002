//! 调高闭环控制（ChangeToHeight）
//!
//! 持有移动锁，按照共享高度忙轮询，朝目标方向驱动继电器，
//! 直到当前高度落入容差带。
//!
//! 每轮都重新断言驱动方向（只写与记录电平不符的引脚），
//! 期间被无锁的 `stop` 打断后会在下一轮恢复驱动。
//!
//! 容差带的初始半宽为 0.75；若起始距离小于半宽，则不断乘以 0.75 缩小，
//! 保证桌子至少移动一次而不是原地"完成"。

use crate::actuator::Direction;
use crate::desk::Desk;
use crate::error::DeskError;
use sitdown_protocol::is_valid_target_height;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 容差带初始半宽
pub const INITIAL_TOLERANCE: f32 = 0.75;

/// 容差带收缩系数
pub const TOLERANCE_SHRINK_FACTOR: f32 = 0.75;

/// 默认收敛超时
pub const DEFAULT_CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(60);

/// 闭环控制配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceConfig {
    /// 收敛超时；`None` 表示无限等待
    pub timeout: Option<Duration>,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_CONVERGENCE_TIMEOUT),
        }
    }
}

/// 一次调高过程中的容差带 `[target - tol, target + tol]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceBand {
    target: f32,
    tolerance: f32,
}

impl ToleranceBand {
    /// 根据目标与起始高度计算容差带
    ///
    /// 起始高度未知（NaN）时距离比较为 false，保持初始半宽。
    pub fn around(target: f32, start: f32) -> Self {
        let distance = (target - start).abs();
        let mut tolerance = INITIAL_TOLERANCE;
        while distance < tolerance {
            let next = tolerance * TOLERANCE_SHRINK_FACTOR;
            // 最小非规格化数乘 0.75 仍舍入回自身，距离为 0 时在此收为 0
            if next >= tolerance {
                tolerance = 0.0;
                break;
            }
            tolerance = next;
        }
        Self { target, tolerance }
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn low(&self) -> f32 {
        self.target - self.tolerance
    }

    /// 上界（`on_height_set` 报告的值）
    pub fn high(&self) -> f32 {
        self.target + self.tolerance
    }

    /// 闭区间包含判断，NaN 不在任何带内
    pub fn contains(&self, height: f32) -> bool {
        self.low() <= height && height <= self.high()
    }

    /// 当前高度需要的驱动方向；相等或未知时为 `None`
    pub fn direction_for(&self, height: f32) -> Option<Direction> {
        if height > self.target {
            Some(Direction::Down)
        } else if height < self.target {
            Some(Direction::Up)
        } else {
            None
        }
    }
}

impl Desk {
    /// 闭环调整到目标高度
    ///
    /// 阻塞直到收敛、超时或反馈链路断开。成功时返回最终容差带的上界，
    /// 并在释放移动锁之前通知 `on_height_set`。
    ///
    /// # 错误
    ///
    /// - [`DeskError::InvalidInput`]: 目标不在 [28.1, 47.5]，不会触碰引脚
    /// - [`DeskError::DidNotConverge`]: 超时，桌子已停止
    /// - [`DeskError::MonitorStopped`]: 位置监控已退出，桌子已停止
    /// - [`DeskError::Halted`]: 已执行 [`Desk::cleanup`]
    /// - [`DeskError::Hw`]: 继电器写入失败，已尝试停止
    pub fn change_to_height(&self, target: f32) -> Result<f32, DeskError> {
        if !is_valid_target_height(target) {
            return Err(DeskError::InvalidInput(format!(
                "target height {target} outside [28.1, 47.5]"
            )));
        }

        let guard = self.actuator.lock();
        if self.is_halted() {
            return Err(DeskError::Halted);
        }
        let band = ToleranceBand::around(target, self.state.raw());
        let timeout = self.config.convergence.timeout;
        info!(
            "Changing height to {:.1} (band {:.3}..={:.3})",
            target,
            band.low(),
            band.high()
        );

        let started = Instant::now();
        loop {
            let height = self.state.raw();

            if band.contains(height) {
                guard.stop()?;
                info!(
                    "Height set to {:.1} after {:?} (target {:.1})",
                    height,
                    started.elapsed(),
                    target
                );
                self.listeners.notify_height_set(band.high());
                return Ok(band.high());
            }

            if self.state.is_feedback_lost() {
                guard.stop_quietly();
                warn!("Aborting height change: position feedback lost");
                return Err(DeskError::MonitorStopped);
            }

            if self.is_halted() {
                guard.stop_quietly();
                info!("Aborting height change: desk shut down");
                return Err(DeskError::Halted);
            }

            if let Some(limit) = timeout
                && started.elapsed() >= limit
            {
                guard.stop_quietly();
                let last_height = self.state.get();
                warn!(
                    "Height change to {:.1} did not converge within {:?} (last height {:?})",
                    target, limit, last_height
                );
                return Err(DeskError::DidNotConverge {
                    target,
                    last_height,
                    elapsed: started.elapsed(),
                });
            }

            if let Some(direction) = band.direction_for(height) {
                match guard.drive(direction) {
                    Ok(true) => debug!("Driving {} at {:.1}", direction, height),
                    Ok(false) => {},
                    Err(e) => {
                        guard.stop_quietly();
                        return Err(e.into());
                    },
                }
            }

            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_far_start_keeps_initial_tolerance() {
        let band = ToleranceBand::around(40.0, 30.0);
        assert_eq!(band.tolerance(), INITIAL_TOLERANCE);
        assert_eq!(band.high(), 40.75);
        assert!(band.contains(39.3));
        assert!(!band.contains(39.2));
    }

    #[test]
    fn test_near_start_shrinks_tolerance() {
        // 0.5 < 0.75 -> 0.5625 -> 0.421875
        let band = ToleranceBand::around(40.0, 39.5);
        assert_eq!(band.tolerance(), 0.421_875);
        assert!(!band.contains(39.5));
    }

    #[test]
    fn test_unknown_start_keeps_initial_tolerance() {
        let band = ToleranceBand::around(40.0, f32::NAN);
        assert_eq!(band.tolerance(), INITIAL_TOLERANCE);
        assert!(!band.contains(f32::NAN));
        assert_eq!(band.direction_for(f32::NAN), None);
    }

    #[test]
    fn test_zero_distance_terminates() {
        let band = ToleranceBand::around(40.0, 40.0);
        assert_eq!(band.tolerance(), 0.0);
        assert!(band.contains(40.0));
    }

    #[test]
    fn test_direction_for() {
        let band = ToleranceBand::around(40.0, 30.0);
        assert_eq!(band.direction_for(41.0), Some(Direction::Down));
        assert_eq!(band.direction_for(39.0), Some(Direction::Up));
        assert_eq!(band.direction_for(40.0), None);
    }

    proptest! {
        #[test]
        fn prop_band_excludes_start(target in 28.1f32..=47.5, start in 28.1f32..=47.5) {
            prop_assume!(target != start);
            let band = ToleranceBand::around(target, start);
            prop_assert!(band.tolerance() <= INITIAL_TOLERANCE);
            prop_assert!(band.tolerance() > 0.0);
            prop_assert!(band.tolerance() <= (target - start).abs());
            prop_assert!(band.low() <= band.target() && band.target() <= band.high());
        }

        #[test]
        fn prop_shrink_is_monotonic(
            target in 28.1f32..=47.5,
            distance in 1e-3f32..10.0,
            above in any::<bool>(),
        ) {
            let start = if above { target + distance } else { target - distance };
            let actual = (target - start).abs();
            prop_assume!(actual > 0.0);

            let band = ToleranceBand::around(target, start);
            let tolerance = band.tolerance();
            prop_assert!(tolerance > 0.0);
            if actual >= INITIAL_TOLERANCE {
                prop_assert_eq!(tolerance, INITIAL_TOLERANCE);
            } else {
                // 停在第一个不超过距离的半宽上：再放大一级就超过距离（允许一次舍入）
                prop_assert!(tolerance <= actual);
                prop_assert!(tolerance / TOLERANCE_SHRINK_FACTOR > actual * (1.0 - 1e-6));
            }

            // 起点越近，半宽越小
            let nearer = ToleranceBand::around(target, target + actual / 2.0);
            prop_assert!(nearer.tolerance() <= tolerance);
        }
    }
}
