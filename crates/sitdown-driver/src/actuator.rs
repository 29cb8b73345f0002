//! 继电器执行器
//!
//! 持有两路继电器输出和移动锁（MovementLock）。
//!
//! 任何会驱动引脚的操作都必须先通过 [`Actuator::lock`] 拿到 [`MovementGuard`]，
//! 引脚级的升/降原语只在 guard 上提供，编译期保证不会绕过移动锁。
//! 唯一的例外是 [`Actuator::stop`]：停止总是安全的，不需要锁。
//!
//! 执行器记录每路最近一次成功写入的电平；[`MovementGuard::drive`] 只写与之不符的引脚，
//! 因此闭环控制可以每轮重新断言方向，被无锁的 `stop` 打断后会立即恢复驱动。

use parking_lot::{Mutex, MutexGuard};
use sitdown_hw::{HwError, Level, Relay, RelayOutputs};
use tracing::{trace, warn};

/// 运动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// 该方向对应的继电器
    pub fn relay(self) -> Relay {
        match self {
            Direction::Up => Relay::Raise,
            Direction::Down => Relay::Lower,
        }
    }

    fn opposite(self) -> Relay {
        match self {
            Direction::Up => Relay::Lower,
            Direction::Down => Relay::Raise,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// 继电器执行器
pub struct Actuator {
    movement: Mutex<()>,
    outputs: Mutex<Outputs>,
}

struct Outputs {
    relays: Box<dyn RelayOutputs>,
    raise: Level,
    lower: Level,
}

impl Outputs {
    fn level(&self, relay: Relay) -> Level {
        match relay {
            Relay::Raise => self.raise,
            Relay::Lower => self.lower,
        }
    }

    /// 写入成功后才更新记录
    fn write(&mut self, relay: Relay, level: Level) -> Result<(), HwError> {
        self.relays.set(relay, level)?;
        match relay {
            Relay::Raise => self.raise = level,
            Relay::Lower => self.lower = level,
        }
        Ok(())
    }
}

impl std::fmt::Debug for Actuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actuator")
            .field("moving", &self.movement.is_locked())
            .finish_non_exhaustive()
    }
}

impl Actuator {
    /// 接管继电器，并立即将两路都置为无效电平
    pub fn new(relays: impl RelayOutputs + 'static) -> Result<Self, HwError> {
        let actuator = Self {
            movement: Mutex::new(()),
            outputs: Mutex::new(Outputs {
                relays: Box::new(relays),
                raise: Level::Inactive,
                lower: Level::Inactive,
            }),
        };
        actuator.stop()?;
        Ok(actuator)
    }

    /// 获取移动锁（阻塞，无超时、无排队优先级）
    pub fn lock(&self) -> MovementGuard<'_> {
        MovementGuard {
            _movement: self.movement.lock(),
            actuator: self,
        }
    }

    /// 当前是否有移动操作持有锁
    pub fn is_moving(&self) -> bool {
        self.movement.is_locked()
    }

    /// 停止：两路都置为无效电平（幂等，不需要移动锁）
    pub fn stop(&self) -> Result<(), HwError> {
        let mut outputs = self.outputs.lock();
        let raise = outputs.write(Relay::Raise, Level::Inactive);
        let lower = outputs.write(Relay::Lower, Level::Inactive);
        trace!("Relays stopped");
        raise.and(lower)
    }

    /// 释放继电器硬件资源
    pub fn release(&self) -> Result<(), HwError> {
        self.outputs.lock().relays.release()
    }

    /// 指定继电器最近一次成功写入的电平
    pub fn level(&self, relay: Relay) -> Level {
        self.outputs.lock().level(relay)
    }
}

/// 移动锁凭证
///
/// 持有期间其他移动操作阻塞；drop 时释放锁。
/// drop 不会自动停止桌子，调用方负责在释放前调用 [`MovementGuard::stop`]。
pub struct MovementGuard<'a> {
    _movement: MutexGuard<'a, ()>,
    actuator: &'a Actuator,
}

impl MovementGuard<'_> {
    /// 只把指定方向的继电器置为有效（定时升降使用）
    pub fn press(&self, direction: Direction) -> Result<(), HwError> {
        self.actuator
            .outputs
            .lock()
            .write(direction.relay(), Level::Active)
    }

    /// 朝指定方向驱动：反方向置为无效，本方向置为有效（闭环控制使用）
    ///
    /// 只写电平与记录不符的引脚，返回是否发生了写入。
    pub fn drive(&self, direction: Direction) -> Result<bool, HwError> {
        let mut outputs = self.actuator.outputs.lock();
        let mut written = false;
        if outputs.level(direction.opposite()) != Level::Inactive {
            outputs.write(direction.opposite(), Level::Inactive)?;
            written = true;
        }
        if outputs.level(direction.relay()) != Level::Active {
            outputs.write(direction.relay(), Level::Active)?;
            written = true;
        }
        Ok(written)
    }

    /// 停止
    pub fn stop(&self) -> Result<(), HwError> {
        self.actuator.stop()
    }

    /// 出错路径上的停止：失败只记录日志
    pub(crate) fn stop_quietly(&self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop desk: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitdown_hw::mock::MockRelays;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_new_drives_both_inactive() {
        let relays = MockRelays::new();
        let _actuator = Actuator::new(relays.clone()).unwrap();

        let writes = relays.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().all(|w| w.level == Level::Inactive));
    }

    #[test]
    fn test_press_and_drive() {
        let relays = MockRelays::new();
        let actuator = Actuator::new(relays.clone()).unwrap();
        relays.clear_writes();

        let guard = actuator.lock();
        guard.press(Direction::Up).unwrap();
        assert_eq!(relays.level(Relay::Raise), Level::Active);
        assert_eq!(relays.writes().len(), 1);

        guard.drive(Direction::Down).unwrap();
        assert_eq!(relays.level(Relay::Raise), Level::Inactive);
        assert_eq!(relays.level(Relay::Lower), Level::Active);

        guard.stop().unwrap();
        assert_eq!(relays.level(Relay::Lower), Level::Inactive);
    }

    #[test]
    fn test_stop_is_idempotent_and_lock_free() {
        let relays = MockRelays::new();
        let actuator = Actuator::new(relays.clone()).unwrap();

        let _guard = actuator.lock();
        // 持锁期间仍可停止
        actuator.stop().unwrap();
        actuator.stop().unwrap();
        assert_eq!(relays.level(Relay::Raise), Level::Inactive);
        assert_eq!(relays.level(Relay::Lower), Level::Inactive);
    }

    #[test]
    fn test_lock_blocks_second_mover() {
        let actuator = Arc::new(Actuator::new(MockRelays::new()).unwrap());
        let guard = actuator.lock();
        assert!(actuator.is_moving());

        let other = actuator.clone();
        let waiter = thread::spawn(move || {
            let _guard = other.lock();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.join().unwrap();
        assert!(!actuator.is_moving());
    }

    #[test]
    fn test_drive_reasserts_after_stop() {
        let relays = MockRelays::new();
        let actuator = Actuator::new(relays.clone()).unwrap();
        relays.clear_writes();

        let guard = actuator.lock();
        assert!(guard.drive(Direction::Up).unwrap());
        assert!(!guard.drive(Direction::Up).unwrap());
        assert_eq!(relays.writes().len(), 1);

        // 无锁停止之后再次驱动会重新写入
        actuator.stop().unwrap();
        assert_eq!(actuator.level(Relay::Raise), Level::Inactive);
        assert!(guard.drive(Direction::Up).unwrap());
        assert_eq!(relays.level(Relay::Raise), Level::Active);
        assert_eq!(actuator.level(Relay::Raise), Level::Active);
        assert_eq!(relays.writes().len(), 4);
    }

    #[test]
    fn test_failed_write_keeps_previous_level() {
        let relays = MockRelays::new();
        let actuator = Actuator::new(relays.clone()).unwrap();
        let guard = actuator.lock();

        relays.fail_writes(true);
        assert!(guard.drive(Direction::Down).is_err());
        assert_eq!(actuator.level(Relay::Lower), Level::Inactive);

        relays.fail_writes(false);
        assert!(guard.drive(Direction::Down).unwrap());
        assert_eq!(relays.level(Relay::Lower), Level::Active);
    }

    #[test]
    fn test_stop_reports_write_failure() {
        let relays = MockRelays::new();
        let actuator = Actuator::new(relays.clone()).unwrap();
        relays.fail_writes(true);
        assert!(actuator.stop().is_err());
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Up.to_string(), "up");
        assert_eq!(Direction::Down.relay(), Relay::Lower);
    }
}
