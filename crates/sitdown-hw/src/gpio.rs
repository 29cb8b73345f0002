//! sysfs GPIO 继电器适配器
//!
//! 通过 `/sys/class/gpio` 导出两路引脚并配置为输出。
//! 导出时直接写入 `direction = high`，保证引脚在成为输出的瞬间就处于无效电平，
//! 不会让桌子在启动时抖动一下。

use crate::{HwError, Level, Relay, RelayOutputs};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// sysfs GPIO 根目录
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

/// 导出后等待 udev 调整权限的重试次数
const EXPORT_RETRIES: u32 = 20;
const EXPORT_RETRY_DELAY: Duration = Duration::from_millis(25);

/// 继电器引脚编号（BCM）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPins {
    pub raise: u32,
    pub lower: u32,
}

impl Default for RelayPins {
    fn default() -> Self {
        Self {
            raise: 16,
            lower: 12,
        }
    }
}

#[derive(Debug)]
struct SysfsLine {
    pin: u32,
    value: File,
}

impl SysfsLine {
    fn export(root: &Path, pin: u32) -> Result<Self, HwError> {
        let dir = root.join(format!("gpio{pin}"));
        if !dir.exists() {
            fs::write(root.join("export"), pin.to_string())
                .map_err(|e| HwError::gpio(pin, format!("export failed: {e}")))?;
        }

        let direction = dir.join("direction");
        let mut attempts = 0;
        loop {
            match fs::write(&direction, b"high") {
                Ok(()) => break,
                Err(e)
                    if attempts < EXPORT_RETRIES
                        && matches!(
                            e.kind(),
                            io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound
                        ) =>
                {
                    attempts += 1;
                    std::thread::sleep(EXPORT_RETRY_DELAY);
                },
                Err(e) => {
                    return Err(HwError::gpio(pin, format!("set direction failed: {e}")));
                },
            }
        }

        let value = OpenOptions::new()
            .write(true)
            .open(dir.join("value"))
            .map_err(|e| HwError::gpio(pin, format!("open value failed: {e}")))?;

        debug!("GPIO {} exported as output (inactive)", pin);
        Ok(Self { pin, value })
    }

    fn write(&self, level: Level) -> Result<(), HwError> {
        self.value
            .write_all_at(level.physical(), 0)
            .map_err(|e| HwError::gpio(self.pin, format!("write failed: {e}")))
    }
}

/// sysfs 继电器输出
#[derive(Debug)]
pub struct SysfsRelays {
    root: PathBuf,
    raise: SysfsLine,
    lower: SysfsLine,
    released: bool,
}

impl SysfsRelays {
    /// 在默认 sysfs 根目录下导出引脚
    pub fn open(pins: RelayPins) -> Result<Self, HwError> {
        Self::open_at(DEFAULT_SYSFS_ROOT, pins)
    }

    /// 在指定根目录下导出引脚
    pub fn open_at(root: impl Into<PathBuf>, pins: RelayPins) -> Result<Self, HwError> {
        let root = root.into();
        let raise = SysfsLine::export(&root, pins.raise)?;
        let lower = SysfsLine::export(&root, pins.lower)?;
        Ok(Self {
            root,
            raise,
            lower,
            released: false,
        })
    }

    fn line(&self, relay: Relay) -> &SysfsLine {
        match relay {
            Relay::Raise => &self.raise,
            Relay::Lower => &self.lower,
        }
    }
}

impl RelayOutputs for SysfsRelays {
    fn set(&mut self, relay: Relay, level: Level) -> Result<(), HwError> {
        self.line(relay).write(level)
    }

    fn release(&mut self) -> Result<(), HwError> {
        if self.released {
            return Ok(());
        }
        self.raise.write(Level::Inactive)?;
        self.lower.write(Level::Inactive)?;

        for pin in [self.raise.pin, self.lower.pin] {
            fs::write(self.root.join("unexport"), pin.to_string())
                .map_err(|e| HwError::gpio(pin, format!("unexport failed: {e}")))?;
        }
        self.released = true;
        Ok(())
    }
}

impl Drop for SysfsRelays {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release relay GPIOs: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(pins: &[u32]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for pin in pins {
            let dir = root.path().join(format!("gpio{pin}"));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("direction"), b"in").unwrap();
            fs::write(dir.join("value"), b"0").unwrap();
        }
        root
    }

    fn read(root: &Path, pin: u32, file: &str) -> String {
        fs::read_to_string(root.join(format!("gpio{pin}")).join(file)).unwrap()
    }

    #[test]
    fn test_open_configures_outputs_inactive() {
        let root = fake_sysfs(&[16, 12]);
        let _relays = SysfsRelays::open_at(root.path(), RelayPins::default()).unwrap();
        assert_eq!(read(root.path(), 16, "direction"), "high");
        assert_eq!(read(root.path(), 12, "direction"), "high");
    }

    #[test]
    fn test_set_is_active_low() {
        let root = fake_sysfs(&[16, 12]);
        let mut relays = SysfsRelays::open_at(root.path(), RelayPins::default()).unwrap();

        relays.set(Relay::Raise, Level::Active).unwrap();
        assert_eq!(read(root.path(), 16, "value"), "0");

        relays.set(Relay::Raise, Level::Inactive).unwrap();
        assert_eq!(read(root.path(), 16, "value"), "1");
    }

    #[test]
    fn test_release_unexports_once() {
        let root = fake_sysfs(&[16, 12]);
        let mut relays = SysfsRelays::open_at(root.path(), RelayPins::default()).unwrap();
        relays.set(Relay::Lower, Level::Active).unwrap();

        relays.release().unwrap();
        assert_eq!(read(root.path(), 12, "value"), "1");
        assert!(root.path().join("unexport").exists());

        // Drop 不应再次写入
        fs::remove_file(root.path().join("unexport")).unwrap();
        drop(relays);
        assert!(!root.path().join("unexport").exists());
    }

    #[test]
    fn test_missing_sysfs_is_error() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("no-gpio-here");
        let err = SysfsRelays::open_at(&missing, RelayPins::default()).unwrap_err();
        assert!(matches!(err, HwError::Gpio { pin: 16, .. }), "{err}");
    }
}
