//! 守护进程配置
//!
//! TOML 文件，所有字段都有默认值，缺省的节或字段取默认：
//!
//! ```toml
//! [serial]
//! port = "/dev/serial0"
//! baud_rate = 9600
//! inter_char_timeout_ms = 100
//! idle_warn_after_secs = 30
//!
//! [pins]
//! raise = 16
//! lower = 12
//!
//! [motion]
//! convergence_timeout_ms = 60000   # 0 表示不设超时
//!
//! [toll]
//! check_interval_ms = 10000
//! raise_ms = 800
//! lower_ms = 850
//! pause_ms = 500
//!
//! [fixheight]
//! noise_threshold = 0.3
//! min_delay_ms = 10000
//! max_delay_ms = 30000
//! settle_pause_ms = 500
//! ```
//!
//! 查找顺序：`--config` 指定的文件 → `./sitdown.toml` → 用户配置目录下的
//! `sitdown/sitdown.toml` → 内置默认值。

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use sitdown_control::{FixHeightConfig, TollConfig};
use sitdown_driver::{ConvergenceConfig, DeskConfig, MonitorConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 当前目录下的配置文件名
pub const LOCAL_CONFIG_FILE: &str = "sitdown.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub serial: SerialSection,
    pub pins: PinsSection,
    pub motion: MotionSection,
    pub toll: TollSection,
    pub fixheight: FixHeightSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialSection {
    pub port: PathBuf,
    pub baud_rate: u32,
    pub inter_char_timeout_ms: u64,
    pub idle_warn_after_secs: u64,
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            port: PathBuf::from("/dev/serial0"),
            baud_rate: 9600,
            inter_char_timeout_ms: 100,
            idle_warn_after_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PinsSection {
    pub raise: u32,
    pub lower: u32,
}

impl Default for PinsSection {
    fn default() -> Self {
        Self {
            raise: 16,
            lower: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotionSection {
    pub convergence_timeout_ms: u64,
}

impl Default for MotionSection {
    fn default() -> Self {
        Self {
            convergence_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TollSection {
    pub check_interval_ms: u64,
    pub raise_ms: u64,
    pub lower_ms: u64,
    pub pause_ms: u64,
}

impl Default for TollSection {
    fn default() -> Self {
        Self {
            check_interval_ms: 10_000,
            raise_ms: 800,
            lower_ms: 850,
            pause_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixHeightSection {
    pub noise_threshold: f32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub settle_pause_ms: u64,
}

impl Default for FixHeightSection {
    fn default() -> Self {
        Self {
            noise_threshold: 0.3,
            min_delay_ms: 10_000,
            max_delay_ms: 30_000,
            settle_pause_ms: 500,
        }
    }
}

impl DaemonConfig {
    /// 解析 TOML 文本并校验
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// 按查找顺序加载配置，返回配置与实际使用的文件（使用默认值时为 `None`）
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::read(path)?, Some(path.to_path_buf())));
        }

        for candidate in search_paths() {
            if candidate.is_file() {
                let config = Self::read(&candidate)?;
                return Ok((config, Some(candidate)));
            }
        }
        Ok((Self::default(), None))
    }

    fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("In config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.pins.raise == self.pins.lower {
            bail!("pins.raise and pins.lower must differ (both {})", self.pins.raise);
        }
        if !(self.fixheight.noise_threshold.is_finite() && self.fixheight.noise_threshold >= 0.0) {
            bail!(
                "fixheight.noise_threshold must be a non-negative number, got {}",
                self.fixheight.noise_threshold
            );
        }
        if self.fixheight.min_delay_ms > self.fixheight.max_delay_ms {
            bail!(
                "fixheight.min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.fixheight.min_delay_ms,
                self.fixheight.max_delay_ms
            );
        }
        if self.toll.check_interval_ms == 0 {
            bail!("toll.check_interval_ms must be positive");
        }
        Ok(())
    }

    pub fn desk_config(&self) -> DeskConfig {
        let timeout = match self.motion.convergence_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        DeskConfig {
            convergence: ConvergenceConfig { timeout },
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            idle_warn_after: Duration::from_secs(self.serial.idle_warn_after_secs),
            ..Default::default()
        }
    }

    pub fn toll_config(&self) -> TollConfig {
        TollConfig {
            check_interval: Duration::from_millis(self.toll.check_interval_ms),
            raise: Duration::from_millis(self.toll.raise_ms),
            lower: Duration::from_millis(self.toll.lower_ms),
            pause: Duration::from_millis(self.toll.pause_ms),
        }
    }

    pub fn fixheight_config(&self) -> FixHeightConfig {
        FixHeightConfig {
            noise_threshold: self.fixheight.noise_threshold,
            min_delay: Duration::from_millis(self.fixheight.min_delay_ms),
            max_delay: Duration::from_millis(self.fixheight.max_delay_ms),
            settle_pause: Duration::from_millis(self.fixheight.settle_pause_ms),
        }
    }

    #[cfg(target_os = "linux")]
    pub fn serial_config(&self) -> sitdown_hw::SerialConfig {
        sitdown_hw::SerialConfig {
            port: self.serial.port.clone(),
            baud_rate: self.serial.baud_rate,
            inter_char_timeout: Duration::from_millis(self.serial.inter_char_timeout_ms),
        }
    }

    #[cfg(target_os = "linux")]
    pub fn relay_pins(&self) -> sitdown_hw::RelayPins {
        sitdown_hw::RelayPins {
            raise: self.pins.raise,
            lower: self.pins.lower,
        }
    }
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("sitdown").join(LOCAL_CONFIG_FILE));
    }
    paths
}
