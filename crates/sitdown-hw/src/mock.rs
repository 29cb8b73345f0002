//! Mock 硬件实现
//!
//! 供上层 crate 在无硬件环境下测试：
//! - [`MockRelays`]: 记录每一次引脚写入
//! - [`ScriptedFeedback`]: 按脚本返回串口数据，可在运行时追加
//! - [`SimulatedDesk`]: 根据继电器状态移动的桌子模型，同时提供继电器与反馈端口

use crate::{HwError, Level, Relay, RelayOutputs};
use parking_lot::Mutex;
use sitdown_protocol::{HEIGHT_REPORT_TAG, MAX_RAW_HEIGHT, MIN_RAW_HEIGHT};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 一次引脚写入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinWrite {
    pub relay: Relay,
    pub level: Level,
    pub at: Instant,
}

#[derive(Debug)]
struct RelayState {
    raise: Level,
    lower: Level,
    writes: Vec<PinWrite>,
    fail_writes: bool,
    released: bool,
}

impl Default for RelayState {
    fn default() -> Self {
        Self {
            raise: Level::Inactive,
            lower: Level::Inactive,
            writes: Vec::new(),
            fail_writes: false,
            released: false,
        }
    }
}

impl RelayState {
    fn apply(&mut self, relay: Relay, level: Level) -> Result<(), HwError> {
        if self.fail_writes {
            return Err(HwError::gpio(0, "simulated write failure"));
        }
        match relay {
            Relay::Raise => self.raise = level,
            Relay::Lower => self.lower = level,
        }
        self.writes.push(PinWrite {
            relay,
            level,
            at: Instant::now(),
        });
        Ok(())
    }
}

/// 记录型继电器
///
/// `Clone` 得到的句柄共享同一份状态，测试中保留一份用于断言。
#[derive(Debug, Clone, Default)]
pub struct MockRelays {
    state: Arc<Mutex<RelayState>>,
}

impl MockRelays {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前电平
    pub fn level(&self, relay: Relay) -> Level {
        let state = self.state.lock();
        match relay {
            Relay::Raise => state.raise,
            Relay::Lower => state.lower,
        }
    }

    /// 所有写入记录（按时间顺序）
    pub fn writes(&self) -> Vec<PinWrite> {
        self.state.lock().writes.clone()
    }

    /// 清空写入记录
    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// 让后续写入全部失败
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// 是否调用过 `release()`
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }
}

impl RelayOutputs for MockRelays {
    fn set(&mut self, relay: Relay, level: Level) -> Result<(), HwError> {
        self.state.lock().apply(relay, level)
    }

    fn release(&mut self) -> Result<(), HwError> {
        let mut state = self.state.lock();
        state.apply(Relay::Raise, Level::Inactive)?;
        state.apply(Relay::Lower, Level::Inactive)?;
        state.released = true;
        Ok(())
    }
}

/// 反馈脚本中的一步
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStep {
    /// 返回这些字节（长度不足 4 即为短读）
    Bytes(Vec<u8>),
    /// 返回 `Ok(0)`
    Eof,
    /// 返回指定类型的 IO 错误
    Fail(io::ErrorKind),
}

/// 构造一个高度报告帧
pub fn height_frame(raw: u8) -> Vec<u8> {
    vec![0x98, HEIGHT_REPORT_TAG, 0x00, raw]
}

/// 脚本化反馈端口
///
/// 脚本耗尽后一直返回 `Ok(0)`（EOF），与无数据时的串口行为一致。
#[derive(Debug, Clone, Default)]
pub struct ScriptedFeedback {
    steps: Arc<Mutex<VecDeque<ReadStep>>>,
    reads: Arc<Mutex<usize>>,
}

impl ScriptedFeedback {
    pub fn new(steps: impl IntoIterator<Item = ReadStep>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into_iter().collect())),
            reads: Arc::new(Mutex::new(0)),
        }
    }

    /// 追加一步（测试线程在监控线程运行时使用）
    pub fn push(&self, step: ReadStep) {
        self.steps.lock().push_back(step);
    }

    /// 追加一个高度报告帧
    pub fn push_height(&self, raw: u8) {
        self.push(ReadStep::Bytes(height_frame(raw)));
    }

    /// 尚未消费的步数
    pub fn pending(&self) -> usize {
        self.steps.lock().len()
    }

    /// 已发生的读取次数
    pub fn reads(&self) -> usize {
        *self.reads.lock()
    }
}

impl io::Read for ScriptedFeedback {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        *self.reads.lock() += 1;
        match self.steps.lock().pop_front() {
            Some(ReadStep::Bytes(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            },
            Some(ReadStep::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
            Some(ReadStep::Eof) | None => Ok(0),
        }
    }
}

#[derive(Debug)]
struct DeskModel {
    raw: u8,
    relays: RelayState,
}

impl DeskModel {
    /// 单步移动：只有一路有效时才移动
    fn step(&mut self) {
        match (self.relays.raise, self.relays.lower) {
            (Level::Active, Level::Inactive) if self.raw < MAX_RAW_HEIGHT => self.raw += 1,
            (Level::Inactive, Level::Active) if self.raw > MIN_RAW_HEIGHT => self.raw -= 1,
            _ => {},
        }
    }
}

/// 模拟桌子
///
/// 每次读取反馈前先按当前继电器状态移动一个原始单位（0.1），
/// 然后返回一个高度报告帧。`tick` 控制反馈帧间隔。
#[derive(Debug, Clone)]
pub struct SimulatedDesk {
    model: Arc<Mutex<DeskModel>>,
    tick: Duration,
}

impl SimulatedDesk {
    pub fn new(start_raw: u8, tick: Duration) -> Self {
        Self {
            model: Arc::new(Mutex::new(DeskModel {
                raw: start_raw.clamp(MIN_RAW_HEIGHT, MAX_RAW_HEIGHT),
                relays: RelayState::default(),
            })),
            tick,
        }
    }

    /// 当前原始高度
    pub fn raw(&self) -> u8 {
        self.model.lock().raw
    }

    /// 继电器写入记录
    pub fn writes(&self) -> Vec<PinWrite> {
        self.model.lock().relays.writes.clone()
    }

    /// 继电器句柄
    pub fn relays(&self) -> SimulatedRelays {
        SimulatedRelays {
            model: self.model.clone(),
        }
    }

    /// 反馈端口句柄
    pub fn feedback(&self) -> SimulatedFeedback {
        SimulatedFeedback {
            model: self.model.clone(),
            tick: self.tick,
        }
    }
}

/// [`SimulatedDesk`] 的继电器端
#[derive(Debug, Clone)]
pub struct SimulatedRelays {
    model: Arc<Mutex<DeskModel>>,
}

impl RelayOutputs for SimulatedRelays {
    fn set(&mut self, relay: Relay, level: Level) -> Result<(), HwError> {
        self.model.lock().relays.apply(relay, level)
    }
}

/// [`SimulatedDesk`] 的反馈端
#[derive(Debug, Clone)]
pub struct SimulatedFeedback {
    model: Arc<Mutex<DeskModel>>,
    tick: Duration,
}

impl io::Read for SimulatedFeedback {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        std::thread::sleep(self.tick);
        let raw = {
            let mut model = self.model.lock();
            model.step();
            model.raw
        };
        let frame = height_frame(raw);
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(n)
    }
}
