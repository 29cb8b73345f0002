//! 反馈帧解析
//!
//! 控制盒以 4 字节为一帧持续上报状态，其中只有高度报告帧携带位置信息：
//!
//! ```text
//! byte[0]  byte[1]  byte[2]  byte[3]
//!   --       0x01     --     raw (25..=219)
//! ```
//!
//! 物理高度 = `28.1 + (raw - 25) / 10`。

use crate::constants::*;
use crate::FrameError;

/// 高度报告帧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeightFrame {
    raw: u8,
}

impl HeightFrame {
    /// 从原始高度单位构造
    pub fn from_raw(raw: u8) -> Result<Self, FrameError> {
        if !(MIN_RAW_HEIGHT..=MAX_RAW_HEIGHT).contains(&raw) {
            return Err(FrameError::RawOutOfRange { raw });
        }
        Ok(Self { raw })
    }

    /// 原始高度单位
    pub fn raw(&self) -> u8 {
        self.raw
    }

    /// 解码后的物理高度
    ///
    /// 同一个 raw 值总是得到位模式相同的 f32，"高度是否变化"按精确相等判断。
    pub fn height(&self) -> f32 {
        let offset = i32::from(self.raw) - i32::from(MIN_RAW_HEIGHT);
        BASE_HEIGHT + offset as f32 / RAW_UNITS_PER_HEIGHT
    }
}

impl TryFrom<&[u8]> for HeightFrame {
    type Error = FrameError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let [_, tag, _, raw] = bytes else {
            return Err(FrameError::InvalidLength {
                expected: FRAME_LEN,
                actual: bytes.len(),
            });
        };

        if *tag != HEIGHT_REPORT_TAG {
            return Err(FrameError::NotHeightReport { tag: *tag });
        }

        Self::from_raw(*raw)
    }
}

impl TryFrom<[u8; FRAME_LEN]> for HeightFrame {
    type Error = FrameError;

    fn try_from(bytes: [u8; FRAME_LEN]) -> Result<Self, Self::Error> {
        Self::try_from(&bytes[..])
    }
}

/// 解码一帧数据，非高度报告帧返回 `None`
pub fn decode_height(bytes: &[u8]) -> Option<f32> {
    HeightFrame::try_from(bytes).ok().map(|frame| frame.height())
}
