use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::Error, frame::Frame};

/// GIF limits each logical screen side to 16 bits.
pub const MAX_DIMENSION: u32 = u16::MAX as u32;
pub const MAX_FRAME_RATE: u32 = 60;

/// Browsers clamp shorter delays, so nothing below this is ever written.
const MIN_DELAY_CS: u16 = 2;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Gif,
    Mp4,
    Webm,
}

impl OutputFormat {
    /// Formats some back-end can actually produce.
    pub const SUPPORTED: &'static [Self] = &[Self::Gif];

    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(<&'static str>::from(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
    /// 1 (worst) to 100 (best); out of range values are clamped.
    Numeric(u8),
}

/// Where a back-end places the symbolic presets on its 1-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityScale {
    pub low:    u8,
    pub medium: u8,
    pub high:   u8,
}

impl Quality {
    pub fn scaled(self, scale: QualityScale) -> u8 {
        match self {
            Self::Low => scale.low,
            Self::Medium => scale.medium,
            Self::High => scale.high,
            Self::Numeric(value) => value.clamp(1, 100),
        }
    }

    /// Fraction of the source dimensions a capture at this quality keeps.
    pub fn scale_factor(self) -> f64 {
        match self {
            Self::Low => 0.5,
            Self::Medium => 0.75,
            Self::High => 1.0,
            Self::Numeric(value) => {
                (f64::from(value.clamp(1, 100)) / 100.0).max(0.25)
            },
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::Medium
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => other.parse::<u32>().map_or_else(
                |_| Err(Error::invalid(format!("unknown quality {s:?}"))),
                |value| Ok(Self::Numeric(value.clamp(1, 100) as u8)),
            ),
        }
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
            Self::Numeric(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingOptions {
    pub width:      u32,
    pub height:     u32,
    pub frame_rate: u32,
    pub quality:    Quality,
    pub looping:    bool,
    pub format:     OutputFormat,
}

impl EncodingOptions {
    pub fn new(width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            width,
            height,
            frame_rate,
            quality: Quality::default(),
            looping: true,
            format: OutputFormat::Gif,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(1..=MAX_DIMENSION).contains(&self.width)
            || !(1..=MAX_DIMENSION).contains(&self.height)
        {
            return Err(Error::invalid(format!(
                "output dimensions must be within 1..={MAX_DIMENSION}, got \
                 {}x{}",
                self.width, self.height
            )));
        }
        if !(1..=MAX_FRAME_RATE).contains(&self.frame_rate) {
            return Err(Error::invalid(format!(
                "frame rate must be within 1..={MAX_FRAME_RATE}, got {}",
                self.frame_rate
            )));
        }
        if !self.format.is_supported() {
            return Err(Error::FormatNotSupported(self.format));
        }

        Ok(())
    }

    /// Display delay for `frame` in centiseconds, falling back to the frame
    /// rate when the frame does not carry its own.
    pub fn delay_cs(&self, frame: &Frame) -> u16 {
        let cs = if frame.delay_ms() > 0 {
            (f64::from(frame.delay_ms()) / 10.0).round()
        } else {
            (100.0 / f64::from(self.frame_rate.max(1))).round()
        };

        (cs as u16).max(MIN_DELAY_CS)
    }
}
