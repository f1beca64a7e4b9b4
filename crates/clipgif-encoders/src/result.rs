use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Backend, OutputFormat};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingMetadata {
    pub frame_count:        usize,
    pub width:              u32,
    pub height:             u32,
    pub format:             OutputFormat,
    pub encoder:            Backend,
    pub encoding_time:      Duration,
    pub average_frame_time: Duration,
    pub file_size:          usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Estimated as `frames * width * height * 4` bytes.
    pub peak_memory_usage: u64,
    /// `1 - file_size / raw_size`, in `[0, 1]`.
    pub efficiency:        f64,
    pub recommendations:   Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingResult {
    pub bytes:       Vec<u8>,
    pub metadata:    EncodingMetadata,
    pub performance: PerformanceReport,
}

impl PerformanceReport {
    pub(crate) fn assess(
        frame_count: usize,
        width: u32,
        height: u32,
        file_size: usize,
        elapsed: Duration,
        slow_threshold: Duration,
    ) -> Self {
        let raw = frame_count as u64 * u64::from(width) * u64::from(height) * 4;
        let efficiency = if raw == 0 {
            0.0
        } else {
            (1.0 - file_size as f64 / raw as f64).clamp(0.0, 1.0)
        };

        let mut recommendations = Vec::new();
        if elapsed > slow_threshold {
            recommendations.push(format!(
                "Encoding took {:.1}s; consider a shorter clip to reduce the \
                 number of frames",
                elapsed.as_secs_f64()
            ));
            recommendations.push(
                "Consider a lower resolution or quality preset to speed up \
                 encoding"
                    .to_owned(),
            );
        }

        Self {
            peak_memory_usage: raw,
            efficiency,
            recommendations,
        }
    }
}
