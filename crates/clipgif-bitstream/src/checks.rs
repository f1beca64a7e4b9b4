use crate::BitstreamMetadata;

/// Header, logical screen descriptor and trailer.
const MIN_OVERHEAD: usize = 13 + 1;
/// Smallest possible image descriptor, code size and terminator per frame.
const MIN_FRAME: usize = 12;
/// Largest color table plus control and application extensions per frame.
const MAX_FRAME_OVERHEAD: usize = 768 + 30;

impl BitstreamMetadata {
    pub fn resolution_matches(&self, width: u32, height: u32, tolerance: u32) -> bool {
        self.width.abs_diff(width) <= tolerance && self.height.abs_diff(height) <= tolerance
    }

    /// `tolerance` is in seconds.
    pub fn duration_matches(&self, expected: f64, tolerance: f64) -> bool {
        (self.duration - expected).abs() <= tolerance
    }

    pub fn fps_matches(&self, expected: f64, tolerance: f64) -> bool {
        (self.fps - expected).abs() <= tolerance
    }

    /// Compares width/height ratios; `tolerance` is an absolute difference.
    pub fn aspect_ratio_preserved(
        &self,
        source_width: u32,
        source_height: u32,
        tolerance: f64,
    ) -> bool {
        if self.height == 0 || source_height == 0 {
            return false;
        }
        let ours = f64::from(self.width) / f64::from(self.height);
        let theirs = f64::from(source_width) / f64::from(source_height);
        (ours - theirs).abs() <= tolerance
    }

    /// Whether the file size is possible for this many frames at this
    /// resolution: at least the fixed overhead per frame, at most every
    /// pixel costing two bytes plus a local palette.
    pub fn file_size_plausible(&self) -> bool {
        let pixels = self.width as usize * self.height as usize;
        let lower = MIN_OVERHEAD + self.frame_count * MIN_FRAME;
        let upper = MIN_OVERHEAD
            + 768
            + self.frame_count * (MAX_FRAME_OVERHEAD + pixels * 2);
        (lower..=upper).contains(&self.file_size)
    }
}
