// ============================================================
// Layer 3 — ImageChw Domain Type
// ============================================================
// A framework-free image handed to summary writers.
// Values are raw model-space floats (normalised pixels or
// reconstructions); writers decide how to map them to bytes.

#[derive(Debug, Clone, PartialEq)]
pub struct ImageChw {
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
    /// Flat CHW buffer
    pub data:     Vec<f32>,
}

impl ImageChw {
    pub fn new(channels: usize, height: usize, width: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), channels * height * width);
        Self { channels, height, width, data }
    }

    pub fn at(&self, channel: usize, y: usize, x: usize) -> f32 {
        self.data[(channel * self.height + y) * self.width + x]
    }

    /// (min, max) over every value, ignoring NaN
    pub fn value_range(&self) -> (f32, f32) {
        self.data
            .iter()
            .filter(|v| !v.is_nan())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_indexes_chw() {
        let img = ImageChw::new(2, 2, 3, (0..12).map(|v| v as f32).collect());
        assert_eq!(img.at(0, 1, 2), 5.0);
        assert_eq!(img.at(1, 0, 0), 6.0);
    }

    #[test]
    fn test_value_range_skips_nan() {
        let img = ImageChw::new(1, 1, 3, vec![f32::NAN, -1.0, 2.0]);
        assert_eq!(img.value_range(), (-1.0, 2.0));
    }
}
