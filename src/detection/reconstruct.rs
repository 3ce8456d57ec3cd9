use crate::models::Detection;

/// Detections below this confidence never reach the reading.
pub const CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Digits shown before the decimal point on the default "XX.XX" display.
pub const DEFAULT_INTEGER_DIGITS: usize = 2;

/// Result of turning one photo's detections into a reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconstruction {
    /// The detector found nothing at all.
    NoObjects,
    /// Symbols were found but none cleared the confidence threshold.
    LowConfidence,
    Reading(String),
}

/// Rebuilds the number shown on a scale display from digit and point detections.
#[derive(Debug, Clone)]
pub struct DigitReconstructor {
    pub confidence_threshold: f32,
    /// Where to insert a decimal point the detector missed. `None` leaves the digits alone.
    pub integer_digits: Option<usize>,
}

impl DigitReconstructor {
    pub fn new() -> Self {
        Self {
            confidence_threshold: CONFIDENCE_THRESHOLD,
            integer_digits: Some(DEFAULT_INTEGER_DIGITS),
        }
    }

    pub fn with_integer_digits(mut self, integer_digits: Option<usize>) -> Self {
        self.integer_digits = integer_digits;
        self
    }

    pub fn reconstruct(&self, detections: &[Detection]) -> Reconstruction {
        if detections.is_empty() {
            return Reconstruction::NoObjects;
        }

        let mut kept: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .collect();

        if kept.is_empty() {
            return Reconstruction::LowConfidence;
        }

        // stable, so boxes sharing a center keep their input order
        kept.sort_by(|a, b| a.bbox.center_x().total_cmp(&b.bbox.center_x()));

        let raw: String = kept.iter().map(|d| d.symbol()).collect();
        Reconstruction::Reading(self.apply_decimal_format(raw))
    }

    /// Insert the decimal point after `integer_digits` characters when none was detected.
    pub fn apply_decimal_format(&self, raw: String) -> String {
        match self.integer_digits {
            Some(n) if n > 0 && raw.len() > n && !raw.contains('.') => {
                format!("{}.{}", &raw[..n], &raw[n..])
            }
            _ => raw,
        }
    }
}

impl Default for DigitReconstructor {
    fn default() -> Self {
        Self::new()
    }
}
