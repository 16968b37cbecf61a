//! Blob key generation.

use chrono::{DateTime, Utc};

/// Counter wraps here; four digits in the generated name.
const COUNTER_MODULUS: u32 = 10_000;

/// Produces `image-YYYY-MM-DD-HH-MM-SS-mmm-NNNN.<ext>` keys.
///
/// The millisecond timestamp plus a per-generator counter keeps two saves in
/// the same millisecond apart.
#[derive(Debug, Clone)]
pub struct FileNameGenerator {
    extension: String,
    counter: u32,
}

impl FileNameGenerator {
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            extension: extension.trim_start_matches('.').to_string(),
            counter: 0,
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Next key for an image saved at `now`.
    pub fn next_name(&mut self, now: DateTime<Utc>) -> String {
        let seq = self.counter;
        self.counter = (self.counter + 1) % COUNTER_MODULUS;
        format!(
            "image-{}-{seq:04}.{}",
            now.format("%Y-%m-%d-%H-%M-%S-%3f"),
            self.extension
        )
    }
}

impl Default for FileNameGenerator {
    fn default() -> Self {
        Self::new("jpg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn names_embed_millis_and_counter() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 7, 8, 9).unwrap()
            + chrono::TimeDelta::milliseconds(42);
        let mut names = FileNameGenerator::new(".png");
        assert_eq!(names.extension(), "png");

        assert_eq!(names.next_name(now), "image-2026-10-18-07-08-09-042-0000.png");
        assert_eq!(names.next_name(now), "image-2026-10-18-07-08-09-042-0001.png");
    }

    #[test]
    fn same_instant_never_repeats_within_counter_range() {
        let now = Utc::now();
        let mut names = FileNameGenerator::default();
        let generated: std::collections::HashSet<String> =
            (0..500).map(|_| names.next_name(now)).collect();
        assert_eq!(generated.len(), 500);
    }
}
