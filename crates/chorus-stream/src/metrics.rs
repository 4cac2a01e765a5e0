//! Performance accounting for a completed stream (§4.9 step 5).

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamMetrics {
    pub elapsed_secs: f64,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub tokens_per_sec: f64,
}

impl StreamMetrics {
    pub fn compute(elapsed_secs: f64, tokens_in: u32, tokens_out: u32) -> Self {
        let tokens_per_sec = if elapsed_secs > 0.0 {
            tokens_out as f64 / elapsed_secs
        } else {
            0.0
        };
        Self {
            elapsed_secs,
            tokens_in,
            tokens_out,
            tokens_per_sec,
        }
    }

    /// One-line footer suitable for appending to a final embed/message.
    pub fn footer(&self) -> String {
        format!(
            "{:.1}s · {} in / {} out · {:.1} tok/s",
            self.elapsed_secs, self.tokens_in, self.tokens_out, self.tokens_per_sec
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_tokens_per_sec() {
        let m = StreamMetrics::compute(2.0, 100, 50);
        assert_eq!(m.tokens_per_sec, 25.0);
    }

    #[test]
    fn zero_elapsed_avoids_div_by_zero() {
        let m = StreamMetrics::compute(0.0, 10, 10);
        assert_eq!(m.tokens_per_sec, 0.0);
    }

    #[test]
    fn footer_formats_reasonably() {
        let m = StreamMetrics::compute(1.5, 20, 40);
        let footer = m.footer();
        assert!(footer.contains("1.5s"));
        assert!(footer.contains("tok/s"));
    }
}
