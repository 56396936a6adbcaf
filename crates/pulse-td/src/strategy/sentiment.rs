//! News-sentiment strategy — the news channel's signal source.
//!
//! Maps a sentiment score in [0, 100] through two thresholds: above the
//! bullish threshold is BUY, below the bearish threshold is SELL, anything
//! between (inclusive of both thresholds) is HOLD. Input validation lives
//! at the frame parser; this type only classifies.

use pulse_core::types::Action;

pub struct SentimentStrategy {
    bearish_threshold: u8,
    bullish_threshold: u8,
}

impl SentimentStrategy {
    pub fn new(bearish_threshold: u8, bullish_threshold: u8) -> Self {
        Self { bearish_threshold, bullish_threshold }
    }

    pub fn classify(&self, sentiment: u8) -> Action {
        if sentiment > self.bullish_threshold {
            Action::Buy
        } else if sentiment < self.bearish_threshold {
            Action::Sell
        } else {
            Action::Hold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds() {
        let s = SentimentStrategy::new(40, 60);
        assert_eq!(s.classify(15), Action::Sell);
        assert_eq!(s.classify(67), Action::Buy);
        assert_eq!(s.classify(50), Action::Hold);
    }

    #[test]
    fn thresholds_are_exclusive() {
        let s = SentimentStrategy::new(40, 60);
        assert_eq!(s.classify(40), Action::Hold);
        assert_eq!(s.classify(60), Action::Hold);
        assert_eq!(s.classify(39), Action::Sell);
        assert_eq!(s.classify(61), Action::Buy);
    }

    #[test]
    fn custom_thresholds() {
        let s = SentimentStrategy::new(9, 14);
        assert_eq!(s.classify(4), Action::Sell);
        assert_eq!(s.classify(10), Action::Hold);
        assert_eq!(s.classify(15), Action::Buy);
        assert_eq!(s.classify(50), Action::Buy);
    }
}
