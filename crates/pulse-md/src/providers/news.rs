//! Synthetic news sentiment provider.
//!
//! Emits `symbol,sentiment*` frames with uniform sentiment in [0, 100] for a
//! uniformly chosen symbol, paced by a fixed interval. With a limit the
//! provider is finite; without one it runs until the server shuts down.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pulse_core::framing::frame;
use pulse_core::provider::{DataProvider, Fetch};

pub struct RandomNewsProvider {
    symbols: Vec<String>,
    rng: StdRng,
    interval: Duration,
    next_emit: Instant,
    remaining: Option<u64>,
    delimiter: u8,
}

impl RandomNewsProvider {
    pub fn new(
        symbols: Vec<String>,
        interval: Duration,
        limit: Option<u64>,
        delimiter: u8,
    ) -> Self {
        Self {
            symbols,
            rng: StdRng::from_os_rng(),
            interval,
            next_emit: Instant::now(),
            remaining: limit,
            delimiter,
        }
    }
}

impl DataProvider for RandomNewsProvider {
    fn next_data(&mut self) -> Fetch {
        if self.symbols.is_empty() || self.remaining == Some(0) {
            return Fetch::Exhausted;
        }
        let now = Instant::now();
        if now < self.next_emit {
            return Fetch::Pending;
        }
        self.next_emit = now + self.interval;
        if let Some(n) = &mut self.remaining {
            *n -= 1;
        }

        let symbol = &self.symbols[self.rng.random_range(0..self.symbols.len())];
        let sentiment: u8 = self.rng.random_range(0..=100);
        Fetch::Data(frame(format!("{symbol},{sentiment}").as_bytes(), self.delimiter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::types::SentimentUpdate;

    fn syms() -> Vec<String> {
        vec!["AAPL".to_string(), "MSFT".to_string()]
    }

    #[test]
    fn emits_valid_news_frames() {
        let mut p = RandomNewsProvider::new(syms(), Duration::ZERO, Some(20), b'*');
        for _ in 0..20 {
            let Fetch::Data(bytes) = p.next_data() else { panic!("expected data") };
            let update = SentimentUpdate::from_frame(&bytes, b'*').unwrap();
            assert!(syms().contains(&update.symbol));
        }
        assert_eq!(p.next_data(), Fetch::Exhausted);
    }

    #[test]
    fn pending_between_emissions() {
        let mut p = RandomNewsProvider::new(syms(), Duration::from_secs(60), None, b'*');
        assert!(matches!(p.next_data(), Fetch::Data(_)));
        assert_eq!(p.next_data(), Fetch::Pending);
    }

    #[test]
    fn no_symbols_means_exhausted() {
        let mut p = RandomNewsProvider::new(Vec::new(), Duration::ZERO, None, b'*');
        assert_eq!(p.next_data(), Fetch::Exhausted);
    }
}
