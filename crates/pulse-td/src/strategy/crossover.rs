//! Moving-average crossover detector — the price channel's signal source.
//!
//! Per instrument, keeps the last `long_window` observed prices and the
//! previous short-vs-long relationship. A signal fires only on a
//! *transition*: the short-window average crossing from at-or-below to
//! above the long-window average emits BUY, the reverse emits SELL.
//! Steady-state agreement emits nothing, and below `long_window` observed
//! prices no signal is possible for that instrument.
//!
//! Averages are computed over the stored history, which excludes the
//! incoming tick; the tick is appended (and the history re-trimmed)
//! afterwards. The emitted signal carries the incoming tick's price.

use std::collections::VecDeque;

use ahash::AHashMap;

use pulse_core::types::Action;

/// Ephemeral per-channel trade recommendation; always superseded by the
/// next one for the same instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub quantity: u32,
    pub price: f64,
    pub action: Action,
}

struct SymbolState {
    prices: VecDeque<f64>,
    short_above_long: bool,
}

pub struct MovingAverageCrossover {
    short_window: usize,
    long_window: usize,
    quantity: u32,
    state: AHashMap<String, SymbolState>,
}

impl MovingAverageCrossover {
    pub fn new(short_window: usize, long_window: usize, quantity: u32) -> Self {
        Self { short_window, long_window, quantity, state: AHashMap::new() }
    }

    /// Feed one tick; returns a signal only on a crossover transition.
    pub fn on_tick(&mut self, symbol: &str, price: f64) -> Option<Signal> {
        let Some(state) = self.state.get_mut(symbol) else {
            self.state.insert(
                symbol.to_string(),
                SymbolState { prices: VecDeque::from([price]), short_above_long: false },
            );
            return None;
        };

        if state.prices.len() < self.long_window {
            state.prices.push_back(price);
            return None;
        }

        let mean = |n: usize| -> f64 {
            state.prices.iter().rev().take(n).sum::<f64>() / n as f64
        };
        let short_ma = mean(self.short_window);
        let long_ma = mean(self.long_window);

        let was_above = state.short_above_long;
        let now_above = short_ma > long_ma;
        state.short_above_long = now_above;

        state.prices.push_back(price);
        while state.prices.len() > self.long_window {
            state.prices.pop_front();
        }

        let action = match (was_above, now_above) {
            (false, true) => Action::Buy,
            (true, false) => Action::Sell,
            _ => return None,
        };
        Some(Signal { symbol: symbol.to_string(), quantity: self.quantity, price, action })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(detector: &mut MovingAverageCrossover, symbol: &str, prices: &[f64]) -> Vec<Signal> {
        prices.iter().filter_map(|&p| detector.on_tick(symbol, p)).collect()
    }

    #[test]
    fn single_buy_on_up_cross() {
        let mut d = MovingAverageCrossover::new(3, 5, 10);
        let signals = run(
            &mut d,
            "AAPL",
            &[100.0, 99.0, 98.0, 97.0, 96.0, 97.0, 98.0, 99.0, 100.0, 101.0, 102.0],
        );
        // One BUY at the tick where the short MA first exceeds the long MA,
        // no repeat on subsequent still-crossed ticks.
        assert_eq!(
            signals,
            vec![Signal { symbol: "AAPL".into(), quantity: 10, price: 100.0, action: Action::Buy }]
        );
    }

    #[test]
    fn buy_fires_at_final_rising_tick() {
        let mut d = MovingAverageCrossover::new(3, 5, 10);
        let signals = run(&mut d, "AAPL", &[100.0, 101.0, 102.0, 106.0, 108.0, 110.0]);
        assert_eq!(
            signals,
            vec![Signal { symbol: "AAPL".into(), quantity: 10, price: 110.0, action: Action::Buy }]
        );
    }

    #[test]
    fn sell_on_down_cross_after_buy() {
        let mut d = MovingAverageCrossover::new(3, 5, 10);
        let signals = run(
            &mut d,
            "AAPL",
            &[100.0, 101.0, 102.0, 103.0, 104.0, 103.0, 102.0, 101.0, 100.0, 99.0, 98.0],
        );
        // The rising leg up-crosses once, the falling leg down-crosses once.
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].action, Action::Buy);
        assert_eq!(signals[1].action, Action::Sell);
        assert_eq!(signals[1].price, 101.0);
    }

    #[test]
    fn silent_below_long_window() {
        let mut d = MovingAverageCrossover::new(3, 5, 10);
        // long_window ticks only ever fill the history.
        assert!(run(&mut d, "AAPL", &[100.0, 110.0, 120.0, 130.0, 140.0]).is_empty());
    }

    #[test]
    fn symbols_are_independent() {
        let mut d = MovingAverageCrossover::new(2, 3, 10);
        let mut signals = Vec::new();
        // Interleave a rising AAPL with a flat MSFT.
        for (a, m) in [(100.0, 50.0), (101.0, 50.0), (102.0, 50.0), (105.0, 50.0), (108.0, 50.0)] {
            signals.extend(d.on_tick("AAPL", a));
            signals.extend(d.on_tick("MSFT", m));
        }
        assert!(signals.iter().all(|s| s.symbol == "AAPL"));
        assert_eq!(signals.iter().filter(|s| s.action == Action::Buy).count(), 1);
    }
}
