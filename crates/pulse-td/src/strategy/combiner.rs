//! Signal combiner — fuses the price and news channels per instrument.
//!
//! Each channel keeps only its *latest* action per instrument (overwrite
//! semantics, no queue, no history). Every arrival on either channel
//! re-evaluates fusion for that instrument only: when both channels hold a
//! value and those latest actions are equal, the trade-signal listener
//! fires once with the price channel's quantity and price. Equality is
//! literal — a HOLD on both channels dispatches too, and it is the order
//! client that refuses to route it.
//!
//! The combiner is single-threaded by design: callers serialize updates
//! through one event queue, so per-instrument fusion sees a total order.

use ahash::AHashMap;

use pulse_core::types::Action;

use super::crossover::{MovingAverageCrossover, Signal};
use super::sentiment::SentimentStrategy;

/// Invoked on fusion with `(symbol, quantity, price, action)`.
pub type TradeSignalFn = Box<dyn FnMut(&str, u32, f64, Action) + Send>;

pub struct SignalCombiner {
    price_strategy: MovingAverageCrossover,
    news_strategy: SentimentStrategy,
    latest_price: AHashMap<String, (u32, f64, Action)>,
    latest_news: AHashMap<String, Action>,
    listener: Option<TradeSignalFn>,
}

impl SignalCombiner {
    pub fn new(price_strategy: MovingAverageCrossover, news_strategy: SentimentStrategy) -> Self {
        Self {
            price_strategy,
            news_strategy,
            latest_price: AHashMap::new(),
            latest_news: AHashMap::new(),
            listener: None,
        }
    }

    pub fn set_trade_signal_listener(&mut self, callback: TradeSignalFn) {
        self.listener = Some(callback);
    }

    /// Feed one validated sentiment reading into the news channel.
    pub fn on_news(&mut self, symbol: &str, sentiment: u8) {
        let action = self.news_strategy.classify(sentiment);
        self.latest_news.insert(symbol.to_string(), action);
        self.evaluate(symbol);
    }

    /// Feed one price tick into the price channel. Most ticks produce no
    /// signal and leave the channel's latest value untouched.
    pub fn on_price_tick(&mut self, symbol: &str, price: f64) {
        if let Some(signal) = self.price_strategy.on_tick(symbol, price) {
            self.record_price_signal(signal);
        }
    }

    /// Overwrite the price channel's latest signal and re-evaluate fusion.
    /// Public so alternative price-signal sources can drive the combiner.
    pub fn record_price_signal(&mut self, signal: Signal) {
        self.latest_price
            .insert(signal.symbol.clone(), (signal.quantity, signal.price, signal.action));
        self.evaluate(&signal.symbol);
    }

    fn evaluate(&mut self, symbol: &str) {
        let (Some(&(quantity, price, price_action)), Some(&news_action)) =
            (self.latest_price.get(symbol), self.latest_news.get(symbol))
        else {
            return;
        };
        if price_action == news_action
            && let Some(listener) = self.listener.as_mut()
        {
            listener(symbol, quantity, price, price_action);
        }
    }
}
