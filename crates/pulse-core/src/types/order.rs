//! Order model and trading enums.
//!
//! The order wire format is `timestamp,side,quantity,symbol,price*` — five
//! comma-separated fields, same delimiter framing as the market channels.
//! Orders carry no ID and no fill state; the router hands them straight to
//! the execution sink.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PulseError;
use crate::framing::frame;

// ---------------------------------------------------------------------------
// Side / Action
// ---------------------------------------------------------------------------

/// Buy or sell direction of a routable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("BUY") {
            Ok(Self::Buy)
        } else if s.eq_ignore_ascii_case("SELL") {
            Ok(Self::Sell)
        } else {
            Err(PulseError::Parse(format!("invalid side {s:?}")))
        }
    }
}

/// A strategy channel's recommendation for one instrument.
///
/// Unlike [`Side`], an action may be `Hold` — a valid channel state that can
/// never be routed as an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

impl TryFrom<Action> for Side {
    type Error = PulseError;

    fn try_from(action: Action) -> Result<Self, Self::Error> {
        match action {
            Action::Buy => Ok(Self::Buy),
            Action::Sell => Ok(Self::Sell),
            Action::Hold => Err(PulseError::Trading("cannot route a HOLD action".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// A routable trade order.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub timestamp: f64,
    pub side: Side,
    pub quantity: u32,
    pub symbol: String,
    pub price: f64,
}

impl Order {
    /// Construct a validated order: positive quantity and price, non-empty
    /// symbol.
    pub fn new(
        timestamp: f64,
        side: Side,
        quantity: u32,
        symbol: impl Into<String>,
        price: f64,
    ) -> Result<Self, PulseError> {
        let symbol = symbol.into();
        if quantity == 0 {
            return Err(PulseError::Trading("quantity must be positive".into()));
        }
        if price <= 0.0 {
            return Err(PulseError::Trading("price must be positive".into()));
        }
        if symbol.is_empty() {
            return Err(PulseError::Trading("symbol cannot be empty".into()));
        }
        Ok(Self { timestamp, side, quantity, symbol, price })
    }

    /// Parse an order frame (`1696180200.0,BUY,100,AAPL,172.53*`).
    pub fn from_frame(data: &[u8], delimiter: u8) -> Result<Self, PulseError> {
        let text = crate::framing::frame_text(data, delimiter)
            .map_err(|_| PulseError::Parse("order frame is not valid UTF-8".into()))?;
        let parts: Vec<&str> = text.split(',').collect();
        if parts.len() != 5 {
            return Err(PulseError::Parse(format!(
                "order frame: expected 5 fields, got {}: {text:?}",
                parts.len()
            )));
        }
        let timestamp: f64 = fast_float2::parse(parts[0])
            .map_err(|_| PulseError::Parse(format!("invalid timestamp {:?}", parts[0])))?;
        let side: Side = parts[1].parse()?;
        let quantity: u32 = parts[2]
            .parse()
            .map_err(|_| PulseError::Parse(format!("invalid quantity {:?}", parts[2])))?;
        let price: f64 = fast_float2::parse(parts[4])
            .map_err(|_| PulseError::Parse(format!("invalid price {:?}", parts[4])))?;

        Self::new(timestamp, side, quantity, parts[3], price)
            .map_err(|e| PulseError::Parse(format!("invalid order {text:?}: {e}")))
    }

    /// Serialize to a delimited frame. Round-trips exactly through
    /// [`Order::from_frame`].
    pub fn to_frame(&self, delimiter: u8) -> Vec<u8> {
        frame(
            format!(
                "{},{},{},{},{}",
                self.timestamp, self.side, self.quantity, self.symbol, self.price
            )
            .as_bytes(),
            delimiter,
        )
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} @ {:.2}",
            self.timestamp, self.side, self.quantity, self.symbol, self.price
        )
    }
}
