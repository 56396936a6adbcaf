//! Market event payloads carried on the broadcast channels.
//!
//! Both types parse the comma-separated UTF-8 payload of one frame. The
//! parsers tolerate a trailing delimiter because feed subscribers receive
//! the complete delimited message.

use crate::error::PulseError;
use crate::framing::frame;

fn frame_text(data: &[u8], delimiter: u8) -> Result<&str, PulseError> {
    crate::framing::frame_text(data, delimiter)
        .map_err(|_| PulseError::Parse("frame payload is not valid UTF-8".into()))
}

// ---------------------------------------------------------------------------
// PriceUpdate
// ---------------------------------------------------------------------------

/// One market-data tick: `symbol,price,timestamp`.
///
/// Timestamps are f64 epoch seconds end to end (wire, shared store, order).
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: f64,
    pub timestamp: f64,
}

impl PriceUpdate {
    /// Parse a market-data frame (`AAPL,172.53,1696180200.0*`).
    pub fn from_frame(data: &[u8], delimiter: u8) -> Result<Self, PulseError> {
        let text = frame_text(data, delimiter)?;
        let parts: Vec<&str> = text.split(',').collect();
        if parts.len() != 3 {
            return Err(PulseError::Parse(format!(
                "market data frame: expected 3 fields, got {}: {text:?}",
                parts.len()
            )));
        }
        let price: f64 = fast_float2::parse(parts[1])
            .map_err(|_| PulseError::Parse(format!("invalid price {:?}", parts[1])))?;
        let timestamp: f64 = fast_float2::parse(parts[2])
            .map_err(|_| PulseError::Parse(format!("invalid timestamp {:?}", parts[2])))?;
        Ok(Self { symbol: parts[0].to_string(), price, timestamp })
    }

    /// Serialize to a delimited frame.
    pub fn to_frame(&self, delimiter: u8) -> Vec<u8> {
        frame(
            format!("{},{},{}", self.symbol, self.price, self.timestamp).as_bytes(),
            delimiter,
        )
    }
}

// ---------------------------------------------------------------------------
// SentimentUpdate
// ---------------------------------------------------------------------------

/// One news event: `symbol,sentiment` with sentiment an integer in [0, 100].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentimentUpdate {
    pub symbol: String,
    pub sentiment: u8,
}

impl SentimentUpdate {
    /// Parse a news frame (`AAPL,67*`).
    ///
    /// Rejects wrong field counts, non-integer sentiment and values outside
    /// [0, 100]; a rejected frame must not touch the channel's latest value.
    pub fn from_frame(data: &[u8], delimiter: u8) -> Result<Self, PulseError> {
        let text = frame_text(data, delimiter)?;
        let parts: Vec<&str> = text.split(',').collect();
        if parts.len() != 2 {
            return Err(PulseError::Parse(format!(
                "news frame: expected 2 fields, got {}: {text:?}",
                parts.len()
            )));
        }
        let sentiment: i64 = parts[1]
            .parse()
            .map_err(|_| PulseError::Parse(format!("non-integer sentiment {:?}", parts[1])))?;
        if !(0..=100).contains(&sentiment) {
            return Err(PulseError::Parse(format!(
                "sentiment {sentiment} outside [0, 100]"
            )));
        }
        Ok(Self { symbol: parts[0].to_string(), sentiment: sentiment as u8 })
    }

    /// Serialize to a delimited frame.
    pub fn to_frame(&self, delimiter: u8) -> Vec<u8> {
        frame(format!("{},{}", self.symbol, self.sentiment).as_bytes(), delimiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_update_parses_delimited_frame() {
        let p = PriceUpdate::from_frame(b"AAPL,172.53,1696180200.0*", b'*').unwrap();
        assert_eq!(p.symbol, "AAPL");
        assert_eq!(p.price, 172.53);
        assert_eq!(p.timestamp, 1696180200.0);
    }

    #[test]
    fn price_update_rejects_wrong_field_count() {
        assert!(PriceUpdate::from_frame(b"AAPL,172.53*", b'*').is_err());
        assert!(PriceUpdate::from_frame(b"AAPL,1,2,3*", b'*').is_err());
    }

    #[test]
    fn price_update_rejects_non_numeric_price() {
        assert!(PriceUpdate::from_frame(b"AAPL,abc,1.0*", b'*').is_err());
    }

    #[test]
    fn sentiment_parses() {
        let s = SentimentUpdate::from_frame(b"MSFT,67*", b'*').unwrap();
        assert_eq!(s.symbol, "MSFT");
        assert_eq!(s.sentiment, 67);
    }

    #[test]
    fn sentiment_rejects_out_of_range() {
        assert!(SentimentUpdate::from_frame(b"MSFT,101*", b'*').is_err());
        assert!(SentimentUpdate::from_frame(b"MSFT,-1*", b'*').is_err());
    }

    #[test]
    fn sentiment_rejects_malformed() {
        assert!(SentimentUpdate::from_frame(b"MSFT*", b'*').is_err());
        assert!(SentimentUpdate::from_frame(b"MSFT,abc*", b'*').is_err());
        assert!(SentimentUpdate::from_frame(b"MSFT,50,extra*", b'*').is_err());
    }

    #[test]
    fn sentiment_boundaries_accepted() {
        assert_eq!(SentimentUpdate::from_frame(b"SPY,0*", b'*').unwrap().sentiment, 0);
        assert_eq!(SentimentUpdate::from_frame(b"SPY,100*", b'*').unwrap().sentiment, 100);
    }
}
