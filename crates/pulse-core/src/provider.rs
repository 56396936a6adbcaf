//! Pull-based data provider abstraction for broadcast sources.
//!
//! Finite (CSV replay) and infinite (synthetic news) providers implement the
//! same interface; the broadcast loop only sees the tri-state result.

/// Result of one provider pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    /// A complete outbound frame, ready to broadcast.
    Data(Vec<u8>),
    /// Nothing available right now — poll again shortly.
    Pending,
    /// The source is permanently exhausted; the broadcast loop ends.
    Exhausted,
}

/// A single ordered source of outbound frames.
pub trait DataProvider: Send {
    fn next_data(&mut self) -> Fetch;
}

/// Replays a fixed frame sequence, then exhausts. Test and demo helper.
pub struct VecProvider {
    frames: std::vec::IntoIter<Vec<u8>>,
}

impl VecProvider {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self { frames: frames.into_iter() }
    }
}

impl DataProvider for VecProvider {
    fn next_data(&mut self) -> Fetch {
        match self.frames.next() {
            Some(f) => Fetch::Data(f),
            None => Fetch::Exhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_provider_drains_then_exhausts() {
        let mut p = VecProvider::new(vec![b"a*".to_vec(), b"b*".to_vec()]);
        assert_eq!(p.next_data(), Fetch::Data(b"a*".to_vec()));
        assert_eq!(p.next_data(), Fetch::Data(b"b*".to_vec()));
        assert_eq!(p.next_data(), Fetch::Exhausted);
        assert_eq!(p.next_data(), Fetch::Exhausted);
    }
}
