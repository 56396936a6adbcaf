//! CSV-backed market data provider.
//!
//! Streams a CSV file with a header row naming at least `symbol`, `price`
//! and `timestamp` columns (any order). Each data row becomes one delimited
//! `symbol,price,timestamp*` frame; field values are passed through as
//! written, not re-parsed. EOF exhausts the provider.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use tracing::warn;

use pulse_core::error::PulseError;
use pulse_core::framing::frame;
use pulse_core::provider::{DataProvider, Fetch};

struct Columns {
    symbol: usize,
    price: usize,
    timestamp: usize,
}

pub struct CsvPriceProvider {
    lines: Lines<BufReader<File>>,
    columns: Columns,
    delimiter: u8,
}

impl CsvPriceProvider {
    /// Open the file and resolve column positions from the header row.
    pub fn open(path: impl AsRef<Path>, delimiter: u8) -> Result<Self, PulseError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| PulseError::Config(format!("open data file {}: {e}", path.display())))?;
        let mut lines = BufReader::new(file).lines();

        let header = lines
            .next()
            .transpose()
            .map_err(|e| PulseError::Config(format!("read {}: {e}", path.display())))?
            .ok_or_else(|| PulseError::Config(format!("{} is empty", path.display())))?;

        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        let find = |name: &str| {
            names.iter().position(|&h| h == name).ok_or_else(|| {
                PulseError::Config(format!("{} has no '{name}' column", path.display()))
            })
        };
        let columns = Columns {
            symbol: find("symbol")?,
            price: find("price")?,
            timestamp: find("timestamp")?,
        };

        Ok(Self { lines, columns, delimiter })
    }
}

impl DataProvider for CsvPriceProvider {
    fn next_data(&mut self) -> Fetch {
        loop {
            let line = match self.lines.next() {
                None => return Fetch::Exhausted,
                Some(Err(e)) => {
                    warn!("market data file read error: {e}");
                    return Fetch::Exhausted;
                }
                Some(Ok(line)) => line,
            };
            if line.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let (Some(symbol), Some(price), Some(timestamp)) = (
                fields.get(self.columns.symbol),
                fields.get(self.columns.price),
                fields.get(self.columns.timestamp),
            ) else {
                warn!("skipping short market data row: {line:?}");
                continue;
            };

            return Fetch::Data(frame(
                format!("{symbol},{price},{timestamp}").as_bytes(),
                self.delimiter,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn replays_rows_as_frames() {
        let path = write_temp(
            "pulse_md_basic.csv",
            "symbol,price,timestamp\nAAPL,172.53,1696180200.0\nMSFT,325.2,1696180201.0\n",
        );
        let mut p = CsvPriceProvider::open(&path, b'*').unwrap();
        assert_eq!(p.next_data(), Fetch::Data(b"AAPL,172.53,1696180200.0*".to_vec()));
        assert_eq!(p.next_data(), Fetch::Data(b"MSFT,325.2,1696180201.0*".to_vec()));
        assert_eq!(p.next_data(), Fetch::Exhausted);
    }

    #[test]
    fn header_order_does_not_matter() {
        let path = write_temp(
            "pulse_md_reorder.csv",
            "timestamp,symbol,price\n1.0,SPY,440.0\n",
        );
        let mut p = CsvPriceProvider::open(&path, b'*').unwrap();
        assert_eq!(p.next_data(), Fetch::Data(b"SPY,440.0,1.0*".to_vec()));
    }

    #[test]
    fn short_rows_skipped() {
        let path = write_temp(
            "pulse_md_short.csv",
            "symbol,price,timestamp\nAAPL\n\nMSFT,1.0,2.0\n",
        );
        let mut p = CsvPriceProvider::open(&path, b'*').unwrap();
        assert_eq!(p.next_data(), Fetch::Data(b"MSFT,1.0,2.0*".to_vec()));
        assert_eq!(p.next_data(), Fetch::Exhausted);
    }

    #[test]
    fn missing_column_is_config_error() {
        let path = write_temp("pulse_md_nocol.csv", "symbol,price\nAAPL,1.0\n");
        assert!(CsvPriceProvider::open(&path, b'*').is_err());
    }
}
