use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::io::Read;

/// One purchase to replay against the simulated gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SaleRecord {
    pub buyer: String,
    pub pack: String,
}

/// Reads `buyer,pack` rows from a CSV source.
///
/// Whitespace around fields is trimmed and extra trailing columns are tolerated.
pub struct SaleReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> SaleReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes the rows, so large files are streamed.
    pub fn sales(self) -> impl Iterator<Item = Result<SaleRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = "buyer, pack\nbuyer-1, pack-a\n buyer-2 ,pack-b, extra";
        let results: Vec<Result<SaleRecord>> = SaleReader::new(data.as_bytes()).sales().collect();

        assert_eq!(results.len(), 2);
        let second = results[1].as_ref().unwrap();
        assert_eq!(second.buyer, "buyer-2");
        assert_eq!(second.pack, "pack-b");
    }

    #[test]
    fn test_reader_short_line_is_an_error() {
        let data = "buyer,pack\nbuyer-1";
        let results: Vec<Result<SaleRecord>> = SaleReader::new(data.as_bytes()).sales().collect();

        assert!(results[0].is_err());
    }
}
