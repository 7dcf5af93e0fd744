use crate::application::reconcile::ReconciliationReport;
use crate::application::report::BatchReport;
use crate::application::wallets::WalletSummary;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct BatchRow<'a> {
    job: &'a str,
    processed: usize,
    skipped: usize,
    failed: usize,
}

/// Writes job reports and balances as CSV.
///
/// A writer holds one kind of row; use a fresh writer per report.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// One row per wallet: `wallet_id,available,frozen,total`.
    pub fn write_summaries(&mut self, summaries: &[WalletSummary]) -> Result<()> {
        self.write_rows(summaries)
    }

    /// A single `job,processed,skipped,failed` row. Failure details go to the log.
    pub fn write_batch(&mut self, report: &BatchReport) -> Result<()> {
        self.write_rows([BatchRow {
            job: &report.job,
            processed: report.processed,
            skipped: report.skipped,
            failed: report.failures.len(),
        }])
    }

    /// One row per wallet that drifted from its records.
    pub fn write_corrections(&mut self, report: &ReconciliationReport) -> Result<()> {
        self.write_rows(&report.corrections)
    }

    fn write_rows<T: Serialize>(&mut self, rows: impl IntoIterator<Item = T>) -> Result<()> {
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::WalletId;
    use crate::domain::money::Balance;

    fn written(f: impl FnOnce(&mut ReportWriter<&mut Vec<u8>>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        {
            let mut writer = ReportWriter::new(&mut buf);
            f(&mut writer).unwrap();
        }
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_summaries_have_header_and_minor_units() {
        let summary = WalletSummary {
            wallet_id: WalletId::new("creator-1"),
            available: Balance::new(1500),
            frozen: Balance::new(2572),
            total: Balance::new(4072),
        };
        let out = written(|w| w.write_summaries(&[summary]));

        assert_eq!(out, "wallet_id,available,frozen,total\ncreator-1,1500,2572,4072\n");
    }

    #[test]
    fn test_batch_row_counts_failures() {
        let mut report = BatchReport::new("release");
        report.processed();
        report.skipped();
        report.failed("p-1", &crate::error::LedgerError::InvariantViolation("x".into()));
        let out = written(|w| w.write_batch(&report));

        assert_eq!(out, "job,processed,skipped,failed\nrelease,1,1,1\n");
    }
}
