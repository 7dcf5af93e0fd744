use crate::error::LedgerError;
use serde::Serialize;

/// One item a batch job could not handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub subject: String,
    pub error: String,
}

/// Aggregate outcome of a batch job.
///
/// Jobs keep going past failing items and collect them here instead of aborting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub job: String,
    pub processed: usize,
    pub skipped: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            ..Self::default()
        }
    }

    pub fn processed(&mut self) {
        self.processed += 1;
    }

    pub fn skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn failed(&mut self, subject: impl ToString, error: &LedgerError) {
        if error.needs_operator() {
            tracing::error!(job = %self.job, subject = %subject.to_string(), %error, "Batch item needs operator attention");
        } else {
            tracing::warn!(job = %self.job, subject = %subject.to_string(), %error, "Batch item failed");
        }
        self.failures.push(BatchFailure {
            subject: subject.to_string(),
            error: error.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            job = %self.job,
            processed = self.processed,
            skipped = self.skipped,
            failed = self.failures.len(),
            "Batch finished"
        );
    }
}
