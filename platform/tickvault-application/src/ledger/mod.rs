use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tickvault_domain::value_objects::job::{JobCounts, JobEntry, JobKey, JobStatus, UpdateKind};

/// Process-wide job table keyed by `(ticker, kind)`.
///
/// Transitions are not validated here: `set_status` writes whatever it is
/// given. The only guarded transition is [`JobLedger::claim`], which lets
/// exactly one worker move a job out of `Pending`.
#[derive(Clone, Default)]
pub struct JobLedger {
    inner: Arc<Mutex<LedgerState>>,
}

#[derive(Default)]
struct LedgerState {
    jobs: HashMap<JobKey, Slot>,
    next_seq: u64,
}

#[derive(Clone, Copy)]
struct Slot {
    entry: JobEntry,
    seq: u64,
}

impl LedgerState {
    fn write(&mut self, key: JobKey, status: JobStatus, timestamp: DateTime<Utc>) {
        self.next_seq += 1;
        let slot = Slot {
            entry: JobEntry { status, timestamp },
            seq: self.next_seq,
        };
        self.jobs.insert(key, slot);
    }
}

impl JobLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the job with `Pending`. Re-adding a finished job
    /// is how retries are expressed.
    pub fn add_job(&self, ticker: &str, kind: UpdateKind) {
        let key = JobKey::new(ticker, kind);
        tracing::debug!(job = %key, "job enqueued");
        self.inner.lock().write(key, JobStatus::Pending, Utc::now());
    }

    /// Create-or-update; a key that was never added is created.
    pub fn set_status(&self, ticker: &str, kind: UpdateKind, status: JobStatus) {
        let key = JobKey::new(ticker, kind);
        self.inner.lock().write(key, status, Utc::now());
    }

    /// Moves `key` from `Pending` to `Running`. Returns `false` when the job
    /// is missing or was already claimed.
    pub fn claim(&self, key: &JobKey) -> bool {
        let mut state = self.inner.lock();
        match state.jobs.get(key) {
            Some(slot) if slot.entry.status == JobStatus::Pending => {
                state.write(key.clone(), JobStatus::Running, Utc::now());
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, ticker: &str, kind: UpdateKind) -> Option<JobEntry> {
        let key = JobKey::new(ticker, kind);
        self.inner.lock().jobs.get(&key).map(|slot| slot.entry)
    }

    /// Snapshot of every job, most recently touched first.
    pub fn all_jobs(&self) -> Vec<(JobKey, JobEntry)> {
        let mut snapshot: Vec<(JobKey, Slot)> = {
            let state = self.inner.lock();
            state
                .jobs
                .iter()
                .map(|(key, slot)| (key.clone(), *slot))
                .collect()
        };
        snapshot.sort_by(|(_, a), (_, b)| {
            b.entry
                .timestamp
                .cmp(&a.entry.timestamp)
                .then(b.seq.cmp(&a.seq))
        });
        snapshot
            .into_iter()
            .map(|(key, slot)| (key, slot.entry))
            .collect()
    }

    pub fn counts(&self) -> JobCounts {
        let state = self.inner.lock();
        let mut counts = JobCounts::default();
        for slot in state.jobs.values() {
            counts.record(slot.entry.status);
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::JobLedger;
    use tickvault_domain::value_objects::job::{JobKey, JobStatus, UpdateKind};

    #[test]
    fn add_job_overwrites_any_previous_status() {
        let ledger = JobLedger::new();
        ledger.add_job("AAPL", UpdateKind::Full);
        ledger.set_status("AAPL", UpdateKind::Full, JobStatus::Failed);
        ledger.add_job("AAPL", UpdateKind::Full);

        let entry = ledger.get("AAPL", UpdateKind::Full).unwrap();
        assert_eq!(entry.status, JobStatus::Pending);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn set_status_creates_missing_entries() {
        let ledger = JobLedger::new();
        ledger.set_status("MSFT", UpdateKind::Partial, JobStatus::Completed);
        assert_eq!(
            ledger.get("MSFT", UpdateKind::Partial).map(|e| e.status),
            Some(JobStatus::Completed)
        );
    }

    #[test]
    fn set_status_does_not_enforce_ordering() {
        let ledger = JobLedger::new();
        ledger.add_job("AAPL", UpdateKind::Full);
        ledger.set_status("AAPL", UpdateKind::Full, JobStatus::Completed);
        assert_eq!(
            ledger.get("AAPL", UpdateKind::Full).map(|e| e.status),
            Some(JobStatus::Completed)
        );
    }

    #[test]
    fn claim_only_succeeds_once_per_pending_job() {
        let ledger = JobLedger::new();
        let key = JobKey::new("AAPL", UpdateKind::Full);
        assert!(!ledger.claim(&key));

        ledger.add_job("AAPL", UpdateKind::Full);
        assert!(ledger.claim(&key));
        assert!(!ledger.claim(&key));
        assert_eq!(
            ledger.get("AAPL", UpdateKind::Full).map(|e| e.status),
            Some(JobStatus::Running)
        );
    }

    #[test]
    fn same_ticker_different_kinds_are_separate_jobs() {
        let ledger = JobLedger::new();
        ledger.add_job("AAPL", UpdateKind::Full);
        ledger.add_job("AAPL", UpdateKind::Partial);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn all_jobs_lists_most_recent_first() {
        let ledger = JobLedger::new();
        ledger.add_job("AAA", UpdateKind::Full);
        ledger.add_job("BBB", UpdateKind::Full);
        ledger.add_job("CCC", UpdateKind::Full);
        ledger.set_status("AAA", UpdateKind::Full, JobStatus::Running);

        let tickers: Vec<String> = ledger
            .all_jobs()
            .into_iter()
            .map(|(key, _)| key.ticker)
            .collect();
        assert_eq!(tickers, vec!["AAA", "CCC", "BBB"]);
    }

    #[test]
    fn counts_tally_each_status() {
        let ledger = JobLedger::new();
        ledger.add_job("A", UpdateKind::Full);
        ledger.add_job("B", UpdateKind::Full);
        ledger.set_status("C", UpdateKind::Live, JobStatus::Failed);
        ledger.set_status("D", UpdateKind::Live, JobStatus::Completed);
        ledger.claim(&JobKey::new("B", UpdateKind::Full));

        let counts = ledger.counts();
        assert_eq!(counts.total, 4);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.completed, 1);
    }
}
