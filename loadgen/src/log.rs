//! Session activity logs and their chronological merge.
//!
//! Every session owns a [`SessionLog`] which request handlers append to. Entries are timestamped
//! while holding the log's lock, so each session log is ordered by construction even with many
//! concurrent writers. After the run, [`merge`] combines all session logs into one global
//! sequence, and [`write_log`] emits the messages.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::Instant;

/// A single timestamped message emitted by a request handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Time of emission. Only used as merge key, never printed.
    pub timestamp: Instant,
    /// Opaque message produced by the handler.
    pub message: String,
}

/// An append-only log shared between a session and the handlers it launches.
///
/// Cloning yields another handle to the same log.
#[derive(Clone, Debug, Default)]
pub struct SessionLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl SessionLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message stamped with the current time.
    pub fn append(&self, message: impl Into<String>) {
        let message = message.into();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // Stamp under the lock to keep the log sorted.
        entries.push(LogEntry {
            timestamp: Instant::now(),
            message,
        });
    }

    /// Number of entries currently in the log.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing has been logged yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains all entries, leaving the log empty.
    ///
    /// Handlers that are still running may keep appending, but those entries will not be part of
    /// the returned snapshot.
    pub fn take(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Head of one session log inside the merge heap.
struct Head {
    entry: LogEntry,
    source: usize,
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed, as `BinaryHeap` is a max-heap.
        (other.entry.timestamp, other.source).cmp(&(self.entry.timestamp, self.source))
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head {}

/// Merges individually ordered logs into a single chronological sequence.
///
/// Equal timestamps are ordered by the position of their log in `logs`, and then by their position
/// within that log. The result is therefore deterministic for a given input.
pub fn merge(logs: Vec<Vec<LogEntry>>) -> Vec<LogEntry> {
    let total = logs.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);

    let mut sources: Vec<_> = logs.into_iter().map(Vec::into_iter).collect();
    let mut heads = BinaryHeap::with_capacity(sources.len());
    for (source, entries) in sources.iter_mut().enumerate() {
        if let Some(entry) = entries.next() {
            heads.push(Head { entry, source });
        }
    }

    while let Some(Head { entry, source }) = heads.pop() {
        merged.push(entry);
        if let Some(entry) = sources[source].next() {
            heads.push(Head { entry, source });
        }
    }

    merged
}

/// Writes the messages of `entries` separated by newlines.
///
/// Timestamps are not part of the output. No newline follows the last message.
pub fn write_entries<W: Write>(mut writer: W, entries: &[LogEntry]) -> io::Result<()> {
    for (index, entry) in entries.iter().enumerate() {
        if index > 0 {
            writer.write_all(b"\n")?;
        }
        writer.write_all(entry.message.as_bytes())?;
    }
    writer.flush()
}

/// Creates or truncates the file at `path` and writes `entries` into it.
pub fn write_log(path: &Path, entries: &[LogEntry]) -> io::Result<()> {
    let file = File::create(path)?;
    write_entries(BufWriter::new(file), entries)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn entry(base: Instant, millis: u64, message: &str) -> LogEntry {
        LogEntry {
            timestamp: base + Duration::from_millis(millis),
            message: message.to_owned(),
        }
    }

    fn messages(entries: &[LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn merge_matches_sorted_concatenation() {
        let base = Instant::now();
        let logs = vec![
            vec![entry(base, 1, "a1"), entry(base, 5, "a5"), entry(base, 9, "a9")],
            vec![],
            vec![entry(base, 2, "b2"), entry(base, 3, "b3"), entry(base, 10, "b10")],
            vec![entry(base, 0, "c0"), entry(base, 7, "c7")],
        ];

        let mut expected: Vec<_> = logs.iter().flatten().cloned().collect();
        expected.sort_by_key(|e| e.timestamp);

        let merged = merge(logs);
        assert_eq!(merged, expected);
        assert!(merged.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn merge_breaks_ties_by_log_then_position() {
        let base = Instant::now();
        let logs = vec![
            vec![entry(base, 1, "first-x"), entry(base, 1, "first-y")],
            vec![entry(base, 0, "second-a"), entry(base, 1, "second-b")],
        ];

        let merged = merge(logs);
        assert_eq!(
            messages(&merged),
            ["second-a", "first-x", "first-y", "second-b"]
        );
    }

    #[test]
    fn merge_of_empty_logs_is_empty() {
        assert!(merge(vec![]).is_empty());
        assert!(merge(vec![vec![], vec![], vec![]]).is_empty());
    }

    #[test]
    fn write_joins_with_newlines() {
        let base = Instant::now();
        let entries = [entry(base, 0, "one"), entry(base, 1, "two")];

        let mut out = Vec::new();
        write_entries(&mut out, &entries).unwrap();
        assert_eq!(out, b"one\ntwo");

        let mut out = Vec::new();
        write_entries(&mut out, &[]).unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn session_log_is_ordered_and_drainable() {
        let log = SessionLog::new();
        let writer = log.clone();

        writer.append("first");
        tokio::time::advance(Duration::from_millis(10)).await;
        log.append(String::from("second"));
        assert_eq!(log.len(), 2);

        let entries = log.take();
        assert!(log.is_empty());
        assert_eq!(messages(&entries), ["first", "second"]);
        assert_eq!(
            entries[1].timestamp - entries[0].timestamp,
            Duration::from_millis(10)
        );
    }
}
