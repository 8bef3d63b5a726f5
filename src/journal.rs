//! Write-ahead journal + compaction, generalizing `mgmt.rs`'s atomic-rename
//! reservation snapshot into an append-only log of lease state changes.
//! Each successful lease state change is durable (fsync'd) before the
//! caller may reply on the wire: journal precedes wire.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;

/// Rotate after this many appended records...
const ROTATE_AFTER_RECORDS: u64 = 1000;
/// ...or after this long since the last rotation, whichever comes first.
const ROTATE_AFTER: std::time::Duration = std::time::Duration::from_secs(3600);

/// One self-delimiting text record, e.g. `lease 10.0.0.5 { ... }`.
pub struct Record(pub String);

impl Record {
    pub fn lease(ip: &str, body: &str) -> Self {
        Self(format!("lease {ip} {{ {body} }}\n"))
    }

    pub fn host(name: &str, body: &str) -> Self {
        Self(format!("host {name} {{ {body} }}\n"))
    }

    pub fn group(name: &str, body: &str) -> Self {
        Self(format!("group {name} {{ {body} }}\n"))
    }
}

/// Append-only journal file plus the bookkeeping needed to rotate it.
pub struct Journal {
    path: PathBuf,
    file: Mutex<BufWriter<File>>,
    record_count: AtomicU64,
    last_rotate: Mutex<std::time::Instant>,
}

impl Journal {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(BufWriter::new(file)),
            record_count: AtomicU64::new(0),
            last_rotate: Mutex::new(std::time::Instant::now()),
        })
    }

    /// Writes one record and fsyncs before returning. A fsync failure is
    /// a persistence failure: the caller must treat `Err` here as fatal
    /// to the in-flight reply, not merely log-and-continue.
    pub fn append(&self, record: &Record) -> io::Result<()> {
        let mut file = self.file.lock().unwrap();
        file.write_all(record.0.as_bytes())?;
        file.flush()?;
        file.get_ref().sync_all()?;
        self.record_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn should_rotate(&self) -> bool {
        self.record_count.load(Ordering::Relaxed) >= ROTATE_AFTER_RECORDS
            || self.last_rotate.lock().unwrap().elapsed() >= ROTATE_AFTER
    }

    /// Closes the current file, renames it aside (`<path>~`), writes a
    /// fresh snapshot (one record per entry in `snapshot`) to a new file
    /// under a temporary name, and renames it into place. The final
    /// rename is the crash-consistency commit point: a crash before it
    /// leaves the old journal intact, a crash after leaves the new one
    /// intact, and there is never a window with neither.
    pub fn rotate<'a>(&self, snapshot: impl Iterator<Item = &'a Record>) -> io::Result<()> {
        {
            let mut file = self.file.lock().unwrap();
            file.flush()?;
        }

        let backup = self.path.with_extension("jnl~");
        if self.path.exists() {
            std::fs::rename(&self.path, &backup)?;
        }

        let tmp_path = self.path.with_extension("jnl.tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            writeln!(tmp, "# journal rewritten {}", Utc::now().to_rfc3339())?;
            for record in snapshot {
                tmp.write_all(record.0.as_bytes())?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        let new_file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        *self.file.lock().unwrap() = BufWriter::new(new_file);
        self.record_count.store(0, Ordering::Relaxed);
        *self.last_rotate.lock().unwrap() = std::time::Instant::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_rotate_preserves_snapshot_contents() {
        let dir = std::env::temp_dir().join(format!("shadow-dhcpv6-journal-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("leases.jnl");

        let journal = Journal::open(&path).unwrap();
        journal.append(&Record::lease("10.0.0.5", "starts 1; ends 2;")).unwrap();
        journal.append(&Record::lease("10.0.0.6", "starts 1; ends 2;")).unwrap();

        let snapshot = vec![Record::lease("10.0.0.5", "starts 3; ends 4;")];
        journal.rotate(snapshot.iter()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("10.0.0.5"));
        assert!(contents.contains("starts 3"));
        assert!(!contents.contains("10.0.0.6"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
