use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Append-only diagnostic log of key material.
///
/// One line per event: `<escaped identity>:<UPPERCASE HEX KEY>`. The log is
/// never read back and a failing write never fails the caller.
#[derive(Debug)]
pub struct KeyLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl KeyLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, identity: &[u8], key: &[u8]) {
        let line = format_line(identity, key);
        let _guard = self.lock.lock();
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "key log write failed");
        }
    }
}

fn format_line(identity: &[u8], key: &[u8]) -> String {
    format!("{}:{}\n", identity.escape_ascii(), hex::encode_upper(key))
}
