//! The per-user transaction log.
//!
//! Each user owns one append-only line file, `tx.data`, under their
//! directory. The store only ever reads whole files and appends whole
//! batches; rewriting or reordering existing lines never happens.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::PathBuf,
};

use log::debug;

#[derive(Clone, Debug)]
pub struct LogStore {
    root: PathBuf,
}

impl LogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn data_path(&self, org: &str, user: &str) -> PathBuf {
        self.root
            .join("orgs")
            .join(org)
            .join("users")
            .join(user)
            .join("tx.data")
    }

    /// Load the full log. A missing file is an empty log; the file is only
    /// created by the first append.
    pub fn read_all(&self, org: &str, user: &str) -> io::Result<Vec<String>> {
        match fs::read_to_string(self.data_path(org, user)) {
            Ok(contents) => Ok(contents.lines().map(str::to_string).collect()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(error),
        }
    }

    /// Append a batch of lines, durably.
    ///
    /// The batch is written with a single write and fsynced before this
    /// returns, so a client that saw the response can trust the new sync key
    /// is on disk. If the write fails, the file is truncated back to its
    /// prior length; a torn batch is never left readable.
    pub fn append(&self, org: &str, user: &str, lines: &[String]) -> io::Result<()> {
        if lines.is_empty() {
            return Ok(());
        }

        let path = self.data_path(org, user);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let watermark = file.metadata()?.len();

        let mut batch = String::new();
        for line in lines {
            batch.push_str(line);
            batch.push('\n');
        }

        let written = file
            .write_all(batch.as_bytes())
            .and_then(|_| file.sync_all());

        if let Err(error) = written {
            debug!("append of {} line(s) failed, rolling back: {error}", lines.len());
            let _ = file.set_len(watermark);
            return Err(error);
        }

        Ok(())
    }
}
