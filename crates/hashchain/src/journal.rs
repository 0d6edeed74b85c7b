//! JSONL block journal - append-only persistence for a `HashChain`

use crate::chain::Block;
use crate::error::ChainError;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Append-only JSONL file, one block per line.
///
/// The file is never rewritten; a chain reloaded from it is verified, not repaired.
pub struct BlockJournal {
    path: PathBuf,
    file: File,
}

impl BlockJournal {
    /// Open (or create) a journal at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self { path, file })
    }

    /// Append a block as one JSON line
    pub fn append(&mut self, block: &Block) -> Result<(), ChainError> {
        let json = serde_json::to_string(block)?;
        writeln!(self.file, "{}", json)?;
        self.file.flush()?;
        Ok(())
    }

    /// Read every block in file order
    pub fn read_all(&self) -> Result<Vec<Block>, ChainError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut blocks = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let block: Block =
                serde_json::from_str(&line).map_err(|e| ChainError::InvalidJournal {
                    line: i + 1,
                    reason: e.to_string(),
                })?;
            blocks.push(block);
        }

        Ok(blocks)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
