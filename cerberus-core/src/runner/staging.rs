//! Temporary staging of trusted reviewer config into a consumer checkout
//!
//! When the runner executes inside a consumer workspace, the CLI
//! auto-discovers project config and the perspective agent definition from
//! the working tree. Those files are staged from trusted locations before
//! the run and restored byte-for-byte afterwards, so the workspace is
//! identical to its pre-run state on every exit path.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result};

enum OriginalState {
    /// The destination did not exist before staging
    Absent,
    /// The destination was a regular file with these bytes
    File(Vec<u8>),
}

struct StagedEntry {
    dest: PathBuf,
    original: OriginalState,
    /// Directories created for the staging, deepest first
    created_dirs: Vec<PathBuf>,
}

/// RAII guard over staged files; dropping it restores the workspace
pub struct StagedConfig {
    entries: Vec<StagedEntry>,
}

impl StagedConfig {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Stage one trusted file at `dest`, remembering what was there
    ///
    /// Refuses to overwrite symlinks or anything that is not a regular
    /// file: replacing a symlink could redirect the restore write outside
    /// the workspace.
    pub fn stage(&mut self, trusted_source: &Path, dest: &Path) -> Result<()> {
        let original = match fs::symlink_metadata(dest) {
            Ok(metadata) => {
                if !metadata.is_file() {
                    return Err(Error::Runner(format!(
                        "refusing to stage over non-regular file: {}",
                        dest.display()
                    )));
                }
                OriginalState::File(fs::read(dest)?)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => OriginalState::Absent,
            Err(e) => return Err(Error::Io(e)),
        };

        let mut created_dirs = Vec::new();
        if let Some(parent) = dest.parent() {
            let mut missing = Vec::new();
            let mut cursor = parent;
            while !cursor.exists() {
                missing.push(cursor.to_path_buf());
                match cursor.parent() {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
            if !missing.is_empty() {
                fs::create_dir_all(parent)?;
                created_dirs = missing;
            }
        }

        let contents = fs::read(trusted_source)?;
        fs::write(dest, contents)?;
        debug!(dest = %dest.display(), "Staged trusted config");

        self.entries.push(StagedEntry {
            dest: dest.to_path_buf(),
            original,
            created_dirs,
        });
        Ok(())
    }

    /// Restore all staged destinations to their pre-stage state
    pub fn restore(&mut self) {
        // Reverse order so nested stages unwind cleanly.
        while let Some(entry) = self.entries.pop() {
            let result = match &entry.original {
                OriginalState::Absent => fs::remove_file(&entry.dest),
                OriginalState::File(bytes) => fs::write(&entry.dest, bytes),
            };
            if let Err(e) = result {
                warn!(
                    dest = %entry.dest.display(),
                    error = %e,
                    "Failed to restore staged file"
                );
            }
            for dir in &entry.created_dirs {
                // Only removes empty directories we created ourselves.
                let _ = fs::remove_dir(dir);
            }
        }
    }
}

impl Default for StagedConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StagedConfig {
    fn drop(&mut self) {
        self.restore();
    }
}
