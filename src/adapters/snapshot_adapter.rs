//! JSON files holding a boss's evolutionary state.

use crate::domain::error::HorseError;
use crate::domain::snapshot::BossSnapshot;
use crate::ports::snapshot_port::SnapshotPort;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSnapshotAdapter {
    pretty: bool,
}

impl JsonSnapshotAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl SnapshotPort for JsonSnapshotAdapter {
    /// Written beside the target and renamed over it, so a crash mid-save
    /// leaves the previous snapshot intact.
    fn save(&self, snapshot: &BossSnapshot, path: &Path) -> Result<(), HorseError> {
        let partial = path.with_extension("json.partial");
        {
            let mut out = BufWriter::new(File::create(&partial)?);
            let written = if self.pretty {
                serde_json::to_writer_pretty(&mut out, snapshot)
            } else {
                serde_json::to_writer(&mut out, snapshot)
            };
            written.map_err(|e| HorseError::Snapshot {
                reason: format!("failed to encode snapshot: {e}"),
            })?;
            out.flush()?;
        }
        fs::rename(&partial, path)?;
        tracing::info!(path = %path.display(), roots = snapshot.roots.len(), "snapshot saved");
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<BossSnapshot, HorseError> {
        let file = File::open(path).map_err(|e| HorseError::Snapshot {
            reason: format!("failed to open {}: {e}", path.display()),
        })?;
        let snapshot: BossSnapshot =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| HorseError::Snapshot {
                reason: format!("{} is not a valid snapshot: {e}", path.display()),
            })?;
        tracing::debug!(path = %path.display(), version = snapshot.version, "snapshot loaded");
        Ok(snapshot)
    }
}
