//! Persistence of the evolutionary tree between runs.

use crate::domain::error::HorseError;
use crate::domain::snapshot::BossSnapshot;
use std::path::Path;

pub trait SnapshotPort {
    fn save(&self, snapshot: &BossSnapshot, path: &Path) -> Result<(), HorseError>;
    fn load(&self, path: &Path) -> Result<BossSnapshot, HorseError>;
}
