use crate::cell::Cell;
use anyhow::{Context, Result};
use cellsim_common::Snapshot;
use log::{info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// On-disk encoding for recorded snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Bincode,
    MessagePack,
}

impl SnapshotFormat {
    /// Parses a format name; unknown names fall back to JSON with a warning.
    pub fn parse(name: &str) -> Self {
        match name {
            "json" => SnapshotFormat::Json,
            "bincode" => SnapshotFormat::Bincode,
            "messagepack" | "msgpack" => SnapshotFormat::MessagePack,
            other => {
                warn!("Unknown output format: {}. Using JSON instead.", other);
                SnapshotFormat::Json
            }
        }
    }

    fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Bincode => "bin",
            SnapshotFormat::MessagePack => "msgpack",
        }
    }
}

/// Writes all snapshots to `<base>_snapshots.<ext>` and returns the path.
pub fn write_snapshots(snapshots: &[Snapshot], base_filename: &str, format: SnapshotFormat) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{}_snapshots.{}", base_filename, format.extension()));
    let file = File::create(&path)
        .with_context(|| format!("Error creating snapshot file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);

    match format {
        SnapshotFormat::Json => serde_json::to_writer(&mut writer, snapshots)
            .context("Error serializing snapshots to JSON")?,
        SnapshotFormat::Bincode => bincode::serialize_into(&mut writer, snapshots)
            .context("Error serializing snapshots to bincode")?,
        SnapshotFormat::MessagePack => rmp_serde::encode::write(&mut writer, snapshots)
            .context("Error serializing snapshots to MessagePack")?,
    }
    writer.flush()?;
    info!("{} snapshots saved to {}", snapshots.len(), path.display());
    Ok(path)
}

/// Writes one CSV row per cell.
pub fn write_cells_csv<P: AsRef<Path>>(cells: &[Cell], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Error creating CSV file '{}'", path.display()))?;
    for cell in cells {
        writer.serialize(cell.to_record())?;
    }
    writer.flush()?;
    info!("Final cells saved to {}", path.display());
    Ok(())
}
