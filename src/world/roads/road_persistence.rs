use crate::errors::CarveError;
use crate::world::roads::road_structs::ControlPoint;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const CONTROL_POINT_FILE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct ControlPointFile {
    version: u32,
    #[serde(default)]
    timestamp_unix: u64,
    points: Vec<ControlPoint>,
}

pub fn export_to_string(points: &[ControlPoint]) -> Result<String, CarveError> {
    let file = ControlPointFile {
        version: CONTROL_POINT_FILE_VERSION,
        timestamp_unix: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        points: points.to_vec(),
    };
    Ok(serde_json::to_string_pretty(&file)?)
}

pub fn import_from_str(text: &str) -> Result<Vec<ControlPoint>, CarveError> {
    let file: ControlPointFile = serde_json::from_str(text)?;
    if file.version > CONTROL_POINT_FILE_VERSION {
        return Err(CarveError::UnsupportedVersion(file.version));
    }
    Ok(file.points)
}

/// Write through a temp file so a failed save never truncates the old one.
pub fn export_control_points<P: AsRef<Path>>(
    path: P,
    points: &[ControlPoint],
) -> Result<(), CarveError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, export_to_string(points)?)?;
    fs::rename(&tmp, path)?;
    log::info!("exported {} control points to {}", points.len(), path.display());
    Ok(())
}

pub fn import_control_points<P: AsRef<Path>>(path: P) -> Result<Vec<ControlPoint>, CarveError> {
    let path = path.as_ref();
    let points = import_from_str(&fs::read_to_string(path)?)?;
    log::info!("imported {} control points from {}", points.len(), path.display());
    Ok(points)
}
