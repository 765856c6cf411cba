//! Geolife trajectory source.
//!
//! Reads the Geolife directory layout `D/Data/<userFolder>/Trajectory/*.plt`.
//! Each `.plt` file carries 6 header lines followed by CSV rows
//! `lat,lng,0,altitude,days,date,time`; timestamps are naive local values
//! frozen as UTC. Malformed rows are skipped silently.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{MiningError, Result};
use crate::GpsFix;

/// Number of header lines at the top of every `.plt` file.
const PLT_HEADER_LINES: usize = 6;

/// Timestamp layout of the `date,time` fields.
const PLT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Enumerate user folders under `root/Data`, each with its `.plt` files.
///
/// Folders and files are returned sorted by name so imports are
/// reproducible. Users without a `Trajectory` directory get an empty file
/// list.
pub fn user_folders(root: &Path) -> Result<Vec<(String, Vec<PathBuf>)>> {
    let data_dir = root.join("Data");
    let entries = fs::read_dir(&data_dir).map_err(|e| MiningError::InputMalformed {
        source_name: data_dir.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut folders = Vec::new();
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let folder = entry.file_name().to_string_lossy().into_owned();
        let trajectory_dir = entry.path().join("Trajectory");

        let mut files: Vec<PathBuf> = match fs::read_dir(&trajectory_dir) {
            Ok(entries) => entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "plt"))
                .collect(),
            Err(_) => Vec::new(),
        };
        files.sort();
        folders.push((folder, files));
    }

    folders.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(folders)
}

/// Parse one `.plt` file into GPS fixes.
///
/// Rows with fewer than 7 fields or unparseable numbers are skipped; a file
/// shorter than its header is malformed. The returned fixes are in file
/// order (Geolife files are already time-sorted; the stay-point detector
/// re-sorts defensively anyway).
pub fn parse_plt(path: &Path) -> Result<Vec<GpsFix>> {
    let file = File::open(path).map_err(|e| MiningError::InputMalformed {
        source_name: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let reader = BufReader::new(file);

    let mut fixes = Vec::new();
    let mut lines = reader.lines();

    for _ in 0..PLT_HEADER_LINES {
        match lines.next() {
            Some(Ok(_)) => {}
            _ => {
                return Err(MiningError::InputMalformed {
                    source_name: path.display().to_string(),
                    reason: "file shorter than its 6-line header".into(),
                })
            }
        }
    }

    for line in lines {
        let Ok(line) = line else { continue };
        if let Some(fix) = parse_plt_line(&line) {
            fixes.push(fix);
        } else {
            log::trace!("skipping malformed line in {}: {line}", path.display());
        }
    }

    Ok(fixes)
}

/// Parse one CSV row; `None` when the row is malformed.
fn parse_plt_line(line: &str) -> Option<GpsFix> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 7 {
        return None;
    }

    let latitude: f64 = fields[0].trim().parse().ok()?;
    let longitude: f64 = fields[1].trim().parse().ok()?;
    let altitude: f64 = fields[3].trim().parse().ok()?;

    let stamp = format!("{} {}", fields[5].trim(), fields[6].trim());
    let timestamp = NaiveDateTime::parse_from_str(&stamp, PLT_TIME_FORMAT)
        .ok()?
        .and_utc();

    Some(GpsFix::new(latitude, longitude, altitude, timestamp))
}

/// Earliest and latest timestamps of a fix sequence.
pub fn time_span(fixes: &[GpsFix]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = fixes.iter().map(|f| f.timestamp).min()?;
    let end = fixes.iter().map(|f| f.timestamp).max()?;
    Some((start, end))
}
