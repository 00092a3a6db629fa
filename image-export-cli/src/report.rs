//! Report generation
//!
//! Prints a console summary of all sessions and writes pulled buffers to disk:
//! one `.raw` file with the bytes exactly as exported, plus a JSON sidecar
//! describing them.

use crate::session::{RoundReport, SessionReport};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use image_export_bridge::{make_directory, Extent, ImageMetadata, ImportedImage, Indent};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// JSON sidecar describing one raw buffer
#[derive(Debug, Serialize)]
pub struct Sidecar<'a> {
    pub session: &'a str,
    pub round: usize,
    pub raw_file: String,
    pub metadata: &'a ImageMetadata,
    pub data_extent: Extent,
    pub byte_count: usize,
    pub scalar_range: Option<(f64, f64)>,
    pub exported_at: String,
}

/// Print the per-session, per-round summary to stdout
pub fn print_summary(reports: &[SessionReport]) {
    println!("═══════════════════════════════════════════════");
    println!("  Image Export Bridge - Summary");
    println!("═══════════════════════════════════════════════\n");

    for report in reports {
        print_session(report, Indent::default());
    }

    let rounds: usize = reports.iter().map(|r| r.rounds.len()).sum();
    let pulled: usize = reports.iter().map(|r| r.pulled_rounds()).sum();
    let failed: usize = reports.iter().map(|r| r.failed_rounds()).sum();
    println!("───────────────────────────────────────────────");
    println!(
        "{} sessions, {} rounds, {} pulled, {} failed",
        reports.len(),
        rounds,
        pulled,
        failed
    );
}

fn print_session(report: &SessionReport, indent: Indent) {
    println!("{}Session '{}' (bridge #{})", indent, report.name, report.handle);
    let inner = indent.next();
    println!(
        "{}Events: {} start, {} end",
        inner, report.start_events, report.end_events
    );
    for round in &report.rounds {
        print_round(round, inner);
    }
    println!();
}

fn print_round(round: &RoundReport, indent: Indent) {
    let status = match (&round.pulled, round.consumer_status, &round.error) {
        (_, _, Some(error)) => format!("✗ {}", error),
        (_, Some(0), None) => "✓ consumer ok".to_string(),
        (_, Some(code), None) => format!("✗ consumer returned {}", code),
        (Some(image), None, None) => {
            let range = image
                .scalar_range()
                .map(|(lo, hi)| format!("[{}, {}]", lo, hi))
                .unwrap_or_else(|| "-".to_string());
            format!(
                "✓ {} bytes, extent {}, range {}",
                image.as_bytes().len(),
                image.data_extent,
                range
            )
        }
        (None, None, None) => "- unchanged".to_string(),
    };
    println!("{}Round {}: {}", indent, round.round, status);
}

/// Write every pulled round of `report` under `dir`, returning the raw files
pub fn write_session(dir: &Path, report: &SessionReport, sidecar: bool) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for round in &report.rounds {
        if let Some(image) = &round.pulled {
            written.push(write_round(dir, &report.name, round.round, image, sidecar)?);
        }
    }
    Ok(written)
}

/// Write one pulled image as `<session>_round<N>.raw` (+ `.json`)
pub fn write_round(
    dir: &Path,
    session: &str,
    round: usize,
    image: &ImportedImage,
    sidecar: bool,
) -> Result<PathBuf> {
    let dir_str = dir
        .to_str()
        .with_context(|| format!("Output directory is not valid UTF-8: {:?}", dir))?;
    if !make_directory(dir_str) {
        bail!("Failed to create output directory: {:?}", dir);
    }

    let stem = format!("{}_round{}", session, round);
    let raw_path = dir.join(format!("{}.raw", stem));
    fs::write(&raw_path, image.as_bytes())
        .with_context(|| format!("Failed to write raw buffer: {:?}", raw_path))?;

    if sidecar {
        let json_path = dir.join(format!("{}.json", stem));
        let description = Sidecar {
            session,
            round,
            raw_file: format!("{}.raw", stem),
            metadata: &image.metadata,
            data_extent: image.data_extent,
            byte_count: image.as_bytes().len(),
            scalar_range: image.scalar_range(),
            exported_at: Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&description)
            .context("Failed to serialize sidecar")?;
        fs::write(&json_path, json)
            .with_context(|| format!("Failed to write sidecar: {:?}", json_path))?;
    }

    log::debug!("Wrote {:?}", raw_path);
    Ok(raw_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_export_bridge::{ScalarBuffer, ScalarType};

    fn image() -> ImportedImage {
        let extent = Extent::new([0, 1, 0, 1, 0, 0]);
        ImportedImage {
            metadata: ImageMetadata {
                whole_extent: extent,
                spacing: [1.0; 3],
                origin: [0.0; 3],
                scalar_type: ScalarType::UnsignedShort,
                number_of_components: 1,
            },
            data_extent: extent,
            scalars: ScalarBuffer::from_fn(ScalarType::UnsignedShort, 4, |i| i as f64),
        }
    }

    #[test]
    fn test_write_round_creates_raw_and_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/out");

        let raw = write_round(&dir, "ct", 2, &image(), true).unwrap();
        assert_eq!(raw, dir.join("ct_round2.raw"));
        assert_eq!(fs::read(&raw).unwrap(), vec![0, 0, 1, 0, 2, 0, 3, 0]);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("ct_round2.json")).unwrap()).unwrap();
        assert_eq!(json["session"], "ct");
        assert_eq!(json["byte_count"], 8);
        assert_eq!(json["metadata"]["scalar_type"], "unsigned_short");
        assert_eq!(json["data_extent"], serde_json::json!([0, 1, 0, 1, 0, 0]));
        assert!(json["exported_at"].as_str().is_some());
    }

    #[test]
    fn test_write_session_skips_unpulled_rounds() {
        let tmp = tempfile::tempdir().unwrap();
        let report = SessionReport {
            name: "s".to_string(),
            handle: 1,
            rounds: vec![
                RoundReport {
                    round: 0,
                    pulled: Some(image()),
                    consumer_status: None,
                    error: None,
                },
                RoundReport {
                    round: 1,
                    pulled: None,
                    consumer_status: None,
                    error: None,
                },
            ],
            start_events: 1,
            end_events: 1,
        };

        let written = write_session(tmp.path(), &report, false).unwrap();
        assert_eq!(written.len(), 1);
        assert!(!tmp.path().join("s_round0.json").exists());
    }

    #[test]
    fn test_write_round_fails_when_directory_blocked() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("blocker"), b"x").unwrap();

        let result = write_round(&tmp.path().join("blocker/out"), "s", 0, &image(), false);
        assert!(result.is_err());
    }
}
