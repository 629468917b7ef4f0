//! # Results — Final Factorization Report
//!
//! When the coordinator reaches its terminal state it produces a
//! [`FactorReport`], logs it, and (when a results path is configured) writes
//! it twice: a human-readable text block at the path itself and a JSON
//! sidecar next to it (`<path>.json`) for tooling.
//!
//! ## Integrity
//!
//! The sidecar wraps the report in an envelope carrying the SHA-256 of the
//! serialized data; [`load`] refuses a sidecar whose checksum does not match.
//! Both files are written atomically (temp file, then rename).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rug::Integer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::kind::FactorKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorReport {
    pub original: Integer,
    /// Prime factors in ascending order, with multiplicity.
    pub factors: Vec<Integer>,
    pub elapsed_ms: u64,
    /// Kind whose report completed the factorization; `None` when no search ran.
    pub winning_kind: Option<FactorKind>,
    pub bits: u32,
    pub finished_at: DateTime<Utc>,
}

impl FactorReport {
    pub fn new(original: Integer, mut factors: Vec<Integer>, elapsed: Duration, winning_kind: Option<FactorKind>) -> Self {
        factors.sort();
        FactorReport {
            bits: original.significant_bits(),
            original,
            factors,
            elapsed_ms: elapsed.as_millis() as u64,
            winning_kind,
            finished_at: Utc::now(),
        }
    }

    pub fn product(&self) -> Integer {
        self.factors.iter().fold(Integer::from(1u32), |acc, f| acc * f)
    }

    /// True when the factors multiply back to the original number.
    pub fn is_complete(&self) -> bool {
        self.product() == self.original
    }

    pub fn render_text(&self) -> String {
        let joined = self
            .factors
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(" * ");
        let winner = self.winning_kind.map_or("none", |k| k.name());
        format!(
            "Factorization Results\n\n{} = {}\n\n{} seconds, {} millis\nBit length: {}\nWinning algorithm: {}\nFinished: {}\n",
            self.original,
            joined,
            self.elapsed_ms / 1000,
            self.elapsed_ms % 1000,
            self.bits,
            winner,
            self.finished_at.to_rfc3339(),
        )
    }
}

#[derive(Serialize, Deserialize)]
struct ReportEnvelope {
    checksum: String,
    data: serde_json::Value,
}

fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `<path>.json`.
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut p = path.as_os_str().to_os_string();
    p.push(".json");
    PathBuf::from(p)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

/// Write the text report at `path` and the checksummed JSON sidecar beside it.
pub fn save(path: &Path, report: &FactorReport) -> Result<()> {
    let data = serde_json::to_value(report)?;
    let data_str = serde_json::to_string_pretty(&data)?;
    let envelope = ReportEnvelope {
        checksum: sha256_hex(&data_str),
        data,
    };
    write_atomic(&sidecar_path(path), &serde_json::to_string_pretty(&envelope)?)?;
    write_atomic(path, &report.render_text())?;
    Ok(())
}

/// Load the JSON sidecar for `path`, verifying its checksum.
pub fn load(path: &Path) -> Result<FactorReport> {
    let sidecar = sidecar_path(path);
    let raw = fs::read_to_string(&sidecar).with_context(|| format!("reading {}", sidecar.display()))?;
    let envelope: ReportEnvelope = serde_json::from_str(&raw)?;
    let data_str = serde_json::to_string_pretty(&envelope.data)?;
    let expected = sha256_hex(&data_str);
    if expected != envelope.checksum {
        anyhow::bail!(
            "report integrity check failed: {} (expected {}, got {})",
            sidecar.display(),
            &expected[..12],
            &envelope.checksum[..12.min(envelope.checksum.len())]
        );
    }
    Ok(serde_json::from_value(envelope.data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> FactorReport {
        FactorReport::new(
            Integer::from(61_108_093u32),
            vec![Integer::from(9311u32), Integer::from(6563u32)],
            Duration::from_millis(2_345),
            Some(FactorKind::Fermat),
        )
    }

    #[test]
    fn factors_sorted_and_complete() {
        let r = report();
        assert_eq!(r.factors, vec![Integer::from(6563u32), Integer::from(9311u32)]);
        assert!(r.is_complete());
        assert_eq!(r.bits, 26);
    }

    #[test]
    fn text_block_layout() {
        let text = report().render_text();
        assert!(text.starts_with("Factorization Results\n\n61108093 = 6563 * 9311\n"));
        assert!(text.contains("2 seconds, 345 millis"));
        assert!(text.contains("Bit length: 26"));
        assert!(text.contains("Winning algorithm: fermat"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.txt");
        let r = report();
        save(&path, &r).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), r.render_text());
        assert_eq!(load(&path).unwrap(), r);
        assert!(!dir.path().join("results.txt.tmp").exists());
    }

    #[test]
    fn tampered_sidecar_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.txt");
        save(&path, &report()).unwrap();
        let sidecar = sidecar_path(&path);
        let raw = fs::read_to_string(&sidecar).unwrap();
        fs::write(&sidecar, raw.replace("\"fermat\"", "\"trial_up\"")).unwrap();
        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("integrity"));
    }

    #[test]
    fn missing_sidecar_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("nothing.txt")).is_err());
    }

    #[test]
    fn prime_report_has_single_factor() {
        let r = FactorReport::new(Integer::from(9311u32), vec![Integer::from(9311u32)], Duration::ZERO, None);
        assert!(r.is_complete());
        assert!(r.render_text().contains("Winning algorithm: none"));
    }
}
