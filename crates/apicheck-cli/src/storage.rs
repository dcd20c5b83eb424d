//! Persistent state under `~/.apicheck/`
//!
//! - `patterns.json`: the learned pattern store, loaded before and saved
//!   after every `apicheck run`
//! - `reports/{suite}_{timestamp}/`: one directory per saved run

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use apicheck_core::{BatchReport, Config, InMemoryPatternStore, PatternEntry, PatternStore};

/// Everything needed to persist a run.
pub struct ReportData<'a> {
    pub suite_name: &'a str,
    pub config: &'a Config,
    pub report: &'a BatchReport,
    pub simulated: bool,
}

/// Save a run report to `{base}/{suite}_{timestamp}/`.
///
/// Returns the report directory path on success.
pub fn save_report(base: &Path, data: &ReportData) -> Result<PathBuf, std::io::Error> {
    let report_dir = base.join(build_dir_name(data.suite_name));
    std::fs::create_dir_all(&report_dir)?;

    // config.toml: snapshot of the config used
    let config_toml =
        toml::to_string_pretty(data.config).map_err(|e| std::io::Error::other(e.to_string()))?;
    std::fs::write(report_dir.join("config.toml"), config_toml)?;

    // summary.json: counts + metadata
    let summary = serde_json::json!({
        "summary": data.report.summary,
        "meta": {
            "suite": data.suite_name,
            "timestamp": timestamp_iso(),
            "simulated": data.simulated,
        },
    });
    std::fs::write(
        report_dir.join("summary.json"),
        serde_json::to_string_pretty(&summary).map_err(std::io::Error::other)?,
    )?;

    // results.json: every execution result, in suite order
    std::fs::write(
        report_dir.join("results.json"),
        serde_json::to_string_pretty(&data.report.results).map_err(std::io::Error::other)?,
    )?;

    Ok(report_dir)
}

fn apicheck_home() -> Result<PathBuf, std::io::Error> {
    let home = std::env::var("HOME")
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home).join(".apicheck"))
}

pub fn report_base_dir() -> Result<PathBuf, std::io::Error> {
    Ok(apicheck_home()?.join("reports"))
}

/// Pattern store location: explicit path, then config, then `~/.apicheck/patterns.json`.
pub fn patterns_path(explicit: Option<&Path>, config: &Config) -> Result<PathBuf, std::io::Error> {
    if let Some(path) = explicit.or(config.patterns_file.as_deref()) {
        return Ok(path.to_path_buf());
    }
    Ok(apicheck_home()?.join("patterns.json"))
}

/// Load persisted patterns. A missing file is an empty store.
pub fn load_patterns(path: &Path) -> Result<InMemoryPatternStore, std::io::Error> {
    if !path.exists() {
        return Ok(InMemoryPatternStore::new());
    }
    let content = std::fs::read_to_string(path)?;
    let entries: Vec<PatternEntry> = serde_json::from_str(&content).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {e}", path.display()),
        )
    })?;
    Ok(InMemoryPatternStore::from_entries(entries))
}

/// Write all entries as pretty JSON, creating parent directories.
pub fn save_patterns(path: &Path, store: &dyn PatternStore) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json =
        serde_json::to_string_pretty(&store.entries()).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

/// `{suite}_{timestamp}` e.g. `users_api_20260205T193000`
fn build_dir_name(suite_name: &str) -> String {
    let ts = timestamp_compact();
    format!("{}_{ts}", slug(suite_name))
}

/// Filesystem-safe suite name: `"Users API v2"` → `"users_api_v2"`.
fn slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect::<String>()
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if slug.is_empty() {
        "suite".to_string()
    } else {
        slug
    }
}

/// `"20260205T193000"`: filesystem-safe compact timestamp.
fn timestamp_compact() -> String {
    let (y, mo, d, h, mi, s) = utc_now();
    format!("{y:04}{mo:02}{d:02}T{h:02}{mi:02}{s:02}")
}

/// `"2026-02-05T19:30:00Z"`: ISO 8601 for JSON.
fn timestamp_iso() -> String {
    let (y, mo, d, h, mi, s) = utc_now();
    format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}Z")
}

/// Current UTC date-time from epoch.
fn utc_now() -> (i32, u32, u32, u32, u32, u32) {
    let epoch_secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let days = (epoch_secs / 86400) as i64;
    let tod = epoch_secs % 86400;
    let (y, m, d) = civil_from_days(days);
    (
        y,
        m,
        d,
        (tod / 3600) as u32,
        ((tod % 3600) / 60) as u32,
        (tod % 60) as u32,
    )
}

/// Howard Hinnant's `civil_from_days`: epoch days → (year, month, day).
///
/// Reference: <https://howardhinnant.github.io/date_algorithms.html#civil_from_days>
fn civil_from_days(days: i64) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = (z - era * 146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y as i32, m, d)
}
