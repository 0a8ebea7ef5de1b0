use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::processor::LedgerExport;

const CACHE_DIR: &str = "crease_live";
const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExportFile {
    version: u32,
    export: LedgerExport,
}

/// Writes the export next to the others under the cache dir and returns its path.
pub fn save_export(export: &LedgerExport) -> Result<PathBuf> {
    let dir = export_dir().context("no cache directory available (set XDG_CACHE_HOME or HOME)")?;
    let path = dir.join(export_file_name(&export.setup.settings.match_id));
    save_export_to(export, &path)?;
    Ok(path)
}

/// Atomic: the file is either the old export or the new one, never half written.
pub fn save_export_to(export: &LedgerExport, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let file = ExportFile {
        version: EXPORT_VERSION,
        export: export.clone(),
    };
    let json = serde_json::to_string_pretty(&file).context("serializing ledger export")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

pub fn load_export(path: &Path) -> Result<LedgerExport> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: ExportFile = serde_json::from_str(&raw).context("invalid ledger export json")?;
    if file.version != EXPORT_VERSION {
        bail!(
            "unsupported export version {} (expected {EXPORT_VERSION})",
            file.version
        );
    }
    Ok(file.export)
}

pub fn export_dir() -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

fn export_file_name(match_id: &str) -> String {
    let safe: String = match_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{safe}.ledger.json")
}
