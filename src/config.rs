use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "dita-bitext.toml";
pub const CONFIG_ENV: &str = "DITA_BITEXT_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub languages: LanguagesSection,
    #[serde(default)]
    pub segmentation: SegmentationSection,
    #[serde(default)]
    pub profiling: ProfilingSection,
    #[serde(default)]
    pub merge: MergeSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct LanguagesSection {
    /// Source language code written to every `<file source-language>`.
    #[serde(default)]
    pub source: Option<String>,
    /// Target languages used when none are given on the command line.
    #[serde(default)]
    pub targets: Option<Vec<String>>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct SegmentationSection {
    /// Elements whose text forms one segment (paragraph-like).
    #[serde(default)]
    pub block_elements: Option<Vec<String>>,
    /// Body containers; also segment boundaries.
    #[serde(default)]
    pub body_elements: Option<Vec<String>>,
    /// Elements never translated; kept verbatim.
    #[serde(default)]
    pub skip_elements: Option<Vec<String>>,
    /// `element@attribute` pairs in topics that point at non-text assets.
    #[serde(default)]
    pub asset_refs: Option<Vec<String>>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ProfilingSection {
    /// Attribute names treated as profiling attributes (filtered and unioned).
    #[serde(default)]
    pub attributes: Option<Vec<String>>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct MergeSection {
    #[serde(default)]
    pub overwrite: Option<bool>,
    #[serde(default)]
    pub copy_assets: Option<bool>,
    #[serde(default)]
    pub strict: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct OutputSection {
    /// Default folder for generated containers, relative to the root map.
    #[serde(default)]
    pub xliff_dir: Option<PathBuf>,
    /// `prefix` or `copy`.
    #[serde(default)]
    pub pseudo_mode: Option<String>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    find_file_upwards(workdir, filename, 8)
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}
