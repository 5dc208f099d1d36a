use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::config::{find_default_config, load_config, AppConfig, CONFIG_ENV, CONFIG_FILE_NAME};
use crate::dita::extract::SegmentationRules;
use crate::dita::graph::AssetRefs;
use crate::xliff::pseudo::PseudoMode;

const DEFAULT_BLOCK_ELEMENTS: &[&str] = &[
    "title", "shortdesc", "abstract", "p", "li", "sli", "dt", "dd", "entry", "stentry", "cmd", "info",
    "stepresult", "stepxmp", "context", "result", "prereq", "postreq", "note", "lq", "desc", "alt",
    "navtitle", "linktext", "searchtitle", "glossterm", "glossdef", "choption", "chdesc",
    "proptype", "propvalue", "propdesc", "lines",
];

const DEFAULT_BODY_ELEMENTS: &[&str] = &[
    "body", "conbody", "taskbody", "refbody", "glossBody", "troublebody", "topicmeta",
];

const DEFAULT_SKIP_ELEMENTS: &[&str] = &[
    "prolog", "codeblock", "draft-comment", "required-cleanup", "data", "foreign", "unknown",
    "critdates", "permissions", "resourceid", "othermeta",
];

const DEFAULT_ASSET_REFS: &[&str] = &["image@href", "object@data"];

const DEFAULT_PROFILING_ATTRIBUTES: &[&str] =
    &["product", "platform", "audience", "otherprops", "props", "deliveryTarget"];

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Caller policy for one merge. The three switches are independent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergeOptions {
    /// Replace topics that already exist in the output folder.
    pub overwrite: bool,
    /// Copy the non-text assets listed in the container.
    pub copy_assets: bool,
    /// Reject a document on missing targets or mismatched units instead of
    /// falling back to source text.
    pub strict: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            copy_assets: true,
            strict: false,
        }
    }
}

/// Everything an engine call needs, resolved once and passed explicitly.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// File the values came from, when there was one.
    pub config_path: Option<PathBuf>,
    pub source_lang: String,
    pub target_langs: Vec<String>,
    pub segmentation: SegmentationRules,
    pub asset_refs: AssetRefs,
    pub profiling_attributes: Vec<String>,
    pub merge: MergeOptions,
    pub xliff_dir: Option<PathBuf>,
    pub pseudo_mode: PseudoMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            source_lang: "en-US".to_string(),
            target_langs: Vec::new(),
            segmentation: SegmentationRules::new(
                &owned(DEFAULT_BLOCK_ELEMENTS),
                &owned(DEFAULT_BODY_ELEMENTS),
                &owned(DEFAULT_SKIP_ELEMENTS),
            ),
            asset_refs: AssetRefs::default(),
            profiling_attributes: owned(DEFAULT_PROFILING_ATTRIBUTES),
            merge: MergeOptions::default(),
            xliff_dir: None,
            pseudo_mode: PseudoMode::Prefix,
        }
    }
}

impl EngineConfig {
    pub fn from_app_config(cfg: &AppConfig, config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut out = Self {
            config_path,
            ..Self::default()
        };

        if let Some(src) = cfg.languages.source.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            out.source_lang = src.to_string();
        }
        if let Some(targets) = &cfg.languages.targets {
            out.target_langs = targets
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }

        let seg = &cfg.segmentation;
        if seg.block_elements.is_some() || seg.body_elements.is_some() || seg.skip_elements.is_some() {
            out.segmentation = SegmentationRules::new(
                seg.block_elements.as_deref().unwrap_or(&owned(DEFAULT_BLOCK_ELEMENTS)),
                seg.body_elements.as_deref().unwrap_or(&owned(DEFAULT_BODY_ELEMENTS)),
                seg.skip_elements.as_deref().unwrap_or(&owned(DEFAULT_SKIP_ELEMENTS)),
            );
        }
        if let Some(refs) = &seg.asset_refs {
            out.asset_refs = AssetRefs::parse(refs).context("[segmentation].asset_refs")?;
        }
        if let Some(attrs) = &cfg.profiling.attributes {
            out.profiling_attributes = attrs.clone();
        }

        let m = &cfg.merge;
        out.merge = MergeOptions {
            overwrite: m.overwrite.unwrap_or(out.merge.overwrite),
            copy_assets: m.copy_assets.unwrap_or(out.merge.copy_assets),
            strict: m.strict.unwrap_or(out.merge.strict),
        };

        out.xliff_dir = cfg.output.xliff_dir.clone();
        if let Some(mode) = cfg.output.pseudo_mode.as_deref() {
            out.pseudo_mode = PseudoMode::parse(mode)
                .ok_or_else(|| anyhow!("[output].pseudo_mode must be \"prefix\" or \"copy\", got {mode:?}"))?;
        }
        Ok(out)
    }

    /// Resolves the config file (explicit path, then `DITA_BITEXT_CONFIG`, then an
    /// upward search from the working directory and `workdir`) and loads it.
    /// Built-in defaults apply when no file is found.
    pub fn load(explicit: Option<PathBuf>, workdir: &Path) -> anyhow::Result<Self> {
        let cfg_file = explicit
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| find_default_config(workdir, CONFIG_FILE_NAME));
        match cfg_file {
            Some(p) if p.exists() => {
                log::debug!("using config {}", p.display());
                let app = load_config(&p)?;
                Self::from_app_config(&app, Some(p))
            }
            Some(p) => Err(anyhow!("config file not found: {}", p.display())),
            None => Ok(Self::default()),
        }
    }
}

/// Writes a commented default `dita-bitext.toml` into `dir`. An existing file
/// is kept unless `force` is set.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }

    let list = |items: &[&str]| {
        items
            .iter()
            .map(|s| format!("\"{s}\""))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let cfg_text = format!(
        r#"[languages]
source = "en-US"
# Used when no -l/--lang is given.
targets = []

[segmentation]
block_elements = [{block}]
body_elements = [{body}]
skip_elements = [{skip}]
asset_refs = [{assets}]

[profiling]
attributes = [{profiling}]

[merge]
overwrite = true
copy_assets = true
# Reject documents with missing targets instead of shipping source text.
strict = false

[output]
# xliff_dir = "xliff"
pseudo_mode = "prefix"
"#,
        block = list(DEFAULT_BLOCK_ELEMENTS),
        body = list(DEFAULT_BODY_ELEMENTS),
        skip = list(DEFAULT_SKIP_ELEMENTS),
        assets = list(DEFAULT_ASSET_REFS),
        profiling = list(DEFAULT_PROFILING_ATTRIBUTES),
    );
    std::fs::write(&cfg_path, cfg_text)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}
