use std::path::Path;

use anyhow::{anyhow, Context};

use crate::dita::xml::{parse_xml_bytes, verify_structure_unchanged};
use crate::engine::config::{EngineConfig, MergeOptions};
use crate::engine::generate::generate;
use crate::engine::merge::import_bitext;
use crate::errors::Issue;
use crate::xliff::pseudo::{pseudo_translate, PseudoMode};
use crate::xliff::read::read_xliff_path;

const VERIFY_LANG: &str = "x-roundtrip";

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub documents: usize,
    pub assets: usize,
    /// Root-relative paths whose rebuilt form differs from the source.
    pub mismatches: Vec<String>,
    pub issues: Vec<Issue>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.issues.is_empty()
    }
}

/// Extracts `map`, copies every source into its target, merges into a scratch
/// folder and checks each rebuilt document against its source, ignoring
/// formatting whitespace. Assets must come out byte-identical.
pub fn verify_roundtrip(map: &Path, cfg: &EngineConfig) -> anyhow::Result<VerifyReport> {
    let scratch = tempfile::tempdir().context("create scratch folder")?;
    let xliff_dir = scratch.path().join("xliff");
    let out_dir = scratch.path().join("out");

    let generated = generate(map, &[VERIFY_LANG.to_string()], None, &xliff_dir, cfg)?;
    let container = generated
        .containers
        .first()
        .ok_or_else(|| anyhow!("no container written"))?;
    let mut bitext = read_xliff_path(container)?;
    pseudo_translate(&mut bitext, PseudoMode::Copy);

    let opts = MergeOptions {
        overwrite: true,
        copy_assets: true,
        strict: true,
    };
    let merged = import_bitext(&bitext, &out_dir, opts, cfg);

    let mut report = VerifyReport {
        issues: generated.issues,
        ..VerifyReport::default()
    };
    report.issues.extend(merged.issues);

    let source_root = bitext
        .root_map()
        .and_then(|f| f.source_root.clone())
        .ok_or_else(|| anyhow!("container has no source root"))?;
    for file in &bitext.files {
        report.documents += 1;
        let src = std::fs::read(source_root.join(&file.original))
            .with_context(|| format!("read {}", file.original))?;
        let out = match std::fs::read(out_dir.join(&file.original)) {
            Ok(b) => b,
            Err(_) => {
                report.mismatches.push(file.original.clone());
                continue;
            }
        };
        let source = parse_xml_bytes(&file.original, &src)?;
        let rebuilt = parse_xml_bytes(&file.original, &out)?;
        if let Err(e) = verify_structure_unchanged(&source, &rebuilt.events) {
            log::warn!("{e:#}");
            report.mismatches.push(file.original.clone());
        }
    }
    if let Some(root) = bitext.root_map() {
        for asset in &root.assets {
            report.assets += 1;
            let same = match (
                std::fs::read(source_root.join(asset)),
                std::fs::read(out_dir.join(asset)),
            ) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            };
            if !same {
                report.mismatches.push(asset.clone());
            }
        }
    }
    log::info!(
        "round-trip: {} document(s), {} asset(s), {} mismatch(es)",
        report.documents,
        report.assets,
        report.mismatches.len()
    );
    Ok(report)
}
