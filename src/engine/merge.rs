use std::path::Path;

use crate::dita::apply::apply_document;
use crate::dita::assets::{copy_asset, CopyOutcome};
use crate::dita::graph::check_relative_path;
use crate::engine::config::{EngineConfig, MergeOptions};
use crate::engine::reconcile::{reconcile_map_file, write_atomic};
use crate::errors::{Issue, IssueKind};
use crate::ir::{Bitext, DocumentKind};
use crate::xliff::read::read_xliff_partial_path;

#[derive(Debug, Default)]
pub struct MergeReport {
    /// Root-relative paths.
    pub written_topics: Vec<String>,
    pub written_maps: Vec<String>,
    pub copied_assets: Vec<String>,
    /// Topics left alone because they existed and overwrite was off.
    pub skipped: Vec<String>,
    /// Units that shipped source text because they had no target.
    pub untranslated_units: usize,
    pub issues: Vec<Issue>,
}

impl MergeReport {
    pub fn has_fatal(&self) -> bool {
        self.issues.iter().any(|i| i.fatal)
    }
}

/// Reads a translated container and merges it into `out_dir`. A `<file>` that
/// cannot be read is reported and the other documents still merge.
pub fn import(
    xliff: &Path,
    out_dir: &Path,
    opts: MergeOptions,
    cfg: &EngineConfig,
) -> anyhow::Result<MergeReport> {
    let read = read_xliff_partial_path(xliff)?;
    log::info!(
        "{}: {} document(s), {} unit(s)",
        xliff.display(),
        read.bitext.files.len(),
        read.bitext.unit_count()
    );
    let mut report = import_bitext(&read.bitext, out_dir, opts, cfg);
    let mut issues = read.issues;
    issues.append(&mut report.issues);
    report.issues = issues;
    Ok(report)
}

/// Rebuilds every document of `bitext` under `out_dir`. Topics are written
/// (last merge wins), maps are reconciled with what is already there, assets
/// are copied from the source tree recorded in the container.
pub fn import_bitext(
    bitext: &Bitext,
    out_dir: &Path,
    opts: MergeOptions,
    cfg: &EngineConfig,
) -> MergeReport {
    let mut report = MergeReport::default();

    for file in &bitext.files {
        let doc = file.original.as_str();
        if let Err(e) = check_relative_path(doc) {
            log::warn!("{doc}: {e:#}");
            report.issues.push(Issue::from_error(IssueKind::Input, doc, &e));
            continue;
        }
        let out_path = out_dir.join(doc);
        if file.kind == DocumentKind::Topic && !opts.overwrite && out_path.exists() {
            log::info!("{doc}: exists, skipped");
            report.skipped.push(doc.to_string());
            continue;
        }

        let applied = apply_document(file, opts.strict);
        report.untranslated_units += applied.untranslated_units;
        report.issues.extend(applied.issues);
        let Some(bytes) = applied.bytes else {
            log::warn!("{doc}: not written");
            continue;
        };

        match file.kind {
            DocumentKind::Topic => match write_atomic(&out_path, &bytes) {
                Ok(()) => report.written_topics.push(doc.to_string()),
                Err(e) => report.issues.push(Issue::from_error(IssueKind::Output, doc, &e)),
            },
            DocumentKind::Map => {
                match reconcile_map_file(&out_path, doc, &bytes, &cfg.profiling_attributes) {
                    Ok(conflicts) => {
                        report.issues.extend(conflicts);
                        report.written_maps.push(doc.to_string());
                    }
                    Err(e) => report.issues.push(Issue::from_error(IssueKind::Output, doc, &e)),
                }
            }
        }
    }

    if opts.copy_assets {
        copy_assets(bitext, out_dir, &mut report);
    }
    if report.untranslated_units > 0 {
        log::info!("{} unit(s) kept source text", report.untranslated_units);
    }
    report
}

fn copy_assets(bitext: &Bitext, out_dir: &Path, report: &mut MergeReport) {
    let Some(root) = bitext.root_map() else {
        return;
    };
    if root.assets.is_empty() {
        return;
    }
    let Some(source_root) = root.source_root.as_deref() else {
        report.issues.push(Issue::fatal(
            IssueKind::Input,
            &root.original,
            "container lists assets but no source-root",
        ));
        return;
    };
    for asset in &root.assets {
        match copy_asset(source_root, asset, out_dir) {
            Ok(CopyOutcome::Copied) => report.copied_assets.push(asset.clone()),
            Ok(CopyOutcome::Unchanged) => log::debug!("{asset}: unchanged"),
            Err(e) => {
                log::warn!("{asset}: {e:#}");
                report.issues.push(Issue::from_error(IssueKind::Input, asset, &e));
            }
        }
    }
}
