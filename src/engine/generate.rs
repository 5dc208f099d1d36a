use std::path::{Path, PathBuf};

use anyhow::anyhow;

use crate::dita::extract::{extract_document, Extraction};
use crate::dita::graph::{load_graph, DocumentGraph, GraphDocument};
use crate::dita::profile::ProfileRules;
use crate::engine::config::EngineConfig;
use crate::errors::{Issue, IssueKind};
use crate::ir::{Bitext, DocumentKind, InterchangeFile};
use crate::xliff::container_name;
use crate::xliff::write::write_xliff_path;

#[derive(Debug, Default)]
pub struct GenerateReport {
    /// One container per target language.
    pub containers: Vec<PathBuf>,
    pub documents: usize,
    pub units: usize,
    pub assets: usize,
    pub issues: Vec<Issue>,
}

/// Extracts the map at `map` into one XLIFF container per target language,
/// written to `out_dir`. `profile` is an optional DITAVAL file.
///
/// An unreadable root map or profile fails the whole call; any other
/// document that cannot be read or segmented is reported and left out.
pub fn generate(
    map: &Path,
    target_langs: &[String],
    profile: Option<&Path>,
    out_dir: &Path,
    cfg: &EngineConfig,
) -> anyhow::Result<GenerateReport> {
    let langs: Vec<String> = if target_langs.is_empty() {
        cfg.target_langs.clone()
    } else {
        target_langs.to_vec()
    };
    if langs.is_empty() {
        return Err(anyhow!("no target language given"));
    }
    let rules = profile
        .map(|p| ProfileRules::from_ditaval_path(p, &cfg.profiling_attributes))
        .transpose()?;

    let graph = load_graph(map, rules.as_ref(), &cfg.asset_refs)?;
    log::info!(
        "{}: {} document(s), {} asset(s){}",
        graph.root_map,
        graph.documents.len(),
        graph.assets.len(),
        rules
            .as_ref()
            .and_then(|r| r.name.as_deref())
            .map(|n| format!(", profile {n}"))
            .unwrap_or_default()
    );

    let mut report = GenerateReport {
        assets: graph.assets.len(),
        issues: graph.issues.clone(),
        ..GenerateReport::default()
    };

    // Segmentation does not depend on the language: do it once per document.
    let mut extracted: Vec<(&GraphDocument, Extraction)> = Vec::with_capacity(graph.documents.len());
    for d in &graph.documents {
        match extract_document(&d.doc, &cfg.segmentation, rules.as_ref()) {
            Ok(x) => {
                log::debug!("{}: {} unit(s)", d.path, x.units.len());
                extracted.push((d, x));
            }
            Err(e) => {
                log::warn!("{}: {e:#}", d.path);
                report.issues.push(Issue::from_error(IssueKind::Input, &d.path, &e));
            }
        }
    }
    report.documents = extracted.len();
    report.units = extracted.iter().map(|(_, x)| x.units.len()).sum();

    let profile_name = rules.as_ref().and_then(|r| r.name.clone());
    for lang in &langs {
        let bitext = build_bitext(&graph, &extracted, &cfg.source_lang, lang, profile_name.as_deref());
        let path = out_dir.join(container_name(&graph.root_map, lang, profile_name.as_deref()));
        match write_xliff_path(&path, &bitext) {
            Ok(()) => {
                log::info!("wrote {} ({} unit(s))", path.display(), bitext.unit_count());
                report.containers.push(path);
            }
            Err(e) => report.issues.push(Issue::from_error(
                IssueKind::Output,
                path.display().to_string(),
                &e,
            )),
        }
    }
    Ok(report)
}

fn build_bitext(
    graph: &DocumentGraph,
    extracted: &[(&GraphDocument, Extraction)],
    source_lang: &str,
    target_lang: &str,
    profile: Option<&str>,
) -> Bitext {
    let files = extracted
        .iter()
        .map(|(d, x)| {
            let root_map = d.kind == DocumentKind::Map && d.path == graph.root_map;
            InterchangeFile {
                original: d.path.clone(),
                kind: d.kind,
                source_lang: source_lang.to_string(),
                target_lang: target_lang.to_string(),
                skeleton: x.skeleton.clone(),
                units: x.units.clone(),
                root_map,
                source_root: root_map.then(|| graph.source_root.clone()),
                profile: profile.map(str::to_string),
                assets: if root_map { graph.assets.clone() } else { Vec::new() },
            }
        })
        .collect();
    Bitext { files }
}
