use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Context};

use crate::dita::xml::{escape_text_into, parse_events};
use crate::errors::{Issue, IssueKind};
use crate::ir::{InlineRun, InterchangeFile, TranslationUnit};
use crate::sentinels::{split_unit_markers, MarkerPiece};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum PlaceholderKind {
    Open,
    Close,
    Standalone,
}

fn placeholder(run: &InlineRun) -> Option<(usize, PlaceholderKind)> {
    match run {
        InlineRun::Text(_) => None,
        InlineRun::Open { id, .. } => Some((*id, PlaceholderKind::Open)),
        InlineRun::Close { id, .. } => Some((*id, PlaceholderKind::Close)),
        InlineRun::Standalone { id, .. } => Some((*id, PlaceholderKind::Standalone)),
    }
}

/// Outcome of rebuilding one document.
#[derive(Debug, Default)]
pub struct Applied {
    /// `None` when a fatal issue rejected the document.
    pub bytes: Option<Vec<u8>>,
    pub issues: Vec<Issue>,
    pub untranslated_units: usize,
}

impl Applied {
    pub fn is_rejected(&self) -> bool {
        self.bytes.is_none()
    }
}

/// Checks a target against the placeholders of its source: same ids and
/// kinds, each used exactly once, properly nested.
pub fn validate_target(source: &[InlineRun], target: &[InlineRun]) -> Result<(), String> {
    let expected: HashSet<(usize, PlaceholderKind)> = source.iter().filter_map(placeholder).collect();
    let mut seen: HashSet<(usize, PlaceholderKind)> = HashSet::new();
    let mut open: Vec<usize> = Vec::new();

    for run in target {
        let Some(key) = placeholder(run) else {
            continue;
        };
        if !expected.contains(&key) {
            return Err(format!("unknown placeholder {} ({:?})", key.0, key.1));
        }
        if !seen.insert(key) {
            return Err(format!("placeholder {} used twice", key.0));
        }
        match key.1 {
            PlaceholderKind::Open => open.push(key.0),
            PlaceholderKind::Close => {
                if open.pop() != Some(key.0) {
                    return Err(format!("placeholder {} closed out of order", key.0));
                }
            }
            PlaceholderKind::Standalone => {}
        }
    }
    if let Some(id) = open.first() {
        return Err(format!("placeholder {id} never closed"));
    }
    let mut missing: Vec<usize> = expected.difference(&seen).map(|(id, _)| *id).collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        missing.dedup();
        return Err(format!("placeholder(s) {missing:?} dropped"));
    }
    Ok(())
}

/// Serializes runs as XML content. Placeholder markup always comes from the
/// source unit, whatever the target carries.
fn render_runs(unit: &TranslationUnit, runs: &[InlineRun], out: &mut Vec<u8>) -> anyhow::Result<()> {
    let markup: HashMap<(usize, PlaceholderKind), &str> = unit
        .source
        .iter()
        .filter_map(|r| {
            let key = placeholder(r)?;
            let m = match r {
                InlineRun::Open { markup, .. }
                | InlineRun::Close { markup, .. }
                | InlineRun::Standalone { markup, .. } => markup.as_str(),
                InlineRun::Text(_) => return None,
            };
            Some((key, m))
        })
        .collect();

    for run in runs {
        match placeholder(run) {
            None => {
                if let InlineRun::Text(t) = run {
                    escape_text_into(out, t);
                }
            }
            Some(key) => {
                let m = markup
                    .get(&key)
                    .ok_or_else(|| anyhow!("unit {}: no source markup for placeholder {}", unit.id, key.0))?;
                out.extend_from_slice(m.as_bytes());
            }
        }
    }
    Ok(())
}

/// Picks the runs that go into the document for one unit, recording what
/// happened. Returns `None` when the unit rejects the whole document.
fn choose_runs<'a>(
    file: &InterchangeFile,
    unit: &'a TranslationUnit,
    strict: bool,
    applied: &mut Applied,
) -> Option<&'a [InlineRun]> {
    let doc = file.original.as_str();
    let Some(target) = unit.target.as_deref() else {
        if strict {
            applied.issues.push(
                Issue::fatal(IssueKind::MissingTarget, doc, "unit has no target").with_unit(unit.id),
            );
            return None;
        }
        applied.untranslated_units += 1;
        return Some(&unit.source);
    };

    let source_has_text = unit.source.iter().any(|r| matches!(r, InlineRun::Text(t) if !t.trim().is_empty()));
    let target_has_text = target.iter().any(|r| matches!(r, InlineRun::Text(t) if !t.trim().is_empty()));
    if source_has_text && !target_has_text {
        applied.issues.push(
            Issue::warning(IssueKind::MissingTarget, doc, "empty target, kept source").with_unit(unit.id),
        );
        applied.untranslated_units += 1;
        return Some(&unit.source);
    }

    match validate_target(&unit.source, target) {
        Ok(()) => Some(target),
        Err(msg) if strict => {
            applied
                .issues
                .push(Issue::fatal(IssueKind::StructuralMismatch, doc, msg).with_unit(unit.id));
            None
        }
        Err(msg) => {
            log::warn!("{doc}: unit {}: {msg}; keeping source", unit.id);
            applied.issues.push(
                Issue::warning(IssueKind::StructuralMismatch, doc, format!("{msg}, kept source"))
                    .with_unit(unit.id),
            );
            Some(&unit.source)
        }
    }
}

/// Rebuilds a document from its skeleton and translated units.
///
/// Strict mode rejects the document on the first missing or malformed target;
/// otherwise source text is substituted and the substitution is reported.
pub fn apply_document(file: &InterchangeFile, strict: bool) -> Applied {
    let mut applied = Applied::default();
    let doc = file.original.as_str();

    let by_id: HashMap<usize, &TranslationUnit> = file.units.iter().map(|u| (u.id, u)).collect();
    let mut used: HashSet<usize> = HashSet::new();
    let mut out: Vec<u8> = Vec::with_capacity(file.skeleton.len() * 2);
    let mut rejected = false;

    for piece in split_unit_markers(&file.skeleton) {
        match piece {
            MarkerPiece::Text(t) => out.extend_from_slice(t.as_bytes()),
            MarkerPiece::Unit(id) => {
                let Some(unit) = by_id.get(&id) else {
                    applied.issues.push(Issue::fatal(
                        IssueKind::StructuralMismatch,
                        doc,
                        format!("skeleton refers to unit {id} which is not in the container"),
                    ));
                    return applied;
                };
                if !used.insert(id) {
                    applied.issues.push(
                        Issue::fatal(IssueKind::StructuralMismatch, doc, "unit marker appears twice")
                            .with_unit(id),
                    );
                    return applied;
                }
                match choose_runs(file, unit, strict, &mut applied) {
                    Some(runs) => {
                        if let Err(e) = render_runs(unit, runs, &mut out) {
                            applied
                                .issues
                                .push(Issue::from_error(IssueKind::StructuralMismatch, doc, &e));
                            return applied;
                        }
                    }
                    None => rejected = true,
                }
            }
        }
    }

    let mut orphans: Vec<usize> = by_id.keys().filter(|id| !used.contains(id)).copied().collect();
    orphans.sort_unstable();
    for id in orphans {
        let issue = Issue::fatal(IssueKind::StructuralMismatch, doc, "unit has no place in the skeleton").with_unit(id);
        if strict {
            applied.issues.push(issue);
            rejected = true;
        } else {
            applied.issues.push(Issue { fatal: false, ..issue });
        }
    }
    if rejected {
        return applied;
    }

    if let Err(e) = check_well_formed(&out) {
        applied
            .issues
            .push(Issue::from_error(IssueKind::StructuralMismatch, doc, &e));
        return applied;
    }
    applied.bytes = Some(out);
    applied
}

fn check_well_formed(bytes: &[u8]) -> anyhow::Result<()> {
    let text = std::str::from_utf8(bytes).context("merged document is not utf-8")?;
    parse_events(text).context("merged document is not well-formed")?;
    Ok(())
}
