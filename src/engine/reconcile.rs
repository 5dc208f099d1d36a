//! Read-merge-write of an output map shared by several merges.
//!
//! Every merge re-reads the map from disk, folds its own references into it
//! and replaces the file atomically. Writers of the same path inside one
//! process are serialized by a lock registry keyed on the canonical path.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::dita::tree::{Element, Node, Tree};
use crate::dita::xml::{parse_events, parse_xml_bytes, set_attr, write_events, XmlEvent};
use crate::errors::{Issue, IssueKind};
use crate::textutil::{join_tokens, split_tokens};

static PATH_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn lock_key(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Lock guarding writes to `path`. The parent directory should exist so the
/// key is canonical.
pub fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    let key = lock_key(path);
    PATH_LOCKS.lock().entry(key).or_default().clone()
}

/// Writes through a temp file in the same directory and renames it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?;
    std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write temp file for {}", path.display()))?;
    // Temp files are owner-only; the result gets the mode of the file it
    // replaces, or the usual 0644.
    let permissions = match std::fs::metadata(path) {
        Ok(meta) => meta.permissions(),
        Err(_) => default_permissions(tmp.as_file())?,
    };
    tmp.as_file()
        .set_permissions(permissions)
        .with_context(|| format!("set permissions for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(unix)]
fn default_permissions(_file: &std::fs::File) -> anyhow::Result<std::fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions(file: &std::fs::File) -> anyhow::Result<std::fs::Permissions> {
    Ok(file.metadata().context("temp file metadata")?.permissions())
}

/// Folds `merged` (a freshly rebuilt map) into the map at `out_path`, creating
/// it when absent. Returns the conflicts found; they never stop the write.
pub fn reconcile_map_file(
    out_path: &Path,
    document: &str,
    merged: &[u8],
    profiling_attributes: &[String],
) -> anyhow::Result<Vec<Issue>> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let lock = path_lock(out_path);
    let _guard = lock.lock();

    if !out_path.exists() {
        write_atomic(out_path, merged)?;
        return Ok(Vec::new());
    }

    let existing_bytes =
        std::fs::read(out_path).with_context(|| format!("read {}", out_path.display()))?;
    let existing_doc = parse_xml_bytes(&out_path.display().to_string(), &existing_bytes)?;
    let mut existing = Tree::from_events(&existing_doc.events).context("existing output map")?;

    let merged_text = std::str::from_utf8(merged).context("merged map is not utf-8")?;
    let new = Tree::from_events(&parse_events(merged_text).context("merged map")?)
        .context("merged map")?;
    if existing.root.name != new.root.name {
        return Err(anyhow!(
            "{document}: output map root <{}> does not match <{}>",
            existing.root.name,
            new.root.name
        ));
    }

    let mut issues: Vec<Issue> = Vec::new();
    let mut r = Reconciler {
        document,
        profiling: profiling_attributes,
        issues: &mut issues,
    };
    r.element(&mut existing.root, &new.root);

    let bytes = write_events(&existing.to_events())?;
    write_atomic(out_path, &bytes)?;
    Ok(issues)
}

/// Tokens of `new` not yet in `existing`, appended. `None` when nothing changes.
pub fn union_profiling_value(existing: Option<&str>, new: &str) -> Option<String> {
    let mut tokens = split_tokens(existing.unwrap_or_default());
    let mut changed = false;
    for t in split_tokens(new) {
        if !tokens.contains(&t) {
            tokens.push(t);
            changed = true;
        }
    }
    changed.then(|| join_tokens(&tokens))
}

/// Identity of a child among its siblings: name, reference, ordinal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ChildKey {
    name: String,
    ident: String,
    nth: usize,
}

fn child_keys(el: &Element) -> Vec<Option<ChildKey>> {
    let mut counts: HashMap<(String, String), usize> = HashMap::new();
    el.children
        .iter()
        .map(|n| match n {
            Node::Element(c) => {
                let ident = c
                    .attr("href")
                    .or_else(|| c.attr("keys"))
                    .or_else(|| c.attr("navtitle"))
                    .unwrap_or_default();
                let n = counts.entry((c.name.clone(), ident.clone())).or_insert(0);
                *n += 1;
                Some(ChildKey {
                    name: c.name.clone(),
                    ident,
                    nth: *n,
                })
            }
            Node::Other(_) => None,
        })
        .collect()
}

struct Reconciler<'a> {
    document: &'a str,
    profiling: &'a [String],
    issues: &'a mut Vec<Issue>,
}

impl Reconciler<'_> {
    fn element(&mut self, existing: &mut Element, new: &Element) {
        self.attributes(existing, new);

        if !existing.has_child_elements() && !new.has_child_elements() {
            existing.children = new.children.clone();
            existing.self_closing = new.self_closing;
            return;
        }

        let new_keys = child_keys(new);
        let mut last_matched: Option<usize> = None;
        for (i, node) in new.children.iter().enumerate() {
            let (Node::Element(new_child), Some(key)) = (node, &new_keys[i]) else {
                continue;
            };
            let existing_keys = child_keys(existing);
            let found = existing_keys.iter().position(|k| k.as_ref() == Some(key));
            match found {
                Some(pos) => {
                    if let Node::Element(ex_child) = &mut existing.children[pos] {
                        self.element(ex_child, new_child);
                    }
                    last_matched = Some(pos);
                }
                None => {
                    let indent = match i.checked_sub(1).map(|p| &new.children[p]) {
                        Some(Node::Other(ev)) if ev.is_blank_text() => Some(ev.clone()),
                        _ => None,
                    };
                    let inserted_at = insert_child(existing, last_matched, new_child.clone(), indent);
                    log::debug!(
                        "{}: added <{}> {}",
                        self.document,
                        new_child.name,
                        new_child.attr("href").unwrap_or_default()
                    );
                    last_matched = Some(inserted_at);
                }
            }
        }
    }

    fn attributes(&mut self, existing: &mut Element, new: &Element) {
        for (key, raw) in &new.attrs {
            let Some(value) = new.attr(key) else {
                continue;
            };
            if self.profiling.iter().any(|p| p == key) {
                if let Some(merged) = union_profiling_value(existing.attr(key).as_deref(), &value) {
                    set_attr(&mut existing.attrs, key, &merged);
                }
                continue;
            }
            match existing.attrs.iter().find(|(k, _)| k == key) {
                None => existing.attrs.push((key.clone(), raw.clone())),
                Some((_, old)) if old != raw => {
                    log::warn!(
                        "{}: <{}> {key}={old:?} kept, merge wanted {raw:?}",
                        self.document,
                        existing.name
                    );
                    self.issues.push(Issue::warning(
                        IssueKind::ReconciliationConflict,
                        self.document,
                        format!(
                            "<{}> {} has {key}={old:?}, merge wanted {raw:?}; kept existing",
                            existing.name,
                            existing.attr("href").unwrap_or_default()
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
    }
}

/// Inserts `child` after position `after` (or before the first element child
/// when nothing matched yet). Returns the child's index.
fn insert_child(
    parent: &mut Element,
    after: Option<usize>,
    child: Element,
    indent: Option<XmlEvent>,
) -> usize {
    parent.self_closing = false;
    match after {
        Some(pos) => {
            let mut at = pos + 1;
            if let Some(ws) = indent {
                parent.children.insert(at, Node::Other(ws));
                at += 1;
            }
            parent.children.insert(at, Node::Element(child));
            at
        }
        None => {
            let first = parent
                .children
                .iter()
                .position(|n| matches!(n, Node::Element(_)));
            match first {
                Some(at) => {
                    parent.children.insert(at, Node::Element(child));
                    if let Some(ws) = indent {
                        parent.children.insert(at + 1, Node::Other(ws));
                    }
                    at
                }
                None => {
                    if let Some(ws) = indent {
                        parent.children.push(Node::Other(ws));
                    }
                    parent.children.push(Node::Element(child));
                    parent.children.len() - 1
                }
            }
        }
    }
}
