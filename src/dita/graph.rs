use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::dita::profile::{included, ProfileRules};
use crate::dita::tree::{Element, Node, Tree};
use crate::dita::xml::{attr_value, parse_xml_bytes, set_attr, structure_hash, XmlDoc, XmlEvent};
use crate::errors::{Issue, IssueKind};
use crate::ir::DocumentKind;
use crate::textutil::split_tokens;

/// One document reached from the root map.
#[derive(Clone, Debug)]
pub struct GraphDocument {
    /// Root-relative, `/`-separated.
    pub path: String,
    pub kind: DocumentKind,
    /// For maps, the profile-filtered document.
    pub doc: XmlDoc,
}

/// The root map plus everything it transitively references, in depth-first
/// order of first appearance.
#[derive(Clone, Debug)]
pub struct DocumentGraph {
    pub source_root: PathBuf,
    pub root_map: String,
    pub documents: Vec<GraphDocument>,
    pub assets: Vec<String>,
    /// Documents that could not be loaded. They are left out of `documents`.
    pub issues: Vec<Issue>,
}

/// `element@attribute` pairs in topics that point at non-text assets.
#[derive(Clone, Debug)]
pub struct AssetRefs(pub Vec<(String, String)>);

impl AssetRefs {
    pub fn parse(specs: &[String]) -> anyhow::Result<Self> {
        let mut out = Vec::new();
        for s in specs {
            let (el, att) = s
                .split_once('@')
                .ok_or_else(|| anyhow!("asset reference {s:?} is not element@attribute"))?;
            out.push((el.trim().to_string(), att.trim().to_string()));
        }
        Ok(Self(out))
    }

    fn attribute_for(&self, element: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(el, _)| el == element)
            .map(|(_, att)| att.as_str())
    }
}

impl Default for AssetRefs {
    fn default() -> Self {
        Self(vec![
            ("image".to_string(), "href".to_string()),
            ("object".to_string(), "data".to_string()),
        ])
    }
}

enum RefTarget {
    Map(String),
    Topic(String),
    Asset(String),
}

struct GraphBuilder<'a> {
    source_root: PathBuf,
    profile: Option<&'a ProfileRules>,
    asset_refs: &'a AssetRefs,
    visited: HashSet<String>,
    assets_seen: HashSet<String>,
    graph: DocumentGraph,
}

/// Loads the root map and walks everything it references.
///
/// A root map that cannot be read is an error; any other unreadable document is
/// recorded as an input issue and skipped.
pub fn load_graph(
    map_path: &Path,
    profile: Option<&ProfileRules>,
    asset_refs: &AssetRefs,
) -> anyhow::Result<DocumentGraph> {
    let map_path = map_path
        .canonicalize()
        .with_context(|| format!("root map not found: {}", map_path.display()))?;
    let source_root = map_path
        .parent()
        .ok_or_else(|| anyhow!("root map has no parent directory"))?
        .to_path_buf();
    let root_rel = map_path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("root map name is not valid unicode"))?
        .to_string();

    let mut b = GraphBuilder {
        source_root: source_root.clone(),
        profile,
        asset_refs,
        visited: HashSet::new(),
        assets_seen: HashSet::new(),
        graph: DocumentGraph {
            source_root,
            root_map: root_rel.clone(),
            documents: Vec::new(),
            assets: Vec::new(),
            issues: Vec::new(),
        },
    };
    b.visited.insert(root_rel.clone());
    b.visit_map(&root_rel).context("load root map")?;
    log::debug!(
        "graph of {}: {} document(s), {} asset(s)",
        b.graph.root_map,
        b.graph.documents.len(),
        b.graph.assets.len()
    );
    Ok(b.graph)
}

impl GraphBuilder<'_> {
    fn read(&self, rel: &str) -> anyhow::Result<XmlDoc> {
        let abs = self.source_root.join(rel);
        let bytes = std::fs::read(&abs).with_context(|| format!("read {}", abs.display()))?;
        parse_xml_bytes(rel, &bytes)
    }

    fn visit_map(&mut self, rel: &str) -> anyhow::Result<()> {
        let doc = self.read(rel)?;
        if !doc.root_name().is_some_and(|n| n.ends_with("map")) {
            return Err(anyhow!("{rel}: root element is not a map"));
        }
        let mut tree = Tree::from_events(&doc.events).with_context(|| format!("{rel}: build tree"))?;
        if let Some(p) = self.profile {
            filter_map_element(&mut tree.root, p);
        }

        let mut targets: Vec<anyhow::Result<RefTarget>> = Vec::new();
        tree.root.walk(&mut |el| {
            if let Some(t) = self.map_ref(rel, el) {
                targets.push(t);
            }
        });

        let events = tree.to_events();
        self.graph.documents.push(GraphDocument {
            path: rel.to_string(),
            kind: DocumentKind::Map,
            doc: XmlDoc {
                path: rel.to_string(),
                baseline_hash: structure_hash(&events),
                events,
            },
        });

        for t in targets {
            match t {
                Ok(t) => self.follow(t),
                Err(e) => self.graph.issues.push(Issue::from_error(IssueKind::Input, rel, &e)),
            }
        }
        Ok(())
    }

    fn visit_topic(&mut self, rel: &str) -> anyhow::Result<()> {
        let doc = self.read(rel)?;
        if doc.root_name().is_some_and(|n| n.ends_with("map")) {
            return Err(anyhow!("{rel}: referenced as a topic but is a map"));
        }

        let mut targets: Vec<anyhow::Result<RefTarget>> = Vec::new();
        // Excluded content is not part of this publication; neither are its references.
        let mut excluded_depth = 0usize;
        for ev in &doc.events {
            match ev {
                XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs } => {
                    let is_start = matches!(ev, XmlEvent::Start { .. });
                    if excluded_depth > 0 || !included(attrs, self.profile) {
                        if is_start {
                            excluded_depth += 1;
                        }
                        continue;
                    }
                    if let Some(conref) = attr_value(attrs, "conref") {
                        let file = conref.split('#').next().unwrap_or_default();
                        if !file.is_empty() {
                            targets.push(self.resolve(rel, file).map(RefTarget::Topic));
                        }
                    }
                    if let Some(att) = self.asset_refs.attribute_for(name) {
                        if let Some(href) = attr_value(attrs, att) {
                            let external = attr_value(attrs, "scope").as_deref() == Some("external");
                            if !external && !is_url(&href) {
                                targets.push(self.resolve(rel, &href).map(RefTarget::Asset));
                            }
                        }
                    }
                }
                XmlEvent::End { .. } if excluded_depth > 0 => excluded_depth -= 1,
                _ => {}
            }
        }

        self.graph.documents.push(GraphDocument {
            path: rel.to_string(),
            kind: DocumentKind::Topic,
            doc,
        });
        for t in targets {
            match t {
                Ok(t) => self.follow(t),
                Err(e) => self.graph.issues.push(Issue::from_error(IssueKind::Input, rel, &e)),
            }
        }
        Ok(())
    }

    fn follow(&mut self, target: RefTarget) {
        match target {
            RefTarget::Asset(p) => {
                if self.assets_seen.insert(p.clone()) {
                    self.graph.assets.push(p);
                }
            }
            RefTarget::Map(p) | RefTarget::Topic(p) if self.visited.contains(&p) => {}
            RefTarget::Map(p) => {
                self.visited.insert(p.clone());
                if let Err(e) = self.visit_map(&p) {
                    log::warn!("skipping map {p}: {e:#}");
                    self.graph.issues.push(Issue::from_error(IssueKind::Input, p, &e));
                }
            }
            RefTarget::Topic(p) => {
                self.visited.insert(p.clone());
                if let Err(e) = self.visit_topic(&p) {
                    log::warn!("skipping topic {p}: {e:#}");
                    self.graph.issues.push(Issue::from_error(IssueKind::Input, p, &e));
                }
            }
        }
    }

    /// Classifies an element of a map. `None` when it references nothing we ship.
    fn map_ref(&self, from: &str, el: &Element) -> Option<anyhow::Result<RefTarget>> {
        let href = el.attr("href")?;
        if href.trim().is_empty() || href.starts_with('#') || is_url(&href) {
            return None;
        }
        if el.attr("scope").as_deref() == Some("external") {
            return None;
        }
        let format = el.attr("format").map(|f| f.to_ascii_lowercase());
        let resolved = match self.resolve(from, &href) {
            Ok(r) => r,
            Err(e) => return Some(Err(e)),
        };
        let lower = resolved.to_ascii_lowercase();
        let target = match format.as_deref() {
            Some("ditamap") => RefTarget::Map(resolved),
            None | Some("dita") if lower.ends_with(".ditamap") => RefTarget::Map(resolved),
            None | Some("dita") if lower.ends_with(".dita") || lower.ends_with(".xml") => {
                RefTarget::Topic(resolved)
            }
            Some("dita") => RefTarget::Topic(resolved),
            _ => RefTarget::Asset(resolved),
        };
        Some(Ok(target))
    }

    fn resolve(&self, from: &str, href: &str) -> anyhow::Result<String> {
        resolve_href(from, href).with_context(|| format!("{from}: bad reference {href:?}"))
    }
}

fn is_url(href: &str) -> bool {
    href.contains("://") || href.starts_with("mailto:")
}

/// Resolves `href` against the directory of `from` (both root-relative) and
/// normalizes the result lexically.
pub fn resolve_href(from: &str, href: &str) -> anyhow::Result<String> {
    let file = href.split('#').next().unwrap_or_default().replace('\\', "/").replace("%20", " ");
    if file.is_empty() {
        return Err(anyhow!("empty reference"));
    }
    if file.starts_with('/') {
        return Err(anyhow!("absolute path escapes the map directory"));
    }
    let mut parts: Vec<&str> = from.split('/').collect();
    parts.pop();
    for seg in file.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(anyhow!("path escapes the map directory"));
                }
            }
            s => parts.push(s),
        }
    }
    Ok(parts.join("/"))
}

/// Checks that a root-relative path read from a container stays inside the
/// folder it is joined to: no absolute form, no `..` segment.
pub fn check_relative_path(rel: &str) -> anyhow::Result<()> {
    let normalized = rel.replace('\\', "/");
    if normalized.trim().is_empty() {
        return Err(anyhow!("empty path"));
    }
    if normalized.starts_with('/') || normalized.as_bytes().get(1) == Some(&b':') {
        return Err(anyhow!("absolute path {rel:?}"));
    }
    if normalized.split('/').any(|seg| seg == "..") {
        return Err(anyhow!("path {rel:?} escapes its folder"));
    }
    Ok(())
}

/// Drops excluded elements (with their subtree and preceding indentation) and
/// narrows the profiling attributes of the rest to the tokens the profile keeps.
pub fn filter_map_element(el: &mut Element, profile: &ProfileRules) {
    let mut kept: Vec<Node> = Vec::with_capacity(el.children.len());
    for child in std::mem::take(&mut el.children) {
        match child {
            Node::Element(mut c) => {
                if !profile.included(&c.attrs) {
                    if matches!(kept.last(), Some(Node::Other(ev)) if ev.is_blank_text()) {
                        kept.pop();
                    }
                    continue;
                }
                narrow_profiling_attrs(&mut c, profile);
                filter_map_element(&mut c, profile);
                kept.push(Node::Element(c));
            }
            other => kept.push(other),
        }
    }
    el.children = kept;
}

fn narrow_profiling_attrs(el: &mut Element, profile: &ProfileRules) {
    for att in profile.profiling_attributes() {
        let Some(value) = el.attr(att) else {
            continue;
        };
        let all = split_tokens(&value);
        let kept = profile.kept_tokens(att, &value);
        if !kept.is_empty() && kept.len() != all.len() {
            set_attr(&mut el.attrs, att, &kept.join(" "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dita::profile::{ProfileRule, RuleAction};

    fn write(dir: &Path, rel: &str, body: &str) {
        let p = dir.join(rel);
        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(p, body).expect("write");
    }

    #[test]
    fn hrefs_resolve_relative_to_the_referencing_document() {
        assert_eq!(resolve_href("maps/main.ditamap", "../topics/a.dita#t").expect("ok"), "topics/a.dita");
        assert_eq!(resolve_href("main.ditamap", "./img/x%20y.png").expect("ok"), "img/x y.png");
        assert!(resolve_href("main.ditamap", "../outside.dita").is_err());
        assert!(resolve_href("main.ditamap", "/etc/passwd").is_err());
    }

    #[test]
    fn container_paths_must_stay_relative() {
        assert!(check_relative_path("topics/a.dita").is_ok());
        assert!(check_relative_path("a..b/c.dita").is_ok());
        assert!(check_relative_path("../x.dita").is_err());
        assert!(check_relative_path("topics/../../x.dita").is_err());
        assert!(check_relative_path("/abs/x.dita").is_err());
        assert!(check_relative_path("C:\\x.dita").is_err());
        assert!(check_relative_path("").is_err());
    }

    #[test]
    fn walks_submaps_topics_conrefs_and_assets_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write(
            root,
            "main.ditamap",
            r#"<map><topicref href="a.dita"/><topicref href="sub/sub.ditamap" format="ditamap"/><topicref href="a.dita"/><topicref href="guide.pdf" format="pdf"/><topicref href="http://x.org/" scope="external"/></map>"#,
        );
        write(root, "a.dita", r#"<topic id="a"><body><p conref="shared.dita#s/p1"/><image href="img/logo.png"/></body></topic>"#);
        write(root, "shared.dita", r#"<topic id="s"><body><p id="p1">Shared</p></body></topic>"#);
        write(root, "sub/sub.ditamap", r#"<map><topicref href="b.dita"/><topicref href="../main.ditamap"/></map>"#);
        write(root, "sub/b.dita", r#"<topic id="b"><body><image href="../img/logo.png"/></body></topic>"#);

        let g = load_graph(&root.join("main.ditamap"), None, &AssetRefs::default()).expect("graph");
        let paths: Vec<&str> = g.documents.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["main.ditamap", "a.dita", "shared.dita", "sub/sub.ditamap", "sub/b.dita"]);
        assert_eq!(g.assets, vec!["img/logo.png", "guide.pdf"]);
        assert!(g.issues.is_empty());
    }

    #[test]
    fn missing_topic_is_an_input_issue() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "m.ditamap", r#"<map><topicref href="gone.dita"/></map>"#);
        let g = load_graph(&dir.path().join("m.ditamap"), None, &AssetRefs::default()).expect("graph");
        assert_eq!(g.documents.len(), 1);
        assert_eq!(g.issues.len(), 1);
        assert_eq!(g.issues[0].kind, IssueKind::Input);
        assert_eq!(g.issues[0].document, "gone.dita");
    }

    #[test]
    fn profile_removes_and_narrows_map_references() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "m.ditamap",
            "<map>\n  <topicref href=\"t1.dita\" product=\"pub1\"/>\n  <topicref href=\"t2.dita\" product=\"pub1 pub2\"/>\n  <topicref href=\"t3.dita\" product=\"pub2\"/>\n</map>",
        );
        for t in ["t1", "t2", "t3"] {
            write(dir.path(), &format!("{t}.dita"), "<topic><title>x</title></topic>");
        }
        let profile = ProfileRules::new(
            Some("pub1".into()),
            vec![ProfileRule {
                attribute: Some("product".into()),
                value: Some("pub2".into()),
                action: RuleAction::Exclude,
            }],
            &["product".to_string()],
        );
        let g = load_graph(&dir.path().join("m.ditamap"), Some(&profile), &AssetRefs::default()).expect("graph");
        let paths: Vec<&str> = g.documents.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["m.ditamap", "t1.dita", "t2.dita"]);
        let map = String::from_utf8(crate::dita::xml::write_xml_doc(&g.documents[0].doc).expect("write")).expect("utf8");
        assert_eq!(
            map,
            "<map>\n  <topicref href=\"t1.dita\" product=\"pub1\"/>\n  <topicref href=\"t2.dita\" product=\"pub1\"/>\n</map>"
        );
    }
}
