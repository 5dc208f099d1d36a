use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use crate::dita::tree::{Element, Node, Tree};
use crate::dita::xml::{parse_xml_bytes, XmlEvent};
use crate::errors::{Issue, IssueKind};
use crate::ir::{Bitext, DocumentKind, InlineRun, InterchangeFile, TranslationUnit};
use crate::xliff::PROP_GROUP;

/// Element name without namespace prefix.
fn local(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn child<'a>(el: &'a Element, name: &str) -> Option<&'a Element> {
    el.child_elements().find(|c| local(&c.name) == name)
}

fn children<'a>(el: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    el.child_elements().filter(move |c| local(&c.name) == name)
}

fn required_attr(el: &Element, key: &str) -> anyhow::Result<String> {
    el.attr(key)
        .ok_or_else(|| anyhow!("<{}> without {key}", el.name))
}

fn placeholder_id(el: &Element) -> anyhow::Result<usize> {
    let raw = required_attr(el, "id")?;
    raw.trim()
        .parse::<usize>()
        .with_context(|| format!("<{}> id {raw:?} is not a number", el.name))
}

/// Inline content of `<source>`/`<target>`.
///
/// Inline elements other than bpt/ept/ph cannot be mapped back to source
/// markup. They are read as a placeholder with id 0, which no source ever
/// has, so the merge reports them as a structural mismatch.
fn read_runs(el: &Element) -> anyhow::Result<Vec<InlineRun>> {
    let mut runs: Vec<InlineRun> = Vec::new();
    for n in &el.children {
        match n {
            Node::Other(XmlEvent::Text { text }) | Node::Other(XmlEvent::CData { text }) => {
                if let Some(InlineRun::Text(prev)) = runs.last_mut() {
                    prev.push_str(text);
                } else {
                    runs.push(InlineRun::Text(text.clone()));
                }
            }
            Node::Other(_) => {}
            Node::Element(c) => {
                let run = match local(&c.name) {
                    "bpt" => InlineRun::Open {
                        id: placeholder_id(c)?,
                        markup: c.text(),
                    },
                    "ept" => InlineRun::Close {
                        id: placeholder_id(c)?,
                        markup: c.text(),
                    },
                    "ph" => InlineRun::Standalone {
                        id: placeholder_id(c)?,
                        markup: c.text(),
                    },
                    other => {
                        log::debug!("unsupported inline element <{other}> in {}", el.name);
                        InlineRun::Standalone {
                            id: 0,
                            markup: String::new(),
                        }
                    }
                };
                runs.push(run);
            }
        }
    }
    Ok(runs)
}

fn read_unit(el: &Element) -> anyhow::Result<TranslationUnit> {
    let id_raw = required_attr(el, "id")?;
    let id = id_raw
        .trim()
        .parse::<usize>()
        .with_context(|| format!("trans-unit id {id_raw:?} is not a number"))?;
    let source = child(el, "source").ok_or_else(|| anyhow!("trans-unit {id} has no <source>"))?;
    let target = child(el, "target")
        .map(read_runs)
        .transpose()
        .with_context(|| format!("trans-unit {id}: target"))?;
    Ok(TranslationUnit {
        id,
        resname: el.attr("resname").unwrap_or_default(),
        source: read_runs(source).with_context(|| format!("trans-unit {id}: source"))?,
        target,
    })
}

fn read_file(el: &Element) -> anyhow::Result<InterchangeFile> {
    let original = required_attr(el, "original")?;
    let header = child(el, "header").ok_or_else(|| anyhow!("<file> has no <header>"))?;
    let skl = child(header, "skl")
        .and_then(|s| child(s, "internal-file"))
        .ok_or_else(|| anyhow!("<header> has no <skl><internal-file>"))?;
    let form = skl.attr("form").unwrap_or_default();
    let skeleton = if form == "base64" {
        let raw: String = skl.text().split_whitespace().collect();
        let bytes = B64.decode(raw.as_bytes()).context("decode base64 skeleton")?;
        String::from_utf8(bytes).context("skeleton is not utf-8")?
    } else {
        skl.text()
    };

    let mut kind: Option<DocumentKind> = None;
    let mut root_map = false;
    let mut source_root: Option<PathBuf> = None;
    let mut profile: Option<String> = None;
    let mut assets: Vec<String> = Vec::new();
    for group in children(header, "prop-group") {
        if group.attr("name").as_deref() != Some(PROP_GROUP) {
            continue;
        }
        for p in children(group, "prop") {
            let value = p.text();
            match p.attr("prop-type").as_deref() {
                Some("document-kind") => kind = DocumentKind::parse(&value),
                Some("root-map") => root_map = value.trim() == "true",
                Some("source-root") => source_root = Some(PathBuf::from(value.trim())),
                Some("profile") => profile = Some(value.trim().to_string()),
                Some("asset") => assets.push(value.trim().to_string()),
                _ => {}
            }
        }
    }
    let kind = kind.ok_or_else(|| anyhow!("missing document-kind property"))?;

    let mut units: Vec<TranslationUnit> = Vec::new();
    if let Some(body) = child(el, "body") {
        // Units may sit inside <group> elements when a tool re-wrote the file.
        let mut err: Option<anyhow::Error> = None;
        body.walk(&mut |e| {
            if err.is_none() && local(&e.name) == "trans-unit" {
                match read_unit(e) {
                    Ok(u) => units.push(u),
                    Err(e) => err = Some(e),
                }
            }
        });
        if let Some(e) = err {
            return Err(e);
        }
    }

    Ok(InterchangeFile {
        original,
        kind,
        source_lang: el.attr("source-language").unwrap_or_default(),
        target_lang: el.attr("target-language").unwrap_or_default(),
        skeleton,
        units,
        root_map,
        source_root,
        profile,
        assets,
    })
}

/// Every `<file>` of a container with its `original` and read result.
fn read_files(name: &str, bytes: &[u8]) -> anyhow::Result<Vec<(String, anyhow::Result<InterchangeFile>)>> {
    let doc = parse_xml_bytes(name, bytes)?;
    let tree = Tree::from_events(&doc.events).with_context(|| format!("{name}: build tree"))?;
    if local(&tree.root.name) != "xliff" {
        return Err(anyhow!("{name}: root element is <{}>, not <xliff>", tree.root.name));
    }
    Ok(children(&tree.root, "file")
        .map(|f| {
            let original = f.attr("original").unwrap_or_default();
            let file = read_file(f).with_context(|| format!("{name}: <file original={original:?}>"));
            (original, file)
        })
        .collect())
}

/// Reads a whole container; any unreadable `<file>` fails the call.
pub fn read_xliff(name: &str, bytes: &[u8]) -> anyhow::Result<Bitext> {
    let files = read_files(name, bytes)?
        .into_iter()
        .map(|(_, f)| f)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Bitext { files })
}

pub fn read_xliff_path(path: &Path) -> anyhow::Result<Bitext> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    read_xliff(&path.display().to_string(), &bytes)
}

/// A container read document by document.
#[derive(Debug, Default)]
pub struct PartialBitext {
    pub bitext: Bitext,
    /// One input issue per `<file>` that could not be read.
    pub issues: Vec<Issue>,
}

/// Like [`read_xliff`], but a malformed `<file>` only drops that document.
/// The container itself must still be well-formed XLIFF.
pub fn read_xliff_partial(name: &str, bytes: &[u8]) -> anyhow::Result<PartialBitext> {
    let mut out = PartialBitext::default();
    for (original, file) in read_files(name, bytes)? {
        match file {
            Ok(f) => out.bitext.files.push(f),
            Err(e) => {
                log::warn!("{e:#}");
                let document = if original.is_empty() { name.to_string() } else { original };
                out.issues.push(Issue::from_error(IssueKind::Input, document, &e));
            }
        }
    }
    Ok(out)
}

pub fn read_xliff_partial_path(path: &Path) -> anyhow::Result<PartialBitext> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    read_xliff_partial(&path.display().to_string(), &bytes)
}
