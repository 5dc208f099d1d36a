use std::path::Path;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::ir::{Bitext, InlineRun, InterchangeFile, TranslationUnit};
use crate::xliff::{PROP_GROUP, XLIFF_NS};

type XmlWriter = Writer<Vec<u8>>;

fn indent(w: &mut XmlWriter, depth: usize) -> anyhow::Result<()> {
    let ws = format!("\n{}", "  ".repeat(depth));
    w.write_event(Event::Text(BytesText::new(&ws)))
        .context("write indent")?;
    Ok(())
}

fn start(w: &mut XmlWriter, el: BytesStart<'_>) -> anyhow::Result<()> {
    w.write_event(Event::Start(el)).context("write start tag")?;
    Ok(())
}

fn end(w: &mut XmlWriter, name: &str) -> anyhow::Result<()> {
    w.write_event(Event::End(BytesEnd::new(name)))
        .context("write end tag")?;
    Ok(())
}

fn text(w: &mut XmlWriter, s: &str) -> anyhow::Result<()> {
    w.write_event(Event::Text(BytesText::new(s)))
        .context("write text")?;
    Ok(())
}

/// `<name attrs...>text</name>` on one line.
fn leaf(w: &mut XmlWriter, el: BytesStart<'_>, s: &str) -> anyhow::Result<()> {
    let name = String::from_utf8_lossy(el.name().as_ref()).into_owned();
    start(w, el)?;
    text(w, s)?;
    end(w, &name)
}

fn write_runs(w: &mut XmlWriter, runs: &[InlineRun]) -> anyhow::Result<()> {
    for r in runs {
        match r {
            InlineRun::Text(t) => text(w, t)?,
            InlineRun::Open { id, markup } => {
                leaf(w, BytesStart::new("bpt").with_attributes([("id", id.to_string().as_str())]), markup)?
            }
            InlineRun::Close { id, markup } => {
                leaf(w, BytesStart::new("ept").with_attributes([("id", id.to_string().as_str())]), markup)?
            }
            InlineRun::Standalone { id, markup } => {
                leaf(w, BytesStart::new("ph").with_attributes([("id", id.to_string().as_str())]), markup)?
            }
        }
    }
    Ok(())
}

fn write_unit(w: &mut XmlWriter, u: &TranslationUnit) -> anyhow::Result<()> {
    indent(w, 3)?;
    let id = u.id.to_string();
    start(
        w,
        BytesStart::new("trans-unit").with_attributes([
            ("id", id.as_str()),
            ("resname", u.resname.as_str()),
            ("xml:space", "preserve"),
        ]),
    )?;
    indent(w, 4)?;
    start(w, BytesStart::new("source"))?;
    write_runs(w, &u.source)?;
    end(w, "source")?;
    if let Some(target) = &u.target {
        indent(w, 4)?;
        start(w, BytesStart::new("target"))?;
        write_runs(w, target)?;
        end(w, "target")?;
    }
    indent(w, 3)?;
    end(w, "trans-unit")
}

fn prop(w: &mut XmlWriter, kind: &str, value: &str) -> anyhow::Result<()> {
    indent(w, 4)?;
    leaf(w, BytesStart::new("prop").with_attributes([("prop-type", kind)]), value)
}

fn write_file(w: &mut XmlWriter, f: &InterchangeFile) -> anyhow::Result<()> {
    indent(w, 1)?;
    start(
        w,
        BytesStart::new("file").with_attributes([
            ("original", f.original.as_str()),
            ("source-language", f.source_lang.as_str()),
            ("target-language", f.target_lang.as_str()),
            ("datatype", "xml"),
        ]),
    )?;
    indent(w, 2)?;
    start(w, BytesStart::new("header"))?;

    indent(w, 3)?;
    start(w, BytesStart::new("skl"))?;
    leaf(
        w,
        BytesStart::new("internal-file").with_attributes([("form", "base64")]),
        &B64.encode(f.skeleton.as_bytes()),
    )?;
    end(w, "skl")?;

    indent(w, 3)?;
    start(w, BytesStart::new("prop-group").with_attributes([("name", PROP_GROUP)]))?;
    prop(w, "document-kind", f.kind.as_str())?;
    if f.root_map {
        prop(w, "root-map", "true")?;
    }
    if let Some(root) = &f.source_root {
        prop(w, "source-root", &root.display().to_string())?;
    }
    if let Some(profile) = &f.profile {
        prop(w, "profile", profile)?;
    }
    for a in &f.assets {
        prop(w, "asset", a)?;
    }
    indent(w, 3)?;
    end(w, "prop-group")?;
    indent(w, 2)?;
    end(w, "header")?;

    indent(w, 2)?;
    start(w, BytesStart::new("body"))?;
    for u in &f.units {
        write_unit(w, u)?;
    }
    indent(w, 2)?;
    end(w, "body")?;
    indent(w, 1)?;
    end(w, "file")
}

/// Serializes a container as XLIFF 1.2.
pub fn write_xliff(bitext: &Bitext) -> anyhow::Result<Vec<u8>> {
    let mut w = Writer::new(Vec::new());
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("write decl")?;
    indent(&mut w, 0)?;
    start(
        &mut w,
        BytesStart::new("xliff").with_attributes([("version", "1.2"), ("xmlns", XLIFF_NS)]),
    )?;
    for f in &bitext.files {
        write_file(&mut w, f).with_context(|| format!("write <file> for {}", f.original))?;
    }
    indent(&mut w, 0)?;
    end(&mut w, "xliff")?;
    let mut out = w.into_inner();
    out.push(b'\n');
    Ok(out)
}

pub fn write_xliff_path(path: &Path, bitext: &Bitext) -> anyhow::Result<()> {
    let bytes = write_xliff(bitext)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}
