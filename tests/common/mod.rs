/*!
 * Fixtures shared by the integration tests
 */

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

use dita_bitext::dita::tree::Tree;
use dita_bitext::dita::xml::parse_xml_bytes;
use dita_bitext::engine::EngineConfig;
use dita_bitext::textutil::split_tokens;
use dita_bitext::xliff::pseudo::{pseudo_translate, PseudoMode};
use dita_bitext::xliff::read::read_xliff_path;
use dita_bitext::xliff::write::write_xliff_path;

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Writes `content` at `dir/rel`, creating directories.
pub fn create_test_file(dir: &Path, rel: &str, content: impl AsRef<[u8]>) -> Result<PathBuf> {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, content)?;
    Ok(path)
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        source_lang: "en-US".to_string(),
        ..EngineConfig::default()
    }
}

pub fn topic(id: &str, title: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE topic PUBLIC \"-//OASIS//DTD DITA Topic//EN\" \"topic.dtd\">\n<topic id=\"{id}\">\n  <title>{title}</title>\n  <body>\n{body}\n  </body>\n</topic>\n"
    )
}

/// Map with topic1 (pub1), topic2 (pub1 pub2), topic3 (pub2); topic2 shows a
/// shared image.
pub fn create_two_profile_source(dir: &Path) -> Result<PathBuf> {
    let map = create_test_file(
        dir,
        "guide.ditamap",
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE map PUBLIC \"-//OASIS//DTD DITA Map//EN\" \"map.dtd\">\n<map>\n  <title>User Guide</title>\n  <topicref href=\"topic1.dita\" product=\"pub1\"/>\n  <topicref href=\"topic2.dita\" product=\"pub1 pub2\"/>\n  <topicref href=\"topic3.dita\" product=\"pub2\"/>\n</map>\n",
    )?;
    create_test_file(
        dir,
        "topic1.dita",
        topic("topic1", "Installing", "    <p>Run the <b>installer</b>.</p>\n    <p product=\"pub2\">Only in pub2.</p>"),
    )?;
    create_test_file(
        dir,
        "topic2.dita",
        topic(
            "topic2",
            "Shared topic",
            "    <p>Both publications show this.</p>\n    <image href=\"images/logo.png\"><alt>Company logo</alt></image>",
        ),
    )?;
    create_test_file(
        dir,
        "topic3.dita",
        topic("topic3", "Advanced", "    <p>Second publication &amp; only.</p>\n    <image href=\"images/logo.png\"/>"),
    )?;
    create_test_file(dir, "images/logo.png", PNG)?;
    Ok(map)
}

pub fn create_ditaval(dir: &Path, name: &str, include: &str, exclude: &str) -> Result<PathBuf> {
    create_test_file(
        dir,
        &format!("{name}.ditaval"),
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<val>\n  <prop att=\"product\" val=\"{include}\" action=\"include\"/>\n  <prop att=\"product\" val=\"{exclude}\" action=\"exclude\"/>\n</val>\n"
        ),
    )
}

/// Fills every target of the container at `xlf` in place.
pub fn translate_in_place(xlf: &Path, mode: PseudoMode) -> Result<usize> {
    let mut bitext = read_xliff_path(xlf)?;
    let filled = pseudo_translate(&mut bitext, mode);
    write_xliff_path(xlf, &bitext)?;
    Ok(filled)
}

/// `(href, sorted profiling tokens)` of every direct child of the map root
/// that has an href.
pub fn map_refs(path: &Path, attribute: &str) -> Result<Vec<(String, Vec<String>)>> {
    let doc = parse_xml_bytes(&path.display().to_string(), &fs::read(path)?)?;
    let tree = Tree::from_events(&doc.events)?;
    Ok(tree
        .root
        .child_elements()
        .filter_map(|e| {
            let href = e.attr("href")?;
            let mut tokens = split_tokens(&e.attr(attribute).unwrap_or_default());
            tokens.sort();
            Some((href, tokens))
        })
        .collect())
}
