/*!
 * Extract -> translate -> merge of a single publication
 */

use std::fs;
use std::path::Path;

use anyhow::Result;

use dita_bitext::dita::xml::{parse_xml_bytes, structure_hash};
use dita_bitext::engine::{generate, import, verify_roundtrip, MergeOptions};
use dita_bitext::errors::IssueKind;
use dita_bitext::xliff::pseudo::PseudoMode;
use dita_bitext::xliff::read::read_xliff_path;

use crate::common::{create_temp_dir, create_test_file, test_config, topic, translate_in_place, PNG};

fn create_rich_source(dir: &Path) -> Result<()> {
    create_test_file(
        dir,
        "manual.ditamap",
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<map xml:lang=\"en-US\">\n  <title>Manual</title>\n  <topicref href=\"topics/intro.dita\">\n    <topicref href=\"topics/empty.dita\"/>\n  </topicref>\n  <mapref href=\"parts/part.ditamap\" format=\"ditamap\"/>\n</map>\n",
    )?;
    create_test_file(
        dir,
        "topics/intro.dita",
        topic(
            "intro",
            "Intro &amp; <i>overview</i>",
            "    <!-- reviewed -->\n    <p>Press <uicontrol>Save</uicontrol>, then\n       wait.</p>\n    <ul>\n      <li>First <xref href=\"#intro\"/> item</li>\n      <li>Second<p>Nested block</p>tail</li>\n    </ul>\n    <codeblock>let x = 1;</codeblock>\n    <p>See <codeph translate=\"no\">cfg.toml</codeph>.</p>\n    <fig><title>Logo</title><image href=\"../img/logo.png\"/></fig>",
        ),
    )?;
    create_test_file(
        dir,
        "topics/empty.dita",
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<topic id=\"empty\"><title/><body><image href=\"../img/logo.png\"/></body></topic>\n",
    )?;
    create_test_file(
        dir,
        "parts/part.ditamap",
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<map>\n  <topicref href=\"reuse.dita\"/>\n</map>\n",
    )?;
    create_test_file(
        dir,
        "parts/reuse.dita",
        topic("reuse", "Reuse", "    <p conref=\"../topics/intro.dita#intro/p1\"/>\n    <p>Part text.</p>"),
    )?;
    create_test_file(dir, "img/logo.png", PNG)?;
    Ok(())
}

fn hash_of(path: &Path) -> Result<String> {
    let doc = parse_xml_bytes(&path.display().to_string(), &fs::read(path)?)?;
    Ok(structure_hash(&doc.events))
}

#[test]
fn copy_translation_reproduces_every_document() -> Result<()> {
    let src = create_temp_dir()?;
    let work = create_temp_dir()?;
    create_rich_source(src.path())?;
    let cfg = test_config();

    let generated = generate(
        &src.path().join("manual.ditamap"),
        &["de-DE".to_string()],
        None,
        &work.path().join("xliff"),
        &cfg,
    )?;
    assert!(generated.issues.is_empty(), "{:?}", generated.issues);
    assert_eq!(generated.containers.len(), 1);
    assert_eq!(generated.documents, 5);

    let xlf = &generated.containers[0];
    assert!(xlf.ends_with("manual_de-DE.ditamap.xlf"));
    translate_in_place(xlf, PseudoMode::Copy)?;

    let out = work.path().join("out");
    let report = import(xlf, &out, MergeOptions::default(), &cfg)?;
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    assert_eq!(report.untranslated_units, 0);
    assert_eq!(report.written_maps, vec!["manual.ditamap", "parts/part.ditamap"]);

    for rel in [
        "manual.ditamap",
        "topics/intro.dita",
        "topics/empty.dita",
        "parts/part.ditamap",
        "parts/reuse.dita",
    ] {
        assert_eq!(hash_of(&src.path().join(rel))?, hash_of(&out.join(rel))?, "{rel}");
    }
    assert_eq!(fs::read(out.join("img/logo.png"))?, PNG);
    Ok(())
}

#[test]
fn untranslated_merge_is_byte_identical() -> Result<()> {
    let src = create_temp_dir()?;
    let work = create_temp_dir()?;
    create_rich_source(src.path())?;
    let cfg = test_config();
    let generated = generate(&src.path().join("manual.ditamap"), &["fr".to_string()], None, work.path(), &cfg)?;

    let out = work.path().join("out");
    let report = import(&generated.containers[0], &out, MergeOptions::default(), &cfg)?;
    assert_eq!(report.untranslated_units, generated.units);
    assert!(report.issues.is_empty());
    assert_eq!(
        fs::read_to_string(out.join("topics/intro.dita"))?,
        fs::read_to_string(src.path().join("topics/intro.dita"))?
    );
    Ok(())
}

#[test]
fn verify_roundtrip_reports_clean_source() -> Result<()> {
    let src = create_temp_dir()?;
    create_rich_source(src.path())?;
    let report = verify_roundtrip(&src.path().join("manual.ditamap"), &test_config())?;
    assert!(report.is_clean(), "{:?} {:?}", report.mismatches, report.issues);
    assert_eq!(report.documents, 5);
    assert_eq!(report.assets, 1);
    Ok(())
}

#[test]
fn document_without_text_still_gets_a_file_entry() -> Result<()> {
    let src = create_temp_dir()?;
    let work = create_temp_dir()?;
    create_rich_source(src.path())?;
    let generated = generate(&src.path().join("manual.ditamap"), &["de".to_string()], None, work.path(), &test_config())?;
    let bitext = read_xliff_path(&generated.containers[0])?;
    let empty = bitext
        .files
        .iter()
        .find(|f| f.original == "topics/empty.dita")
        .expect("file entry for empty topic");
    assert!(empty.units.is_empty());
    Ok(())
}

#[test]
fn every_unit_keeps_visible_text() -> Result<()> {
    let src = create_temp_dir()?;
    let work = create_temp_dir()?;
    create_rich_source(src.path())?;
    let cfg = test_config();
    let generated = generate(&src.path().join("manual.ditamap"), &["de".to_string()], None, work.path(), &cfg)?;
    let xlf = &generated.containers[0];
    let filled = translate_in_place(xlf, PseudoMode::Prefix)?;
    assert_eq!(filled, generated.units);

    let out = work.path().join("out");
    import(xlf, &out, MergeOptions::default(), &cfg)?;
    let intro = fs::read_to_string(out.join("topics/intro.dita"))?;
    assert!(intro.contains("<title>de:Intro &amp; <i>overview</i></title>"), "{intro}");
    assert!(intro.contains("<p>de:Press <uicontrol>Save</uicontrol>, then\n       wait.</p>"), "{intro}");
    assert!(intro.contains("<li>de:Second<p>de:Nested block</p>de:tail</li>"), "{intro}");
    assert!(intro.contains("<codeblock>let x = 1;</codeblock>"));
    assert!(intro.contains("<codeph translate=\"no\">cfg.toml</codeph>"));

    let bitext = read_xliff_path(xlf)?;
    for f in &bitext.files {
        for u in &f.units {
            let text = dita_bitext::ir::plain_text(u.target.as_deref().unwrap_or_default());
            assert!(!text.trim().is_empty(), "{} unit {}", f.original, u.id);
        }
    }
    Ok(())
}

#[test]
fn strict_mode_rejects_untranslated_documents() -> Result<()> {
    let src = create_temp_dir()?;
    let work = create_temp_dir()?;
    create_rich_source(src.path())?;
    let cfg = test_config();
    let generated = generate(&src.path().join("manual.ditamap"), &["de".to_string()], None, work.path(), &cfg)?;

    let out = work.path().join("out");
    let opts = MergeOptions {
        strict: true,
        ..MergeOptions::default()
    };
    let report = import(&generated.containers[0], &out, opts, &cfg)?;
    assert!(report.has_fatal());
    assert!(report.issues.iter().all(|i| i.kind == IssueKind::MissingTarget));
    assert!(!out.join("topics/intro.dita").exists());
    // No units, nothing to miss.
    assert_eq!(report.written_topics, vec!["topics/empty.dita"]);
    Ok(())
}

#[test]
fn no_overwrite_keeps_existing_topics() -> Result<()> {
    let src = create_temp_dir()?;
    let work = create_temp_dir()?;
    create_rich_source(src.path())?;
    let cfg = test_config();
    let generated = generate(&src.path().join("manual.ditamap"), &["de".to_string()], None, work.path(), &cfg)?;
    let out = work.path().join("out");
    create_test_file(&out, "topics/intro.dita", "<topic id=\"intro\"/>")?;

    let opts = MergeOptions {
        overwrite: false,
        ..MergeOptions::default()
    };
    let report = import(&generated.containers[0], &out, opts, &cfg)?;
    assert_eq!(report.skipped, vec!["topics/intro.dita"]);
    assert_eq!(fs::read_to_string(out.join("topics/intro.dita"))?, "<topic id=\"intro\"/>");
    assert!(report.written_maps.contains(&"manual.ditamap".to_string()));
    Ok(())
}

#[test]
fn assets_are_left_behind_when_disabled() -> Result<()> {
    let src = create_temp_dir()?;
    let work = create_temp_dir()?;
    create_rich_source(src.path())?;
    let cfg = test_config();
    let generated = generate(&src.path().join("manual.ditamap"), &["de".to_string()], None, work.path(), &cfg)?;
    let out = work.path().join("out");
    let opts = MergeOptions {
        copy_assets: false,
        ..MergeOptions::default()
    };
    let report = import(&generated.containers[0], &out, opts, &cfg)?;
    assert!(report.copied_assets.is_empty());
    assert!(!out.join("img/logo.png").exists());
    assert!(out.join("topics/intro.dita").exists());
    Ok(())
}
