/*!
 * Several publishing profiles merged into one output folder
 */

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use dita_bitext::engine::{generate, import, MergeOptions};
use dita_bitext::xliff::pseudo::PseudoMode;

use crate::common::{
    create_ditaval, create_temp_dir, create_test_file, create_two_profile_source, map_refs, test_config, topic,
    translate_in_place, PNG,
};

/// Generates and pseudo-translates one container for `profile` (a DITAVAL
/// path), returning the container path.
fn translated_container(map: &Path, profile: &Path, xliff_dir: &Path) -> Result<PathBuf> {
    let report = generate(map, &["de-DE".to_string()], Some(profile), xliff_dir, &test_config())?;
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    let xlf = report.containers[0].clone();
    translate_in_place(&xlf, PseudoMode::Prefix)?;
    Ok(xlf)
}

struct Scenario {
    _src: tempfile::TempDir,
    work: tempfile::TempDir,
    pub1: PathBuf,
    pub2: PathBuf,
}

fn scenario() -> Result<Scenario> {
    let src = create_temp_dir()?;
    let work = create_temp_dir()?;
    let map = create_two_profile_source(src.path())?;
    let pub1_val = create_ditaval(src.path(), "pub1", "pub1", "pub2")?;
    let pub2_val = create_ditaval(src.path(), "pub2", "pub2", "pub1")?;
    let xliff_dir = work.path().join("xliff");
    let pub1 = translated_container(&map, &pub1_val, &xliff_dir)?;
    let pub2 = translated_container(&map, &pub2_val, &xliff_dir)?;
    Ok(Scenario {
        _src: src,
        work,
        pub1,
        pub2,
    })
}

fn merge(xlf: &Path, out: &Path) -> Result<()> {
    let report = import(xlf, out, MergeOptions::default(), &test_config())?;
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    Ok(())
}

#[test]
fn two_profiles_union_into_one_map() -> Result<()> {
    let s = scenario()?;
    assert!(s.pub1.ends_with("guide_pub1_de-DE.ditamap.xlf"));
    assert!(s.pub2.ends_with("guide_pub2_de-DE.ditamap.xlf"));
    let out = s.work.path().join("out");
    merge(&s.pub1, &out)?;
    merge(&s.pub2, &out)?;

    let map = fs::read_to_string(out.join("guide.ditamap"))?;
    assert!(map.contains(r#"<topicref href="topic1.dita" product="pub1"/>"#), "{map}");
    assert!(map.contains(r#"<topicref href="topic2.dita" product="pub1, pub2"/>"#), "{map}");
    assert!(map.contains(r#"<topicref href="topic3.dita" product="pub2"/>"#), "{map}");
    assert!(map.contains("<title>de-DE:User Guide</title>"));

    for t in ["topic1.dita", "topic2.dita", "topic3.dita"] {
        assert!(out.join(t).is_file(), "{t}");
    }
    assert_eq!(fs::read(out.join("images/logo.png"))?, PNG);

    // Excluded content is kept, untranslated.
    let topic1 = fs::read_to_string(out.join("topic1.dita"))?;
    assert!(topic1.contains(r#"<p product="pub2">Only in pub2.</p>"#));
    assert!(topic1.contains("<p>de-DE:Run the <b>installer</b>.</p>"));
    Ok(())
}

#[test]
fn merging_the_same_profile_twice_changes_nothing() -> Result<()> {
    let s = scenario()?;
    let out = s.work.path().join("out");
    merge(&s.pub1, &out)?;
    merge(&s.pub2, &out)?;
    let once = fs::read_to_string(out.join("guide.ditamap"))?;
    merge(&s.pub2, &out)?;
    merge(&s.pub1, &out)?;
    assert_eq!(fs::read_to_string(out.join("guide.ditamap"))?, once);
    Ok(())
}

#[test]
fn merge_order_gives_the_same_sets() -> Result<()> {
    let s = scenario()?;
    let ab = s.work.path().join("ab");
    let ba = s.work.path().join("ba");
    merge(&s.pub1, &ab)?;
    merge(&s.pub2, &ab)?;
    merge(&s.pub2, &ba)?;
    merge(&s.pub1, &ba)?;

    let mut refs_ab = map_refs(&ab.join("guide.ditamap"), "product")?;
    let mut refs_ba = map_refs(&ba.join("guide.ditamap"), "product")?;
    refs_ab.sort();
    refs_ba.sort();
    assert_eq!(refs_ab, refs_ba);
    assert_eq!(
        refs_ab,
        vec![
            ("topic1.dita".to_string(), vec!["pub1".to_string()]),
            ("topic2.dita".to_string(), vec!["pub1".to_string(), "pub2".to_string()]),
            ("topic3.dita".to_string(), vec!["pub2".to_string()]),
        ]
    );
    Ok(())
}

#[test]
fn shared_topic_and_image_are_written_once() -> Result<()> {
    let src = create_temp_dir()?;
    let work = create_temp_dir()?;
    let map = create_test_file(
        src.path(),
        "single.ditamap",
        "<map>\n  <topicref href=\"topics/shared.dita\"/>\n  <topicref href=\"topics/shared.dita\"/>\n  <topicref href=\"topics/other.dita\"/>\n</map>\n",
    )?;
    create_test_file(
        src.path(),
        "topics/shared.dita",
        topic("shared", "Shared", "    <p>Look: <image href=\"../media/pic.png\"/></p>"),
    )?;
    create_test_file(
        src.path(),
        "topics/other.dita",
        topic("other", "Other", "    <image href=\"../media/pic.png\"/>"),
    )?;
    create_test_file(src.path(), "media/pic.png", PNG)?;
    let cfg = test_config();

    let generated = generate(&map, &["ja".to_string()], None, work.path(), &cfg)?;
    assert_eq!(generated.documents, 3);
    assert_eq!(generated.assets, 1);
    translate_in_place(&generated.containers[0], PseudoMode::Prefix)?;

    let out = work.path().join("out");
    let report = import(&generated.containers[0], &out, MergeOptions::default(), &cfg)?;
    assert_eq!(report.written_topics, vec!["topics/shared.dita", "topics/other.dita"]);
    assert_eq!(report.copied_assets, vec!["media/pic.png"]);
    assert_eq!(fs::read(out.join("media/pic.png"))?, PNG);

    let map_out = fs::read_to_string(out.join("single.ditamap"))?;
    assert_eq!(map_out.matches("topics/shared.dita").count(), 2);

    // A second merge finds the asset already in place.
    let again = import(&generated.containers[0], &out, MergeOptions::default(), &cfg)?;
    assert!(again.copied_assets.is_empty());
    assert!(again.issues.is_empty());
    Ok(())
}

#[test]
fn missing_asset_is_reported_without_stopping_the_merge() -> Result<()> {
    let src = create_temp_dir()?;
    let work = create_temp_dir()?;
    let map = create_two_profile_source(src.path())?;
    let generated = generate(&map, &["de".to_string()], None, work.path(), &test_config())?;
    fs::remove_file(src.path().join("images/logo.png"))?;

    let out = work.path().join("out");
    let report = import(&generated.containers[0], &out, MergeOptions::default(), &test_config())?;
    assert_eq!(report.written_topics.len(), 3);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].document, "images/logo.png");
    Ok(())
}
