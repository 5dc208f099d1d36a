/*!
 * Project records keyed by map path
 */

use anyhow::Result;

use dita_bitext::project::{ProjectError, ProjectStore};

use crate::common::{create_temp_dir, create_test_file};

fn langs(l: &[&str]) -> Vec<String> {
    l.iter().map(|s| s.to_string()).collect()
}

#[test]
fn one_project_per_map_path() -> Result<()> {
    let src = create_temp_dir()?;
    let store_dir = create_temp_dir()?;
    let map = create_test_file(src.path(), "docs/guide.ditamap", "<map/>")?;
    let mut store = ProjectStore::open(store_dir.path())?;

    let created = store.create(&map, "en-US", &langs(&["de-DE", "fr-FR"]))?;
    assert_eq!(created.name, "guide");
    assert_eq!(created.target_langs, langs(&["de-DE", "fr-FR"]));

    // Same file, spelled differently.
    let other_spelling = src.path().join("docs/./../docs/guide.ditamap");
    let found = store.find_by_map(&other_spelling)?.expect("project for the same map");
    assert_eq!(found.id, created.id);

    let err = store
        .create(&other_spelling, "en-US", &[])
        .expect_err("duplicate project");
    assert!(matches!(
        err.downcast_ref::<ProjectError>(),
        Some(ProjectError::AlreadyExists(_))
    ));
    assert_eq!(store.list().len(), 1);
    Ok(())
}

#[test]
fn get_or_create_reuses_the_existing_record() -> Result<()> {
    let src = create_temp_dir()?;
    let store_dir = create_temp_dir()?;
    let map = create_test_file(src.path(), "a.ditamap", "<map/>")?;
    let mut store = ProjectStore::open(store_dir.path())?;

    let first = store.get_or_create(&map, "en-US", &langs(&["ja"]))?;
    let second = store.get_or_create(&map, "en-GB", &langs(&["ko"]))?;
    assert_eq!(first, second);
    assert_eq!(second.target_langs, langs(&["ja"]));
    Ok(())
}

#[test]
fn records_survive_reopening() -> Result<()> {
    let src = create_temp_dir()?;
    let store_dir = create_temp_dir()?;
    let a = create_test_file(src.path(), "a.ditamap", "<map/>")?;
    let b = create_test_file(src.path(), "b.ditamap", "<map/>")?;

    let (id_a, id_b) = {
        let mut store = ProjectStore::open(store_dir.path())?;
        let a = store.create(&a, "en-US", &langs(&["de"]))?;
        let b = store.create(&b, "en-US", &langs(&["fr"]))?;
        (a.id, b.id)
    };
    assert_ne!(id_a, id_b);

    let mut store = ProjectStore::open(store_dir.path())?;
    assert_eq!(store.list().len(), 2);
    assert_eq!(store.get(id_b).map(|p| p.name.as_str()), Some("b"));
    assert!(store.find_by_map(&a)?.is_some());
    assert!(store.get(id_b + 100).is_none());

    // Ids keep counting after a reopen.
    let c = create_test_file(src.path(), "c.ditamap", "<map/>")?;
    let id_c = store.create(&c, "en-US", &[])?.id;
    assert!(id_c > id_b);
    Ok(())
}

#[test]
fn missing_map_is_an_error() -> Result<()> {
    let src = create_temp_dir()?;
    let store_dir = create_temp_dir()?;
    let mut store = ProjectStore::open(store_dir.path())?;
    assert!(store.create(&src.path().join("nope.ditamap"), "en-US", &[]).is_err());
    assert!(store.list().is_empty());
    Ok(())
}
