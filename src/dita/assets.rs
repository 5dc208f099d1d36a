use std::path::Path;

use anyhow::Context;
use sha2::{Digest, Sha256};

use crate::dita::graph::check_relative_path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    /// Output already held the same bytes.
    Unchanged,
}

fn file_digest(path: &Path) -> anyhow::Result<[u8; 32]> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(Sha256::digest(&bytes).into())
}

/// Copies one root-relative asset from the source tree into the output tree,
/// creating directories as needed. Re-copying identical content is a no-op.
pub fn copy_asset(source_root: &Path, rel: &str, out_root: &Path) -> anyhow::Result<CopyOutcome> {
    check_relative_path(rel).context("asset path")?;
    let src = source_root.join(rel);
    let dst = out_root.join(rel);
    if !src.is_file() {
        anyhow::bail!("asset not found: {}", src.display());
    }
    if dst.is_file() && file_digest(&src)? == file_digest(&dst)? {
        return Ok(CopyOutcome::Unchanged);
    }
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::copy(&src, &dst).with_context(|| format!("copy {} -> {}", src.display(), dst.display()))?;
    Ok(CopyOutcome::Copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_then_skips_identical_content() {
        let src = tempfile::tempdir().expect("src");
        let out = tempfile::tempdir().expect("out");
        std::fs::create_dir_all(src.path().join("img")).expect("mkdir");
        std::fs::write(src.path().join("img/a.png"), [0x89, b'P', b'N', b'G']).expect("write");

        assert_eq!(copy_asset(src.path(), "img/a.png", out.path()).expect("copy"), CopyOutcome::Copied);
        assert_eq!(
            copy_asset(src.path(), "img/a.png", out.path()).expect("copy"),
            CopyOutcome::Unchanged
        );
        assert_eq!(std::fs::read(out.path().join("img/a.png")).expect("read"), vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn escaping_paths_are_not_copied() {
        let base = tempfile::tempdir().expect("base");
        let src = base.path().join("src");
        std::fs::create_dir_all(&src).expect("mkdir");
        std::fs::write(base.path().join("a.png"), b"png").expect("write");
        let out = base.path().join("out");
        assert!(copy_asset(&src, "../a.png", &out).is_err());
        assert!(copy_asset(&src, "/a.png", &out).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn missing_source_is_an_error() {
        let src = tempfile::tempdir().expect("src");
        let out = tempfile::tempdir().expect("out");
        assert!(copy_asset(src.path(), "nope.png", out.path()).is_err());
    }
}
