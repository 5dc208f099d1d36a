//! XLIFF 1.2 containers: one `<file>` per source document, the skeleton in
//! `<header><skl>`, units in `<body>`.

pub mod pseudo;
pub mod read;
pub mod write;

pub const XLIFF_NS: &str = "urn:oasis:names:tc:xliff:document:1.2";

/// Name of the `<prop-group>` carrying document metadata.
pub const PROP_GROUP: &str = "dita-bitext";

/// `<map-stem>[_<profile>]_<lang>.ditamap.xlf`
pub fn container_name(root_map: &str, lang: &str, profile: Option<&str>) -> String {
    let file = root_map.rsplit('/').next().unwrap_or(root_map);
    let stem = file.strip_suffix(".ditamap").unwrap_or(file);
    match profile {
        Some(p) => format!("{stem}_{p}_{lang}.ditamap.xlf"),
        None => format!("{stem}_{lang}.ditamap.xlf"),
    }
}
