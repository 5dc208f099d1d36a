use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    Map,
    Topic,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Map => "map",
            DocumentKind::Topic => "topic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "map" => Some(DocumentKind::Map),
            "topic" => Some(DocumentKind::Topic),
            _ => None,
        }
    }
}

/// One piece of segment content. Inline markup is opaque: `markup` holds the
/// original tag(s) verbatim and is reinserted unchanged on merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InlineRun {
    Text(String),
    /// Start tag of an inline element whose content stays translatable.
    Open { id: usize, markup: String },
    /// End tag matching the `Open` with the same id.
    Close { id: usize, markup: String },
    /// Self-contained element (empty element, or one that must not be translated).
    Standalone { id: usize, markup: String },
}

impl InlineRun {
    pub fn placeholder_id(&self) -> Option<usize> {
        match self {
            InlineRun::Text(_) => None,
            InlineRun::Open { id, .. }
            | InlineRun::Close { id, .. }
            | InlineRun::Standalone { id, .. } => Some(*id),
        }
    }
}

pub fn plain_text(runs: &[InlineRun]) -> String {
    runs.iter()
        .filter_map(|r| match r {
            InlineRun::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationUnit {
    /// Sequential within its document, starting at 1.
    pub id: usize,
    /// Element path of the segment in the source document, e.g. `/topic/body/p[2]`.
    pub resname: String,
    pub source: Vec<InlineRun>,
    pub target: Option<Vec<InlineRun>>,
}

/// Per-document container: one XLIFF `<file>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterchangeFile {
    /// Root-relative path of the source document (`/`-separated).
    pub original: String,
    pub kind: DocumentKind,
    pub source_lang: String,
    pub target_lang: String,
    /// Source document with each unit replaced by its marker.
    pub skeleton: String,
    pub units: Vec<TranslationUnit>,
    pub root_map: bool,
    pub source_root: Option<PathBuf>,
    pub profile: Option<String>,
    /// Root-relative paths of non-text assets (root map only).
    pub assets: Vec<String>,
}

/// A whole `.xlf` container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bitext {
    pub files: Vec<InterchangeFile>,
}

impl Bitext {
    pub fn root_map(&self) -> Option<&InterchangeFile> {
        self.files.iter().find(|f| f.root_map)
    }

    pub fn unit_count(&self) -> usize {
        self.files.iter().map(|f| f.units.len()).sum()
    }
}
