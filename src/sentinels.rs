use once_cell::sync::Lazy;
use regex::Regex;

pub const UNIT_ID_WIDTH: usize = 6;

static UNIT_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@@BITEXT:(\d{6})@@").expect("unit marker regex"));

/// Marker left in a skeleton where a translation unit was cut out.
pub fn unit_marker(unit_id: usize) -> String {
    format!("@@BITEXT:{unit_id:0UNIT_ID_WIDTH$}@@")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarkerPiece<'a> {
    Text(&'a str),
    Unit(usize),
}

/// Splits skeleton text into literal pieces and unit markers, in order.
pub fn split_unit_markers(text: &str) -> Vec<MarkerPiece<'_>> {
    let mut pieces: Vec<MarkerPiece<'_>> = Vec::new();
    let mut pos = 0usize;
    for caps in UNIT_MARKER_RE.captures_iter(text) {
        let Some(m) = caps.get(0) else {
            continue;
        };
        if m.start() > pos {
            pieces.push(MarkerPiece::Text(&text[pos..m.start()]));
        }
        let id = caps[1].parse::<usize>().unwrap_or_default();
        pieces.push(MarkerPiece::Unit(id));
        pos = m.end();
    }
    if pos < text.len() {
        pieces.push(MarkerPiece::Text(&text[pos..]));
    }
    pieces
}

pub fn contains_unit_marker(text: &str) -> bool {
    UNIT_MARKER_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_split_in_order() {
        let s = format!("  {}\n{}x", unit_marker(1), unit_marker(12));
        assert_eq!(
            split_unit_markers(&s),
            vec![
                MarkerPiece::Text("  "),
                MarkerPiece::Unit(1),
                MarkerPiece::Text("\n"),
                MarkerPiece::Unit(12),
                MarkerPiece::Text("x"),
            ]
        );
        assert!(contains_unit_marker(&s));
        assert!(!contains_unit_marker("plain @@ text"));
    }
}
