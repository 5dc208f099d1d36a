use crate::ir::{Bitext, InlineRun};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PseudoMode {
    /// Target = source with `<lang>:` in front of the first text run.
    Prefix,
    /// Target = source.
    Copy,
}

impl PseudoMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefix" => Some(PseudoMode::Prefix),
            "copy" => Some(PseudoMode::Copy),
            _ => None,
        }
    }
}

/// Fills every missing target from its source. Existing targets are kept.
/// Returns how many units were filled.
pub fn pseudo_translate(bitext: &mut Bitext, mode: PseudoMode) -> usize {
    let mut filled = 0usize;
    for file in &mut bitext.files {
        let lang = file.target_lang.clone();
        for unit in &mut file.units {
            if unit.target.is_some() {
                continue;
            }
            let mut target = unit.source.clone();
            if mode == PseudoMode::Prefix {
                if let Some(InlineRun::Text(t)) = target.iter_mut().find(|r| matches!(r, InlineRun::Text(t) if !t.trim().is_empty())) {
                    t.insert_str(0, &format!("{lang}:"));
                }
            }
            unit.target = Some(target);
            filled += 1;
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DocumentKind, InterchangeFile, TranslationUnit};

    fn bitext() -> Bitext {
        let unit = |id: usize, target: Option<Vec<InlineRun>>| TranslationUnit {
            id,
            resname: "/topic/title".into(),
            source: vec![
                InlineRun::Standalone {
                    id: 1,
                    markup: "<ph/>".into(),
                },
                InlineRun::Text("Hello".into()),
            ],
            target,
        };
        Bitext {
            files: vec![InterchangeFile {
                original: "a.dita".into(),
                kind: DocumentKind::Topic,
                source_lang: "en".into(),
                target_lang: "de".into(),
                skeleton: String::new(),
                units: vec![unit(1, None), unit(2, Some(vec![InlineRun::Text("Hallo".into())]))],
                root_map: false,
                source_root: None,
                profile: None,
                assets: Vec::new(),
            }],
        }
    }

    #[test]
    fn prefix_marks_first_text_run_and_keeps_existing_targets() {
        let mut b = bitext();
        assert_eq!(pseudo_translate(&mut b, PseudoMode::Prefix), 1);
        let units = &b.files[0].units;
        assert_eq!(units[0].target.as_ref().expect("filled")[1], InlineRun::Text("de:Hello".into()));
        assert_eq!(units[1].target, Some(vec![InlineRun::Text("Hallo".into())]));
    }

    #[test]
    fn copy_mode_duplicates_source() {
        let mut b = bitext();
        pseudo_translate(&mut b, PseudoMode::Copy);
        let u = &b.files[0].units[0];
        assert_eq!(u.target.as_ref(), Some(&u.source));
    }
}
