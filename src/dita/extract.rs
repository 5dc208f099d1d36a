use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Context};

use crate::dita::profile::{included, ProfileRules};
use crate::dita::xml::{attr_value, event_markup, events_markup, write_events, XmlDoc, XmlEvent};
use crate::ir::{InlineRun, TranslationUnit};
use crate::sentinels::{contains_unit_marker, unit_marker};
use crate::textutil::{has_visible_text, split_outer_whitespace};

/// Which elements open segments, which are never translated.
#[derive(Clone, Debug)]
pub struct SegmentationRules {
    pub block_elements: HashSet<String>,
    pub body_elements: HashSet<String>,
    pub skip_elements: HashSet<String>,
}

impl SegmentationRules {
    pub fn new(block: &[String], body: &[String], skip: &[String]) -> Self {
        Self {
            block_elements: block.iter().cloned().collect(),
            body_elements: body.iter().cloned().collect(),
            skip_elements: skip.iter().cloned().collect(),
        }
    }

    fn is_boundary(&self, name: &str) -> bool {
        self.block_elements.contains(name) || self.body_elements.contains(name)
    }
}

/// Result of cutting one document into skeleton + units.
#[derive(Clone, Debug)]
pub struct Extraction {
    pub skeleton: String,
    pub units: Vec<TranslationUnit>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    /// Block or body: direct text is segmented.
    Collect,
    /// Inline element inside a segment.
    Inline,
    /// Anything else outside segments.
    Plain,
}

struct Frame {
    kind: FrameKind,
    /// Placeholder id when `kind == Inline`.
    inline_id: usize,
}

enum BufItem {
    Text(String),
    Open { id: usize, event: XmlEvent },
    Close { id: usize, event: XmlEvent },
    Standalone { id: usize, events: Vec<XmlEvent> },
}

impl BufItem {
    fn push_events(&self, out: &mut Vec<XmlEvent>) {
        match self {
            BufItem::Text(t) => out.push(XmlEvent::Text { text: t.clone() }),
            BufItem::Open { event, .. } | BufItem::Close { event, .. } => out.push(event.clone()),
            BufItem::Standalone { events, .. } => out.extend(events.iter().cloned()),
        }
    }
}

struct Walker<'a> {
    rules: &'a SegmentationRules,
    profile: Option<&'a ProfileRules>,
    skeleton: Vec<XmlEvent>,
    units: Vec<TranslationUnit>,
    buf: Vec<BufItem>,
    next_placeholder: usize,
    frames: Vec<Frame>,
    path: ElementPath,
}

/// Walks `doc` in document order, replacing every segment with a marker.
///
/// Unit ids are assigned sequentially from 1, so the same source always yields
/// the same ids.
pub fn extract_document(
    doc: &XmlDoc,
    rules: &SegmentationRules,
    profile: Option<&ProfileRules>,
) -> anyhow::Result<Extraction> {
    if doc.events.iter().any(event_has_marker) {
        return Err(anyhow!("{}: source already contains a unit marker", doc.path));
    }
    let block_parents = elements_with_block_descendants(&doc.events, rules);
    let mut w = Walker {
        rules,
        profile,
        skeleton: Vec::with_capacity(doc.events.len()),
        units: Vec::new(),
        buf: Vec::new(),
        next_placeholder: 1,
        frames: Vec::new(),
        path: ElementPath::default(),
    };

    let events = &doc.events;
    let mut idx = 0usize;
    while idx < events.len() {
        let ev = &events[idx];
        let collecting = w.collecting();
        match ev {
            XmlEvent::Start { name, attrs } => {
                if w.is_opaque(name, attrs) {
                    let end = matching_end(events, idx)
                        .with_context(|| format!("{}: unclosed <{name}>", doc.path))?;
                    let whole = events[idx..=end].to_vec();
                    if collecting {
                        let id = w.take_placeholder_id();
                        w.buf.push(BufItem::Standalone { id, events: whole });
                    } else {
                        w.skeleton.extend(whole);
                    }
                    w.path.enter(name);
                    w.path.leave();
                    idx = end + 1;
                    continue;
                }
                if w.rules.is_boundary(name) || (collecting && block_parents.contains(&idx)) {
                    w.flush(&doc.path)?;
                    w.path.enter(name);
                    w.skeleton.push(ev.clone());
                    w.frames.push(Frame {
                        kind: FrameKind::Collect,
                        inline_id: 0,
                    });
                } else if collecting {
                    w.path.enter(name);
                    let id = w.take_placeholder_id();
                    w.buf.push(BufItem::Open {
                        id,
                        event: ev.clone(),
                    });
                    w.frames.push(Frame {
                        kind: FrameKind::Inline,
                        inline_id: id,
                    });
                } else {
                    w.path.enter(name);
                    w.skeleton.push(ev.clone());
                    w.frames.push(Frame {
                        kind: FrameKind::Plain,
                        inline_id: 0,
                    });
                }
            }
            XmlEvent::Empty { name, .. } => {
                w.path.enter(name);
                w.path.leave();
                if collecting && !w.rules.is_boundary(name) {
                    let id = w.take_placeholder_id();
                    w.buf.push(BufItem::Standalone {
                        id,
                        events: vec![ev.clone()],
                    });
                } else {
                    w.flush(&doc.path)?;
                    w.skeleton.push(ev.clone());
                }
            }
            XmlEvent::End { name } => {
                let frame = w
                    .frames
                    .pop()
                    .ok_or_else(|| anyhow!("{}: stray </{name}>", doc.path))?;
                match frame.kind {
                    FrameKind::Inline => w.buf.push(BufItem::Close {
                        id: frame.inline_id,
                        event: ev.clone(),
                    }),
                    FrameKind::Collect => {
                        w.flush(&doc.path)?;
                        w.skeleton.push(ev.clone());
                    }
                    FrameKind::Plain => w.skeleton.push(ev.clone()),
                }
                w.path.leave();
            }
            XmlEvent::Text { text } if collecting => w.buf.push(BufItem::Text(text.clone())),
            XmlEvent::CData { .. } | XmlEvent::Comment { .. } | XmlEvent::PI { .. }
                if collecting =>
            {
                let id = w.take_placeholder_id();
                w.buf.push(BufItem::Standalone {
                    id,
                    events: vec![ev.clone()],
                });
            }
            _ => w.skeleton.push(ev.clone()),
        }
        idx += 1;
    }
    w.flush(&doc.path)?;

    let skeleton = String::from_utf8(write_events(&w.skeleton)?).context("skeleton is utf-8")?;
    Ok(Extraction {
        skeleton,
        units: w.units,
    })
}

impl Walker<'_> {
    fn collecting(&self) -> bool {
        matches!(
            self.frames.last().map(|f| f.kind),
            Some(FrameKind::Collect) | Some(FrameKind::Inline)
        )
    }

    fn is_opaque(&self, name: &str, attrs: &[(String, String)]) -> bool {
        self.rules.skip_elements.contains(name)
            || attr_value(attrs, "translate").as_deref() == Some("no")
            || !included(attrs, self.profile)
    }

    fn take_placeholder_id(&mut self) -> usize {
        let id = self.next_placeholder;
        self.next_placeholder += 1;
        id
    }

    /// Turns the pending buffer into a unit (or back into plain skeleton
    /// events when it carries no visible text).
    fn flush(&mut self, doc_path: &str) -> anyhow::Result<()> {
        let buf = std::mem::take(&mut self.buf);
        self.next_placeholder = 1;
        if buf.is_empty() {
            return Ok(());
        }
        let visible = buf
            .iter()
            .any(|b| matches!(b, BufItem::Text(t) if has_visible_text(t)));
        if !visible {
            for item in &buf {
                item.push_events(&mut self.skeleton);
            }
            return Ok(());
        }

        let first = buf
            .iter()
            .position(|b| !matches!(b, BufItem::Text(t) if !has_visible_text(t)))
            .unwrap_or(0);
        let last = buf
            .iter()
            .rposition(|b| !matches!(b, BufItem::Text(t) if !has_visible_text(t)))
            .unwrap_or(buf.len() - 1);

        for item in &buf[..first] {
            item.push_events(&mut self.skeleton);
        }

        let mut runs: Vec<InlineRun> = Vec::new();
        let mut trailing = String::new();
        for (i, item) in buf[first..=last].iter().enumerate() {
            let pos = first + i;
            match item {
                BufItem::Text(t) => {
                    let (lead, core, tail) = split_outer_whitespace(t);
                    let mut piece = String::new();
                    if pos == first {
                        if !lead.is_empty() {
                            self.skeleton.push(XmlEvent::Text {
                                text: lead.to_string(),
                            });
                        }
                    } else {
                        piece.push_str(lead);
                    }
                    piece.push_str(core);
                    if pos == last {
                        trailing = tail.to_string();
                    } else {
                        piece.push_str(tail);
                    }
                    if !piece.is_empty() {
                        push_text(&mut runs, &piece);
                    }
                }
                BufItem::Open { id, event } => runs.push(InlineRun::Open {
                    id: *id,
                    markup: event_markup(event)?,
                }),
                BufItem::Close { id, event } => runs.push(InlineRun::Close {
                    id: *id,
                    markup: event_markup(event)?,
                }),
                BufItem::Standalone { id, events } => runs.push(InlineRun::Standalone {
                    id: *id,
                    markup: events_markup(events)?,
                }),
            }
        }

        // Inline elements still open at the cut would leave the unit unbalanced.
        check_balanced(&runs).with_context(|| format!("{doc_path}: segment at {}", self.path))?;

        let unit_id = self.units.len() + 1;
        self.units.push(TranslationUnit {
            id: unit_id,
            resname: self.path.to_string(),
            source: runs,
            target: None,
        });
        self.skeleton.push(XmlEvent::Text {
            text: unit_marker(unit_id),
        });
        if !trailing.is_empty() {
            self.skeleton.push(XmlEvent::Text { text: trailing });
        }
        for item in &buf[last + 1..] {
            item.push_events(&mut self.skeleton);
        }
        Ok(())
    }
}

/// Anything that ends up verbatim in the skeleton must not look like a marker.
fn event_has_marker(ev: &XmlEvent) -> bool {
    match ev {
        XmlEvent::Text { text }
        | XmlEvent::CData { text }
        | XmlEvent::Comment { text }
        | XmlEvent::DocType { text } => contains_unit_marker(text),
        XmlEvent::PI { content } => contains_unit_marker(content),
        XmlEvent::Start { attrs, .. } | XmlEvent::Empty { attrs, .. } => {
            attrs.iter().any(|(_, v)| contains_unit_marker(v))
        }
        XmlEvent::Decl { .. } | XmlEvent::End { .. } => false,
    }
}

fn push_text(runs: &mut Vec<InlineRun>, text: &str) {
    if let Some(InlineRun::Text(prev)) = runs.last_mut() {
        prev.push_str(text);
    } else {
        runs.push(InlineRun::Text(text.to_string()));
    }
}

fn check_balanced(runs: &[InlineRun]) -> anyhow::Result<()> {
    let mut open: Vec<usize> = Vec::new();
    for r in runs {
        match r {
            InlineRun::Open { id, .. } => open.push(*id),
            InlineRun::Close { id, .. } => {
                if open.pop() != Some(*id) {
                    return Err(anyhow!("inline close {id} does not match"));
                }
            }
            _ => {}
        }
    }
    if !open.is_empty() {
        return Err(anyhow!("{} inline element(s) left open", open.len()));
    }
    Ok(())
}

/// Index of the `End` closing the `Start` at `start`.
pub fn matching_end(events: &[XmlEvent], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ev) in events.iter().enumerate().skip(start) {
        match ev {
            XmlEvent::Start { .. } => depth += 1,
            XmlEvent::End { .. } => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Start-event indices of elements that contain a block somewhere below them.
/// Such elements cannot be inline placeholders: a segment would have to be cut
/// inside them.
fn elements_with_block_descendants(events: &[XmlEvent], rules: &SegmentationRules) -> HashSet<usize> {
    let mut out: HashSet<usize> = HashSet::new();
    let mut stack: Vec<usize> = Vec::new();
    for (i, ev) in events.iter().enumerate() {
        match ev {
            XmlEvent::Start { name, .. } | XmlEvent::Empty { name, .. } => {
                if rules.is_boundary(name) {
                    out.extend(stack.iter().copied());
                }
                if matches!(ev, XmlEvent::Start { .. }) {
                    stack.push(i);
                }
            }
            XmlEvent::End { .. } => {
                stack.pop();
            }
            _ => {}
        }
    }
    out
}

/// `/topic/body/p[2]`-style path of the element being walked.
#[derive(Default)]
struct ElementPath {
    steps: Vec<(String, usize)>,
    counters: Vec<HashMap<String, usize>>,
}

impl ElementPath {
    fn enter(&mut self, name: &str) {
        if self.counters.is_empty() {
            self.counters.push(HashMap::new());
        }
        let level = self.counters.len() - 1;
        let n = self.counters[level].entry(name.to_string()).or_insert(0);
        *n += 1;
        self.steps.push((name.to_string(), *n));
        self.counters.push(HashMap::new());
    }

    fn leave(&mut self) {
        self.steps.pop();
        self.counters.pop();
    }
}

impl std::fmt::Display for ElementPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "/");
        }
        for (name, n) in &self.steps {
            if *n > 1 {
                write!(f, "/{name}[{n}]")?;
            } else {
                write!(f, "/{name}")?;
            }
        }
        Ok(())
    }
}
