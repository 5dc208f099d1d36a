use anyhow::anyhow;

use crate::dita::xml::{attr_value, XmlEvent};

/// Element tree over the flat event list. Maps are small and get edited
/// structurally, so they are worked on in this form.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    /// Text, comment, PI or CDATA, kept as the original event.
    Other(XmlEvent),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
    /// Written as `<x/>` when it still has no children.
    pub self_closing: bool,
}

impl Element {
    pub fn new(name: &str, attrs: Vec<(String, String)>) -> Self {
        Self {
            name: name.to_string(),
            attrs,
            children: Vec::new(),
            self_closing: true,
        }
    }

    pub fn attr(&self, key: &str) -> Option<String> {
        attr_value(&self.attrs, key).map(|v| v.into_owned())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Other(_) => None,
        })
    }

    pub fn has_child_elements(&self) -> bool {
        self.child_elements().next().is_some()
    }

    /// Concatenated direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Other(XmlEvent::Text { text }) | Node::Other(XmlEvent::CData { text }) => {
                    Some(text.as_str())
                }
                _ => None,
            })
            .collect()
    }

    /// Visits this element and every descendant, parents first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Element)) {
        f(self);
        for c in self.child_elements() {
            c.walk(f);
        }
    }

    fn push_events(&self, out: &mut Vec<XmlEvent>) {
        if self.children.is_empty() && self.self_closing {
            out.push(XmlEvent::Empty {
                name: self.name.clone(),
                attrs: self.attrs.clone(),
            });
            return;
        }
        out.push(XmlEvent::Start {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
        });
        for c in &self.children {
            match c {
                Node::Element(e) => e.push_events(out),
                Node::Other(ev) => out.push(ev.clone()),
            }
        }
        out.push(XmlEvent::End {
            name: self.name.clone(),
        });
    }
}

/// A whole document: everything before the root, the root, everything after.
#[derive(Clone, Debug, PartialEq)]
pub struct Tree {
    pub prolog: Vec<XmlEvent>,
    pub root: Element,
    pub epilog: Vec<XmlEvent>,
}

impl Tree {
    pub fn from_events(events: &[XmlEvent]) -> anyhow::Result<Self> {
        let mut prolog: Vec<XmlEvent> = Vec::new();
        let mut epilog: Vec<XmlEvent> = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        for ev in events {
            match ev {
                XmlEvent::Start { name, attrs } => {
                    if root.is_some() && stack.is_empty() {
                        return Err(anyhow!("second root element <{name}>"));
                    }
                    let mut el = Element::new(name, attrs.clone());
                    el.self_closing = false;
                    stack.push(el);
                }
                XmlEvent::Empty { name, attrs } => {
                    let el = Element::new(name, attrs.clone());
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(el)),
                        None if root.is_none() => root = Some(el),
                        None => return Err(anyhow!("second root element <{name}>")),
                    }
                }
                XmlEvent::End { name } => {
                    let el = stack.pop().ok_or_else(|| anyhow!("stray </{name}>"))?;
                    if &el.name != name {
                        return Err(anyhow!("</{name}> closes <{}>", el.name));
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(el)),
                        None => root = Some(el),
                    }
                }
                other => match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Other(other.clone())),
                    None if root.is_none() => prolog.push(other.clone()),
                    None => epilog.push(other.clone()),
                },
            }
        }
        if let Some(open) = stack.last() {
            return Err(anyhow!("<{}> never closed", open.name));
        }
        let root = root.ok_or_else(|| anyhow!("document has no root element"))?;
        Ok(Self {
            prolog,
            root,
            epilog,
        })
    }

    pub fn to_events(&self) -> Vec<XmlEvent> {
        let mut out = self.prolog.clone();
        self.root.push_events(&mut out);
        out.extend(self.epilog.iter().cloned());
        out
    }
}
