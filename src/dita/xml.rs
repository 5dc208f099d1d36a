use std::borrow::Cow;
use std::collections::BTreeMap;

use anyhow::{anyhow, Context};
use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::textutil::normalise;

static ENCODING_DECL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*\bencoding\s*=\s*["']([A-Za-z0-9._\-]+)["']"#).expect("decl re")
});

#[derive(Clone, Debug, PartialEq)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

impl XmlEvent {
    pub fn start_name(&self) -> Option<&str> {
        match self {
            XmlEvent::Start { name, .. } | XmlEvent::Empty { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn attrs(&self) -> &[(String, String)] {
        match self {
            XmlEvent::Start { attrs, .. } | XmlEvent::Empty { attrs, .. } => attrs,
            _ => &[],
        }
    }

    pub fn is_blank_text(&self) -> bool {
        matches!(self, XmlEvent::Text { text } if text.trim().is_empty())
    }
}

/// A parsed XML document kept as a flat, lossless event list.
///
/// Attribute values are stored raw (still escaped) so they round-trip byte for
/// byte; use [`attr_value`] / [`set_attr`] to read or write them as plain text.
#[derive(Clone, Debug)]
pub struct XmlDoc {
    pub path: String,
    pub events: Vec<XmlEvent>,
    pub baseline_hash: String,
}

impl XmlDoc {
    pub fn root_name(&self) -> Option<&str> {
        self.events.iter().find_map(|ev| ev.start_name())
    }
}

/// Decodes raw document bytes to UTF-8, honouring a BOM first and the XML
/// declaration second.
pub fn decode_document(bytes: &[u8]) -> anyhow::Result<String> {
    if let Some((enc, bom_len)) = Encoding::for_bom(bytes) {
        return decode_with(enc, &bytes[bom_len..]);
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
    let enc = ENCODING_DECL_RE
        .captures(&head)
        .and_then(|c| Encoding::for_label(c[1].as_bytes()))
        .unwrap_or(UTF_8);
    decode_with(enc, bytes)
}

fn decode_with(enc: &'static Encoding, bytes: &[u8]) -> anyhow::Result<String> {
    let (text, had_errors) = enc.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(anyhow!("invalid {} byte sequence", enc.name()));
    }
    Ok(text.into_owned())
}

pub fn parse_xml_bytes(path: &str, bytes: &[u8]) -> anyhow::Result<XmlDoc> {
    let text = decode_document(bytes).with_context(|| format!("decode {path}"))?;
    parse_xml_str(path, &text)
}

pub fn parse_xml_str(path: &str, xml: &str) -> anyhow::Result<XmlDoc> {
    let events = parse_events(xml).with_context(|| format!("parse xml: {path}"))?;
    let baseline_hash = structure_hash(&events);
    Ok(XmlDoc {
        path: path.to_string(),
        events,
        baseline_hash,
    })
}

/// Parses a well-formed fragment (one or more sibling nodes) into events.
pub fn parse_events(xml: &str) -> anyhow::Result<Vec<XmlEvent>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut events: Vec<XmlEvent> = Vec::new();
    let mut depth: usize = 0;
    loop {
        let ev = reader.read_event().context("read xml event")?;
        match ev {
            Event::Eof => break,
            Event::Decl(d) => {
                let version = bytes_to_string(d.version().context("decl version")?);
                let encoding = d
                    .encoding()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                let standalone = d
                    .standalone()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                events.push(XmlEvent::Decl {
                    version,
                    encoding,
                    standalone,
                });
            }
            Event::Start(s) => {
                depth += 1;
                events.push(XmlEvent::Start {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                });
            }
            Event::End(e) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| anyhow!("unbalanced end tag"))?;
                events.push(XmlEvent::End {
                    name: bytes_to_string(e.name().as_ref()),
                });
            }
            Event::Empty(s) => {
                events.push(XmlEvent::Empty {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                });
            }
            Event::Text(t) => {
                let txt = t.unescape().context("unescape text")?.into_owned();
                events.push(XmlEvent::Text { text: txt });
            }
            Event::CData(t) => {
                events.push(XmlEvent::CData {
                    text: bytes_to_string(t.into_inner()),
                });
            }
            Event::Comment(t) => {
                events.push(XmlEvent::Comment {
                    text: bytes_to_string(t.into_inner()),
                });
            }
            Event::PI(t) => {
                // Target and data together, as written between `<?` and `?>`.
                events.push(XmlEvent::PI {
                    content: bytes_to_string(&*t),
                });
            }
            Event::DocType(t) => {
                events.push(XmlEvent::DocType {
                    text: bytes_to_string(t.into_inner()),
                });
            }
        }
    }
    if depth != 0 {
        return Err(anyhow!("{depth} unclosed element(s) at end of input"));
    }
    Ok(events)
}

fn collect_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.context("attr")?;
        // Raw (still escaped) value: character references survive the round-trip.
        attrs.push((
            bytes_to_string(a.key.as_ref()),
            bytes_to_string(a.value.as_ref()),
        ));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

/// Plain-text value of an attribute.
pub fn attr_value<'a>(attrs: &'a [(String, String)], key: &str) -> Option<Cow<'a, str>> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, raw)| {
        quick_xml::escape::unescape(raw).unwrap_or(Cow::Borrowed(raw.as_str()))
    })
}

/// Sets an attribute from plain text, appending it when absent.
pub fn set_attr(attrs: &mut Vec<(String, String)>, key: &str, value: &str) {
    let raw = quick_xml::escape::escape(value).into_owned();
    if let Some((_, v)) = attrs.iter_mut().find(|(k, _)| k == key) {
        *v = raw;
    } else {
        attrs.push((key.to_string(), raw));
    }
}

pub fn escape_text_into(out: &mut Vec<u8>, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn write_start_like(out: &mut Vec<u8>, name: &str, attrs: &[(String, String)], empty: bool) {
    out.extend_from_slice(b"<");
    out.extend_from_slice(name.as_bytes());
    // Values are raw XML already; never escape twice.
    for (k, v) in attrs {
        out.extend_from_slice(b" ");
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(v.as_bytes());
        out.extend_from_slice(b"\"");
    }
    if empty {
        out.extend_from_slice(b"/>");
    } else {
        out.extend_from_slice(b">");
    }
}

/// Serializes events back to UTF-8 markup. Declared encodings are rewritten to
/// UTF-8 since that is what gets written.
pub fn write_events(events: &[XmlEvent]) -> anyhow::Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();
    for ev in events {
        match ev {
            XmlEvent::Decl {
                version,
                encoding,
                standalone,
            } => {
                let encoding = encoding.as_ref().map(|_| "UTF-8");
                let d = BytesDecl::new(version.as_str(), encoding, standalone.as_deref());
                let mut writer = quick_xml::Writer::new(Vec::new());
                writer.write_event(Event::Decl(d)).context("write decl")?;
                out.extend_from_slice(&writer.into_inner());
            }
            XmlEvent::Start { name, attrs } => write_start_like(&mut out, name, attrs, false),
            XmlEvent::End { name } => {
                out.extend_from_slice(b"</");
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b">");
            }
            XmlEvent::Empty { name, attrs } => write_start_like(&mut out, name, attrs, true),
            XmlEvent::Text { text } => escape_text_into(&mut out, text),
            XmlEvent::CData { text } => {
                out.extend_from_slice(b"<![CDATA[");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"]]>");
            }
            XmlEvent::Comment { text } => {
                out.extend_from_slice(b"<!--");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"-->");
            }
            XmlEvent::PI { content } => {
                out.extend_from_slice(b"<?");
                out.extend_from_slice(content.as_bytes());
                out.extend_from_slice(b"?>");
            }
            XmlEvent::DocType { text } => {
                out.extend_from_slice(b"<!DOCTYPE");
                if !text.starts_with(char::is_whitespace) {
                    out.push(b' ');
                }
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b">");
            }
        }
    }
    Ok(out)
}

pub fn write_xml_doc(doc: &XmlDoc) -> anyhow::Result<Vec<u8>> {
    write_events(&doc.events).with_context(|| format!("serialize xml: {}", doc.path))
}

/// Markup of a single event as it would be written, e.g. `<b outputclass="x">`.
pub fn event_markup(ev: &XmlEvent) -> anyhow::Result<String> {
    let bytes = write_events(std::slice::from_ref(ev))?;
    String::from_utf8(bytes).context("markup is utf-8")
}

pub fn events_markup(events: &[XmlEvent]) -> anyhow::Result<String> {
    String::from_utf8(write_events(events)?).context("markup is utf-8")
}

pub fn verify_structure_unchanged(doc: &XmlDoc, other: &[XmlEvent]) -> anyhow::Result<()> {
    let cur = structure_hash(other);
    if cur != doc.baseline_hash {
        return Err(anyhow!(
            "structure of {} differs (baseline={} current={})",
            doc.path,
            doc.baseline_hash,
            cur
        ));
    }
    Ok(())
}

/// Hash of everything but formatting: whitespace-only text is skipped and
/// remaining text is whitespace-normalised. Attribute order is ignored.
pub fn structure_hash(events: &[XmlEvent]) -> String {
    let mut hasher = Sha256::new();
    let mut pending_text = String::new();

    let flush = |hasher: &mut Sha256, pending: &mut String| {
        let norm = normalise(pending, true);
        if !norm.is_empty() {
            hasher.update(b"T:");
            hasher.update(norm.as_bytes());
            hasher.update(b"\n");
        }
        pending.clear();
    };

    for ev in events {
        match ev {
            XmlEvent::Text { text } | XmlEvent::CData { text } => {
                pending_text.push_str(text);
                continue;
            }
            _ => flush(&mut hasher, &mut pending_text),
        }
        match ev {
            XmlEvent::Start { name, attrs } => hash_start_like(&mut hasher, name, attrs),
            XmlEvent::Empty { name, attrs } => {
                hash_start_like(&mut hasher, name, attrs);
                hash_end_like(&mut hasher, name);
            }
            XmlEvent::End { name } => hash_end_like(&mut hasher, name),
            XmlEvent::Decl { version, .. } => {
                hasher.update(b"D:");
                hasher.update(version.as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::Comment { text } => {
                hasher.update(b"M:");
                hasher.update(text.trim().as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::PI { content } => {
                hasher.update(b"P:");
                hasher.update(content.as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::DocType { text } => {
                hasher.update(b"Y:");
                hasher.update(normalise(text, true).as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::Text { .. } | XmlEvent::CData { .. } => {}
        }
    }
    flush(&mut hasher, &mut pending_text);
    hex::encode(hasher.finalize())
}

fn hash_start_like(hasher: &mut Sha256, name: &str, attrs: &[(String, String)]) {
    hasher.update(b"S:");
    hasher.update(name.as_bytes());
    hasher.update(b"|");
    let map: BTreeMap<&str, &str> = attrs
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    for (k, v) in map {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b";");
    }
    hasher.update(b"\n");
}

fn hash_end_like(hasher: &mut Sha256, name: &str) {
    hasher.update(b"E:");
    hasher.update(name.as_bytes());
    hasher.update(b"\n");
}
