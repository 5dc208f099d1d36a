use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context};

use crate::dita::xml::{attr_value, parse_xml_bytes, XmlEvent};
use crate::textutil::split_tokens;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleAction {
    Include,
    Exclude,
}

impl RuleAction {
    fn parse(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "include" | "flag" | "passthrough" => Ok(RuleAction::Include),
            "exclude" => Ok(RuleAction::Exclude),
            other => Err(anyhow!("unknown prop action: {other:?}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileRule {
    pub attribute: Option<String>,
    pub value: Option<String>,
    pub action: RuleAction,
}

/// Conditional-processing rules for one publication.
#[derive(Clone, Debug, Default)]
pub struct ProfileRules {
    pub name: Option<String>,
    exact: HashMap<(String, String), RuleAction>,
    attribute_defaults: HashMap<String, RuleAction>,
    global_default: Option<RuleAction>,
    attributes: Vec<String>,
}

impl ProfileRules {
    /// `profiling_attributes` are the attribute names a global default applies to.
    pub fn new(name: Option<String>, rules: Vec<ProfileRule>, profiling_attributes: &[String]) -> Self {
        let mut exact: HashMap<(String, String), RuleAction> = HashMap::new();
        let mut attribute_defaults: HashMap<String, RuleAction> = HashMap::new();
        let mut global_default: Option<RuleAction> = None;
        let mut attributes: Vec<String> = profiling_attributes.to_vec();

        for r in &rules {
            match (&r.attribute, &r.value) {
                (Some(att), Some(val)) => {
                    let slot = exact.entry((att.clone(), val.clone())).or_insert(r.action);
                    if r.action == RuleAction::Exclude {
                        *slot = RuleAction::Exclude;
                    }
                }
                (Some(att), None) => {
                    attribute_defaults.insert(att.clone(), r.action);
                }
                (None, _) => global_default = Some(r.action),
            }
            if let Some(att) = &r.attribute {
                if !attributes.contains(att) {
                    attributes.push(att.clone());
                }
            }
        }

        Self {
            name,
            exact,
            attribute_defaults,
            global_default,
            attributes,
        }
    }

    pub fn from_ditaval_path(path: &Path, profiling_attributes: &[String]) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read profile definition: {}", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string());
        let rules = parse_ditaval(&path.display().to_string(), &bytes)?;
        Ok(Self::new(name, rules, profiling_attributes))
    }

    pub fn profiling_attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn action_for(&self, attribute: &str, value: &str) -> RuleAction {
        if let Some(a) = self.exact.get(&(attribute.to_string(), value.to_string())) {
            return *a;
        }
        if let Some(a) = self.attribute_defaults.get(attribute) {
            return *a;
        }
        self.global_default.unwrap_or(RuleAction::Include)
    }

    /// Tokens of `value` that survive this profile.
    pub fn kept_tokens(&self, attribute: &str, value: &str) -> Vec<String> {
        split_tokens(value)
            .into_iter()
            .filter(|t| self.action_for(attribute, t) == RuleAction::Include)
            .collect()
    }

    /// A node is dropped when some profiling attribute it carries has every one
    /// of its tokens excluded. Nodes without matching attributes are kept.
    pub fn included(&self, attrs: &[(String, String)]) -> bool {
        for att in &self.attributes {
            let Some(value) = attr_value(attrs, att) else {
                continue;
            };
            let tokens = split_tokens(&value);
            if tokens.is_empty() {
                continue;
            }
            if tokens
                .iter()
                .all(|t| self.action_for(att, t) == RuleAction::Exclude)
            {
                return false;
            }
        }
        true
    }
}

/// Predicate form used by the walkers: no ruleset means everything is included.
pub fn included(attrs: &[(String, String)], rules: Option<&ProfileRules>) -> bool {
    rules.map_or(true, |r| r.included(attrs))
}

pub fn parse_ditaval(name: &str, bytes: &[u8]) -> anyhow::Result<Vec<ProfileRule>> {
    let doc = parse_xml_bytes(name, bytes)?;
    if doc.root_name() != Some("val") {
        return Err(anyhow!("{name}: root element must be <val>"));
    }
    let mut rules: Vec<ProfileRule> = Vec::new();
    let mut stack: Vec<&str> = Vec::new();
    for ev in &doc.events {
        match ev {
            XmlEvent::Start { name: el, attrs } | XmlEvent::Empty { name: el, attrs } => {
                // Only direct <val>/<prop> children count; <revprop> and friends are ignored.
                if el == "prop" && stack.last() == Some(&"val") {
                    let action = attr_value(attrs, "action")
                        .ok_or_else(|| anyhow!("{name}: <prop> without action"))?;
                    rules.push(ProfileRule {
                        attribute: non_empty(attr_value(attrs, "att").as_deref()),
                        value: non_empty(attr_value(attrs, "val").as_deref()),
                        action: RuleAction::parse(&action)
                            .with_context(|| format!("{name}: bad <prop>"))?,
                    });
                }
                if matches!(ev, XmlEvent::Start { .. }) {
                    stack.push(el.as_str());
                }
            }
            XmlEvent::End { .. } => {
                stack.pop();
            }
            _ => {}
        }
    }
    Ok(rules)
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
