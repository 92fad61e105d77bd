//! Kubernetes-style label selectors (`app=web,tier!=db,env in (prod,stage),!canary`).
//!
//! Parsed locally so that a malformed selector can be detected before it reaches the API
//! server, and evaluated in memory for sources that do not filter server-side.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

static LABEL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9]([-A-Za-z0-9_.]{0,61}[A-Za-z0-9])?)$").expect("static regex"));
static DNS_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").expect("static regex")
});
static SET_EXPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\s+(in|notin)\s*\((.*)\)$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("invalid label key {0:?}")]
    InvalidKey(String),
    #[error("invalid label value {0:?}")]
    InvalidValue(String),
    #[error("unbalanced parentheses in {0:?}")]
    Unbalanced(String),
    #[error("empty requirement")]
    EmptyRequirement,
    #[error("empty value set for {0:?}")]
    EmptySet(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Exists,
    DoesNotExist,
    Equals,
    NotEquals,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub op: Operator,
    pub values: BTreeSet<String>,
}

impl Requirement {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let found = labels.get(&self.key);
        match self.op {
            Operator::Exists => found.is_some(),
            Operator::DoesNotExist => found.is_none(),
            Operator::Equals | Operator::In => found.map(|v| self.values.contains(v)).unwrap_or(false),
            Operator::NotEquals | Operator::NotIn => found.map(|v| !self.values.contains(v)).unwrap_or(true),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.values.iter().next().map(String::as_str).unwrap_or("");
        match self.op {
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::Equals => write!(f, "{}={}", self.key, first),
            Operator::NotEquals => write!(f, "{}!={}", self.key, first),
            Operator::In | Operator::NotIn => {
                let op = if self.op == Operator::In { "in" } else { "notin" };
                let vals: Vec<&str> = self.values.iter().map(String::as_str).collect();
                write!(f, "{} {} ({})", self.key, op, vals.join(","))
            }
        }
    }
}

/// Conjunction of requirements. No requirements selects everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn everything() -> Self { Self::default() }

    pub fn is_empty(&self) -> bool { self.requirements.is_empty() }

    pub fn requirements(&self) -> &[Requirement] { &self.requirements }

    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        static EMPTY: Lazy<BTreeMap<String, String>> = Lazy::new(BTreeMap::new);
        let labels = labels.unwrap_or(&EMPTY);
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// Rendered form for `ListParams::label_selector`; `None` when selecting everything.
    pub fn to_param(&self) -> Option<String> {
        if self.is_empty() { None } else { Some(self.to_string()) }
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::everything());
        }
        let mut requirements = Vec::new();
        for part in split_top_level(s)? {
            requirements.push(parse_requirement(part.trim())?);
        }
        Ok(Self { requirements })
    }
}

// Split on commas that are not inside a parenthesized value set.
fn split_top_level(s: &str) -> Result<Vec<&str>, SelectorError> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 { return Err(SelectorError::Unbalanced(s.to_string())); }
            }
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(SelectorError::Unbalanced(s.to_string()));
    }
    parts.push(&s[start..]);
    Ok(parts)
}

fn parse_requirement(part: &str) -> Result<Requirement, SelectorError> {
    if part.is_empty() {
        return Err(SelectorError::EmptyRequirement);
    }
    if let Some(caps) = SET_EXPR.captures(part) {
        let key = validate_key(&caps[1])?;
        let op = if &caps[2] == "in" { Operator::In } else { Operator::NotIn };
        let mut values = BTreeSet::new();
        for v in caps[3].split(',') {
            let v = v.trim();
            if v.is_empty() { continue; }
            values.insert(validate_value(v)?);
        }
        if values.is_empty() {
            return Err(SelectorError::EmptySet(key));
        }
        return Ok(Requirement { key, op, values });
    }
    if part.contains('(') || part.contains(')') {
        return Err(SelectorError::Unbalanced(part.to_string()));
    }
    if let Some(rest) = part.strip_prefix('!') {
        let key = validate_key(rest.trim())?;
        return Ok(Requirement { key, op: Operator::DoesNotExist, values: BTreeSet::new() });
    }
    let (key, op, value) = if let Some((k, v)) = part.split_once("!=") {
        (k, Operator::NotEquals, v)
    } else if let Some((k, v)) = part.split_once("==") {
        (k, Operator::Equals, v)
    } else if let Some((k, v)) = part.split_once('=') {
        (k, Operator::Equals, v)
    } else {
        let key = validate_key(part)?;
        return Ok(Requirement { key, op: Operator::Exists, values: BTreeSet::new() });
    };
    let key = validate_key(key.trim())?;
    let mut values = BTreeSet::new();
    values.insert(validate_value(value.trim())?);
    Ok(Requirement { key, op, values })
}

fn validate_key(key: &str) -> Result<String, SelectorError> {
    let (prefix, name) = match key.split_once('/') {
        Some((p, n)) => (Some(p), n),
        None => (None, key),
    };
    if let Some(p) = prefix {
        if p.is_empty() || p.len() > 253 || !DNS_SUBDOMAIN.is_match(p) {
            return Err(SelectorError::InvalidKey(key.to_string()));
        }
    }
    if !LABEL_NAME.is_match(name) {
        return Err(SelectorError::InvalidKey(key.to_string()));
    }
    Ok(key.to_string())
}

fn validate_value(value: &str) -> Result<String, SelectorError> {
    if value.is_empty() || LABEL_NAME.is_match(value) {
        Ok(value.to_string())
    } else {
        Err(SelectorError::InvalidValue(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_selects_everything() {
        let sel: LabelSelector = "".parse().unwrap();
        assert!(sel.is_empty());
        assert!(sel.matches(None));
        assert_eq!(sel.to_param(), None);
    }

    #[test]
    fn equality_and_existence() {
        let sel: LabelSelector = "app=web,tier!=db,example.com/team,!canary".parse().unwrap();
        assert_eq!(sel.requirements().len(), 4);
        assert!(sel.matches(Some(&labels(&[("app", "web"), ("example.com/team", "x")]))));
        assert!(!sel.matches(Some(&labels(&[("app", "web"), ("example.com/team", "x"), ("tier", "db")]))));
        assert!(!sel.matches(Some(&labels(&[("app", "web"), ("example.com/team", "x"), ("canary", "")]))));
        assert!(!sel.matches(Some(&labels(&[("app", "api"), ("example.com/team", "x")]))));
    }

    #[test]
    fn set_based_requirements() {
        let sel: LabelSelector = "env in (prod, stage),zone notin (a)".parse().unwrap();
        assert!(sel.matches(Some(&labels(&[("env", "prod")]))));
        assert!(sel.matches(Some(&labels(&[("env", "stage"), ("zone", "b")]))));
        assert!(!sel.matches(Some(&labels(&[("env", "stage"), ("zone", "a")]))));
        assert!(!sel.matches(Some(&labels(&[("env", "dev")]))));
        assert_eq!(sel.to_string(), "env in (prod,stage),zone notin (a)");
    }

    #[test]
    fn double_equals_is_equality() {
        let sel: LabelSelector = "app==web".parse().unwrap();
        assert_eq!(sel.to_param().as_deref(), Some("app=web"));
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        assert!("app in (a".parse::<LabelSelector>().is_err());
        assert!("app=web,".parse::<LabelSelector>().is_err());
        assert!("-bad=x".parse::<LabelSelector>().is_err());
        assert!("app=has space".parse::<LabelSelector>().is_err());
        assert!("env in ()".parse::<LabelSelector>().is_err());
        assert!("Bad_Prefix/app=x".parse::<LabelSelector>().is_err());
    }
}
