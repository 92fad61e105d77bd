//! Label/annotation matching.
//!
//! Two strictness levels share one atom syntax (`key=value`, `key!=value`, bare `key`):
//! - [`label_match`]: a single atom, values compared for equality.
//! - [`custom_match`]: `atom||atom,atom` (commas AND, `||` OR), values compared by
//!   substring containment.
//!
//! A negated atom needs the key to be present with a non-matching value; an absent key
//! never satisfies an atom, negated or not.

use std::collections::BTreeMap;

use smallvec::SmallVec;

/// Value that matches any present key (non-negated atoms only).
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub key: String,
    pub value: String,
    pub negated: bool,
}

impl Atom {
    /// `key=value`, `key!=value` (the `!` belongs to the key) or bare `key`.
    pub fn parse(s: &str) -> Self {
        match s.split_once('=') {
            Some((key, value)) => match key.strip_suffix('!') {
                Some(key) => Self { key: key.to_string(), value: value.to_string(), negated: true },
                None => Self { key: key.to_string(), value: value.to_string(), negated: false },
            },
            None => Self { key: s.to_string(), value: WILDCARD.to_string(), negated: false },
        }
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>, mode: MatchMode) -> bool {
        let Some(v) = labels.get(&self.key) else { return false };
        let hit = match mode {
            MatchMode::Exact => *v == self.value,
            MatchMode::Contains => v.contains(self.value.as_str()),
        };
        if self.negated {
            !hit
        } else {
            self.value == WILDCARD || hit
        }
    }
}

/// OR over alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub alternatives: SmallVec<[Atom; 2]>,
}

impl Clause {
    pub fn matches(&self, labels: &BTreeMap<String, String>, mode: MatchMode) -> bool {
        self.alternatives.iter().any(|a| a.matches(labels, mode))
    }
}

/// AND over clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub clauses: Vec<Clause>,
}

impl Expr {
    pub fn parse(s: &str) -> Self {
        let clauses = s
            .split(',')
            .map(|and| Clause { alternatives: and.split("||").map(Atom::parse).collect() })
            .collect();
        Self { clauses }
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>, mode: MatchMode) -> bool {
        self.clauses.iter().all(|c| c.matches(labels, mode))
    }
}

/// Exact-equality match of a single atom (`label=` / `annotation=` filters).
pub fn label_match(labels: &BTreeMap<String, String>, filter: &str) -> bool {
    Atom::parse(filter).matches(labels, MatchMode::Exact)
}

/// Boolean DSL with substring containment (`dogo=` filter).
pub fn custom_match(labels: &BTreeMap<String, String>, filter: &str) -> bool {
    Expr::parse(filter).matches(labels, MatchMode::Contains)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn atom_parsing() {
        assert_eq!(Atom::parse("a=b"), Atom { key: "a".into(), value: "b".into(), negated: false });
        assert_eq!(Atom::parse("a!=b"), Atom { key: "a".into(), value: "b".into(), negated: true });
        assert_eq!(Atom::parse("a"), Atom { key: "a".into(), value: "*".into(), negated: false });
        // only the first '=' splits
        assert_eq!(Atom::parse("a=b=c").value, "b=c");
    }

    #[test]
    fn exact_equality() {
        let labels = m(&[("app", "web"), ("example.com/workspace", "system-workspace")]);
        assert!(label_match(&labels, "app=web"));
        assert!(!label_match(&labels, "app=we"));
        assert!(label_match(&labels, "example.com/workspace=system-workspace"));
        assert!(!label_match(&labels, "tier=web"));
    }

    #[test]
    fn bare_key_is_existence() {
        let labels = m(&[("app", "")]);
        assert!(label_match(&labels, "app"));
        assert!(label_match(&labels, "app=*"));
        assert!(!label_match(&labels, "tier"));
    }

    #[test]
    fn negation_requires_present_key() {
        let labels = m(&[("k", "other")]);
        assert!(label_match(&labels, "k!=v"));
        assert!(!label_match(&m(&[("k", "v")]), "k!=v"));
        assert!(!label_match(&m(&[("x", "y")]), "k!=v"));
        assert!(!label_match(&BTreeMap::new(), "k!=v"));
    }

    #[test]
    fn dsl_and_or_containment() {
        assert!(custom_match(&m(&[("a", "xb"), ("e", "zfz")]), "a=b||c=d,e=f"));
        assert!(!custom_match(&m(&[("c", "d0")]), "a=b||c=d,e=f"));
        assert!(custom_match(&m(&[("c", "d0"), ("e", "f")]), "a=b||c=d,e=f"));
    }

    #[test]
    fn dsl_plain_and_list() {
        let labels = m(&[("a", "b1"), ("c", "d1")]);
        assert!(custom_match(&labels, "a=b,c=d"));
        assert!(!custom_match(&labels, "a=b,c=x"));
    }

    #[test]
    fn dsl_negation_and_wildcard() {
        let labels = m(&[("a", "hello"), ("e", "x")]);
        assert!(custom_match(&labels, "a!=zz"));
        assert!(!custom_match(&labels, "a!=ell"));
        assert!(!custom_match(&labels, "missing!=zz"));
        assert!(custom_match(&labels, "e,a=ell"));
        assert!(custom_match(&labels, "missing||e"));
    }

    #[test]
    fn dsl_four_way() {
        let labels = m(&[("c", "dd"), ("d", "hh")]);
        assert!(custom_match(&labels, "a=b||c=d,e=f||d=h"));
        assert!(!custom_match(&labels, "a=b||c=x,e=f||d=h"));
    }

    #[test]
    fn empty_expression_matches_nothing() {
        assert!(!custom_match(&m(&[("a", "b")]), ""));
        assert!(!label_match(&m(&[("a", "b")]), ""));
    }

    #[test]
    fn expression_structure() {
        let e = Expr::parse("a=b||c=d,e=f");
        assert_eq!(e.clauses.len(), 2);
        assert_eq!(e.clauses[0].alternatives.len(), 2);
        assert_eq!(e.clauses[1].alternatives[0].key, "e");
    }
}
