//! Substitution dictionary
//!
//! Two layers back the `{key}` expansion: entries seeded from the
//! command line, `-i` dictionary files and the synthesized keys are
//! sealed; `<dict>` elements in documents only ever grow the second
//! layer and never shadow an existing key.

use std::collections::BTreeMap;

use crate::system::Error;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubstMap {
    sealed: BTreeMap<String, String>,
    grown: BTreeMap<String, String>,
}

impl SubstMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a sealed entry. A later seed for the same key overwrites an
    /// earlier one, which is how appended prebuild `<sub>` entries
    /// shadow the parent's values for the child invocation.
    pub fn seed(&mut self, key: &str, value: &str) {
        self.sealed.insert(key.to_string(), value.to_string());
    }

    /// Seed a sealed entry unless the key is already sealed. Dictionary
    /// files rank below `-s` entries.
    pub fn seed_soft(&mut self, key: &str, value: &str) {
        if !self.sealed.contains_key(key) {
            self.seed(key, value);
        }
    }

    /// Insert a document-supplied entry. The first definition of a key
    /// wins; an insert that would shadow any existing key is dropped.
    pub fn insert(&mut self, key: &str, value: &str) {
        if self.sealed.contains_key(key) || self.grown.contains_key(key) {
            return;
        }
        self.grown.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.grown
            .get(key)
            .or_else(|| self.sealed.get(key))
            .map(String::as_str)
    }

    /// Expand every `{key}` token in `input`. `origin` names the
    /// document or element for diagnostics.
    pub fn substitute(&self, input: &str, origin: &str) -> Result<String, Error> {
        if !input.contains('{') {
            return Ok(input.to_string());
        }
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                Error::UnbalancedBraces(origin.to_string(), input.to_string())
            })?;
            let key = &after[..close];
            if key.is_empty() || key.contains('{') {
                return Err(Error::UnbalancedBraces(
                    origin.to_string(),
                    input.to_string(),
                ));
            }
            let value = self
                .get(key)
                .ok_or_else(|| Error::UnknownKey(origin.to_string(), key.to_string()))?;
            out.push_str(value);
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Split a `-s` value into key/value pairs. Both a single `key:value`
/// pair and a `;`-separated multi-pair string are accepted.
pub fn parse_pairs(input: &str) -> Result<Vec<(String, String)>, Error> {
    let mut pairs = Vec::new();
    for part in input.split(';') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part
            .split_once(':')
            .ok_or_else(|| Error::BadSubstitutionPair(part.to_string()))?;
        if key.is_empty() {
            return Err(Error::BadSubstitutionPair(part.to_string()));
        }
        pairs.push((key.to_string(), value.to_string()));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_tokens() {
        let mut map = SubstMap::new();
        map.seed("config", "Release");
        map.insert("cc", "gcc");
        assert_eq!(
            map.substitute("{config}/obj-{cc}.o", "test").unwrap(),
            "Release/obj-gcc.o"
        );
        assert_eq!(map.substitute("no tokens", "test").unwrap(), "no tokens");
    }

    #[test]
    fn unknown_key_is_an_error() {
        let map = SubstMap::new();
        assert!(matches!(
            map.substitute("{missing}", "test"),
            Err(Error::UnknownKey(_, k)) if k == "missing"
        ));
    }

    #[test]
    fn unbalanced_braces_are_an_error() {
        let map = SubstMap::new();
        assert!(matches!(
            map.substitute("{open", "test"),
            Err(Error::UnbalancedBraces(..))
        ));
        assert!(matches!(
            map.substitute("{ne{sted}}", "test"),
            Err(Error::UnbalancedBraces(..))
        ));
        // a lone closing brace is literal text
        assert_eq!(map.substitute("a}b", "test").unwrap(), "a}b");
    }

    #[test]
    fn sealed_keys_cannot_be_shadowed() {
        let mut map = SubstMap::new();
        map.seed("target", "w32");
        map.insert("target", "linux");
        assert_eq!(map.get("target"), Some("w32"));
    }

    #[test]
    fn first_document_definition_wins() {
        let mut map = SubstMap::new();
        map.insert("opt", "-O2");
        map.insert("opt", "-O0");
        assert_eq!(map.get("opt"), Some("-O2"));
    }

    #[test]
    fn soft_seed_ranks_below_cli() {
        let mut map = SubstMap::new();
        map.seed("target", "w32");
        map.seed_soft("target", "linux");
        map.seed_soft("board", "rev2");
        assert_eq!(map.get("target"), Some("w32"));
        assert_eq!(map.get("board"), Some("rev2"));
    }

    #[test]
    fn later_cli_seed_overwrites() {
        let mut map = SubstMap::new();
        map.seed("k", "parent");
        map.seed("k", "child");
        assert_eq!(map.get("k"), Some("child"));
    }

    #[test]
    fn parses_single_and_multi_pairs() {
        assert_eq!(
            parse_pairs("target:w32").unwrap(),
            [("target".to_string(), "w32".to_string())]
        );
        assert_eq!(
            parse_pairs("a:1;b:2").unwrap(),
            [
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
        // values may contain colons
        assert_eq!(
            parse_pairs("path:/usr/bin:ext").unwrap(),
            [("path".to_string(), "/usr/bin:ext".to_string())]
        );
        assert!(parse_pairs("novalue").is_err());
        assert!(parse_pairs(":empty").is_err());
    }
}
