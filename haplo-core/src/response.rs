use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ordered mapping from input symbol to response label (e.g. `"1" -> "squashed"`).
///
/// Only these symbols count as responses. Order is for display; it implies no
/// precedence between symbols.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseMapping {
    entries: Vec<(String, String)>,
}

impl ResponseMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a symbol, keeping first-insertion order.
    pub fn insert(&mut self, symbol: impl Into<String>, label: impl Into<String>) {
        let symbol = symbol.into();
        let label = label.into();
        match self.entries.iter_mut().find(|(s, _)| *s == symbol) {
            Some(entry) => entry.1 = label,
            None => self.entries.push((symbol, label)),
        }
    }

    pub fn label(&self, symbol: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, l)| l.as_str())
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.label(symbol).is_some()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(s, _)| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(s, l)| (s.as_str(), l.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One `symbol = label` line per entry.
    pub fn describe(&self) -> String {
        self.iter()
            .map(|(s, l)| format!("{s} = {l}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<S: Into<String>, L: Into<String>> FromIterator<(S, L)> for ResponseMapping {
    fn from_iter<I: IntoIterator<Item = (S, L)>>(iter: I) -> Self {
        let mut mapping = ResponseMapping::new();
        for (s, l) in iter {
            mapping.insert(s, l);
        }
        mapping
    }
}

impl Serialize for ResponseMapping {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (s, l) in &self.entries {
            map.serialize_entry(s, l)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResponseMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = ResponseMapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of response symbol to label")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut mapping = ResponseMapping::new();
                while let Some((symbol, label)) = access.next_entry::<String, String>()? {
                    if mapping.contains(&symbol) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate response symbol '{symbol}'"
                        )));
                    }
                    mapping.insert(symbol, label);
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_order() {
        let mapping: ResponseMapping = [("1", "squashed"), ("2", "stretched")]
            .into_iter()
            .collect();
        assert_eq!(mapping.label("2"), Some("stretched"));
        assert_eq!(mapping.label("3"), None);
        assert_eq!(mapping.symbols().collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(mapping.describe(), "1 = squashed\n2 = stretched");
    }

    #[test]
    fn insert_replaces_label_in_place() {
        let mut mapping = ResponseMapping::new();
        mapping.insert("1", "a");
        mapping.insert("2", "b");
        mapping.insert("1", "c");
        assert_eq!(mapping.iter().collect::<Vec<_>>(), vec![("1", "c"), ("2", "b")]);
    }

    #[test]
    fn deserializes_from_toml_table_in_document_order() {
        #[derive(Deserialize)]
        struct Wrapper {
            keys: ResponseMapping,
        }
        let w: Wrapper = toml::from_str("[keys]\n2 = \"stretched\"\n1 = \"squashed\"\n").unwrap();
        assert_eq!(w.keys.symbols().collect::<Vec<_>>(), vec!["2", "1"]);
    }

    #[test]
    fn json_round_trip_keeps_order() {
        let mapping: ResponseMapping = [("b", "x"), ("a", "y")].into_iter().collect();
        let json = serde_json::to_string(&mapping).unwrap();
        assert_eq!(json, r#"{"b":"x","a":"y"}"#);
    }
}
