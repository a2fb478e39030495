//! Ordered key/value dictionary for properties and environment variables.

/// One key and its values, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DictEntry {
    pub key: String,
    pub values: Vec<String>,
}

impl DictEntry {
    /// First value, the one written to environment scripts.
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// Insertion-ordered multimap. Keys keep the position of their first
/// insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dict {
    entries: Vec<DictEntry>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all values of `key` with `value`.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.values = vec![value.to_string()],
            None => self.entries.push(DictEntry {
                key: key.to_string(),
                values: vec![value.to_string()],
            }),
        }
    }

    /// Append `value` to the values of `key`.
    pub fn insert(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.values.push(value.to_string()),
            None => self.entries.push(DictEntry {
                key: key.to_string(),
                values: vec![value.to_string()],
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .and_then(DictEntry::value)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.values.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &DictEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_in_place() {
        let mut d = Dict::new();
        d.set("a", "1");
        d.set("b", "2");
        d.set("a", "3");
        let keys: Vec<_> = d.iter().map(|e| (e.key.as_str(), e.value().unwrap())).collect();
        assert_eq!(keys, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn insert_accumulates_values() {
        let mut d = Dict::new();
        d.insert("targets", "x");
        d.insert("targets", "y");
        assert_eq!(d.get("targets"), Some("x"));
        assert_eq!(d.get_all("targets"), ["x".to_string(), "y".to_string()]);
        assert!(d.get_all("missing").is_empty());
    }
}
