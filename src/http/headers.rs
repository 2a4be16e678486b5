/// An ordered multimap from header field-name to its list of values.
///
/// Modeled as a `Vec` of `(name, values)` entries, grouped by name in
/// first-appearance order, rather than a `HashMap`: spec.md requires
/// that both "order within a name" and "order across names" survive a
/// parse → serialize round trip, which a hash-based map cannot
/// guarantee.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value under `name`, creating the entry if this is
    /// the name's first appearance.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Looks up the first value under `name`. Matching is
    /// case-sensitive — see DESIGN.md open-question #1, kept
    /// bug-for-bug with the original implementation's observed
    /// behavior rather than "fixed" to be case-insensitive.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    /// Returns every value under `name`, in encounter order.
    pub fn all(&self, name: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Overwrites only the first value under `name`. Returns `false`
    /// (a no-op) if `name` is absent. Additional values under the
    /// same name are left untouched — see DESIGN.md open-question #2.
    pub fn set_first(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, values)) => {
                if let Some(first) = values.first_mut() {
                    *first = value.into();
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Iterates `(name, value)` pairs in serialization order: names in
    /// first-appearance order, each name's values in encounter order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |value| (name.as_str(), value.as_str())))
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, values)| values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
