//! Ordered header field storage.
//!
//! HTTP header semantics here are deliberately minimal: names are
//! case-insensitive (stored lower-cased), a name may repeat, and both the
//! insertion order of distinct names and the arrival order of repeated
//! values are preserved. Continuation lines (obsolete folding) are joined
//! onto the previous value with a single space on the read side and never
//! produced on the write side.

/// An ordered multimap of header fields.
///
/// Used for request/response headers and for chunked-body trailers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    entries: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    name: String,
    values: Vec<String>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct field names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of values across all names, one per header line.
    pub fn value_count(&self) -> usize {
        self.entries.iter().map(|f| f.values.len()).sum()
    }

    /// Appends a value for `name`, preserving arrival order for repeats.
    pub fn append<N: AsRef<str>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.as_ref().to_ascii_lowercase();
        match self.entries.iter_mut().find(|f| f.name == name) {
            Some(field) => field.values.push(value.into()),
            None => self.entries.push(Field { name, values: vec![value.into()] }),
        }
    }

    /// Replaces all values of `name` with a single value, keeping the
    /// field's original position if it already exists.
    pub fn insert<N: AsRef<str>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.as_ref().to_ascii_lowercase();
        match self.entries.iter_mut().find(|f| f.name == name) {
            Some(field) => {
                field.values.clear();
                field.values.push(value.into());
            }
            None => self.entries.push(Field { name, values: vec![value.into()] }),
        }
    }

    /// Extends the most recently appended value with a folded continuation
    /// line, joined by a single space. Returns false if no value exists yet.
    pub fn fold_continuation(&mut self, continuation: &str) -> bool {
        let Some(field) = self.entries.last_mut() else {
            return false;
        };
        let Some(value) = field.values.last_mut() else {
            return false;
        };
        value.push(' ');
        value.push_str(continuation);
        true
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        debug_assert!(!name.chars().any(|c| c.is_ascii_uppercase()), "lookups use lower-case names");
        self.entries.iter().find(|f| f.name == name).and_then(|f| f.values.first()).map(String::as_str)
    }

    /// All values for `name` in arrival order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries.iter().find(|f| f.name == name).map(|f| f.values.as_slice()).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|f| f.name == name)
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|f| f.name != name);
    }

    /// Iterates `(name, value)` pairs: names in insertion order, and for a
    /// repeated name all its values in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|f| f.values.iter().map(move |v| (f.name.as_str(), v.as_str())))
    }

    /// True if any comma-separated element of any value equals `token`
    /// (ASCII case-insensitive). Used for `Connection: close` and
    /// `Transfer-Encoding: chunked` checks.
    pub fn value_has_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name).iter().any(|value| value.split(',').any(|part| part.trim().eq_ignore_ascii_case(token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_name_and_value_order() {
        let mut fields = FieldSet::new();
        fields.append("H1", "v1");
        fields.append("H2", "v2");
        fields.append("H1", "v11");

        assert_eq!(fields.get_all("h1"), &["v1".to_string(), "v11".to_string()]);
        assert_eq!(fields.get_all("h2"), &["v2".to_string()]);

        let pairs: Vec<_> = fields.iter().collect();
        assert_eq!(pairs, vec![("h1", "v1"), ("h1", "v11"), ("h2", "v2")]);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.value_count(), 3);
    }

    #[test]
    fn names_are_lower_cased() {
        let mut fields = FieldSet::new();
        fields.append("Content-Length", "42");
        assert_eq!(fields.get("content-length"), Some("42"));
        assert!(fields.contains("content-length"));
    }

    #[test]
    fn fold_joins_with_single_space() {
        let mut fields = FieldSet::new();
        fields.append("X", "a");
        assert!(fields.fold_continuation("b"));
        assert_eq!(fields.get("x"), Some("a b"));
    }

    #[test]
    fn fold_without_previous_field_is_rejected() {
        let mut fields = FieldSet::new();
        assert!(!fields.fold_continuation("b"));
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut fields = FieldSet::new();
        fields.append("a", "1");
        fields.append("b", "2");
        fields.insert("a", "3");
        let pairs: Vec<_> = fields.iter().collect();
        assert_eq!(pairs, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn token_lookup_splits_on_commas() {
        let mut fields = FieldSet::new();
        fields.append("Transfer-Encoding", "gzip, Chunked");
        assert!(fields.value_has_token("transfer-encoding", "chunked"));
        assert!(!fields.value_has_token("transfer-encoding", "br"));
    }
}
