//! Column name encoding
//!
//! Column names are chosen by users and can contain anything: spaces,
//! operators, quotes. Scripts only ever see encoded identifiers of the form
//! `<prefix><n>_Encoded`, and every message coming back is decoded again.

use imstat_script::is_identifier_char;
use std::collections::{BTreeSet, HashMap};

/// Maps user-facing names to script identifiers and back
pub trait NameEncoder {
    /// Whether this encoder is responsible for `name`
    fn should_encode(&self, name: &str) -> bool;

    /// Whether `id` was produced by this encoder
    fn should_decode(&self, id: &str) -> bool;

    /// Encode `name`, registering it when it is new
    fn encode(&mut self, name: &str) -> String;

    /// Original name of `id`, or `id` itself when it is unknown
    fn decode(&self, id: &str) -> String;

    /// Every known `(original, encoded)` pair
    fn entries(&self) -> Vec<(String, String)>;
}

/// Encoder for dataset column names
#[derive(Debug, Clone)]
pub struct ColumnEncoder {
    prefix: String,
    to_encoded: HashMap<String, String>,
    to_original: HashMap<String, String>,
    order: Vec<String>,
}

impl ColumnEncoder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            to_encoded: HashMap::new(),
            to_original: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register `name` and return its identifier
    pub fn register(&mut self, name: &str) -> String {
        if let Some(id) = self.to_encoded.get(name) {
            return id.clone();
        }
        let id = format!("{}{}_Encoded", self.prefix, self.order.len());
        self.to_encoded.insert(name.to_string(), id.clone());
        self.to_original.insert(id.clone(), name.to_string());
        self.order.push(name.to_string());
        id
    }

    /// Encoded identifier of `name` without registering it
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.to_encoded.get(name).map(String::as_str)
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Registered identifiers in registration order
    pub fn encoded_names(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|n| self.to_encoded.get(n).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl NameEncoder for ColumnEncoder {
    fn should_encode(&self, _name: &str) -> bool {
        true
    }

    fn should_decode(&self, id: &str) -> bool {
        self.to_original.contains_key(id)
    }

    fn encode(&mut self, name: &str) -> String {
        self.register(name)
    }

    fn decode(&self, id: &str) -> String {
        self.to_original
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn entries(&self) -> Vec<(String, String)> {
        self.order
            .iter()
            .filter_map(|n| self.to_encoded.get(n).map(|id| (n.clone(), id.clone())))
            .collect()
    }
}

/// Column encoder plus an optional extra encoder that takes priority for
/// the names it claims
pub struct NameEncoding {
    columns: ColumnEncoder,
    extra: Option<Box<dyn NameEncoder>>,
}

impl NameEncoding {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            columns: ColumnEncoder::new(prefix),
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: Box<dyn NameEncoder>) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn set_extra(&mut self, extra: Option<Box<dyn NameEncoder>>) {
        self.extra = extra;
    }

    pub fn columns(&self) -> &ColumnEncoder {
        &self.columns
    }

    /// Register dataset column names so they are substituted in scripts
    pub fn register_all<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.encode(name);
        }
    }

    pub fn encode(&mut self, name: &str) -> String {
        if let Some(extra) = self.extra.as_mut() {
            if extra.should_encode(name) {
                return extra.encode(name);
            }
        }
        self.columns.register(name)
    }

    pub fn decode(&self, id: &str) -> String {
        if let Some(extra) = self.extra.as_ref() {
            if extra.should_decode(id) {
                return extra.decode(id);
            }
        }
        self.columns.decode(id)
    }

    pub fn should_decode(&self, id: &str) -> bool {
        self.columns.should_decode(id)
            || self.extra.as_ref().is_some_and(|e| e.should_decode(id))
    }

    /// Replace every known name in `text` by its identifier
    pub fn encode_all(&self, text: &str) -> String {
        let table = self.encode_table();
        let mut used = BTreeSet::new();
        substitute(text, &table, false, &mut used)
    }

    /// Replace every known identifier in `text` by its original name
    pub fn decode_all(&self, text: &str) -> String {
        let table: Vec<(String, String)> = self
            .encode_table()
            .into_iter()
            .map(|(name, id)| (id, name))
            .collect();
        let mut used = BTreeSet::new();
        substitute(text, &sort_longest_first(table), false, &mut used)
    }

    /// Encode a script, leaving string literals alone. Also returns the
    /// original names the script refers to.
    pub fn encode_script(&self, text: &str) -> (String, BTreeSet<String>) {
        let table = self.encode_table();
        let mut used = BTreeSet::new();
        let encoded = substitute(text, &table, true, &mut used);
        (encoded, used)
    }

    /// Merged `(original, encoded)` table, longest original first
    fn encode_table(&self) -> Vec<(String, String)> {
        let mut merged: HashMap<String, String> = self.columns.entries().into_iter().collect();
        if let Some(extra) = self.extra.as_ref() {
            merged.extend(extra.entries());
        }
        sort_longest_first(merged.into_iter().collect())
    }
}

impl std::fmt::Debug for NameEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameEncoding")
            .field("columns", &self.columns)
            .field("extra", &self.extra.is_some())
            .finish()
    }
}

fn sort_longest_first(mut table: Vec<(String, String)>) -> Vec<(String, String)> {
    table.retain(|(from, _)| !from.is_empty());
    table.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    table
}

/// Single left-to-right pass; replaced spans are never rescanned.
fn substitute(
    text: &str,
    table: &[(String, String)],
    skip_literals: bool,
    used: &mut BTreeSet<String>,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    let mut i = 0;

    'scan: while i < text.len() {
        let rest = &text[i..];

        if skip_literals {
            if let Some(len) = string_literal_len(rest) {
                out.push_str(&rest[..len]);
                prev = rest[..len].chars().next_back();
                i += len;
                continue;
            }
            if !prev.is_some_and(|c| is_identifier_char(c) || c == '`') {
                if let Some(len) = numeric_literal_len(rest) {
                    out.push_str(&rest[..len]);
                    prev = rest[..len].chars().next_back();
                    i += len;
                    continue;
                }
            }
        }

        for (from, to) in table {
            if rest.starts_with(from.as_str()) && at_boundary(from, prev, rest[from.len()..].chars().next()) {
                out.push_str(to);
                used.insert(from.clone());
                prev = from.chars().next_back();
                i += from.len();
                continue 'scan;
            }
        }

        let c = match rest.chars().next() {
            Some(c) => c,
            None => break,
        };
        out.push(c);
        prev = Some(c);
        i += c.len_utf8();
    }

    out
}

/// A key whose edge is an identifier character must not continue an
/// identifier on that side
fn at_boundary(key: &str, before: Option<char>, after: Option<char>) -> bool {
    let starts_ident = key.chars().next().is_some_and(is_identifier_char);
    let ends_ident = key.chars().next_back().is_some_and(is_identifier_char);

    !(starts_ident && before.is_some_and(is_identifier_char))
        && !(ends_ident && after.is_some_and(is_identifier_char))
}

/// Byte length of the number literal at the start of `text`, such as
/// `12`, `.5`, `1e-3` or `3L`
fn numeric_literal_len(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let starts_number = match bytes {
        [b'0'..=b'9', ..] => true,
        [b'.', b'0'..=b'9', ..] => true,
        _ => false,
    };
    if !starts_number {
        return None;
    }

    let mut len = 0;
    loop {
        len += text[len..]
            .chars()
            .take_while(|c| is_identifier_char(*c))
            .map(char::len_utf8)
            .sum::<usize>();
        match (bytes.get(len - 1), bytes.get(len), bytes.get(len + 1)) {
            (Some(b'e' | b'E'), Some(b'+' | b'-'), Some(b'0'..=b'9')) => len += 1,
            _ => return Some(len),
        }
    }
}

/// Byte length of the quoted literal at the start of `text`
fn string_literal_len(text: &str) -> Option<usize> {
    let quote = text.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let mut escaped = false;
    for (i, c) in text.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(i + c.len_utf8());
        }
    }
    Some(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn encoding(names: &[&str]) -> NameEncoding {
        let mut enc = NameEncoding::new("imstatColumn_");
        enc.register_all(names.iter().copied());
        enc
    }

    #[test]
    fn test_encode_is_stable_and_lazy() {
        let mut enc = ColumnEncoder::new("imstatColumn_");
        assert!(enc.is_empty());
        assert_eq!(enc.encode("age"), "imstatColumn_0_Encoded");
        assert_eq!(enc.encode("weight (kg)"), "imstatColumn_1_Encoded");
        assert_eq!(enc.encode("age"), "imstatColumn_0_Encoded");
        assert_eq!(enc.len(), 2);
        assert_eq!(enc.lookup("height"), None);
    }

    #[test]
    fn test_decode_unknown_passes_through() {
        let mut enc = ColumnEncoder::new("imstatColumn_");
        let id = enc.encode("age");
        assert_eq!(enc.decode(&id), "age");
        assert!(enc.should_decode(&id));
        assert!(!enc.should_decode("imstatColumn_7_Encoded"));
        assert_eq!(enc.decode("imstatColumn_7_Encoded"), "imstatColumn_7_Encoded");
    }

    #[test]
    fn test_numbers_are_not_column_names() {
        let enc = encoding(&["x", "1", "2e"]);
        let (script, used) = enc.encode_script("x > 1 & x < 1e-1 & x != 2e+1");
        assert_eq!(
            script,
            "imstatColumn_0_Encoded > 1 & imstatColumn_0_Encoded < 1e-1 & imstatColumn_0_Encoded != 2e+1"
        );
        assert_eq!(used.into_iter().collect::<Vec<_>>(), vec!["x".to_string()]);

        let (script, used) = enc.encode_script("`1` > 0");
        assert_eq!(script, "`imstatColumn_1_Encoded` > 0");
        assert!(used.contains("1"));
    }

    #[test]
    fn test_listing_follows_registration_order() {
        let enc = encoding(&["b", "a"]);
        assert_eq!(enc.columns().names(), vec!["b", "a"]);
        assert_eq!(
            enc.columns().encoded_names(),
            vec!["imstatColumn_0_Encoded", "imstatColumn_1_Encoded"]
        );
    }

    #[rstest]
    #[case("age > 30", "imstatColumn_0_Encoded > 30")]
    #[case("age2 > 30", "age2 > 30")]
    #[case("my.age > 30", "my.age > 30")]
    #[case("age+age", "imstatColumn_0_Encoded+imstatColumn_0_Encoded")]
    #[case("`age` == 1", "`imstatColumn_0_Encoded` == 1")]
    fn test_encode_all_respects_identifier_boundaries(#[case] input: &str, #[case] expected: &str) {
        let enc = encoding(&["age"]);
        assert_eq!(enc.encode_all(input), expected);
    }

    #[test]
    fn test_longest_name_wins() {
        let enc = encoding(&["a", "a b"]);
        assert_eq!(
            enc.encode_all("a b + a"),
            "imstatColumn_1_Encoded + imstatColumn_0_Encoded"
        );
    }

    #[test]
    fn test_substituted_span_is_not_rescanned() {
        // The identifier of the first name contains the second name.
        let enc = encoding(&["x", "Encoded"]);
        let encoded = enc.encode_all("x");
        assert_eq!(encoded, "imstatColumn_0_Encoded");
        assert_eq!(enc.decode_all(&encoded), "x");
    }

    #[test]
    fn test_decode_all_restores_names() {
        let enc = encoding(&["weight (kg)", "group"]);
        let message = "Object not found: imstatColumn_1_Encoded, imstatColumn_0_Encoded";
        assert_eq!(
            enc.decode_all(message),
            "Object not found: group, weight (kg)"
        );
    }

    #[test]
    fn test_names_with_operators() {
        let enc = encoding(&["weight (kg)"]);
        let script = "weight (kg) > 80";
        let encoded = enc.encode_all(script);
        assert_eq!(encoded, "imstatColumn_0_Encoded > 80");
        assert_eq!(enc.decode_all(&encoded), script);
    }

    #[test]
    fn test_encode_script_skips_literals_and_reports_usage() {
        let enc = encoding(&["group", "age", "unused"]);
        let (encoded, used) = enc.encode_script(r#"group == "group" & age > 1 & group != 'a\'group'"#);
        assert_eq!(
            encoded,
            r#"imstatColumn_0_Encoded == "group" & imstatColumn_1_Encoded > 1 & imstatColumn_0_Encoded != 'a\'group'"#
        );
        let used: Vec<_> = used.into_iter().collect();
        assert_eq!(used, vec!["age", "group"]);
    }

    #[test]
    fn test_unterminated_literal_is_left_alone() {
        let enc = encoding(&["age"]);
        let (encoded, used) = enc.encode_script("age == \"age");
        assert_eq!(encoded, "imstatColumn_0_Encoded == \"age");
        assert_eq!(used.len(), 1);
    }

    struct Options;

    impl NameEncoder for Options {
        fn should_encode(&self, name: &str) -> bool {
            name.starts_with("option:")
        }

        fn should_decode(&self, id: &str) -> bool {
            id.starts_with("opt_")
        }

        fn encode(&mut self, name: &str) -> String {
            format!("opt_{}", &name["option:".len()..])
        }

        fn decode(&self, id: &str) -> String {
            format!("option:{}", &id["opt_".len()..])
        }

        fn entries(&self) -> Vec<(String, String)> {
            vec![("option:alpha".to_string(), "opt_alpha".to_string())]
        }
    }

    #[test]
    fn test_extra_encoder_takes_priority() {
        let mut enc = NameEncoding::new("imstatColumn_").with_extra(Box::new(Options));
        assert_eq!(enc.encode("option:alpha"), "opt_alpha");
        assert_eq!(enc.encode("age"), "imstatColumn_0_Encoded");
        assert_eq!(enc.decode("opt_alpha"), "option:alpha");
        assert_eq!(enc.decode("imstatColumn_0_Encoded"), "age");
        assert!(enc.should_decode("opt_beta"));
        assert!(enc.columns().lookup("option:alpha").is_none());

        assert_eq!(
            enc.encode_all("age * option:alpha"),
            "imstatColumn_0_Encoded * opt_alpha"
        );
        assert_eq!(
            enc.decode_all("imstatColumn_0_Encoded * opt_alpha"),
            "age * option:alpha"
        );
    }
}
