use once_cell::sync::Lazy;
use regex::Regex;

/// Keys start with a letter, then 1..=15 of `A-Z a-z 0-9 _ /`.
/// The length cap keeps garbage fragments of a torn line out of the store.
static KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_/]{1,15}$").expect("static key pattern"));
static VALUE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+").expect("static value pattern"));

/// Ordered key/value fields of one device line.
///
/// Field order is preserved because it decides first-seen order when several
/// new keys arrive in the same line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KvRecord {
    fields: Vec<(String, i64)>,
}
impl KvRecord {
    pub fn new() -> Self {
        Self::default()
    }
    /// Repeated keys keep their first position and take the latest value.
    pub fn insert(&mut self, key: impl Into<String>, value: i64) {
        let key = key.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
    }
    pub fn get(&self, key: &str) -> Option<i64> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }
    pub fn len(&self) -> usize {
        self.fields.len()
    }
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
impl<K: Into<String>> FromIterator<(K, i64)> for KvRecord {
    fn from_iter<T: IntoIterator<Item = (K, i64)>>(iter: T) -> Self {
        let mut record = KvRecord::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

/// Example line shown in the Help window.
pub const FORMAT_EXAMPLE: &str = "state:5,CHG:4179mv,T1:2296mv,T2:1589mv,Q6:2111mv,Q2/Q3:21mv";

/// Device-side log format, as shown in the Help window.
pub const FORMAT_HELP: &str = "\
Each log line is ONE sample and ends with CRLF (\\r\\n).

  key:value,key:value,key:value,...

Rules:
- fields are separated by ',' and key/value by ':'
- spaces are ignored, field order does not matter
- a key starts with a letter, then 1 to 15 of A-Z a-z 0-9 _ /
- the value is the first integer in the field, so units like 4179mv are fine
- tokens that break these rules are skipped, the rest of the line still counts
- at most 16 channels; later new keys are dropped and reported
- timestamps come from the PC when the line is received

Firmware example (C):
  printf(\"state:%d,CHG:%dmv,T1:%dmv\\r\\n\", state, chg_mv, t1_mv);";

/// Parses `key:value,key:value,...` into integer fields.
///
/// `"state:5,CHG:4181mv,Q2/Q3:  21mv,"` gives `state=5, CHG=4181, Q2/Q3=21`.
/// Bad tokens are skipped one by one; they never invalidate the rest of the line.
pub fn parse_kv_line(line: &str) -> KvRecord {
    let mut record = KvRecord::new();
    for token in line.trim().split(',') {
        let token = token.trim();
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if !KEY_PATTERN.is_match(key) {
            continue;
        }
        let Some(digits) = VALUE_PATTERN.find(value.trim()) else {
            continue;
        };
        if let Ok(parsed) = digits.as_str().parse::<i64>() {
            record.insert(key, parsed);
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn parses_mcu_line_with_units() {
        let record = parse_kv_line("state:5,CHG:4181mv,T1:2299mv,Q2/Q3:  21mv,\r");
        let fields: Vec<_> = record.iter().collect();
        assert_eq!(
            fields,
            vec![("state", 5), ("CHG", 4181), ("T1", 2299), ("Q2/Q3", 21)]
        );
    }
    #[test]
    fn skips_bad_tokens_but_keeps_the_rest() {
        let record = parse_kv_line("1abc:3, x:4,novalue, T2:mv, toolongkey_abcdefgh:1, ok:7");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("ok"), Some(7));
    }
    #[test]
    fn negative_numbers_are_kept_for_the_store_to_judge() {
        let record = parse_kv_line("temp:-12C");
        assert_eq!(record.get("temp"), Some(-12));
    }
    #[test]
    fn duplicate_keys_keep_first_position() {
        let record = parse_kv_line("aa:1,bb:2,aa:3");
        let fields: Vec<_> = record.iter().collect();
        assert_eq!(fields, vec![("aa", 3), ("bb", 2)]);
    }
    #[test]
    fn help_example_parses_fully() {
        let record = parse_kv_line(FORMAT_EXAMPLE);
        assert_eq!(record.len(), 6);
        assert_eq!(record.get("CHG"), Some(4179));
        assert_eq!(record.get("Q2/Q3"), Some(21));
        assert!(FORMAT_HELP.contains("key:value"));
    }
    #[test]
    fn empty_and_garbage_lines() {
        assert!(parse_kv_line("").is_empty());
        assert!(parse_kv_line(",,,").is_empty());
        assert!(parse_kv_line("boot ok").is_empty());
    }
}
