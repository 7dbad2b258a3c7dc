// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test identities and their on-disk encoding.

use crate::errors::{InvalidTestIdentity, InvalidTestIdentityReason};
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// Names that live directly inside the report root and must never be produced as a class
/// directory.
const RESERVED_SEGMENTS: &[&str] = &["index.html"];

/// The identity of a single test: a class name and a test name within that class.
///
/// Neither name may be empty or contain a newline. Identities are immutable once constructed.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TestIdentity {
    class_name: String,
    test_name: String,
}

impl TestIdentity {
    /// Creates a new `TestIdentity`, validating both names.
    pub fn new(
        class_name: impl Into<String>,
        test_name: impl Into<String>,
    ) -> Result<Self, InvalidTestIdentity> {
        let class_name = class_name.into();
        let test_name = test_name.into();

        let reason = if class_name.is_empty() {
            Some(InvalidTestIdentityReason::EmptyClassName)
        } else if test_name.is_empty() {
            Some(InvalidTestIdentityReason::EmptyTestName)
        } else if class_name.contains(['\n', '\r']) {
            Some(InvalidTestIdentityReason::NewlineInClassName)
        } else if test_name.contains(['\n', '\r']) {
            Some(InvalidTestIdentityReason::NewlineInTestName)
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InvalidTestIdentity::new(class_name, test_name, reason)),
            None => Ok(Self {
                class_name,
                test_name,
            }),
        }
    }

    /// Returns the class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the test name.
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Returns the encoded directory names for this identity: `(class segment, test segment)`.
    pub fn encode_segments(&self) -> (String, String) {
        (
            encode_segment(&self.class_name, RESERVED_SEGMENTS),
            encode_segment(&self.test_name, &[]),
        )
    }

    /// Decodes a pair of directory names produced by [`Self::encode_segments`].
    ///
    /// Returns `None` if either segment is not a canonical encoding of a valid name. Hashed
    /// segments (see [`Self::has_hashed_segment`]) never decode on their own: use
    /// [`Self::from_sidecar`].
    pub fn decode_segments(class_segment: &str, test_segment: &str) -> Option<Self> {
        let class_name = decode_segment(class_segment, RESERVED_SEGMENTS)?;
        let test_name = decode_segment(test_segment, &[])?;
        Self::new(class_name, test_name).ok()
    }

    /// Returns true if either name is too long to be stored as a path segment and is stored as a
    /// prefix plus a hash instead.
    ///
    /// Such identities are recovered from the contents of [`Self::sidecar_contents`].
    pub fn has_hashed_segment(&self) -> bool {
        escape_name(&self.class_name).len() > MAX_SEGMENT_LEN
            || escape_name(&self.test_name).len() > MAX_SEGMENT_LEN
    }

    /// Returns the full names in the form read by [`Self::from_sidecar`]: the class name and the
    /// test name on separate lines.
    pub fn sidecar_contents(&self) -> String {
        format!("{}\n{}\n", self.class_name, self.test_name)
    }

    /// Recovers an identity from sidecar contents written by [`Self::sidecar_contents`].
    ///
    /// Returns `None` unless the names are valid and encode to exactly the given segments.
    pub fn from_sidecar(contents: &str, class_segment: &str, test_segment: &str) -> Option<Self> {
        let mut lines = contents.strip_suffix('\n')?.split('\n');
        let class_name = lines.next()?;
        let test_name = lines.next()?;
        if lines.next().is_some() {
            return None;
        }
        let identity = Self::new(class_name, test_name).ok()?;
        let (expected_class, expected_test) = identity.encode_segments();
        (expected_class == class_segment && expected_test == test_segment).then_some(identity)
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class_name, self.test_name)
    }
}

/// The longest encoded segment stored as is. Common filesystems limit a path segment to 255
/// bytes.
const MAX_SEGMENT_LEN: usize = 200;

/// The byte budget for the readable prefix of a hashed segment.
const HASHED_PREFIX_LEN: usize = 120;

/// The escape that separates a hashed segment's prefix from its hash. It is never produced for
/// an ordinary character, so hashed segments don't decode.
const HASH_MARKER: &str = "_h";

/// Encodes a name into a single path segment.
///
/// Uses `_` as an escape character:
///
/// - `_` → `__`
/// - `/` → `_s`, `\` → `_b`, NUL → `_0`
/// - `:` → `_c`, `*` → `_a`, `"` → `_q`, `<` → `_l`, `>` → `_g`, `|` → `_p`, `?` → `_m`
/// - a leading `.` → `_d`, so that `.` and `..` never reach the filesystem
///
/// If the result would collide with one of `reserved`, its first `.` is escaped as `_d` too.
///
/// If the result is longer than [`MAX_SEGMENT_LEN`] bytes, it is replaced by the encoding of a
/// prefix of the name, then `_h`, then the xxh3 hash of the whole name in hex.
///
/// Examples:
///
/// - `com.example.FooTest` → `com.example.FooTest`
/// - `test_with_underscore` → `test__with__underscore`
/// - `[1] a/b` → `[1] a_sb`
/// - `..` → `_d.`
fn encode_segment(name: &str, reserved: &[&str]) -> String {
    let mut encoded = escape_name(name);

    if encoded.len() > MAX_SEGMENT_LEN {
        return hashed_segment(name);
    }

    if reserved.contains(&encoded.as_str()) {
        if let Some(pos) = encoded.find('.') {
            encoded.replace_range(pos..pos + 1, "_d");
        }
    }

    encoded
}

fn push_encoded(encoded: &mut String, idx: usize, ch: char) {
    match ch {
        '_' => encoded.push_str("__"),
        '/' => encoded.push_str("_s"),
        '\\' => encoded.push_str("_b"),
        '\0' => encoded.push_str("_0"),
        ':' => encoded.push_str("_c"),
        '*' => encoded.push_str("_a"),
        '"' => encoded.push_str("_q"),
        '<' => encoded.push_str("_l"),
        '>' => encoded.push_str("_g"),
        '|' => encoded.push_str("_p"),
        '?' => encoded.push_str("_m"),
        '.' if idx == 0 => encoded.push_str("_d"),
        _ => encoded.push(ch),
    }
}

fn escape_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len() * 2);
    for (idx, ch) in name.char_indices() {
        push_encoded(&mut encoded, idx, ch);
    }
    encoded
}

fn hashed_segment(name: &str) -> String {
    let mut prefix = String::with_capacity(HASHED_PREFIX_LEN);
    let mut scratch = String::new();
    for (idx, ch) in name.char_indices() {
        push_encoded(&mut scratch, idx, ch);
        // Whole escapes only, so the marker below is never mistaken for a `__` escape.
        if prefix.len() + scratch.len() > HASHED_PREFIX_LEN {
            break;
        }
        prefix.push_str(&scratch);
        scratch.clear();
    }
    let hash = xxh3_64(name.as_bytes());
    format!("{prefix}{HASH_MARKER}{hash:016x}")
}

/// Decodes a segment that was encoded with [`encode_segment`].
///
/// Returns `None` if the segment is malformed (an unknown escape such as `_x`, a trailing `_`),
/// is hashed, or is not the canonical encoding of the name it decodes to.
fn decode_segment(encoded: &str, reserved: &[&str]) -> Option<String> {
    let mut decoded = String::with_capacity(encoded.len());
    let mut chars = encoded.chars();

    while let Some(ch) = chars.next() {
        if ch == '_' {
            match chars.next() {
                Some('_') => decoded.push('_'),
                Some('s') => decoded.push('/'),
                Some('b') => decoded.push('\\'),
                Some('0') => decoded.push('\0'),
                Some('c') => decoded.push(':'),
                Some('a') => decoded.push('*'),
                Some('q') => decoded.push('"'),
                Some('l') => decoded.push('<'),
                Some('g') => decoded.push('>'),
                Some('p') => decoded.push('|'),
                Some('m') => decoded.push('?'),
                Some('d') => decoded.push('.'),
                _ => return None,
            }
        } else {
            decoded.push(ch);
        }
    }

    // Escapes like `_d` are only valid in specific positions, and long names must be hashed.
    // Rejecting anything that doesn't re-encode to the same string keeps the mapping one-to-one.
    (encode_segment(&decoded, reserved) == encoded).then_some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use test_strategy::proptest;

    #[test_case("com.example.FooTest", "com.example.FooTest" ; "plain")]
    #[test_case("test_with_underscore", "test__with__underscore" ; "underscore")]
    #[test_case("[1] a/b", "[1] a_sb" ; "slash")]
    #[test_case(r"C:\x", "C_c_bx" ; "windows path")]
    #[test_case("weird*name?", "weird_aname_m" ; "wildcards")]
    #[test_case(r#"<a|"b">"#, "_la_p_qb_q_g" ; "shell metacharacters")]
    #[test_case(".", "_d" ; "dot")]
    #[test_case("..", "_d." ; "dot dot")]
    #[test_case(".hidden.name", "_dhidden.name" ; "leading dot")]
    #[test_case("t\0x", "t_0x" ; "nul")]
    fn encode_test_segment(input: &str, expected: &str) {
        assert_eq!(encode_segment(input, &[]), expected);
        assert_eq!(decode_segment(expected, &[]).as_deref(), Some(input));
    }

    #[test]
    fn reserved_class_segment() {
        let id = TestIdentity::new("index.html", "t1").unwrap();
        let (class_segment, test_segment) = id.encode_segments();
        assert_eq!(class_segment, "index_dhtml");
        assert_eq!(test_segment, "t1");
        assert_eq!(
            TestIdentity::decode_segments(&class_segment, &test_segment),
            Some(id),
        );

        // The reserved name itself is never a valid class segment.
        assert_eq!(TestIdentity::decode_segments("index.html", "t1"), None);
    }

    #[test_case("foo_" ; "trailing escape")]
    #[test_case("foo_x" ; "unknown escape")]
    #[test_case("a_db" ; "non-leading dot escape")]
    #[test_case("." ; "bare dot")]
    #[test_case("" ; "empty")]
    fn decode_rejects_malformed(segment: &str) {
        assert_eq!(TestIdentity::decode_segments("a.Foo", segment), None);
    }

    #[test_case("", "t", InvalidTestIdentityReason::EmptyClassName ; "empty class")]
    #[test_case("A", "", InvalidTestIdentityReason::EmptyTestName ; "empty test")]
    #[test_case("A\nB", "t", InvalidTestIdentityReason::NewlineInClassName ; "newline in class")]
    #[test_case("A", "t\n1", InvalidTestIdentityReason::NewlineInTestName ; "newline in test")]
    #[test_case("A", "t\r", InvalidTestIdentityReason::NewlineInTestName ; "carriage return")]
    fn new_rejects(class_name: &str, test_name: &str, reason: InvalidTestIdentityReason) {
        let err = TestIdentity::new(class_name, test_name).unwrap_err();
        assert_eq!(err.reason(), reason);
    }

    #[test]
    fn long_names_are_hashed() {
        let long_name = format!("testParam[{}]", "x_".repeat(150));
        let id = TestIdentity::new("com.example.FooTest", long_name.as_str()).unwrap();
        assert!(id.has_hashed_segment());

        let (class_segment, test_segment) = id.encode_segments();
        assert_eq!(class_segment, "com.example.FooTest");
        assert!(test_segment.len() <= MAX_SEGMENT_LEN, "{test_segment}");
        assert!(test_segment.starts_with("testParam[x__x__"), "{test_segment}");
        assert!(test_segment.contains(HASH_MARKER), "{test_segment}");

        // Hashed segments only decode through the sidecar.
        assert_eq!(TestIdentity::decode_segments(&class_segment, &test_segment), None);
        assert_eq!(
            TestIdentity::from_sidecar(&id.sidecar_contents(), &class_segment, &test_segment),
            Some(id.clone()),
        );

        // A sidecar that doesn't match its directory is rejected.
        let other = TestIdentity::new("com.example.FooTest", format!("{long_name}y")).unwrap();
        assert_ne!(other.encode_segments().1, test_segment);
        assert_eq!(
            TestIdentity::from_sidecar(&other.sidecar_contents(), &class_segment, &test_segment),
            None,
        );
    }

    #[test]
    fn short_names_are_not_hashed() {
        let name = "y".repeat(MAX_SEGMENT_LEN);
        let id = TestIdentity::new("A", name.as_str()).unwrap();
        assert!(!id.has_hashed_segment());
        assert_eq!(id.encode_segments().1, name);

        // An unhashed segment over the limit isn't canonical.
        let too_long = "y".repeat(MAX_SEGMENT_LEN + 1);
        assert_eq!(TestIdentity::decode_segments("A", &too_long), None);
    }

    #[proptest]
    fn identity_round_trip(
        #[strategy("[^\r\n]{1,40}")] class_name: String,
        #[strategy("[^\r\n]{1,40}")] test_name: String,
    ) {
        let id = TestIdentity::new(class_name, test_name).unwrap();
        let (class_segment, test_segment) = id.encode_segments();
        assert!(!class_segment.contains(['/', '\\']));
        assert!(!test_segment.contains(['/', '\\']));
        assert_eq!(
            TestIdentity::decode_segments(&class_segment, &test_segment),
            Some(id)
        );
    }
}
