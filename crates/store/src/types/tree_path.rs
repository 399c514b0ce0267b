//! Materialized paths.
//!
//! A [`TreePath`] has two spellings:
//!
//! - the user form, slash-delimited and rooted: `/docs/report v2.pdf`
//! - the stored form, dot-delimited labels: `docs.report~20v2~2epdf`
//!
//! Labels only ever contain ASCII alphanumerics, `_` and `~` escapes, so the
//! stored form can be compared with plain string operations in SQL. Every
//! byte of a segment that is not alphanumeric or `_` is written as `~`
//! followed by two lowercase hex digits. The root is the empty label
//! sequence, spelled `/` and `` respectively.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Sqlite, Type};

const USER_SEPARATOR: char = '/';
const LABEL_SEPARATOR: char = '.';
const ESCAPE: char = '~';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path must begin with '/': {0:?}")]
    NotAbsolute(String),

    #[error("path contains an empty segment: {0:?}")]
    EmptySegment(String),

    #[error("invalid stored label {label:?}: {reason}")]
    InvalidLabel { label: String, reason: &'static str },
}

/// A hierarchical label: a possibly empty sequence of segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TreePath {
    encoded: String,
}

impl TreePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse the user form. A single trailing slash is tolerated.
    pub fn parse(user: &str) -> Result<Self, PathError> {
        let rest = user
            .strip_prefix(USER_SEPARATOR)
            .ok_or_else(|| PathError::NotAbsolute(user.to_string()))?;
        let rest = rest.strip_suffix(USER_SEPARATOR).unwrap_or(rest);
        if rest.is_empty() {
            return Ok(Self::root());
        }

        let mut labels = Vec::new();
        for segment in rest.split(USER_SEPARATOR) {
            if segment.is_empty() {
                return Err(PathError::EmptySegment(user.to_string()));
            }
            labels.push(encode_label(segment));
        }
        Ok(Self {
            encoded: labels.join("."),
        })
    }

    /// Accept an already encoded path, validating every label.
    pub fn from_encoded(encoded: &str) -> Result<Self, PathError> {
        if !encoded.is_empty() {
            for label in encoded.split(LABEL_SEPARATOR) {
                decode_label(label)?;
            }
        }
        Ok(Self {
            encoded: encoded.to_string(),
        })
    }

    pub fn as_encoded(&self) -> &str {
        &self.encoded
    }

    pub fn is_root(&self) -> bool {
        self.encoded.is_empty()
    }

    /// Number of labels; zero for the root.
    pub fn depth(&self) -> usize {
        self.labels().count()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.encoded
            .split(LABEL_SEPARATOR)
            .filter(|label| !label.is_empty())
    }

    /// `None` for the root.
    pub fn parent(&self) -> Option<TreePath> {
        if self.is_root() {
            return None;
        }
        let parent = match self.encoded.rfind(LABEL_SEPARATOR) {
            Some(idx) => self.encoded[..idx].to_string(),
            None => String::new(),
        };
        Some(Self { encoded: parent })
    }

    /// Decoded name of the last segment, `None` for the root.
    pub fn name(&self) -> Option<String> {
        self.labels()
            .last()
            .map(|label| decode_label(label).unwrap_or_else(|_| label.to_string()))
    }

    pub fn child(&self, name: &str) -> Result<TreePath, PathError> {
        if name.is_empty() {
            return Err(PathError::EmptySegment(name.to_string()));
        }
        Ok(self.join_encoded(&encode_label(name)))
    }

    /// Inclusive: every path is an ancestor of itself.
    pub fn is_ancestor_of(&self, other: &TreePath) -> bool {
        if self.is_root() || self.encoded == other.encoded {
            return true;
        }
        other
            .encoded
            .strip_prefix(self.encoded.as_str())
            .is_some_and(|rest| rest.starts_with(LABEL_SEPARATOR))
    }

    /// Replace the `from` prefix of this path with `onto`, keeping the
    /// remaining labels. `None` if `from` is not an ancestor.
    pub fn rebase(&self, from: &TreePath, onto: &TreePath) -> Option<TreePath> {
        if !from.is_ancestor_of(self) {
            return None;
        }
        let suffix = self.labels().skip(from.depth()).collect::<Vec<_>>();
        let mut rebased = onto.clone();
        for label in suffix {
            rebased = rebased.join_encoded(label);
        }
        Some(rebased)
    }

    fn join_encoded(&self, label: &str) -> TreePath {
        if self.is_root() {
            Self {
                encoded: label.to_string(),
            }
        } else {
            Self {
                encoded: format!("{}{}{}", self.encoded, LABEL_SEPARATOR, label),
            }
        }
    }
}

fn encode_label(segment: &str) -> String {
    let mut label = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' {
            label.push(byte as char);
        } else {
            label.push(ESCAPE);
            label.push_str(&format!("{:02x}", byte));
        }
    }
    label
}

fn decode_label(label: &str) -> Result<String, PathError> {
    let invalid = |reason| PathError::InvalidLabel {
        label: label.to_string(),
        reason,
    };
    if label.is_empty() {
        return Err(invalid("empty label"));
    }

    let bytes = label.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == ESCAPE as u8 {
            let hex = label
                .get(i + 1..i + 3)
                .ok_or_else(|| invalid("truncated escape"))?;
            if hex.bytes().any(|h| h.is_ascii_uppercase()) {
                return Err(invalid("escape must be lowercase hex"));
            }
            let value = u8::from_str_radix(hex, 16).map_err(|_| invalid("bad escape"))?;
            if value.is_ascii_alphanumeric() || value == b'_' {
                return Err(invalid("escaped a plain character"));
            }
            decoded.push(value);
            i += 3;
        } else if b.is_ascii_alphanumeric() || b == b'_' {
            decoded.push(b);
            i += 1;
        } else {
            return Err(invalid("illegal character"));
        }
    }
    String::from_utf8(decoded).map_err(|_| invalid("escapes are not valid UTF-8"))
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for label in self.labels() {
            let segment = decode_label(label).unwrap_or_else(|_| label.to_string());
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for TreePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TreePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TreePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TreePath::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl Decode<'_, Sqlite> for TreePath {
    fn decode(value: SqliteValueRef<'_>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Sqlite>>::decode(value)?;
        Ok(TreePath::from_encoded(&s)?)
    }
}

impl Encode<'_, Sqlite> for TreePath {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'_>>,
    ) -> Result<IsNull, BoxDynError> {
        args.push(SqliteArgumentValue::Text(self.encoded.clone().into()));
        Ok(IsNull::No)
    }
}

impl Type<Sqlite> for TreePath {
    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }

    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}
