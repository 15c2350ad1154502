//! Key/value annotations attached to errors.
//!
//! An annotation set is attached with [`Error::with_context`] and becomes one
//! layer of the error chain. [`extract_context`] later walks the chain from
//! the outermost layer to the root and merges every set it finds:
//!
//! - the outermost occurrence of a key wins over the ones further in,
//! - within one set, the last pair for a key wins,
//! - keys keep the position at which they were first seen.
//!
//! ```
//! use faultline::{Error, extract_context};
//!
//! let error = Error::msg("error")
//!     .with_context([("a", "1")])
//!     .with_context([("a", "2"), ("b", "3")]);
//!
//! let merged = extract_context(&error).to_map();
//! assert_eq!(merged.len(), 2);
//! assert_eq!(merged["a"].to_string(), "2");
//! assert_eq!(merged["b"].to_string(), "3");
//! ```

use std::{borrow::Cow, fmt};

use indexmap::IndexMap;

use crate::Error;

/// The key of an annotation.
pub type Key = Cow<'static, str>;

/// The value of an annotation.
///
/// Values are text-like scalars. Conversions exist from strings, integers,
/// floats, `bool` and `char`, so most call sites never name this type.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A string value.
    Str(Cow<'static, str>),
    /// A signed integer value.
    Int(i64),
    /// An unsigned integer value.
    Uint(u64),
    /// A floating point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
}

impl Value {
    /// Returns the value as a string slice if it is a [`Value::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(value) => f.write_str(value),
            Value::Int(value) => fmt::Display::fmt(value, f),
            Value::Uint(value) => fmt::Display::fmt(value, f),
            Value::Float(value) => fmt::Display::fmt(value, f),
            Value::Bool(value) => fmt::Display::fmt(value, f),
        }
    }
}

impl From<&'static str> for Value {
    fn from(value: &'static str) -> Self {
        Value::Str(Cow::Borrowed(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Cow::Owned(value))
    }
}

impl From<Cow<'static, str>> for Value {
    fn from(value: Cow<'static, str>) -> Self {
        Value::Str(value)
    }
}

impl From<char> for Value {
    fn from(value: char) -> Self {
        Value::Str(Cow::Owned(value.to_string()))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

macro_rules! value_from {
    ($variant:ident($repr:ty): $($from:ty),+) => {
        $(
            impl From<$from> for Value {
                fn from(value: $from) -> Self {
                    Value::$variant(<$repr>::from(value))
                }
            }
        )+
    };
}

value_from!(Int(i64): i8, i16, i32, i64);
value_from!(Uint(u64): u8, u16, u32, u64);
value_from!(Float(f64): f32, f64);

impl From<isize> for Value {
    fn from(value: isize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Uint(value as u64)
    }
}

/// An ordered sequence of key/value annotations.
///
/// As attached to a single layer, a [`Context`] holds the pairs exactly as
/// they were given. The result of [`extract_context`] is already merged and
/// holds every key at most once.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Context {
    pairs: Vec<(Key, Value)>,
}

impl Context {
    /// Creates an empty set.
    pub const fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Appends a pair.
    pub fn push<K, V>(&mut self, key: K, value: V)
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        self.pairs.push((key.into(), value.into()));
    }

    /// Appends a pair, builder style.
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        self.push(key, value);
        self
    }

    /// Returns the number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates over the pairs in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &Value)> {
        self.pairs.iter().map(|(key, value)| (&**key, value))
    }

    /// Iterates over the keys in order.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &str> {
        self.pairs.iter().map(|(key, _)| &**key)
    }

    /// Returns the value of the last pair with the given key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.pairs
            .iter()
            .rev()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value)
    }

    /// Converts the set into a flat mapping.
    ///
    /// A key occurring several times keeps its first position and its last
    /// value.
    pub fn to_map(&self) -> IndexMap<Key, Value> {
        let mut map = IndexMap::with_capacity(self.pairs.len());
        for (key, value) in &self.pairs {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

impl<K, V> FromIterator<(K, V)> for Context
where
    K: Into<Key>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = Context::new();
        context.extend(iter);
        context
    }
}

impl<K, V> Extend<(K, V)> for Context
where
    K: Into<Key>,
    V: Into<Value>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.pairs.extend(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into())),
        );
    }
}

impl IntoIterator for Context {
    type Item = (Key, Value);
    type IntoIter = std::vec::IntoIter<(Key, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

impl From<IndexMap<Key, Value>> for Context {
    fn from(map: IndexMap<Key, Value>) -> Self {
        Self {
            pairs: map.into_iter().collect(),
        }
    }
}

/// Merges the annotations of every layer of `error`.
///
/// Layers are visited from the outermost to the root. The outermost
/// occurrence of a key wins and keys keep the order in which they were first
/// seen. An error without annotations yields an empty [`Context`]. The chain
/// is never modified, so calling this repeatedly returns the same result.
pub fn extract_context(error: &Error) -> Context {
    let mut merged: IndexMap<Key, Value> = IndexMap::new();
    for set in error.layers().filter_map(Error::own_context) {
        for (key, value) in set.to_map() {
            merged.entry(key).or_insert(value);
        }
    }
    Context::from(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(context: &Context) -> Vec<(String, String)> {
        context
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_unannotated_error_yields_empty_context() {
        let context = extract_context(&Error::msg("plain").wrap("outer").with_stack_trace());
        assert!(context.is_empty());
        assert_eq!(context, Context::default());
    }

    #[test]
    fn test_outermost_wins_in_first_seen_order() {
        let error = Error::msg("error")
            .with_context([("a", "1")])
            .with_context([("a", "2"), ("b", "3")]);
        assert_eq!(
            rendered(&error.context()),
            [
                ("a".to_string(), "2".to_string()),
                ("b".to_string(), "3".to_string())
            ]
        );
    }

    #[test]
    fn test_inner_only_keys_follow_outer_keys() {
        let error = Error::msg("error")
            .with_context([("inner", 1), ("shared", 1)])
            .wrap("middle")
            .with_context([("shared", 2), ("outer", 2)]);
        let context = error.context();
        assert_eq!(context.keys().collect::<Vec<_>>(), ["shared", "outer", "inner"]);
        assert_eq!(context.get("shared"), Some(&Value::Int(2)));
        assert_eq!(context.get("inner"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_last_pair_wins_within_one_set() {
        let error = Error::msg("error").with_context([("k", "first"), ("other", "x"), ("k", "last")]);
        let context = error.context();
        assert_eq!(context.keys().collect::<Vec<_>>(), ["k", "other"]);
        assert_eq!(context.get("k").and_then(Value::as_str), Some("last"));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let error = Error::msg("error").with_context(context! { "a" => 1, "b" => true });
        assert_eq!(error.context(), error.context());
        assert_eq!(error.own_context().map(Context::len), Some(2));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(-3i8), Value::Int(-3));
        assert_eq!(Value::from(3usize), Value::Uint(3));
        assert_eq!(Value::from(1.5f32), Value::Float(1.5));
        assert_eq!(Value::from('x').to_string(), "x");
        assert_eq!(Value::from(String::from("owned")).as_str(), Some("owned"));
        assert_eq!(Value::from(false).to_string(), "false");
    }
}
