//! Call Arguments
//!
//! Cells may take arguments. Every distinct argument tuple gets its own cache
//! and override slot, so arguments are normalized into an [`ArgKey`]:
//! positional arguments in call order, then named arguments sorted by name.
//!
//! Only structurally hashable values can be part of a key. Scalars, strings
//! and tuples of those qualify; lists and maps are rejected with
//! [`Error::InvalidArguments`].

use std::fmt;

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::value::Value;

/// Arguments passed to a cell call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: SmallVec<[Value; 2]>,
    named: Vec<(String, Value)>,
}

impl Args {
    /// No arguments.
    pub fn none() -> Self {
        Self::default()
    }

    /// Positional arguments from an iterator.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            named: Vec::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a named argument, replacing an earlier one with the same name.
    pub fn named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.named.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.named.push((name, value)),
        }
        self
    }

    /// Positional argument at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Named argument `name`.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.named
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Total number of arguments, positional and named.
    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize into a cache key.
    pub fn key(&self) -> Result<ArgKey> {
        let mut parts = SmallVec::with_capacity(self.len());
        for (index, value) in self.positional.iter().enumerate() {
            let atom = KeyAtom::from_value(value)
                .map_err(|kind| invalid(&format!("positional argument {index}"), kind))?;
            parts.push((None, atom));
        }

        let mut named: Vec<_> = self.named.iter().collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in named {
            let atom = KeyAtom::from_value(value)
                .map_err(|kind| invalid(&format!("argument `{name}`"), kind))?;
            parts.push((Some(name.clone()), atom));
        }

        Ok(ArgKey(parts))
    }
}

fn invalid(what: &str, kind: &'static str) -> Error {
    Error::InvalidArguments {
        reason: format!("{what} is a {kind}, which is not hashable"),
    }
}

/// Normalized, hashable form of an argument tuple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ArgKey(SmallVec<[(Option<String>, KeyAtom); 2]>);

impl ArgKey {
    /// Key of a call without arguments.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for ArgKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (name, atom)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if let Some(name) = name {
                write!(f, "{name}=")?;
            }
            write!(f, "{atom}")?;
        }
        write!(f, ")")
    }
}

/// A hashable argument value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyAtom {
    Null,
    Bool(bool),
    Int(i64),
    /// Bit pattern with `-0.0` folded into `0.0` and every NaN canonical.
    Float(u64),
    Str(String),
    Tuple(Vec<KeyAtom>),
}

impl KeyAtom {
    /// Convert, or report the kind of the offending value.
    fn from_value(value: &Value) -> std::result::Result<Self, &'static str> {
        Ok(match value {
            Value::Null => KeyAtom::Null,
            Value::Bool(v) => KeyAtom::Bool(*v),
            Value::Int(v) => KeyAtom::Int(*v),
            Value::Float(v) => KeyAtom::Float(float_bits(*v)),
            Value::Str(v) => KeyAtom::Str(v.clone()),
            Value::Tuple(items) => KeyAtom::Tuple(
                items
                    .iter()
                    .map(KeyAtom::from_value)
                    .collect::<std::result::Result<_, _>>()?,
            ),
            Value::List(_) | Value::Map(_) => return Err(value.kind()),
        })
    }
}

fn float_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

impl fmt::Display for KeyAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAtom::Null => write!(f, "null"),
            KeyAtom::Bool(v) => write!(f, "{v}"),
            KeyAtom::Int(v) => write!(f, "{v}"),
            KeyAtom::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            KeyAtom::Str(v) => write!(f, "{v:?}"),
            KeyAtom::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}
