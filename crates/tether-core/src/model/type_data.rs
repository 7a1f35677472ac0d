//! Module: model::type_data
//! Responsibility: normalized, comparable type descriptions.
//! Does not own: generic binding discovery (see `model::builder`).

use std::{collections::BTreeMap, fmt};

///
/// TypeData
///
/// A fully resolved type: raw type name plus resolved type arguments.
/// Equality is structural and recursive.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TypeData {
    raw: String,
    args: Vec<Self>,
}

impl TypeData {
    /// Raw name of ordered, duplicate-preserving collections.
    pub const LIST: &'static str = "List";
    /// Raw name of keyed collections; the last argument is the value type.
    pub const MAP: &'static str = "Map";
    /// Raw name of duplicate-free collections.
    pub const SET: &'static str = "Set";

    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args(raw: impl Into<String>, args: Vec<Self>) -> Self {
        Self {
            raw: raw.into(),
            args,
        }
    }

    #[must_use]
    pub fn list(element: Self) -> Self {
        Self::with_args(Self::LIST, vec![element])
    }

    #[must_use]
    pub fn set(element: Self) -> Self {
        Self::with_args(Self::SET, vec![element])
    }

    #[must_use]
    pub fn map(key: Self, value: Self) -> Self {
        Self::with_args(Self::MAP, vec![key, value])
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn args(&self) -> &[Self] {
        &self.args
    }

    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self.raw.as_str(), Self::LIST | Self::SET | Self::MAP)
    }

    /// The element type of a collection, or `self` for anything else.
    #[must_use]
    pub fn element(&self) -> &Self {
        if self.is_collection() {
            self.args.last().unwrap_or(self)
        } else {
            self
        }
    }
}

impl fmt::Display for TypeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)?;
        if !self.args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{arg}")?;
            }
            write!(f, ">")?;
        }

        Ok(())
    }
}

/// Type-variable name to bound type, for one declaring type.
pub type TypeBindings = BTreeMap<String, GenericType>;

///
/// GenericType
///
/// A declared type as written in a type descriptor, which may still
/// reference type variables of the declaring type.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum GenericType {
    Var(String),
    Type { raw: String, args: Vec<Self> },
}

impl GenericType {
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    #[must_use]
    pub fn named(raw: impl Into<String>) -> Self {
        Self::Type {
            raw: raw.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn apply(raw: impl Into<String>, args: Vec<Self>) -> Self {
        Self::Type {
            raw: raw.into(),
            args,
        }
    }

    #[must_use]
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Self::Var(name) => Some(name),
            Self::Type { .. } => None,
        }
    }

    /// True when no type variable appears anywhere in this type.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        match self {
            Self::Var(_) => false,
            Self::Type { args, .. } => args.iter().all(Self::is_concrete),
        }
    }

    /// Replace every bound variable; unbound variables are kept.
    #[must_use]
    pub fn substitute(&self, bindings: &TypeBindings) -> Self {
        match self {
            Self::Var(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            Self::Type { raw, args } => Self::Type {
                raw: raw.clone(),
                args: args.iter().map(|arg| arg.substitute(bindings)).collect(),
            },
        }
    }

    #[must_use]
    pub fn to_type_data(&self) -> Option<TypeData> {
        match self {
            Self::Var(_) => None,
            Self::Type { raw, args } => {
                let args = args
                    .iter()
                    .map(Self::to_type_data)
                    .collect::<Option<Vec<_>>>()?;

                Some(TypeData::with_args(raw.clone(), args))
            }
        }
    }
}

impl From<TypeData> for GenericType {
    fn from(value: TypeData) -> Self {
        Self::Type {
            raw: value.raw,
            args: value.args.into_iter().map(Self::from).collect(),
        }
    }
}

impl fmt::Display for GenericType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(name) => write!(f, "{name}"),
            Self::Type { raw, args } => {
                write!(f, "{raw}")?;
                if !args.is_empty() {
                    let rendered = args.iter().map(ToString::to_string).collect::<Vec<_>>();
                    write!(f, "<{}>", rendered.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

///
/// TESTS
///
