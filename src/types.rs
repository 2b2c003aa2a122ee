//! Normalized type graph handed to downstream emitters.

use crate::annotations::Annotations;
use crate::tags::Tags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Go primitive types a field or parameter can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Builtin {
    String,
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Complex64,
    Complex128,
}

impl Builtin {
    /// Predeclared identifier to builtin; `byte` and `rune` are aliases.
    pub fn from_ident(name: &str) -> Option<Self> {
        Some(match name {
            "string" => Self::String,
            "bool" => Self::Bool,
            "int" => Self::Int,
            "int8" => Self::Int8,
            "int16" => Self::Int16,
            "int32" | "rune" => Self::Int32,
            "int64" => Self::Int64,
            "uint" => Self::Uint,
            "uint8" | "byte" => Self::Uint8,
            "uint16" => Self::Uint16,
            "uint32" => Self::Uint32,
            "uint64" => Self::Uint64,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "complex64" => Self::Complex64,
            "complex128" => Self::Complex128,
            _ => return None,
        })
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint => "uint",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Types with dedicated handling downstream; never descended into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WellKnown {
    Context,
    Empty,
    Error,
    RawMessage,
    JsonObject,
    JsonArray,
    JsonDate,
    JsonTime,
    Time,
    StdRawMessage,
    /// `interface{}` and `any`.
    Any,
}

impl WellKnown {
    pub const ALL: [WellKnown; 11] = [
        Self::Context,
        Self::Empty,
        Self::Error,
        Self::RawMessage,
        Self::JsonObject,
        Self::JsonArray,
        Self::JsonDate,
        Self::JsonTime,
        Self::Time,
        Self::StdRawMessage,
        Self::Any,
    ];
}

/// A resolved type.
///
/// Struct references go through the struct cache by canonical key, so the
/// graph stays acyclic in memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Type {
    Builtin { name: Builtin },
    Struct { key: String },
    Pointer { elem: Box<Type> },
    Array { elem: Box<Type> },
    Map { key: Builtin, value: Box<Type> },
    WellKnown { name: WellKnown },
}

impl Type {
    pub fn builtin(name: Builtin) -> Self {
        Self::Builtin { name }
    }

    pub fn well_known(name: WellKnown) -> Self {
        Self::WellKnown { name }
    }

    pub fn struct_ref(key: impl Into<String>) -> Self {
        Self::Struct { key: key.into() }
    }

    pub fn pointer(elem: Type) -> Self {
        Self::Pointer {
            elem: Box::new(elem),
        }
    }

    pub fn array(elem: Type) -> Self {
        Self::Array {
            elem: Box::new(elem),
        }
    }

    pub fn is_well_known(&self, wk: WellKnown) -> bool {
        matches!(self, Self::WellKnown { name } if *name == wk)
    }

    /// Key of a `Struct` or `*Struct`; what a carried value must be.
    pub fn carried_struct(&self) -> Option<&str> {
        match self {
            Self::Struct { key } => Some(key),
            Self::Pointer { elem } => match elem.as_ref() {
                Self::Struct { key } => Some(key),
                _ => None,
            },
            _ => None,
        }
    }

    /// Calls `f` with every struct key mentioned anywhere in this type.
    pub fn for_each_struct<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Self::Struct { key } => f(key),
            Self::Pointer { elem } | Self::Array { elem } => elem.for_each_struct(f),
            Self::Map { value, .. } => value.for_each_struct(f),
            Self::Builtin { .. } | Self::WellKnown { .. } => {}
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin { name } => write!(f, "{name}"),
            Self::Struct { key } => f.write_str(key),
            Self::Pointer { elem } => write!(f, "*{elem}"),
            Self::Array { elem } => write!(f, "[]{elem}"),
            Self::Map { key, value } => write!(f, "map[{key}]{value}"),
            Self::WellKnown { name } => write!(f, "{name:?}"),
        }
    }
}

/// A resolved struct declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Struct {
    /// Import path of the declaring package.
    pub package: String,
    pub name: String,
    pub fields: Vec<Field>,
    pub annotations: Annotations,
    pub exported: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
}

impl Struct {
    /// `"<package-path>.<name>"`
    pub fn key(&self) -> String {
        canonical_key(&self.package, &self.name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

pub fn canonical_key(package: &str, name: &str) -> String {
    format!("{package}.{name}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    /// Tag name when set, otherwise the Go name.
    pub json_name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    pub tags: Tags,
    pub annotations: Annotations,
    pub exported: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
}

/// Go's export rule: the name starts with an upper-case letter.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}
