//! Syntactic forms of Zed types and ZSON literal values.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Type {
    #[serde(rename = "TypePrimitive")]
    Primitive { name: String },
    #[serde(rename = "TypeRecord")]
    Record { fields: Vec<TypeField> },
    #[serde(rename = "TypeArray")]
    Array { ty: Box<Type> },
    #[serde(rename = "TypeSet")]
    Set { ty: Box<Type> },
    #[serde(rename = "TypeMap")]
    Map { key: Box<Type>, val: Box<Type> },
    #[serde(rename = "TypeUnion")]
    Union { types: Vec<Type> },
    #[serde(rename = "TypeEnum")]
    Enum { symbols: Vec<String> },
    #[serde(rename = "TypeError")]
    Error { ty: Box<Type> },
    /// A reference to a previously defined named type.
    #[serde(rename = "TypeName")]
    Name { name: String },
    /// `name=type`: defines `name` and evaluates to it.
    #[serde(rename = "TypeDef")]
    Def { name: String, ty: Box<Type> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeField {
    pub name: String,
    pub ty: Type,
}

impl Type {
    pub fn primitive(name: impl Into<String>) -> Self {
        Type::Primitive { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Value {
    /// Primitive text as written, with the type implied by its syntax.
    Primitive { ty: String, text: String },
    Record { fields: Vec<FieldValue> },
    Array { elems: Vec<Value> },
    Set { elems: Vec<Value> },
    Map { entries: Vec<Entry> },
    Enum { name: String },
    TypeValue { value: Type },
    Error { value: Box<Value> },
    /// `value (=name)`: names the type of the inner value.
    DefValue { value: Box<Value>, type_name: String },
    /// `value (type)`: casts the inner value.
    CastValue { value: Box<Value>, ty: Type },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: Value,
    pub value: Value,
}

impl Value {
    pub fn primitive(ty: impl Into<String>, text: impl Into<String>) -> Self {
        Value::Primitive {
            ty: ty.into(),
            text: text.into(),
        }
    }
}
