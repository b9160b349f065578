// SPDX-License-Identifier: AGPL-3.0

//! The Zed data model: interned types and their binary value encoding.

pub mod context;
pub mod types;
pub mod zcode;

pub use context::{Context, ContextError};
pub use types::{EnumSymbol, Field, Primitive, Type, TypeId, TypeKind, format_field_name};
