use crate::zedc::zed::types::{
    EnumSymbol, Field, ID_TYPE_COMPLEX, Primitive, Type, TypeId, TypeKind,
};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, LazyLock},
};
use thiserror::Error;
use tracing::trace;

pub const MAX_ENUM_SYMBOLS: usize = 100_000;
pub const MAX_RECORD_FIELDS: usize = 100_000;
pub const MAX_UNION_TYPES: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("duplicate field: {0:?}")]
    DuplicateField(String),
    #[error("duplicate enum symbol: {0:?}")]
    DuplicateSymbol(String),
    #[error("alias exists with different type: {0:?}")]
    AliasExists(String),
    #[error("bad type name {0:?}: primitive type name")]
    PrimitiveName(String),
    #[error("bad type name {0:?}: empty or malformed")]
    BadName(String),
    #[error("too many {what} ({count})")]
    TooMany { what: &'static str, count: usize },
    #[error("union type requires at least one member type")]
    EmptyUnion,
}

/// Structural description of a complex type with its children reduced to IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Record(Vec<(String, TypeId)>),
    Array(TypeId),
    Set(TypeId),
    Map(TypeId, TypeId),
    Union(Vec<TypeId>),
    Enum(TypeId, Vec<EnumSymbol>),
    Error(TypeId),
    Named(String, TypeId),
}

#[derive(Clone, Default)]
struct Tables {
    by_id: Vec<Type>,
    by_key: HashMap<TypeKey, Type>,
    typedefs: HashMap<String, Type>,
}

/// The type interner.
///
/// Readers load an immutable snapshot of the tables and never block. Writers
/// serialize on `writer`, copy the snapshot, insert, and publish the copy, so a
/// lookup that races an insertion of the same type observes the winner.
pub struct Context {
    tables: ArcSwap<Tables>,
    writer: Mutex<()>,
}

static SHARED: LazyLock<Arc<Context>> = LazyLock::new(|| Arc::new(Context::new()));

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            tables: ArcSwap::from_pointee(Tables::default()),
            writer: Mutex::new(()),
        }
    }

    /// The process-wide context shared across compilations.
    pub fn shared() -> Arc<Context> {
        SHARED.clone()
    }

    pub fn lookup_primitive(&self, name: &str) -> Option<Type> {
        Primitive::from_name(name).map(Type::primitive)
    }

    pub fn lookup_by_id(&self, id: TypeId) -> Option<Type> {
        if id < ID_TYPE_COMPLEX {
            return Primitive::from_id(id).map(Type::primitive);
        }
        self.tables
            .load()
            .by_id
            .get((id - ID_TYPE_COMPLEX) as usize)
            .cloned()
    }

    pub fn lookup_type_record(&self, fields: Vec<Field>) -> Result<Type, ContextError> {
        if fields.len() > MAX_RECORD_FIELDS {
            return Err(ContextError::TooMany {
                what: "record fields",
                count: fields.len(),
            });
        }
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(ContextError::DuplicateField(field.name.clone()));
            }
        }
        let key = TypeKey::Record(
            fields
                .iter()
                .map(|f| (f.name.clone(), f.ty.id()))
                .collect(),
        );
        Ok(self.intern(key, || TypeKind::Record(fields)))
    }

    pub fn lookup_type_array(&self, inner: &Type) -> Type {
        self.intern(TypeKey::Array(inner.id()), || TypeKind::Array(inner.clone()))
    }

    pub fn lookup_type_set(&self, inner: &Type) -> Type {
        self.intern(TypeKey::Set(inner.id()), || TypeKind::Set(inner.clone()))
    }

    pub fn lookup_type_map(&self, key: &Type, val: &Type) -> Type {
        self.intern(TypeKey::Map(key.id(), val.id()), || {
            TypeKind::Map(key.clone(), val.clone())
        })
    }

    /// Members are deduplicated and ordered by ID so that any permutation of
    /// the same members yields the same union.
    pub fn lookup_type_union(&self, types: &[Type]) -> Result<Type, ContextError> {
        let mut members: Vec<Type> = Vec::with_capacity(types.len());
        for t in types {
            if !members.contains(t) {
                members.push(t.clone());
            }
        }
        if members.is_empty() {
            return Err(ContextError::EmptyUnion);
        }
        if members.len() > MAX_UNION_TYPES {
            return Err(ContextError::TooMany {
                what: "union types",
                count: members.len(),
            });
        }
        members.sort_by_key(Type::id);
        let key = TypeKey::Union(members.iter().map(Type::id).collect());
        Ok(self.intern(key, || TypeKind::Union(members)))
    }

    pub fn lookup_type_enum(
        &self,
        elem: &Type,
        symbols: Vec<EnumSymbol>,
    ) -> Result<Type, ContextError> {
        if symbols.len() > MAX_ENUM_SYMBOLS {
            return Err(ContextError::TooMany {
                what: "enum symbols",
                count: symbols.len(),
            });
        }
        let mut seen = HashSet::with_capacity(symbols.len());
        for s in &symbols {
            if !seen.insert(s.name.as_str()) {
                return Err(ContextError::DuplicateSymbol(s.name.clone()));
            }
        }
        let key = TypeKey::Enum(elem.id(), symbols.clone());
        Ok(self.intern(key, || TypeKind::Enum {
            elem: elem.clone(),
            symbols,
        }))
    }

    pub fn lookup_type_error(&self, inner: &Type) -> Type {
        self.intern(TypeKey::Error(inner.id()), || TypeKind::Error(inner.clone()))
    }

    /// Binds `name` to `underlying`. Rebinding a name to the same underlying
    /// type returns the existing alias.
    pub fn lookup_type_alias(&self, name: &str, underlying: &Type) -> Result<Type, ContextError> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(ContextError::BadName(name.to_string()));
        }
        if Primitive::from_name(name).is_some() {
            return Err(ContextError::PrimitiveName(name.to_string()));
        }
        if let Some(existing) = self.lookup_type_def(name) {
            return match existing.kind() {
                TypeKind::Named { ty, .. } if ty == underlying => Ok(existing),
                _ => Err(ContextError::AliasExists(name.to_string())),
            };
        }
        let _guard = self.writer.lock();
        let current = self.tables.load_full();
        if let Some(existing) = current.typedefs.get(name) {
            return match existing.kind() {
                TypeKind::Named { ty, .. } if ty == underlying => Ok(existing.clone()),
                _ => Err(ContextError::AliasExists(name.to_string())),
            };
        }
        let mut next = Tables::clone(&current);
        let key = TypeKey::Named(name.to_string(), underlying.id());
        let alias = match next.by_key.get(&key) {
            Some(t) => t.clone(),
            None => Self::insert(
                &mut next,
                key,
                TypeKind::Named {
                    name: name.to_string(),
                    ty: underlying.clone(),
                },
            ),
        };
        next.typedefs.insert(name.to_string(), alias.clone());
        self.tables.store(Arc::new(next));
        Ok(alias)
    }

    pub fn lookup_type_def(&self, name: &str) -> Option<Type> {
        self.tables.load().typedefs.get(name).cloned()
    }

    pub fn alias_of(&self, t: &Type) -> Type {
        t.under().clone()
    }

    /// Number of complex types interned so far.
    pub fn len(&self) -> usize {
        self.tables.load().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn intern(&self, key: TypeKey, make: impl FnOnce() -> TypeKind) -> Type {
        if let Some(t) = self.tables.load().by_key.get(&key) {
            return t.clone();
        }
        let _guard = self.writer.lock();
        let current = self.tables.load_full();
        if let Some(t) = current.by_key.get(&key) {
            return t.clone();
        }
        let mut next = Tables::clone(&current);
        let t = Self::insert(&mut next, key, make());
        self.tables.store(Arc::new(next));
        t
    }

    fn insert(tables: &mut Tables, key: TypeKey, kind: TypeKind) -> Type {
        let id = ID_TYPE_COMPLEX + tables.by_id.len() as TypeId;
        let t = Type::new(id, kind);
        trace!(id, ty = %t, "interned type");
        tables.by_id.push(t.clone());
        tables.by_key.insert(key, t.clone());
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zedc::zed::types::ID_TYPE_COMPLEX;
    use proptest::prelude::*;
    use std::thread;

    fn int64() -> Type {
        Type::primitive(Primitive::Int64)
    }

    fn string() -> Type {
        Type::primitive(Primitive::String)
    }

    #[test]
    fn records_intern_structurally() {
        let zctx = Context::new();
        let a = zctx
            .lookup_type_record(vec![Field::new("a", int64()), Field::new("b", string())])
            .unwrap();
        let b = zctx
            .lookup_type_record(vec![Field::new("a", int64()), Field::new("b", string())])
            .unwrap();
        let c = zctx
            .lookup_type_record(vec![Field::new("b", string()), Field::new("a", int64())])
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.id(), ID_TYPE_COMPLEX);
        assert_eq!(a.to_string(), "{a:int64,b:string}");
    }

    #[test]
    fn duplicate_field_fails() {
        let zctx = Context::new();
        let err = zctx
            .lookup_type_record(vec![Field::new("a", int64()), Field::new("a", string())])
            .unwrap_err();
        assert_eq!(err, ContextError::DuplicateField("a".into()));
        assert_eq!(err.to_string(), "duplicate field: \"a\"");
    }

    #[test]
    fn union_is_order_insensitive() {
        let zctx = Context::new();
        let u1 = zctx.lookup_type_union(&[string(), int64()]).unwrap();
        let u2 = zctx
            .lookup_type_union(&[int64(), string(), int64()])
            .unwrap();
        assert_eq!(u1, u2);
        assert_eq!(u1.to_string(), "(int64,string)");
        assert_eq!(u1.selector(&string()), Some(1));
        assert!(zctx.lookup_type_union(&[]).is_err());
    }

    #[test]
    fn alias_rules() {
        let zctx = Context::new();
        let port = zctx
            .lookup_type_alias("port", &Type::primitive(Primitive::Uint16))
            .unwrap();
        let again = zctx
            .lookup_type_alias("port", &Type::primitive(Primitive::Uint16))
            .unwrap();
        assert_eq!(port, again);
        assert_eq!(
            zctx.lookup_type_alias("port", &string()),
            Err(ContextError::AliasExists("port".into()))
        );
        assert!(matches!(
            zctx.lookup_type_alias("int64", &string()),
            Err(ContextError::PrimitiveName(_))
        ));
        assert_eq!(zctx.lookup_type_def("port"), Some(port.clone()));
        let nested = zctx.lookup_type_alias("p2", &port).unwrap();
        assert_eq!(zctx.alias_of(&nested).id(), Primitive::Uint16.id());
    }

    #[test]
    fn enum_symbols_unique() {
        let zctx = Context::new();
        let sym = |n: &str| EnumSymbol {
            name: n.into(),
            value: vec![],
        };
        assert!(
            zctx.lookup_type_enum(&Type::primitive(Primitive::Uint64), vec![sym("a"), sym("a")])
                .is_err()
        );
        let e = zctx
            .lookup_type_enum(&Type::primitive(Primitive::Uint64), vec![sym("a"), sym("b")])
            .unwrap();
        assert_eq!(e.symbol("b"), Some(1));
    }

    #[test]
    fn concurrent_interning_agrees() {
        let zctx = Arc::new(Context::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let zctx = zctx.clone();
                thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            let inner = zctx.lookup_type_array(&int64());
                            zctx.lookup_type_record(vec![Field::new(format!("f{i}"), inner)])
                                .unwrap()
                                .id()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
        assert_eq!(zctx.len(), 51);
    }

    proptest! {
        #[test]
        fn lookup_is_idempotent(names in proptest::collection::btree_set("[a-z]{1,6}", 1..8)) {
            let zctx = Context::new();
            let fields: Vec<Field> = names.iter().map(|n| Field::new(n.clone(), int64())).collect();
            let first = zctx.lookup_type_record(fields.clone()).unwrap();
            let second = zctx.lookup_type_record(fields).unwrap();
            prop_assert_eq!(first.id(), second.id());
            prop_assert_eq!(zctx.lookup_by_id(first.id()), Some(first));
        }
    }
}
