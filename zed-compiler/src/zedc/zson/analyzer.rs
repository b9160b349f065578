use crate::zedc::{
    ast::zed as ast,
    zed::{
        Context, EnumSymbol, Field, Primitive, Type, TypeKind, types, zcode,
    },
    zson::ZsonError,
};
use std::collections::HashMap;

/// A ZSON value with every type resolved against a [`Context`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Primitive { ty: Type, text: String },
    Record { ty: Type, fields: Vec<Value> },
    Array { ty: Type, elems: Vec<Value> },
    Set { ty: Type, elems: Vec<Value> },
    Map { ty: Type, entries: Vec<(Value, Value)> },
    /// A value wrapped in a union. A selector of `-1` marks null.
    Union {
        ty: Type,
        selector: i32,
        value: Box<Value>,
    },
    Enum { ty: Type, selector: u64, name: String },
    TypeValue { ty: Type, value: Type },
    Error { ty: Type, value: Box<Value> },
    Null { ty: Type },
}

impl Value {
    pub fn ty(&self) -> &Type {
        match self {
            Value::Primitive { ty, .. }
            | Value::Record { ty, .. }
            | Value::Array { ty, .. }
            | Value::Set { ty, .. }
            | Value::Map { ty, .. }
            | Value::Union { ty, .. }
            | Value::Enum { ty, .. }
            | Value::TypeValue { ty, .. }
            | Value::Error { ty, .. }
            | Value::Null { ty } => ty,
        }
    }

    fn with_type(mut self, new: Type) -> Self {
        match &mut self {
            Value::Primitive { ty, .. }
            | Value::Record { ty, .. }
            | Value::Array { ty, .. }
            | Value::Set { ty, .. }
            | Value::Map { ty, .. }
            | Value::Union { ty, .. }
            | Value::Enum { ty, .. }
            | Value::TypeValue { ty, .. }
            | Value::Error { ty, .. }
            | Value::Null { ty } => *ty = new,
        }
        self
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null { .. })
    }
}

/// Resolves parsed ZSON against a type context.
///
/// Numeric typedef names (`(=0)`) bind only within this analyzer; named
/// typedefs also become aliases in the context.
pub struct Analyzer<'a> {
    zctx: &'a Context,
    locals: HashMap<String, Type>,
}

impl<'a> Analyzer<'a> {
    pub fn new(zctx: &'a Context) -> Self {
        Self {
            zctx,
            locals: HashMap::new(),
        }
    }

    pub fn convert_value(&mut self, val: &ast::Value) -> Result<Value, ZsonError> {
        self.convert(val, None)
    }

    fn convert(&mut self, val: &ast::Value, parent: Option<&Type>) -> Result<Value, ZsonError> {
        match val {
            ast::Value::DefValue { value, type_name } => {
                let v = self.convert(value, parent)?;
                let named = self.enter_typedef(type_name, v.ty())?;
                Ok(match named {
                    Some(alias) => v.with_type(alias),
                    None => v,
                })
            }
            ast::Value::CastValue { value, ty } => {
                let cast = self.convert_type(ty)?;
                type_check(&cast, parent)?;
                if cast.is_union() {
                    let inner = self.convert(value, None)?;
                    return convert_union(inner, &cast);
                }
                self.convert(value, Some(&cast))
            }
            _ => self.convert_any(val, parent),
        }
    }

    fn convert_any(&mut self, val: &ast::Value, cast: Option<&Type>) -> Result<Value, ZsonError> {
        if let Some(u) = cast.filter(|c| c.is_union()) {
            let inner = self.convert_any(val, None)?;
            return convert_union(inner, u);
        }
        match val {
            ast::Value::Primitive { ty, text } => convert_primitive(ty, text, cast),
            ast::Value::Record { fields } => self.convert_record(fields, cast),
            ast::Value::Array { elems } => {
                let inner = match cast {
                    Some(c) => match c.under().kind() {
                        TypeKind::Array(t) => Some(t.clone()),
                        _ => return Err(type_err("array decorator not of type array")),
                    },
                    None => None,
                };
                let (ty, elems) = self.convert_elems(elems, inner)?;
                let ty = match cast {
                    Some(c) => c.clone(),
                    None => self.zctx.lookup_type_array(&ty),
                };
                Ok(Value::Array { ty, elems })
            }
            ast::Value::Set { elems } => {
                let inner = match cast {
                    Some(c) => match c.under().kind() {
                        TypeKind::Set(t) => Some(t.clone()),
                        _ => return Err(type_err("set decorator not of type set")),
                    },
                    None => None,
                };
                let (ty, elems) = self.convert_elems(elems, inner)?;
                let ty = match cast {
                    Some(c) => c.clone(),
                    None => self.zctx.lookup_type_set(&ty),
                };
                Ok(Value::Set { ty, elems })
            }
            ast::Value::Map { entries } => self.convert_map(entries, cast),
            ast::Value::Enum { name } => {
                let Some(c) = cast else {
                    return Err(type_err(format!(
                        "identifier {name:?} must be enum and requires decorator"
                    )));
                };
                enum_value(name, c)
            }
            ast::Value::TypeValue { value } => {
                if let Some(c) = cast {
                    if c.as_primitive() != Some(Primitive::Type) {
                        return Err(type_err(format!(
                            "cannot apply decorator ({:?}) to a type value",
                            c.to_string()
                        )));
                    }
                }
                let contents = self.convert_type(value)?;
                Ok(Value::TypeValue {
                    ty: cast.cloned().unwrap_or_else(|| contents.clone()),
                    value: contents,
                })
            }
            ast::Value::Error { value } => {
                let inner_cast = match cast {
                    Some(c) => match c.under().kind() {
                        TypeKind::Error(t) => Some(t.clone()),
                        _ => {
                            return Err(type_err(format!(
                                "error decorator not of type error: {:?}",
                                c.to_string()
                            )));
                        }
                    },
                    None => None,
                };
                let inner = self.convert(value, inner_cast.as_ref())?;
                let ty = match cast {
                    Some(c) => c.clone(),
                    None => self.zctx.lookup_type_error(inner.ty()),
                };
                Ok(Value::Error {
                    ty,
                    value: Box::new(inner),
                })
            }
            ast::Value::DefValue { .. } | ast::Value::CastValue { .. } => self.convert(val, cast),
        }
    }

    fn convert_record(
        &mut self,
        fields: &[ast::FieldValue],
        cast: Option<&Type>,
    ) -> Result<Value, ZsonError> {
        if let Some(c) = cast {
            let Some(types) = c.fields() else {
                return Err(type_err("record decorator not of type record"));
            };
            if types.len() != fields.len() {
                return Err(type_err(format!(
                    "record decorator columns ({}) mismatched with value columns ({})",
                    types.len(),
                    fields.len()
                )));
            }
            let types = types.to_vec();
            let mut vals = Vec::with_capacity(fields.len());
            for (f, col) in fields.iter().zip(&types) {
                vals.push(self.convert(&f.value, Some(&col.ty))?);
            }
            return Ok(Value::Record {
                ty: c.clone(),
                fields: vals,
            });
        }
        let mut vals = Vec::with_capacity(fields.len());
        let mut cols = Vec::with_capacity(fields.len());
        for f in fields {
            let v = self.convert(&f.value, None)?;
            cols.push(Field::new(f.name.clone(), v.ty().clone()));
            vals.push(v);
        }
        let ty = self.zctx.lookup_type_record(cols)?;
        Ok(Value::Record { ty, fields: vals })
    }

    /// Converts container elements and returns the element type alongside.
    ///
    /// Without a decorator, mixed element types are wrapped in a union over the
    /// distinct types. Null is compatible with any element type and never
    /// becomes a member of its own.
    fn convert_elems(
        &mut self,
        elems: &[ast::Value],
        inner: Option<Type>,
    ) -> Result<(Type, Vec<Value>), ZsonError> {
        if let Some(t) = inner {
            let mut vals = Vec::with_capacity(elems.len());
            for e in elems {
                vals.push(self.convert(e, Some(&t))?);
            }
            return Ok((t, vals));
        }
        let mut vals = Vec::with_capacity(elems.len());
        for e in elems {
            vals.push(self.convert(e, None)?);
        }
        self.unify(vals)
    }

    fn unify(&self, vals: Vec<Value>) -> Result<(Type, Vec<Value>), ZsonError> {
        let mut distinct: Vec<Type> = Vec::new();
        for v in &vals {
            if v.is_null() {
                continue;
            }
            if !distinct.contains(v.ty()) {
                distinct.push(v.ty().clone());
            }
        }
        match distinct.len() {
            0 => Ok((Type::null(), vals)),
            1 => {
                let t = distinct.remove(0);
                let vals = vals
                    .into_iter()
                    .map(|v| if v.is_null() { Value::Null { ty: t.clone() } } else { v })
                    .collect();
                Ok((t, vals))
            }
            _ => {
                let union = self.zctx.lookup_type_union(&distinct)?;
                let vals = vals
                    .into_iter()
                    .map(|v| convert_union(v, &union))
                    .collect::<Result<_, _>>()?;
                Ok((union, vals))
            }
        }
    }

    fn convert_map(
        &mut self,
        entries: &[ast::Entry],
        cast: Option<&Type>,
    ) -> Result<Value, ZsonError> {
        if let Some(c) = cast {
            let TypeKind::Map(kt, vt) = c.under().kind() else {
                return Err(type_err("map decorator not of type map"));
            };
            let (kt, vt) = (kt.clone(), vt.clone());
            let mut out = Vec::with_capacity(entries.len());
            for e in entries {
                let k = self.convert(&e.key, Some(&kt))?;
                let v = self.convert(&e.value, Some(&vt))?;
                out.push((k, v));
            }
            return Ok(Value::Map {
                ty: c.clone(),
                entries: out,
            });
        }
        let mut keys = Vec::with_capacity(entries.len());
        let mut vals = Vec::with_capacity(entries.len());
        for e in entries {
            keys.push(self.convert(&e.key, None)?);
            vals.push(self.convert(&e.value, None)?);
        }
        let (kt, keys) = self.unify(keys)?;
        let (vt, vals) = self.unify(vals)?;
        Ok(Value::Map {
            ty: self.zctx.lookup_type_map(&kt, &vt),
            entries: keys.into_iter().zip(vals).collect(),
        })
    }

    /// Binds a typedef name. Returns the alias to retype the value with, or
    /// `None` for numeric names, which bind locally only.
    fn enter_typedef(&mut self, name: &str, ty: &Type) -> Result<Option<Type>, ZsonError> {
        if is_numeric(name) {
            self.locals.insert(name.to_string(), ty.clone());
            return Ok(None);
        }
        let alias = self.zctx.lookup_type_alias(name, ty)?;
        self.locals.insert(name.to_string(), alias.clone());
        Ok(Some(alias))
    }

    pub fn convert_type(&mut self, ty: &ast::Type) -> Result<Type, ZsonError> {
        match ty {
            ast::Type::Primitive { name } => self
                .zctx
                .lookup_primitive(name)
                .ok_or_else(|| type_err(format!("no such primitive type: {name:?}"))),
            ast::Type::Record { fields } => {
                let mut cols = Vec::with_capacity(fields.len());
                for f in fields {
                    cols.push(Field::new(f.name.clone(), self.convert_type(&f.ty)?));
                }
                Ok(self.zctx.lookup_type_record(cols)?)
            }
            ast::Type::Array { ty } => {
                let inner = self.convert_type(ty)?;
                Ok(self.zctx.lookup_type_array(&inner))
            }
            ast::Type::Set { ty } => {
                let inner = self.convert_type(ty)?;
                Ok(self.zctx.lookup_type_set(&inner))
            }
            ast::Type::Map { key, val } => {
                let k = self.convert_type(key)?;
                let v = self.convert_type(val)?;
                Ok(self.zctx.lookup_type_map(&k, &v))
            }
            ast::Type::Union { types } => {
                let mut members = Vec::with_capacity(types.len());
                for t in types {
                    members.push(self.convert_type(t)?);
                }
                Ok(self.zctx.lookup_type_union(&members)?)
            }
            ast::Type::Enum { symbols } => {
                if symbols.is_empty() {
                    return Err(type_err("enum body is empty"));
                }
                let symbols = symbols
                    .iter()
                    .enumerate()
                    .map(|(i, name)| EnumSymbol {
                        name: name.clone(),
                        value: zcode::encode_uint(i as u64),
                    })
                    .collect();
                let elem = Type::primitive(Primitive::Uint64);
                Ok(self.zctx.lookup_type_enum(&elem, symbols)?)
            }
            ast::Type::Error { ty } => {
                let inner = self.convert_type(ty)?;
                Ok(self.zctx.lookup_type_error(&inner))
            }
            ast::Type::Name { name } => self
                .locals
                .get(name)
                .cloned()
                .or_else(|| self.zctx.lookup_type_def(name))
                .ok_or_else(|| type_err(format!("no such type name: {name:?}"))),
            ast::Type::Def { name, ty } => {
                let t = self.convert_type(ty)?;
                Ok(self.enter_typedef(name, &t)?.unwrap_or(t))
            }
        }
    }
}

fn convert_primitive(ty: &str, text: &str, cast: Option<&Type>) -> Result<Value, ZsonError> {
    let inferred = Primitive::from_name(ty)
        .map(Type::primitive)
        .ok_or_else(|| type_err(format!("no such primitive type: {ty:?}")))?;
    let Some(cast) = cast else {
        if inferred.is_null() {
            return Ok(Value::Null { ty: inferred });
        }
        return Ok(Value::Primitive {
            ty: inferred,
            text: text.to_string(),
        });
    };
    if matches!(cast.under().kind(), TypeKind::Enum { .. }) && inferred.id() == types::ID_STRING {
        return enum_value(text, cast);
    }
    if inferred.is_null() {
        return Ok(Value::Null { ty: cast.clone() });
    }
    cast_type(&inferred, cast)?;
    Ok(Value::Primitive {
        ty: cast.clone(),
        text: text.to_string(),
    })
}

/// Checks that a value of implied type `inferred` may be read as `to`.
fn cast_type(inferred: &Type, to: &Type) -> Result<(), ZsonError> {
    let (from, target) = (inferred.id(), to.under().id());
    let ok = from == target
        || (types::is_integer(from) && types::is_integer(target))
        || (types::is_float(from) && types::is_float(target))
        || (types::is_stringy(from) && types::is_stringy(target));
    if ok {
        return Ok(());
    }
    Err(type_err(format!(
        "type mismatch: {:?} cannot be used as {:?}",
        inferred.to_string(),
        to.to_string()
    )))
}

fn enum_value(name: &str, cast: &Type) -> Result<Value, ZsonError> {
    if !matches!(cast.under().kind(), TypeKind::Enum { .. }) {
        return Err(type_err(format!(
            "identifier {name:?} is enum and incompatible with type {:?}",
            cast.to_string()
        )));
    }
    let selector = cast.symbol(name).ok_or_else(|| {
        type_err(format!(
            "symbol {name:?} not a member of type {:?}",
            cast.to_string()
        ))
    })?;
    Ok(Value::Enum {
        ty: cast.clone(),
        selector: selector as u64,
        name: name.to_string(),
    })
}

fn convert_union(v: Value, union: &Type) -> Result<Value, ZsonError> {
    if v.ty() == union {
        return Ok(v);
    }
    if v.is_null() {
        return Ok(Value::Union {
            ty: union.clone(),
            selector: -1,
            value: Box::new(v),
        });
    }
    let selector = union.selector(v.ty()).ok_or_else(|| {
        type_err(format!(
            "type {:?} is not in union type {:?}",
            v.ty().to_string(),
            union.to_string()
        ))
    })?;
    Ok(Value::Union {
        ty: union.clone(),
        selector: selector as i32,
        value: Box::new(v),
    })
}

fn type_check(cast: &Type, parent: Option<&Type>) -> Result<(), ZsonError> {
    match parent {
        None => Ok(()),
        Some(p) if p == cast || p.is_union() => Ok(()),
        Some(p) => Err(type_err(format!(
            "decorator conflict enclosing context {:?} and decorator cast {:?}",
            p.to_string(),
            cast.to_string()
        ))),
    }
}

fn is_numeric(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

fn type_err(msg: impl Into<String>) -> ZsonError {
    ZsonError::Type(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zedc::zson::parse_value_str;

    fn analyze(zctx: &Context, s: &str) -> Result<Value, ZsonError> {
        let ast = parse_value_str(s)?;
        Analyzer::new(zctx).convert_value(&ast)
    }

    #[test]
    fn record_types_are_inferred() {
        let zctx = Context::new();
        let v = analyze(&zctx, r#"{a:1,b:"x",c:[1.5]}"#).unwrap();
        assert_eq!(v.ty().to_string(), "{a:int64,b:string,c:[float64]}");
    }

    #[test]
    fn mixed_array_becomes_union() {
        let zctx = Context::new();
        let v = analyze(&zctx, r#"[1,"a",null]"#).unwrap();
        assert_eq!(v.ty().to_string(), "[(int64,string)]");
        let Value::Array { elems, .. } = v else {
            panic!("not an array");
        };
        assert!(matches!(elems[2], Value::Union { selector: -1, .. }));
    }

    #[test]
    fn nulls_take_the_array_element_type() {
        let zctx = Context::new();
        let v = analyze(&zctx, "[1,null]").unwrap();
        assert_eq!(v.ty().to_string(), "[int64]");
        assert_eq!(analyze(&zctx, "[]").unwrap().ty().to_string(), "[null]");
    }

    #[test]
    fn nulls_take_the_set_and_map_element_types() {
        let zctx = Context::new();
        let v = analyze(&zctx, "|[1,null]|").unwrap();
        assert_eq!(v.ty().to_string(), "|[int64]|");
        let v = analyze(&zctx, "|{\"a\":1,\"b\":null}|").unwrap();
        assert_eq!(v.ty().to_string(), "|{string:int64}|");
        let v = analyze(&zctx, "|[1,\"a\",null]|").unwrap();
        assert_eq!(v.ty().to_string(), "|[(int64,string)]|");
    }

    #[test]
    fn typedefs_and_numeric_locals() {
        let zctx = Context::new();
        let v = analyze(&zctx, "80 (port=uint16)").unwrap();
        assert_eq!(v.ty().to_string(), "port");
        assert_eq!(zctx.lookup_type_def("port").unwrap().under().to_string(), "uint16");

        let v = analyze(&zctx, "[1 (=0), 2 (0)]").unwrap();
        assert_eq!(v.ty().to_string(), "[int64]");
        assert!(zctx.lookup_type_def("0").is_none());
    }

    #[test]
    fn enums_need_decorators() {
        let zctx = Context::new();
        let v = analyze(&zctx, "%b (enum(a,b))").unwrap();
        assert!(matches!(v, Value::Enum { selector: 1, .. }));
        assert_eq!(
            analyze(&zctx, "%c (enum(a,b))").unwrap_err().to_string(),
            "symbol \"c\" not a member of type \"enum(a,b)\""
        );
        assert_eq!(
            analyze(&zctx, "%a").unwrap_err().to_string(),
            "identifier \"a\" must be enum and requires decorator"
        );
    }

    #[test]
    fn decorator_errors() {
        let zctx = Context::new();
        let cases = [
            ("\"a\" (int64)", "type mismatch: \"string\" cannot be used as \"int64\""),
            ("1 (float64)", "type mismatch: \"int64\" cannot be used as \"float64\""),
            ("{a:1} ({a:int64,b:int64})", "record decorator columns (2) mismatched with value columns (1)"),
            ("[1] ({a:int64})", "array decorator not of type array"),
            ("<int64> (string)", "cannot apply decorator (\"string\") to a type value"),
            ("1 (foo)", "no such type name: \"foo\""),
            ("\"x\" ((int64,uint8))", "type \"string\" is not in union type \"(uint8,int64)\""),
        ];
        for (input, want) in cases {
            assert_eq!(analyze(&zctx, input).unwrap_err().to_string(), want, "{input}");
        }
    }

    #[test]
    fn conflicting_aliases() {
        let zctx = Context::new();
        analyze(&zctx, "1 (x=int64)").unwrap();
        let err = analyze(&zctx, "\"a\" (x=string)").unwrap_err();
        assert_eq!(err.to_string(), "alias exists with different type: \"x\"");
    }

    #[test]
    fn union_cast_selects_member() {
        let zctx = Context::new();
        let v = analyze(&zctx, "\"a\" ((int64,string))").unwrap();
        let Value::Union { selector, ty, .. } = v else {
            panic!("not a union");
        };
        assert_eq!(ty.to_string(), "(int64,string)");
        assert_eq!(selector, 1);
    }
}
