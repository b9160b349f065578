//! Canonical ZSON text for analyzed values.

use crate::zedc::{
    zed::{Primitive, Type, TypeKind, format_field_name},
    zson::{Value, parser::classify},
};
use std::{collections::HashSet, fmt::Write};

/// Formats values, emitting each named type's definition only once.
#[derive(Debug, Default)]
pub struct Formatter {
    defined: HashSet<String>,
}

pub fn format_value(v: &Value) -> String {
    Formatter::default().format(v)
}

/// Type text with each named type spelled out as `name=type` on first use.
pub fn format_type(t: &Type) -> String {
    let mut out = String::new();
    Formatter::default().write_type(&mut out, t);
    out
}

pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl Formatter {
    pub fn format(&mut self, v: &Value) -> String {
        let mut out = String::new();
        self.write_value(&mut out, v);
        out
    }

    fn write_value(&mut self, out: &mut String, v: &Value) {
        match v {
            Value::Null { ty } => {
                out.push_str("null");
                self.decorate(out, ty, ty.is_null());
            }
            Value::Primitive { ty, text } => {
                let implied = match ty.as_primitive() {
                    Some(Primitive::String) => {
                        out.push_str(&quote_string(text));
                        true
                    }
                    Some(Primitive::Bstring) => {
                        out.push_str(&quote_string(text));
                        false
                    }
                    Some(p) => {
                        out.push_str(text);
                        classify(text) == Some(p)
                    }
                    None => false,
                };
                self.decorate(out, ty, implied && ty.under() == ty);
            }
            Value::Record { ty, fields } => {
                out.push('{');
                let names = ty.fields().map(<[_]>::to_vec).unwrap_or_default();
                for (i, (f, col)) in fields.iter().zip(&names).enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&format_field_name(&col.name));
                    out.push(':');
                    self.write_value(out, f);
                }
                out.push('}');
                self.decorate(out, ty, true);
            }
            Value::Array { ty, elems } => {
                self.write_elems(out, "[", elems, "]");
                self.decorate(out, ty, !elems.is_empty());
            }
            Value::Set { ty, elems } => {
                self.write_elems(out, "|[", elems, "]|");
                self.decorate(out, ty, !elems.is_empty());
            }
            Value::Map { ty, entries } => {
                out.push_str("|{");
                for (i, (k, val)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.write_value(out, k);
                    out.push(':');
                    self.write_value(out, val);
                }
                out.push_str("}|");
                self.decorate(out, ty, !entries.is_empty());
            }
            Value::Union { value, .. } => self.write_value(out, value),
            Value::Enum { ty, name, .. } => {
                out.push('%');
                out.push_str(&format_field_name(name));
                self.decorate(out, ty, false);
            }
            Value::TypeValue { value, .. } => {
                out.push('<');
                self.write_type(out, value);
                out.push('>');
            }
            Value::Error { value, .. } => {
                out.push_str("error(");
                self.write_value(out, value);
                out.push(')');
            }
        }
    }

    fn write_elems(&mut self, out: &mut String, open: &str, elems: &[Value], close: &str) {
        out.push_str(open);
        for (i, e) in elems.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            self.write_value(out, e);
        }
        out.push_str(close);
    }

    fn write_type(&mut self, out: &mut String, t: &Type) {
        match t.kind() {
            TypeKind::Primitive(p) => out.push_str(p.name()),
            TypeKind::Record(fields) => {
                out.push('{');
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&format_field_name(&field.name));
                    out.push(':');
                    self.write_type(out, &field.ty);
                }
                out.push('}');
            }
            TypeKind::Array(inner) => {
                out.push('[');
                self.write_type(out, inner);
                out.push(']');
            }
            TypeKind::Set(inner) => {
                out.push_str("|[");
                self.write_type(out, inner);
                out.push_str("]|");
            }
            TypeKind::Map(k, v) => {
                out.push_str("|{");
                self.write_type(out, k);
                out.push(':');
                self.write_type(out, v);
                out.push_str("}|");
            }
            TypeKind::Union(types) => {
                out.push('(');
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.write_type(out, t);
                }
                out.push(')');
            }
            TypeKind::Error(inner) => {
                out.push_str("error(");
                self.write_type(out, inner);
                out.push(')');
            }
            TypeKind::Enum { .. } => {
                let _ = write!(out, "{t}");
            }
            TypeKind::Named { name, ty } => {
                let name = format_field_name(name);
                out.push_str(&name);
                if self.defined.insert(name) {
                    out.push('=');
                    self.write_type(out, ty);
                }
            }
        }
    }

    /// Appends a type decorator unless the type is implied by the text.
    /// Named types always decorate.
    fn decorate(&mut self, out: &mut String, ty: &Type, implied: bool) {
        if let TypeKind::Named { name, ty: under } = ty.kind() {
            let name = format_field_name(name);
            if self.defined.insert(name.clone()) {
                let _ = write!(out, " ({name}={under})");
            } else {
                let _ = write!(out, " ({name})");
            }
            return;
        }
        if !implied {
            let _ = write!(out, " ({ty})");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zedc::{
        zed::Context,
        zson::{Analyzer, parse_value_str},
    };

    fn canonical(zctx: &Context, s: &str) -> String {
        let ast = parse_value_str(s).unwrap();
        format_value(&Analyzer::new(zctx).convert_value(&ast).unwrap())
    }

    #[test]
    fn implied_values_are_bare() {
        let zctx = Context::new();
        assert_eq!(canonical(&zctx, "{a:1,b:\"x\\ny\"}"), "{a:1,b:\"x\\ny\"}");
        assert_eq!(canonical(&zctx, "[1,2]"), "[1,2]");
        assert_eq!(canonical(&zctx, "1h"), "1h");
    }

    #[test]
    fn odd_field_names_are_quoted() {
        let zctx = Context::new();
        assert_eq!(canonical(&zctx, "{\"a b\":1,c:2}"), "{\"a b\":1,c:2}");
        assert_eq!(
            format_type(&analyze_type(&zctx, "<{\"1x\":int64}>")),
            "{\"1x\":int64}"
        );
    }

    fn analyze_type(zctx: &Context, s: &str) -> Type {
        let ast = parse_value_str(s).unwrap();
        match Analyzer::new(zctx).convert_value(&ast).unwrap() {
            Value::TypeValue { value, .. } => value,
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn casts_decorate() {
        let zctx = Context::new();
        assert_eq!(canonical(&zctx, "1 (uint8)"), "1 (uint8)");
        assert_eq!(canonical(&zctx, "null (int64)"), "null (int64)");
        assert_eq!(canonical(&zctx, "[]"), "[] ([null])");
        assert_eq!(canonical(&zctx, "%a (enum(a,b))"), "%a (enum(a,b))");
    }

    #[test]
    fn named_types_define_once() {
        let zctx = Context::new();
        assert_eq!(
            canonical(&zctx, "[80 (port=uint16), 81 (port)]"),
            "[80 (port=uint16),81 (port)]"
        );
    }

    #[test]
    fn type_values_define_names() {
        let zctx = Context::new();
        assert_eq!(canonical(&zctx, "<port=uint16>"), "<port=uint16>");
        assert_eq!(
            canonical(&zctx, "<{a:port=uint16,b:[port]}>"),
            "<{a:port=uint16,b:[port]}>"
        );
    }

    #[test]
    fn canonical_text_reparses_to_the_same_type() {
        let zctx = Context::new();
        for s in ["{a:[1,\"a\"],b:|{\"k\":1.5}|}", "<{x:int64}>", "error(\"boom\")"] {
            let ast = parse_value_str(s).unwrap();
            let v = Analyzer::new(&zctx).convert_value(&ast).unwrap();
            let again = parse_value_str(&format_value(&v)).unwrap();
            let w = Analyzer::new(&zctx).convert_value(&again).unwrap();
            assert_eq!(v.ty(), w.ty(), "{s}");
        }
    }
}
