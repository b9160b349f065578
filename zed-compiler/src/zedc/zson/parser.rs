use crate::zedc::{
    ast::zed::{Entry, FieldValue, Type, TypeField, Value},
    zed::Primitive,
    zson::{ZsonError, builder, lexer::Lexer},
};
use std::{collections::HashSet, io::Read};

/// Reads a stream of ZSON values.
pub struct Parser<R> {
    lexer: Lexer<R>,
}

pub fn parse_value_str(s: &str) -> Result<Value, ZsonError> {
    let mut p = Parser::new(s.as_bytes());
    let val = p.parse_value()?.ok_or(ZsonError::Eof)?;
    if !p.lexer.at_eof()? {
        return Err(syntax("zson syntax error"));
    }
    Ok(val)
}

pub fn parse_type_str(s: &str) -> Result<Type, ZsonError> {
    let mut p = Parser::new(s.as_bytes());
    let ty = p
        .match_type()?
        .ok_or_else(|| syntax("couldn't parse type"))?;
    if !p.lexer.at_eof()? {
        return Err(syntax("couldn't parse type"));
    }
    Ok(ty)
}

impl<R: Read> Parser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lexer: Lexer::new(reader),
        }
    }

    pub fn from_lexer(lexer: Lexer<R>) -> Self {
        Self { lexer }
    }

    /// Parses the next value, or returns `None` at end of input.
    pub fn parse_value(&mut self) -> Result<Option<Value>, ZsonError> {
        if self.lexer.at_eof()? {
            return Ok(None);
        }
        let val = self.match_value()?.ok_or_else(|| syntax("zson syntax error"))?;
        self.decorate(val).map(Some)
    }

    fn parse_decorated(&mut self) -> Result<Value, ZsonError> {
        let val = self.match_value()?.ok_or_else(|| syntax("zson syntax error"))?;
        self.decorate(val)
    }

    fn decorate(&mut self, mut val: Value) -> Result<Value, ZsonError> {
        while self.lexer.peek()? == Some(b'(') {
            self.lexer.advance(1);
            if self.lexer.match_byte(b'=')? {
                let name = self
                    .lexer
                    .scan_type_name()?
                    .ok_or_else(|| syntax("bad short-form type definition"))?;
                val = Value::DefValue {
                    value: Box::new(val),
                    type_name: name,
                };
            } else {
                let ty = self
                    .match_type()?
                    .ok_or_else(|| syntax("couldn't parse type"))?;
                val = Value::CastValue {
                    value: Box::new(val),
                    ty,
                };
            }
            if !self.lexer.match_byte(b')')? {
                return Err(syntax("mismatched parentheses while parsing type decorator"));
            }
        }
        Ok(val)
    }

    fn match_value(&mut self) -> Result<Option<Value>, ZsonError> {
        let Some(b) = self.lexer.peek()? else {
            return Ok(None);
        };
        match b {
            b'{' => self.match_record().map(Some),
            b'[' => self.match_array().map(Some),
            b'|' => self.match_set_or_map().map(Some),
            b'<' => {
                self.lexer.advance(1);
                let ty = self
                    .match_type()?
                    .ok_or_else(|| syntax("couldn't parse type"))?;
                if !self.lexer.match_byte(b'>')? {
                    return Err(syntax("mismatched closing bracket while parsing type value"));
                }
                Ok(Some(Value::TypeValue { value: ty }))
            }
            b'"' => {
                let s = self.lexer.scan_string()?;
                Ok(Some(Value::primitive("string", s)))
            }
            b'`' | b'=' => {
                let s = self.lexer.scan_backtick()?;
                Ok(Some(Value::primitive("string", s)))
            }
            b'%' => {
                self.lexer.advance(1);
                let name = match self.lexer.byte_at(0)? {
                    Some(b'"') => self.lexer.scan_string()?,
                    _ => self.lexer.scan_identifier()?,
                };
                Ok(Some(Value::Enum { name }))
            }
            _ => {
                if self.lexer.peek_bytes(b"error(")? {
                    self.lexer.advance(6);
                    let inner = self.parse_decorated()?;
                    if !self.lexer.match_byte(b')')? {
                        return Err(syntax("mismatched parentheses while parsing error value"));
                    }
                    return Ok(Some(Value::Error {
                        value: Box::new(inner),
                    }));
                }
                self.match_primitive()
            }
        }
    }

    fn match_record(&mut self) -> Result<Value, ZsonError> {
        self.lexer.advance(1);
        let mut fields = Vec::new();
        let mut seen = HashSet::new();
        if !self.lexer.match_byte(b'}')? {
            loop {
                let name = self.field_name()?;
                if !self.lexer.match_byte(b':')? {
                    return Err(syntax(format!(
                        "no colon found after field name {name:?} while parsing record"
                    )));
                }
                let value = self.parse_decorated()?;
                if seen.insert(name.clone()) {
                    fields.push(FieldValue { name, value });
                }
                if self.lexer.match_byte(b',')? {
                    continue;
                }
                if self.lexer.match_byte(b'}')? {
                    break;
                }
                return Err(syntax("mismatched closing bracket while parsing record value"));
            }
        }
        Ok(Value::Record { fields })
    }

    fn field_name(&mut self) -> Result<String, ZsonError> {
        match self.lexer.peek()? {
            Some(b'"') => self.lexer.scan_string(),
            _ => self
                .lexer
                .scan_type_name()?
                .ok_or_else(|| syntax("malformed identifier")),
        }
    }

    fn match_array(&mut self) -> Result<Value, ZsonError> {
        self.lexer.advance(1);
        let elems = self.match_elems(b"]", "array")?;
        Ok(Value::Array { elems })
    }

    fn match_elems(&mut self, close: &[u8], what: &str) -> Result<Vec<Value>, ZsonError> {
        let mut elems = Vec::new();
        if self.lexer.match_bytes(close)? {
            return Ok(elems);
        }
        loop {
            elems.push(self.parse_decorated()?);
            if self.lexer.match_byte(b',')? {
                continue;
            }
            if self.lexer.match_bytes(close)? {
                return Ok(elems);
            }
            return Err(syntax(format!(
                "mismatched closing bracket while parsing {what} value"
            )));
        }
    }

    fn match_set_or_map(&mut self) -> Result<Value, ZsonError> {
        if self.lexer.match_bytes(b"|[")? {
            let elems = self.match_elems(b"]|", "set")?;
            return Ok(Value::Set { elems });
        }
        if self.lexer.match_bytes(b"|{")? {
            let mut entries = Vec::new();
            if self.lexer.match_bytes(b"}|")? {
                return Ok(Value::Map { entries });
            }
            loop {
                let key = self.parse_decorated()?;
                if !self.lexer.match_byte(b':')? {
                    return Err(syntax("no colon found after map key while parsing map entry"));
                }
                let value = self.parse_decorated()?;
                entries.push(Entry { key, value });
                if self.lexer.match_byte(b',')? {
                    continue;
                }
                if self.lexer.match_bytes(b"}|")? {
                    return Ok(Value::Map { entries });
                }
                return Err(syntax("mismatched closing bracket while parsing map value"));
            }
        }
        Err(syntax("no '|[' or '|{' type bracket at '|' character"))
    }

    fn match_primitive(&mut self) -> Result<Option<Value>, ZsonError> {
        let Some(text) = self.lexer.scan_primitive()? else {
            return Ok(None);
        };
        let ty = classify(&text).ok_or_else(|| syntax("zson syntax error"))?;
        if ty == Primitive::Null {
            return Ok(Some(Value::primitive("null", "")));
        }
        Ok(Some(Value::primitive(ty.name(), text)))
    }

    /// Parses a type, or returns `None` if the input does not start one.
    pub fn match_type(&mut self) -> Result<Option<Type>, ZsonError> {
        let Some(b) = self.lexer.peek()? else {
            return Ok(None);
        };
        match b {
            b'{' => {
                self.lexer.advance(1);
                let mut fields = Vec::new();
                if !self.lexer.match_byte(b'}')? {
                    loop {
                        let name = self.field_name()?;
                        if !self.lexer.match_byte(b':')? {
                            return Err(syntax(format!("no type name found for field {name:?}")));
                        }
                        let ty = self
                            .match_type()?
                            .ok_or_else(|| syntax(format!("no type name found for field {name:?}")))?;
                        fields.push(TypeField { name, ty });
                        if self.lexer.match_byte(b',')? {
                            continue;
                        }
                        if self.lexer.match_byte(b'}')? {
                            break;
                        }
                        return Err(syntax("mismatched braces while parsing record type"));
                    }
                }
                Ok(Some(Type::Record { fields }))
            }
            b'[' => {
                self.lexer.advance(1);
                let ty = self.required_type()?;
                if !self.lexer.match_byte(b']')? {
                    return Err(syntax("mismatched brackets while parsing array type"));
                }
                Ok(Some(Type::Array { ty: Box::new(ty) }))
            }
            b'|' => {
                if self.lexer.match_bytes(b"|[")? {
                    let ty = self.required_type()?;
                    if !self.lexer.match_bytes(b"]|")? {
                        return Err(syntax("mismatched brackets while parsing set type"));
                    }
                    return Ok(Some(Type::Set { ty: Box::new(ty) }));
                }
                if self.lexer.match_bytes(b"|{")? {
                    let key = self.required_type()?;
                    if !self.lexer.match_byte(b':')? {
                        return Err(syntax("value type missing while parsing map type"));
                    }
                    let val = self
                        .match_type()?
                        .ok_or_else(|| syntax("value type missing while parsing map type"))?;
                    if !self.lexer.match_bytes(b"}|")? {
                        return Err(syntax("mismatched brackets while parsing map type"));
                    }
                    return Ok(Some(Type::Map {
                        key: Box::new(key),
                        val: Box::new(val),
                    }));
                }
                Err(syntax("no '|[' or '|{' type bracket at '|' character"))
            }
            b'(' => {
                self.lexer.advance(1);
                let types = self.match_type_list()?;
                if types.len() < 2 {
                    return Err(syntax("type list not found parsing union type at '('"));
                }
                if !self.lexer.match_byte(b')')? {
                    return Err(syntax("mismatched parentheses while parsing union type"));
                }
                Ok(Some(Type::Union { types }))
            }
            _ => self.match_type_name(),
        }
    }

    fn required_type(&mut self) -> Result<Type, ZsonError> {
        self.match_type()?.ok_or_else(|| syntax("couldn't parse type"))
    }

    fn match_type_list(&mut self) -> Result<Vec<Type>, ZsonError> {
        let mut types = Vec::new();
        while let Some(ty) = self.match_type()? {
            types.push(ty);
            if !self.lexer.match_byte(b',')? {
                break;
            }
        }
        Ok(types)
    }

    fn match_type_name(&mut self) -> Result<Option<Type>, ZsonError> {
        let Some(name) = self.lexer.scan_type_name()? else {
            return Ok(None);
        };
        if (name == "enum" || name == "error") && self.lexer.match_tight(b'(')? {
            let ty = if name == "enum" {
                let mut symbols = Vec::new();
                if !self.lexer.match_byte(b')')? {
                    loop {
                        symbols.push(self.field_name()?);
                        if self.lexer.match_byte(b',')? {
                            continue;
                        }
                        if self.lexer.match_byte(b')')? {
                            break;
                        }
                        return Err(syntax("mismatched parentheses while parsing enum type"));
                    }
                }
                Type::Enum { symbols }
            } else {
                let inner = self.required_type()?;
                if !self.lexer.match_byte(b')')? {
                    return Err(syntax("mismatched parentheses while parsing error type"));
                }
                Type::Error {
                    ty: Box::new(inner),
                }
            };
            return Ok(Some(ty));
        }
        if self.lexer.match_byte(b'=')? {
            let ty = self.required_type()?;
            return Ok(Some(Type::Def {
                name,
                ty: Box::new(ty),
            }));
        }
        if Primitive::from_name(&name).is_some() {
            return Ok(Some(Type::Primitive { name }));
        }
        Ok(Some(Type::Name { name }))
    }
}

/// Infers the implied primitive type of unquoted ZSON text.
pub fn classify(text: &str) -> Option<Primitive> {
    match text {
        "true" | "false" => return Some(Primitive::Bool),
        "null" => return Some(Primitive::Null),
        "NaN" | "+NaN" | "-NaN" | "Inf" | "+Inf" | "-Inf" => return Some(Primitive::Float64),
        _ => {}
    }
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if text.parse::<i64>().is_ok() {
            return Some(Primitive::Int64);
        }
        if text.parse::<u64>().is_ok() {
            return Some(Primitive::Uint64);
        }
        return Some(Primitive::Float64);
    }
    if text.starts_with("0x") {
        return builder::parse_bytes(text).ok().map(|_| Primitive::Bytes);
    }
    let looks_numeric = digits
        .bytes()
        .next()
        .is_some_and(|b| b.is_ascii_digit() || b == b'.');
    if looks_numeric
        && digits.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
        && text.parse::<f64>().is_ok()
    {
        return Some(Primitive::Float64);
    }
    if builder::parse_time(text).is_ok() {
        return Some(Primitive::Time);
    }
    if builder::parse_duration(text).is_ok() {
        return Some(Primitive::Duration);
    }
    if text.parse::<std::net::IpAddr>().is_ok() {
        return Some(Primitive::Ip);
    }
    if builder::parse_net(text).is_ok() {
        return Some(Primitive::Net);
    }
    None
}

fn syntax(msg: impl Into<String>) -> ZsonError {
    ZsonError::Syntax(msg.into())
}
