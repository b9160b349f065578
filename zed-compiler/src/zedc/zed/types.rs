use std::{
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};

pub type TypeId = u32;

pub const ID_UINT8: TypeId = 0;
pub const ID_UINT16: TypeId = 1;
pub const ID_UINT32: TypeId = 2;
pub const ID_UINT64: TypeId = 3;
pub const ID_INT8: TypeId = 4;
pub const ID_INT16: TypeId = 5;
pub const ID_INT32: TypeId = 6;
pub const ID_INT64: TypeId = 7;
pub const ID_DURATION: TypeId = 8;
pub const ID_TIME: TypeId = 9;
pub const ID_FLOAT16: TypeId = 10;
pub const ID_FLOAT32: TypeId = 11;
pub const ID_FLOAT64: TypeId = 12;
pub const ID_BOOL: TypeId = 13;
pub const ID_BYTES: TypeId = 14;
pub const ID_STRING: TypeId = 15;
pub const ID_BSTRING: TypeId = 16;
pub const ID_IP: TypeId = 17;
pub const ID_NET: TypeId = 18;
pub const ID_TYPE: TypeId = 19;
pub const ID_ERROR: TypeId = 20;
pub const ID_NULL: TypeId = 21;

/// First ID handed out by a `Context`. Everything below is a primitive.
pub const ID_TYPE_COMPLEX: TypeId = 23;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Primitive {
    Uint8 = ID_UINT8,
    Uint16 = ID_UINT16,
    Uint32 = ID_UINT32,
    Uint64 = ID_UINT64,
    Int8 = ID_INT8,
    Int16 = ID_INT16,
    Int32 = ID_INT32,
    Int64 = ID_INT64,
    Duration = ID_DURATION,
    Time = ID_TIME,
    Float16 = ID_FLOAT16,
    Float32 = ID_FLOAT32,
    Float64 = ID_FLOAT64,
    Bool = ID_BOOL,
    Bytes = ID_BYTES,
    String = ID_STRING,
    Bstring = ID_BSTRING,
    Ip = ID_IP,
    Net = ID_NET,
    Type = ID_TYPE,
    Error = ID_ERROR,
    Null = ID_NULL,
}

impl Primitive {
    pub const ALL: [Primitive; 22] = [
        Primitive::Uint8,
        Primitive::Uint16,
        Primitive::Uint32,
        Primitive::Uint64,
        Primitive::Int8,
        Primitive::Int16,
        Primitive::Int32,
        Primitive::Int64,
        Primitive::Duration,
        Primitive::Time,
        Primitive::Float16,
        Primitive::Float32,
        Primitive::Float64,
        Primitive::Bool,
        Primitive::Bytes,
        Primitive::String,
        Primitive::Bstring,
        Primitive::Ip,
        Primitive::Net,
        Primitive::Type,
        Primitive::Error,
        Primitive::Null,
    ];

    pub fn id(self) -> TypeId {
        self as TypeId
    }

    pub fn from_id(id: TypeId) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Uint8 => "uint8",
            Primitive::Uint16 => "uint16",
            Primitive::Uint32 => "uint32",
            Primitive::Uint64 => "uint64",
            Primitive::Int8 => "int8",
            Primitive::Int16 => "int16",
            Primitive::Int32 => "int32",
            Primitive::Int64 => "int64",
            Primitive::Duration => "duration",
            Primitive::Time => "time",
            Primitive::Float16 => "float16",
            Primitive::Float32 => "float32",
            Primitive::Float64 => "float64",
            Primitive::Bool => "bool",
            Primitive::Bytes => "bytes",
            Primitive::String => "string",
            Primitive::Bstring => "bstring",
            Primitive::Ip => "ip",
            Primitive::Net => "net",
            Primitive::Type => "type",
            Primitive::Error => "error",
            Primitive::Null => "null",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }
}

impl Display for Primitive {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn is_unsigned(id: TypeId) -> bool {
    id <= ID_UINT64
}

pub fn is_signed(id: TypeId) -> bool {
    (ID_INT8..=ID_TIME).contains(&id)
}

pub fn is_integer(id: TypeId) -> bool {
    id <= ID_INT64
}

pub fn is_float(id: TypeId) -> bool {
    (ID_FLOAT16..=ID_FLOAT64).contains(&id)
}

pub fn is_number(id: TypeId) -> bool {
    is_integer(id) || is_float(id)
}

pub fn is_stringy(id: TypeId) -> bool {
    id == ID_STRING || id == ID_BSTRING
}

pub fn is_primitive(id: TypeId) -> bool {
    id < ID_TYPE_COMPLEX
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// An enum member: its symbol and the encoded value of the element type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumSymbol {
    pub name: String,
    pub value: Vec<u8>,
}

#[derive(Debug)]
pub enum TypeKind {
    Primitive(Primitive),
    Record(Vec<Field>),
    Array(Type),
    Set(Type),
    Map(Type, Type),
    Union(Vec<Type>),
    Enum { elem: Type, symbols: Vec<EnumSymbol> },
    Error(Type),
    Named { name: String, ty: Type },
}

/// A handle to an interned type. Two handles are equal iff they carry the
/// same ID, which the owning `Context` guarantees for structurally equal types.
#[derive(Clone)]
pub struct Type {
    id: TypeId,
    kind: Arc<TypeKind>,
}

impl Type {
    pub(crate) fn new(id: TypeId, kind: TypeKind) -> Self {
        Self {
            id,
            kind: Arc::new(kind),
        }
    }

    pub fn primitive(p: Primitive) -> Self {
        Self::new(p.id(), TypeKind::Primitive(p))
    }

    pub fn null() -> Self {
        Self::primitive(Primitive::Null)
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self.under().kind() {
            TypeKind::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.id == ID_NULL
    }

    /// Strips every alias wrapper.
    pub fn under(&self) -> &Type {
        let mut t = self;
        while let TypeKind::Named { ty, .. } = t.kind() {
            t = ty;
        }
        t
    }

    pub fn fields(&self) -> Option<&[Field]> {
        match self.under().kind() {
            TypeKind::Record(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn inner(&self) -> Option<&Type> {
        match self.under().kind() {
            TypeKind::Array(t) | TypeKind::Set(t) | TypeKind::Error(t) => Some(t),
            _ => None,
        }
    }

    /// Position of `member` within this union, if this is a union containing it.
    pub fn selector(&self, member: &Type) -> Option<usize> {
        match self.under().kind() {
            TypeKind::Union(types) => types.iter().position(|t| t == member),
            _ => None,
        }
    }

    pub fn symbol(&self, name: &str) -> Option<usize> {
        match self.under().kind() {
            TypeKind::Enum { symbols, .. } => symbols.iter().position(|s| s.name == name),
            _ => None,
        }
    }

    pub fn is_union(&self) -> bool {
        matches!(self.under().kind(), TypeKind::Union(_))
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}#{}", self, self.id)
    }
}

/// Field names that are not plain identifiers must be quoted in type text.
pub fn format_field_name(name: &str) -> String {
    let mut chars = name.chars();
    let ident = match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {
            chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    };
    if ident {
        name.to_string()
    } else {
        format!("{name:?}")
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.kind() {
            TypeKind::Primitive(p) => write!(f, "{p}"),
            TypeKind::Record(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", format_field_name(&field.name), field.ty)?;
                }
                write!(f, "}}")
            }
            TypeKind::Array(t) => write!(f, "[{t}]"),
            TypeKind::Set(t) => write!(f, "|[{t}]|"),
            TypeKind::Map(k, v) => write!(f, "|{{{k}:{v}}}|"),
            TypeKind::Union(types) => {
                write!(f, "(")?;
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            TypeKind::Enum { symbols, .. } => {
                write!(f, "enum(")?;
                for (i, s) in symbols.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", format_field_name(&s.name))?;
                }
                write!(f, ")")
            }
            TypeKind::Error(t) => write!(f, "error({t})"),
            TypeKind::Named { name, .. } => write!(f, "{}", format_field_name(name)),
        }
    }
}
