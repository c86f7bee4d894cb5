//! Type signatures
//!
//! A signature names a type as it appears in a member declaration or a member
//! reference. Named types are referenced by namespace and name, so a signature
//! can point at a type in another module.

use std::fmt;

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

/// Namespace-qualified type name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName {
    /// Namespace (may be empty)
    pub namespace: String,
    /// Simple name
    pub name: String,
}

impl TypeName {
    /// Create a new type name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a dotted full name; the last segment is the simple name
    pub fn parse(full_name: &str) -> Self {
        match full_name.rfind('.') {
            Some(idx) => Self::new(&full_name[..idx], &full_name[idx + 1..]),
            None => Self::new("", full_name),
        }
    }

    /// Dotted full name
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.namespace);
        writer.emit_string(&self.name);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let namespace = reader.read_string()?;
        let name = reader.read_string()?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.namespace, self.name)
        }
    }
}

/// Type signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    Void,
    Bool,
    Char,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    String,
    /// Pointer-sized integer
    IntPtr,
    Object,
    /// Class, struct, enum or interface referenced by name
    Named(TypeName),
    /// Generic instantiation, e.g. `IList<int>`
    Generic { base: TypeName, args: Vec<TypeSig> },
    /// Managed single-dimension array
    Array(Box<TypeSig>),
    /// Managed reference (`ref`/`out` parameter)
    ByRef(Box<TypeSig>),
}

impl TypeSig {
    /// Shorthand for a named type signature
    pub fn named(namespace: &str, name: &str) -> Self {
        TypeSig::Named(TypeName::new(namespace, name))
    }

    /// Shorthand for a generic instantiation
    pub fn generic(namespace: &str, name: &str, args: Vec<TypeSig>) -> Self {
        TypeSig::Generic {
            base: TypeName::new(namespace, name),
            args,
        }
    }

    /// The referenced type name, for named and generic signatures
    pub fn type_name(&self) -> Option<&TypeName> {
        match self {
            TypeSig::Named(name) => Some(name),
            TypeSig::Generic { base, .. } => Some(base),
            _ => None,
        }
    }

    /// Strip one level of by-ref
    pub fn strip_by_ref(&self) -> &TypeSig {
        match self {
            TypeSig::ByRef(inner) => inner,
            other => other,
        }
    }

    /// Check if this is a by-ref signature
    pub fn is_by_ref(&self) -> bool {
        matches!(self, TypeSig::ByRef(_))
    }

    /// Check if this is `void`
    pub fn is_void(&self) -> bool {
        matches!(self, TypeSig::Void)
    }

    /// Encode the signature
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        match self {
            TypeSig::Void => writer.emit_u8(0),
            TypeSig::Bool => writer.emit_u8(1),
            TypeSig::Char => writer.emit_u8(2),
            TypeSig::I8 => writer.emit_u8(3),
            TypeSig::U8 => writer.emit_u8(4),
            TypeSig::I16 => writer.emit_u8(5),
            TypeSig::U16 => writer.emit_u8(6),
            TypeSig::I32 => writer.emit_u8(7),
            TypeSig::U32 => writer.emit_u8(8),
            TypeSig::I64 => writer.emit_u8(9),
            TypeSig::U64 => writer.emit_u8(10),
            TypeSig::F32 => writer.emit_u8(11),
            TypeSig::F64 => writer.emit_u8(12),
            TypeSig::String => writer.emit_u8(13),
            TypeSig::IntPtr => writer.emit_u8(14),
            TypeSig::Object => writer.emit_u8(15),
            TypeSig::Named(name) => {
                writer.emit_u8(16);
                name.encode(writer);
            }
            TypeSig::Generic { base, args } => {
                writer.emit_u8(17);
                base.encode(writer);
                writer.emit_u32(args.len() as u32);
                for arg in args {
                    arg.encode(writer);
                }
            }
            TypeSig::Array(elem) => {
                writer.emit_u8(18);
                elem.encode(writer);
            }
            TypeSig::ByRef(inner) => {
                writer.emit_u8(19);
                inner.encode(writer);
            }
        }
    }

    /// Decode a signature
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        let tag = reader.read_u8()?;
        Ok(match tag {
            0 => TypeSig::Void,
            1 => TypeSig::Bool,
            2 => TypeSig::Char,
            3 => TypeSig::I8,
            4 => TypeSig::U8,
            5 => TypeSig::I16,
            6 => TypeSig::U16,
            7 => TypeSig::I32,
            8 => TypeSig::U32,
            9 => TypeSig::I64,
            10 => TypeSig::U64,
            11 => TypeSig::F32,
            12 => TypeSig::F64,
            13 => TypeSig::String,
            14 => TypeSig::IntPtr,
            15 => TypeSig::Object,
            16 => TypeSig::Named(TypeName::decode(reader)?),
            17 => {
                let base = TypeName::decode(reader)?;
                let count = reader.read_u32()? as usize;
                let mut args = Vec::with_capacity(count.min(16));
                for _ in 0..count {
                    args.push(TypeSig::decode(reader)?);
                }
                TypeSig::Generic { base, args }
            }
            18 => TypeSig::Array(Box::new(TypeSig::decode(reader)?)),
            19 => TypeSig::ByRef(Box::new(TypeSig::decode(reader)?)),
            tag => {
                return Err(DecodeError::InvalidTag {
                    kind: "type signature",
                    tag,
                    offset,
                })
            }
        })
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Void => write!(f, "void"),
            TypeSig::Bool => write!(f, "bool"),
            TypeSig::Char => write!(f, "char"),
            TypeSig::I8 => write!(f, "sbyte"),
            TypeSig::U8 => write!(f, "byte"),
            TypeSig::I16 => write!(f, "short"),
            TypeSig::U16 => write!(f, "ushort"),
            TypeSig::I32 => write!(f, "int"),
            TypeSig::U32 => write!(f, "uint"),
            TypeSig::I64 => write!(f, "long"),
            TypeSig::U64 => write!(f, "ulong"),
            TypeSig::F32 => write!(f, "float"),
            TypeSig::F64 => write!(f, "double"),
            TypeSig::String => write!(f, "string"),
            TypeSig::IntPtr => write!(f, "nint"),
            TypeSig::Object => write!(f, "object"),
            TypeSig::Named(name) => write!(f, "{}", name),
            TypeSig::Generic { base, args } => {
                write!(f, "{}<", base)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ">")
            }
            TypeSig::Array(elem) => write!(f, "{}[]", elem),
            TypeSig::ByRef(inner) => write!(f, "ref {}", inner),
        }
    }
}
