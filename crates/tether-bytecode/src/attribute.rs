//! Custom attributes attached to types, members and parameters

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::signature::{TypeName, TypeSig};

/// A constant attribute argument
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    /// Any integral or enum argument
    Int(i64),
    String(String),
    Type(TypeSig),
}

impl AttrValue {
    /// Boolean payload, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload, if any
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// String payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        match self {
            AttrValue::Null => writer.emit_u8(0),
            AttrValue::Bool(b) => {
                writer.emit_u8(1);
                writer.emit_u8(*b as u8);
            }
            AttrValue::Int(i) => {
                writer.emit_u8(2);
                writer.emit_i64(*i);
            }
            AttrValue::String(s) => {
                writer.emit_u8(3);
                writer.emit_string(s);
            }
            AttrValue::Type(sig) => {
                writer.emit_u8(4);
                sig.encode(writer);
            }
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        Ok(match reader.read_u8()? {
            0 => AttrValue::Null,
            1 => AttrValue::Bool(reader.read_u8()? != 0),
            2 => AttrValue::Int(reader.read_i64()?),
            3 => AttrValue::String(reader.read_string()?),
            4 => AttrValue::Type(TypeSig::decode(reader)?),
            tag => {
                return Err(DecodeError::InvalidTag {
                    kind: "attribute value",
                    tag,
                    offset,
                })
            }
        })
    }
}

/// Custom attribute instance
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Attribute type
    pub type_name: TypeName,
    /// Positional constructor arguments
    pub args: Vec<AttrValue>,
    /// Named property arguments
    pub named: Vec<(String, AttrValue)>,
}

impl Attribute {
    /// Create an attribute with no arguments
    pub fn new(type_name: TypeName) -> Self {
        Self {
            type_name,
            args: Vec::new(),
            named: Vec::new(),
        }
    }

    /// Builder: add a positional argument
    pub fn with_arg(mut self, value: AttrValue) -> Self {
        self.args.push(value);
        self
    }

    /// Builder: add a named argument
    pub fn with_named(mut self, name: &str, value: AttrValue) -> Self {
        self.named.push((name.to_string(), value));
        self
    }

    /// Check the attribute type by full name
    pub fn is(&self, full_name: &str) -> bool {
        let ns_len = self.type_name.namespace.len();
        if ns_len == 0 {
            return self.type_name.name == full_name;
        }
        full_name.len() == ns_len + 1 + self.type_name.name.len()
            && full_name.starts_with(self.type_name.namespace.as_str())
            && full_name.as_bytes()[ns_len] == b'.'
            && full_name.ends_with(self.type_name.name.as_str())
    }

    /// Look up a named argument
    pub fn named_arg(&self, name: &str) -> Option<&AttrValue> {
        self.named
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Look up a positional argument
    pub fn arg(&self, index: usize) -> Option<&AttrValue> {
        self.args.get(index)
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        TypeSig::Named(self.type_name.clone()).encode(writer);
        writer.emit_u32(self.args.len() as u32);
        for arg in &self.args {
            arg.encode(writer);
        }
        writer.emit_u32(self.named.len() as u32);
        for (name, value) in &self.named {
            writer.emit_string(name);
            value.encode(writer);
        }
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        let type_name = match TypeSig::decode(reader)? {
            TypeSig::Named(name) => name,
            _ => {
                return Err(DecodeError::InvalidTag {
                    kind: "attribute type",
                    tag: 0,
                    offset,
                })
            }
        };
        let arg_count = reader.read_u32()? as usize;
        let mut args = Vec::with_capacity(arg_count.min(16));
        for _ in 0..arg_count {
            args.push(AttrValue::decode(reader)?);
        }
        let named_count = reader.read_u32()? as usize;
        let mut named = Vec::with_capacity(named_count.min(16));
        for _ in 0..named_count {
            let name = reader.read_string()?;
            named.push((name, AttrValue::decode(reader)?));
        }
        Ok(Self {
            type_name,
            args,
            named,
        })
    }
}

/// Lookup helpers over an attribute list
pub trait AttributeList {
    /// Find the first attribute with the given full name
    fn find_attr(&self, full_name: &str) -> Option<&Attribute>;

    /// Check for an attribute with the given full name
    fn has_attr(&self, full_name: &str) -> bool {
        self.find_attr(full_name).is_some()
    }
}

impl AttributeList for [Attribute] {
    fn find_attr(&self, full_name: &str) -> Option<&Attribute> {
        self.iter().find(|attr| attr.is(full_name))
    }
}

impl AttributeList for Vec<Attribute> {
    fn find_attr(&self, full_name: &str) -> Option<&Attribute> {
        self.as_slice().find_attr(full_name)
    }
}

pub(crate) fn encode_attributes(attributes: &[Attribute], writer: &mut BytecodeWriter) {
    writer.emit_u32(attributes.len() as u32);
    for attr in attributes {
        attr.encode(writer);
    }
}

pub(crate) fn decode_attributes(
    reader: &mut BytecodeReader<'_>,
) -> Result<Vec<Attribute>, DecodeError> {
    let count = reader.read_u32()? as usize;
    let mut attributes = Vec::with_capacity(count.min(16));
    for _ in 0..count {
        attributes.push(Attribute::decode(reader)?);
    }
    Ok(attributes)
}
