//! Managed module format
//!
//! A module holds type definitions (with their fields, properties and method
//! bodies), a member-reference table and a type-reference table addressed by
//! instruction tokens, and a string pool.

use crate::attribute::{decode_attributes, encode_attributes, Attribute};
use crate::constants::ConstantPool;
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::signature::{TypeName, TypeSig};
use thiserror::Error;

/// Magic number for module files: "TETH"
pub const MAGIC: [u8; 4] = *b"TETH";

/// Current format version
pub const VERSION: u32 = 1;

const HEADER_SIZE: usize = 16;

/// Module encoding/decoding errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected TETH, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

/// Module flags
pub mod flags {
    /// Module carries source locations
    pub const HAS_DEBUG_INFO: u32 = 1 << 0;
    /// Module has already been rewritten by the weaver
    pub const WOVEN: u32 = 1 << 1;
}

/// Type flags
pub mod type_flags {
    pub const PUBLIC: u32 = 1 << 0;
    pub const ABSTRACT: u32 = 1 << 1;
    pub const SEALED: u32 = 1 << 2;
}

/// Field flags
pub mod field_flags {
    pub const STATIC: u32 = 1 << 0;
    pub const INIT_ONLY: u32 = 1 << 1;
    /// Compile-time constant (enum members)
    pub const LITERAL: u32 = 1 << 2;
    /// Synthesized by the compiler, e.g. an auto-property backing field
    pub const COMPILER_GENERATED: u32 = 1 << 3;
}

/// Method flags
pub mod method_flags {
    pub const STATIC: u32 = 1 << 0;
    pub const VIRTUAL: u32 = 1 << 1;
    pub const ABSTRACT: u32 = 1 << 2;
    pub const SPECIAL_NAME: u32 = 1 << 3;
    pub const COMPILER_GENERATED: u32 = 1 << 4;
}

/// Parameter flags
pub mod param_flags {
    /// `out` parameter: written by the callee, never read
    pub const OUT: u32 = 1 << 0;
}

/// Name of instance constructors
pub const CONSTRUCTOR_NAME: &str = ".ctor";
/// Name of the static type initializer
pub const TYPE_INITIALIZER_NAME: &str = ".cctor";

/// Member accessibility
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Access {
    Private = 0,
    Protected = 1,
    Internal = 2,
    Public = 3,
}

impl Access {
    fn from_u8(byte: u8, offset: usize) -> Result<Self, DecodeError> {
        Ok(match byte {
            0 => Access::Private,
            1 => Access::Protected,
            2 => Access::Internal,
            3 => Access::Public,
            tag => {
                return Err(DecodeError::InvalidTag {
                    kind: "access",
                    tag,
                    offset,
                })
            }
        })
    }
}

/// Kind of a type definition
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class = 0,
    Struct = 1,
    Enum = 2,
    Interface = 3,
}

impl TypeKind {
    fn from_u8(byte: u8, offset: usize) -> Result<Self, DecodeError> {
        Ok(match byte {
            0 => TypeKind::Class,
            1 => TypeKind::Struct,
            2 => TypeKind::Enum,
            3 => TypeKind::Interface,
            tag => {
                return Err(DecodeError::InvalidTag {
                    kind: "type kind",
                    tag,
                    offset,
                })
            }
        })
    }
}

/// Source position of a declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Source file path
    pub file: String,
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
}

impl SourceLocation {
    /// Create a new source location
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    fn encode_opt(location: &Option<SourceLocation>, writer: &mut BytecodeWriter) {
        match location {
            Some(loc) => {
                writer.emit_u8(1);
                writer.emit_string(&loc.file);
                writer.emit_u32(loc.line);
                writer.emit_u32(loc.column);
            }
            None => writer.emit_u8(0),
        }
    }

    fn decode_opt(reader: &mut BytecodeReader<'_>) -> Result<Option<Self>, DecodeError> {
        if reader.read_u8()? == 0 {
            return Ok(None);
        }
        let file = reader.read_string()?;
        let line = reader.read_u32()?;
        let column = reader.read_u32()?;
        Ok(Some(Self { file, line, column }))
    }
}

/// A single entry in a method's line table
///
/// Maps an instruction offset to a source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    /// Offset within the method's code
    pub offset: u32,
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
}

/// Method signature as seen by a caller
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig {
    /// Instance method (argument 0 is `this`)
    pub has_this: bool,
    /// Parameter types
    pub params: Vec<TypeSig>,
    /// Return type
    pub ret: TypeSig,
}

impl MethodSig {
    /// Instance method signature
    pub fn instance(params: Vec<TypeSig>, ret: TypeSig) -> Self {
        Self {
            has_this: true,
            params,
            ret,
        }
    }

    /// Static method signature
    pub fn static_fn(params: Vec<TypeSig>, ret: TypeSig) -> Self {
        Self {
            has_this: false,
            params,
            ret,
        }
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u8(self.has_this as u8);
        writer.emit_u32(self.params.len() as u32);
        for param in &self.params {
            param.encode(writer);
        }
        self.ret.encode(writer);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let has_this = reader.read_u8()? != 0;
        let count = reader.read_u32()? as usize;
        let mut params = Vec::with_capacity(count.min(32));
        for _ in 0..count {
            params.push(TypeSig::decode(reader)?);
        }
        let ret = TypeSig::decode(reader)?;
        Ok(Self {
            has_this,
            params,
            ret,
        })
    }
}

/// Kind of a member reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberRefKind {
    /// Field with its type
    Field { ty: TypeSig, is_static: bool },
    /// Method with its signature
    Method(MethodSig),
}

/// Reference to a field or method, possibly in another module
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Declaring type
    pub owner: TypeSig,
    /// Member name
    pub name: String,
    /// Field or method details
    pub kind: MemberRefKind,
}

impl MemberRef {
    /// Reference to an instance field
    pub fn field(owner: TypeSig, name: &str, ty: TypeSig) -> Self {
        Self {
            owner,
            name: name.to_string(),
            kind: MemberRefKind::Field {
                ty,
                is_static: false,
            },
        }
    }

    /// Reference to a static field
    pub fn static_field(owner: TypeSig, name: &str, ty: TypeSig) -> Self {
        Self {
            owner,
            name: name.to_string(),
            kind: MemberRefKind::Field {
                ty,
                is_static: true,
            },
        }
    }

    /// Reference to a method
    pub fn method(owner: TypeSig, name: &str, sig: MethodSig) -> Self {
        Self {
            owner,
            name: name.to_string(),
            kind: MemberRefKind::Method(sig),
        }
    }

    /// Method signature, if this references a method
    pub fn method_sig(&self) -> Option<&MethodSig> {
        match &self.kind {
            MemberRefKind::Method(sig) => Some(sig),
            MemberRefKind::Field { .. } => None,
        }
    }

    /// Check if this references an instance constructor
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
            && matches!(&self.kind, MemberRefKind::Method(sig) if sig.has_this)
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        self.owner.encode(writer);
        writer.emit_string(&self.name);
        match &self.kind {
            MemberRefKind::Field { ty, is_static } => {
                writer.emit_u8(0);
                ty.encode(writer);
                writer.emit_u8(*is_static as u8);
            }
            MemberRefKind::Method(sig) => {
                writer.emit_u8(1);
                sig.encode(writer);
            }
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let owner = TypeSig::decode(reader)?;
        let name = reader.read_string()?;
        let offset = reader.position();
        let kind = match reader.read_u8()? {
            0 => {
                let ty = TypeSig::decode(reader)?;
                let is_static = reader.read_u8()? != 0;
                MemberRefKind::Field { ty, is_static }
            }
            1 => MemberRefKind::Method(MethodSig::decode(reader)?),
            tag => {
                return Err(DecodeError::InvalidTag {
                    kind: "member reference",
                    tag,
                    offset,
                })
            }
        };
        Ok(Self { owner, name, kind })
    }
}

/// Field definition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeSig,
    pub access: Access,
    /// See [`field_flags`]
    pub flags: u32,
    /// Constant value for literal fields (enum members)
    pub constant: Option<i64>,
    pub attributes: Vec<Attribute>,
    pub source: Option<SourceLocation>,
}

impl FieldDef {
    /// Create a private instance field
    pub fn new(name: &str, ty: TypeSig) -> Self {
        Self {
            name: name.to_string(),
            ty,
            access: Access::Private,
            flags: 0,
            constant: None,
            attributes: Vec::new(),
            source: None,
        }
    }

    pub fn is_static(&self) -> bool {
        self.flags & field_flags::STATIC != 0
    }

    pub fn is_literal(&self) -> bool {
        self.flags & field_flags::LITERAL != 0
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        self.ty.encode(writer);
        writer.emit_u8(self.access as u8);
        writer.emit_u32(self.flags);
        match self.constant {
            Some(value) => {
                writer.emit_u8(1);
                writer.emit_i64(value);
            }
            None => writer.emit_u8(0),
        }
        encode_attributes(&self.attributes, writer);
        SourceLocation::encode_opt(&self.source, writer);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let ty = TypeSig::decode(reader)?;
        let offset = reader.position();
        let access = Access::from_u8(reader.read_u8()?, offset)?;
        let flags = reader.read_u32()?;
        let constant = if reader.read_u8()? != 0 {
            Some(reader.read_i64()?)
        } else {
            None
        };
        let attributes = decode_attributes(reader)?;
        let source = SourceLocation::decode_opt(reader)?;
        Ok(Self {
            name,
            ty,
            access,
            flags,
            constant,
            attributes,
            source,
        })
    }
}

/// Property definition; accessors are indices into the owning type's methods
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    pub name: String,
    pub ty: TypeSig,
    pub getter: Option<u32>,
    pub setter: Option<u32>,
    pub attributes: Vec<Attribute>,
    pub source: Option<SourceLocation>,
}

impl PropertyDef {
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        self.ty.encode(writer);
        for accessor in [self.getter, self.setter] {
            match accessor {
                Some(index) => {
                    writer.emit_u8(1);
                    writer.emit_u32(index);
                }
                None => writer.emit_u8(0),
            }
        }
        encode_attributes(&self.attributes, writer);
        SourceLocation::encode_opt(&self.source, writer);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let ty = TypeSig::decode(reader)?;
        let mut accessors = [None, None];
        for accessor in accessors.iter_mut() {
            if reader.read_u8()? != 0 {
                *accessor = Some(reader.read_u32()?);
            }
        }
        let attributes = decode_attributes(reader)?;
        let source = SourceLocation::decode_opt(reader)?;
        Ok(Self {
            name,
            ty,
            getter: accessors[0],
            setter: accessors[1],
            attributes,
            source,
        })
    }
}

/// Method parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub ty: TypeSig,
    /// See [`param_flags`]
    pub flags: u32,
    pub attributes: Vec<Attribute>,
}

impl ParamDef {
    /// Create a plain input parameter
    pub fn new(name: &str, ty: TypeSig) -> Self {
        Self {
            name: name.to_string(),
            ty,
            flags: 0,
            attributes: Vec::new(),
        }
    }

    pub fn is_out(&self) -> bool {
        self.flags & param_flags::OUT != 0
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        self.ty.encode(writer);
        writer.emit_u32(self.flags);
        encode_attributes(&self.attributes, writer);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let ty = TypeSig::decode(reader)?;
        let flags = reader.read_u32()?;
        let attributes = decode_attributes(reader)?;
        Ok(Self {
            name,
            ty,
            flags,
            attributes,
        })
    }
}

/// Method body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodBody {
    /// Local variable types
    pub locals: Vec<TypeSig>,
    /// Encoded instructions
    pub code: Vec<u8>,
    /// Offset-to-line mapping, sorted by offset
    pub line_table: Vec<LineEntry>,
}

impl MethodBody {
    /// Look up the source line covering an instruction offset
    pub fn lookup_line(&self, offset: u32) -> Option<&LineEntry> {
        if self.line_table.is_empty() {
            return None;
        }
        let idx = self.line_table.partition_point(|e| e.offset <= offset);
        if idx == 0 {
            Some(&self.line_table[0])
        } else {
            Some(&self.line_table[idx - 1])
        }
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.locals.len() as u32);
        for local in &self.locals {
            local.encode(writer);
        }
        writer.emit_blob(&self.code);
        writer.emit_u32(self.line_table.len() as u32);
        for entry in &self.line_table {
            writer.emit_u32(entry.offset);
            writer.emit_u32(entry.line);
            writer.emit_u32(entry.column);
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let local_count = reader.read_u32()? as usize;
        let mut locals = Vec::with_capacity(local_count.min(256));
        for _ in 0..local_count {
            locals.push(TypeSig::decode(reader)?);
        }
        let code = reader.read_blob()?;
        let line_count = reader.read_u32()? as usize;
        let mut line_table = Vec::with_capacity(line_count.min(1024));
        for _ in 0..line_count {
            line_table.push(LineEntry {
                offset: reader.read_u32()?,
                line: reader.read_u32()?,
                column: reader.read_u32()?,
            });
        }
        Ok(Self {
            locals,
            code,
            line_table,
        })
    }
}

/// Method definition
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub name: String,
    pub access: Access,
    /// See [`method_flags`]
    pub flags: u32,
    pub params: Vec<ParamDef>,
    pub return_type: TypeSig,
    /// Absent for abstract methods
    pub body: Option<MethodBody>,
    pub attributes: Vec<Attribute>,
    pub source: Option<SourceLocation>,
}

impl MethodDef {
    /// Create a public instance method with an empty body
    pub fn new(name: &str, params: Vec<ParamDef>, return_type: TypeSig) -> Self {
        Self {
            name: name.to_string(),
            access: Access::Public,
            flags: 0,
            params,
            return_type,
            body: Some(MethodBody::default()),
            attributes: Vec::new(),
            source: None,
        }
    }

    pub fn is_static(&self) -> bool {
        self.flags & method_flags::STATIC != 0
    }

    pub fn is_virtual(&self) -> bool {
        self.flags & method_flags::VIRTUAL != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.flags & method_flags::ABSTRACT != 0
    }

    /// Instance constructor
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME && !self.is_static()
    }

    /// Static type initializer
    pub fn is_type_initializer(&self) -> bool {
        self.name == TYPE_INITIALIZER_NAME && self.is_static()
    }

    /// Number of arguments including `this`
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(!self.is_static())
    }

    /// Caller-side signature
    pub fn signature(&self) -> MethodSig {
        MethodSig {
            has_this: !self.is_static(),
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            ret: self.return_type.clone(),
        }
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_u8(self.access as u8);
        writer.emit_u32(self.flags);
        writer.emit_u32(self.params.len() as u32);
        for param in &self.params {
            param.encode(writer);
        }
        self.return_type.encode(writer);
        match &self.body {
            Some(body) => {
                writer.emit_u8(1);
                body.encode(writer);
            }
            None => writer.emit_u8(0),
        }
        encode_attributes(&self.attributes, writer);
        SourceLocation::encode_opt(&self.source, writer);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let offset = reader.position();
        let access = Access::from_u8(reader.read_u8()?, offset)?;
        let flags = reader.read_u32()?;
        let param_count = reader.read_u32()? as usize;
        let mut params = Vec::with_capacity(param_count.min(32));
        for _ in 0..param_count {
            params.push(ParamDef::decode(reader)?);
        }
        let return_type = TypeSig::decode(reader)?;
        let body = if reader.read_u8()? != 0 {
            Some(MethodBody::decode(reader)?)
        } else {
            None
        };
        let attributes = decode_attributes(reader)?;
        let source = SourceLocation::decode_opt(reader)?;
        Ok(Self {
            name,
            access,
            flags,
            params,
            return_type,
            body,
            attributes,
            source,
        })
    }
}

/// Type definition
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub namespace: String,
    pub kind: TypeKind,
    /// See [`type_flags`]
    pub flags: u32,
    /// Declared base type (classes only)
    pub base: Option<TypeSig>,
    /// Underlying integral type (enums only)
    pub enum_underlying: Option<TypeSig>,
    pub attributes: Vec<Attribute>,
    pub fields: Vec<FieldDef>,
    pub properties: Vec<PropertyDef>,
    pub methods: Vec<MethodDef>,
    pub source: Option<SourceLocation>,
}

impl TypeDef {
    /// Create an empty public type
    pub fn new(namespace: &str, name: &str, kind: TypeKind) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            kind,
            flags: type_flags::PUBLIC,
            base: None,
            enum_underlying: None,
            attributes: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            source: None,
        }
    }

    /// Namespace-qualified name
    pub fn type_name(&self) -> TypeName {
        TypeName::new(&self.namespace, &self.name)
    }

    /// Dotted full name
    pub fn full_name(&self) -> String {
        self.type_name().full_name()
    }

    /// Signature referring to this type
    pub fn as_sig(&self) -> TypeSig {
        TypeSig::Named(self.type_name())
    }

    pub fn is_abstract(&self) -> bool {
        self.flags & type_flags::ABSTRACT != 0
    }

    /// Find a method by name
    pub fn find_method(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    /// Find a field by name
    pub fn find_field(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Find a property by name
    pub fn find_property(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    /// Instance constructors with their method indices
    pub fn constructors(&self) -> impl Iterator<Item = (usize, &MethodDef)> {
        self.methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_constructor())
    }

    /// Index of the static type initializer, if declared
    pub fn type_initializer(&self) -> Option<usize> {
        self.methods.iter().position(|m| m.is_type_initializer())
    }

    /// Add a method and return its index
    pub fn add_method(&mut self, method: MethodDef) -> u32 {
        self.methods.push(method);
        (self.methods.len() - 1) as u32
    }

    /// Remove a method, keeping property accessor indices consistent
    pub fn remove_method(&mut self, index: usize) -> MethodDef {
        let removed = self.methods.remove(index);
        let index = index as u32;
        for property in &mut self.properties {
            for accessor in [&mut property.getter, &mut property.setter] {
                *accessor = match *accessor {
                    Some(i) if i == index => None,
                    Some(i) if i > index => Some(i - 1),
                    other => other,
                };
            }
        }
        removed
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_string(&self.namespace);
        writer.emit_u8(self.kind as u8);
        writer.emit_u32(self.flags);
        for sig in [&self.base, &self.enum_underlying] {
            match sig {
                Some(sig) => {
                    writer.emit_u8(1);
                    sig.encode(writer);
                }
                None => writer.emit_u8(0),
            }
        }
        encode_attributes(&self.attributes, writer);
        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            field.encode(writer);
        }
        writer.emit_u32(self.properties.len() as u32);
        for property in &self.properties {
            property.encode(writer);
        }
        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.encode(writer);
        }
        SourceLocation::encode_opt(&self.source, writer);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let namespace = reader.read_string()?;
        let offset = reader.position();
        let kind = TypeKind::from_u8(reader.read_u8()?, offset)?;
        let flags = reader.read_u32()?;
        let base = if reader.read_u8()? != 0 {
            Some(TypeSig::decode(reader)?)
        } else {
            None
        };
        let enum_underlying = if reader.read_u8()? != 0 {
            Some(TypeSig::decode(reader)?)
        } else {
            None
        };
        let attributes = decode_attributes(reader)?;

        let field_count = reader.read_u32()? as usize;
        let mut fields = Vec::with_capacity(field_count.min(256));
        for _ in 0..field_count {
            fields.push(FieldDef::decode(reader)?);
        }
        let property_count = reader.read_u32()? as usize;
        let mut properties = Vec::with_capacity(property_count.min(256));
        for _ in 0..property_count {
            properties.push(PropertyDef::decode(reader)?);
        }
        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::with_capacity(method_count.min(256));
        for _ in 0..method_count {
            methods.push(MethodDef::decode(reader)?);
        }
        let source = SourceLocation::decode_opt(reader)?;

        Ok(Self {
            name,
            namespace,
            kind,
            flags,
            base,
            enum_underlying,
            attributes,
            fields,
            properties,
            methods,
            source,
        })
    }
}

/// Module metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Module name
    pub name: String,
    /// Names of modules this module references
    pub references: Vec<String>,
}

impl Metadata {
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_u32(self.references.len() as u32);
        for reference in &self.references {
            writer.emit_string(reference);
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let count = reader.read_u32()? as usize;
        let mut references = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            references.push(reader.read_string()?);
        }
        Ok(Self { name, references })
    }
}

/// A compiled managed module
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Magic number (must be "TETH")
    pub magic: [u8; 4],
    /// Format version
    pub version: u32,
    /// Module flags, see [`flags`]
    pub flags: u32,
    /// String pool
    pub constants: ConstantPool,
    /// Type definitions
    pub types: Vec<TypeDef>,
    /// Field and method references, addressed by member tokens
    pub member_refs: Vec<MemberRef>,
    /// Type references, addressed by type tokens
    pub type_refs: Vec<TypeSig>,
    /// Module metadata
    pub metadata: Metadata,
}

impl Module {
    /// Create a new empty module
    pub fn new(name: &str) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            constants: ConstantPool::new(),
            types: Vec::new(),
            member_refs: Vec::new(),
            type_refs: Vec::new(),
            metadata: Metadata {
                name: name.to_string(),
                references: Vec::new(),
            },
        }
    }

    /// Check if the weaver already rewrote this module
    pub fn is_woven(&self) -> bool {
        self.flags & flags::WOVEN != 0
    }

    /// Intern a member reference and return its token
    pub fn intern_member_ref(&mut self, member: MemberRef) -> u32 {
        if let Some(index) = self.member_refs.iter().position(|m| *m == member) {
            return index as u32;
        }
        self.member_refs.push(member);
        (self.member_refs.len() - 1) as u32
    }

    /// Intern a type reference and return its token
    pub fn intern_type_ref(&mut self, sig: TypeSig) -> u32 {
        if let Some(index) = self.type_refs.iter().position(|t| *t == sig) {
            return index as u32;
        }
        self.type_refs.push(sig);
        (self.type_refs.len() - 1) as u32
    }

    /// Intern a string constant and return its index
    pub fn intern_string(&mut self, s: &str) -> u32 {
        self.constants.add_string(s)
    }

    /// Look up a member reference by token
    pub fn member_ref(&self, token: u32) -> Option<&MemberRef> {
        self.member_refs.get(token as usize)
    }

    /// Look up a type reference by token
    pub fn type_ref(&self, token: u32) -> Option<&TypeSig> {
        self.type_refs.get(token as usize)
    }

    /// Find a type definition by name
    pub fn find_type(&self, name: &TypeName) -> Option<usize> {
        self.types
            .iter()
            .position(|t| t.name == name.name && t.namespace == name.namespace)
    }

    /// Validate module structure
    pub fn validate(&self) -> Result<(), String> {
        if self.magic != MAGIC {
            return Err("Invalid magic number".to_string());
        }
        if self.version != VERSION {
            return Err(format!("Unsupported version: {}", self.version));
        }
        Ok(())
    }

    /// Encode the module to binary format
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + flags (u32) + checksum (u32)
    /// - String pool
    /// - Type table
    /// - Member reference table
    /// - Type reference table
    /// - Metadata
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();

        writer.buffer.extend_from_slice(&self.magic);
        writer.emit_u32(self.version);
        writer.emit_u32(self.flags);
        let checksum_offset = writer.reserve_u32();

        self.constants.encode(&mut writer);

        writer.emit_u32(self.types.len() as u32);
        for ty in &self.types {
            ty.encode(&mut writer);
        }

        writer.emit_u32(self.member_refs.len() as u32);
        for member in &self.member_refs {
            member.encode(&mut writer);
        }

        writer.emit_u32(self.type_refs.len() as u32);
        for sig in &self.type_refs {
            sig.encode(&mut writer);
        }

        self.metadata.encode(&mut writer);

        // CRC32 of everything after the header
        let checksum = crc32fast::hash(&writer.buffer[HEADER_SIZE..]);
        writer.patch_u32(checksum_offset, checksum);

        writer.into_bytes()
    }

    /// Decode a module from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ModuleError> {
        let mut reader = BytecodeReader::new(data);

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&reader.read_bytes(4)?);
        if magic != MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ModuleError::UnsupportedVersion(version));
        }

        let flags = reader.read_u32()?;
        let stored_checksum = reader.read_u32()?;

        let calculated_checksum = crc32fast::hash(&data[HEADER_SIZE..]);
        if stored_checksum != calculated_checksum {
            return Err(ModuleError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated_checksum,
            });
        }

        let constants = ConstantPool::decode(&mut reader)?;

        let type_count = reader.read_u32()? as usize;
        let mut types = Vec::with_capacity(type_count.min(1024));
        for _ in 0..type_count {
            types.push(TypeDef::decode(&mut reader)?);
        }

        let member_count = reader.read_u32()? as usize;
        let mut member_refs = Vec::with_capacity(member_count.min(4096));
        for _ in 0..member_count {
            member_refs.push(MemberRef::decode(&mut reader)?);
        }

        let type_ref_count = reader.read_u32()? as usize;
        let mut type_refs = Vec::with_capacity(type_ref_count.min(1024));
        for _ in 0..type_ref_count {
            type_refs.push(TypeSig::decode(&mut reader)?);
        }

        let metadata = Metadata::decode(&mut reader)?;

        Ok(Self {
            magic,
            version,
            flags,
            constants,
            types,
            member_refs,
            type_refs,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttrValue;

    fn sample_class() -> TypeDef {
        let mut ty = TypeDef::new("Game", "Pawn", TypeKind::Class);
        ty.base = Some(TypeSig::named("Tether.Runtime", "NativeObject"));
        ty.attributes.push(
            Attribute::new(TypeName::new("Tether.Attributes", "NativeClass"))
                .with_named("Config", AttrValue::String("Game".to_string())),
        );
        let mut field = FieldDef::new("<Health>k__BackingField", TypeSig::F32);
        field.flags = field_flags::COMPILER_GENERATED;
        ty.fields.push(field);

        let getter = ty.add_method(MethodDef::new("get_Health", vec![], TypeSig::F32));
        let setter = ty.add_method(MethodDef::new(
            "set_Health",
            vec![ParamDef::new("value", TypeSig::F32)],
            TypeSig::Void,
        ));
        ty.properties.push(PropertyDef {
            name: "Health".to_string(),
            ty: TypeSig::F32,
            getter: Some(getter),
            setter: Some(setter),
            attributes: Vec::new(),
            source: Some(SourceLocation::new("Pawn.cs", 12, 5)),
        });
        ty
    }

    #[test]
    fn test_module_creation() {
        let module = Module::new("test");
        assert_eq!(module.magic, MAGIC);
        assert_eq!(module.version, VERSION);
        assert_eq!(module.flags, 0);
        assert!(module.validate().is_ok());
        assert!(!module.is_woven());
    }

    #[test]
    fn test_module_with_types_roundtrip() {
        let mut module = Module::new("Game");
        module.types.push(sample_class());
        let token = module.intern_member_ref(MemberRef::field(
            TypeSig::named("Game", "Pawn"),
            "<Health>k__BackingField",
            TypeSig::F32,
        ));
        assert_eq!(token, 0);
        module.intern_type_ref(TypeSig::named("Game", "Pawn"));
        module.intern_string("Health");
        module.metadata.references.push("Tether.Runtime".to_string());

        let bytes = module.encode();
        let decoded = Module::decode(&bytes).unwrap();
        assert_eq!(decoded, module);
    }

    #[test]
    fn test_member_ref_interning() {
        let mut module = Module::new("test");
        let a = module.intern_member_ref(MemberRef::method(
            TypeSig::named("Tether.Runtime", "NativeObject"),
            "CheckLiveness",
            MethodSig::instance(vec![], TypeSig::Void),
        ));
        let b = module.intern_member_ref(MemberRef::method(
            TypeSig::named("Tether.Runtime", "NativeObject"),
            "CheckLiveness",
            MethodSig::instance(vec![], TypeSig::Void),
        ));
        assert_eq!(a, b);
        assert_eq!(module.member_refs.len(), 1);
    }

    #[test]
    fn test_remove_method_remaps_accessors() {
        let mut ty = sample_class();
        ty.add_method(MethodDef::new("Jump", vec![], TypeSig::Void));
        let setter = ty.properties[0].setter.unwrap() as usize;
        ty.remove_method(setter);

        assert_eq!(ty.properties[0].getter, Some(0));
        assert_eq!(ty.properties[0].setter, None);
        assert_eq!(ty.methods[1].name, "Jump");

        ty.remove_method(0);
        assert_eq!(ty.properties[0].getter, None);
    }

    #[test]
    fn test_module_checksum_validation() {
        let mut module = Module::new("test");
        module.types.push(sample_class());
        let mut bytes = module.encode();
        bytes[20] ^= 0xFF;

        let result = Module::decode(&bytes);
        assert!(matches!(result, Err(ModuleError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_invalid_magic_number() {
        let mut bytes = b"XXXX".to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let result = Module::decode(&bytes);
        assert!(matches!(result, Err(ModuleError::InvalidMagic(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = b"TETH".to_vec();
        bytes.extend_from_slice(&999u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let result = Module::decode(&bytes);
        assert!(matches!(result, Err(ModuleError::UnsupportedVersion(999))));
    }

    #[test]
    fn test_line_lookup() {
        let body = MethodBody {
            locals: vec![],
            code: vec![0; 16],
            line_table: vec![
                LineEntry { offset: 0, line: 10, column: 1 },
                LineEntry { offset: 6, line: 11, column: 9 },
            ],
        };
        assert_eq!(body.lookup_line(3).map(|e| e.line), Some(10));
        assert_eq!(body.lookup_line(6).map(|e| e.line), Some(11));
        assert_eq!(body.lookup_line(15).map(|e| e.line), Some(11));
    }
}
