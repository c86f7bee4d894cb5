//! Constant pool for bytecode modules

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

/// Constant pool containing string literals referenced by `const.str`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    /// String constants
    pub strings: Vec<String>,
}

impl ConstantPool {
    /// Create a new empty constant pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string constant and return its index, reusing an equal entry
    pub fn add_string(&mut self, s: &str) -> u32 {
        if let Some(index) = self.strings.iter().position(|existing| existing == s) {
            return index as u32;
        }
        let index = self.strings.len();
        self.strings.push(s.to_string());
        index as u32
    }

    /// Get a string constant by index
    pub fn get_string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(|s| s.as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Check if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Encode the constant pool
    ///
    /// Format: string count (u32), then each string as length (u32) + UTF-8 bytes
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }
    }

    /// Decode the constant pool
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u32()? as usize;
        let mut strings = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            strings.push(reader.read_string()?);
        }
        Ok(Self { strings })
    }
}
