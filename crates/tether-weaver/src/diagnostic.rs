//! Validation diagnostics
//!
//! Author mistakes are accumulated as diagnostics rather than returned as
//! errors, so a single run reports every problem in a module. Each diagnostic
//! carries an error code, the symbol it refers to (`Namespace.Type::Member`)
//! and the best source location available from the module's debug tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use tether_bytecode::SourceLocation;

/// Error code for a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Diagnostic codes
///
/// E1xxx enums, E2xxx structs, E3xxx classes and constructors, E4xxx members,
/// E5xxx functions, E6xxx rewriting.
pub mod codes {
    use super::ErrorCode;

    pub const ENUM_BACKING_TYPE: ErrorCode = ErrorCode("E1001");
    pub const ENUM_SEQUENCE: ErrorCode = ErrorCode("E1002");

    pub const STRUCT_DECLARES_BLITTABLE: ErrorCode = ErrorCode("E2001");
    pub const STRUCT_ACCESSOR_MEMBER: ErrorCode = ErrorCode("E2002");
    pub const STRUCT_MARSHAL_CONFLICT: ErrorCode = ErrorCode("E2003");

    pub const MISSING_CONSTRUCTION_CTOR: ErrorCode = ErrorCode("E3001");
    pub const MISSING_REHYDRATION_CTOR: ErrorCode = ErrorCode("E3002");
    pub const DUPLICATE_CTOR: ErrorCode = ErrorCode("E3003");
    pub const UNSUPPORTED_CTOR: ErrorCode = ErrorCode("E3004");
    pub const NOT_NATIVE_DERIVED: ErrorCode = ErrorCode("E3005");
    pub const NATIVE_NAME_COLLISION: ErrorCode = ErrorCode("E3010");

    pub const UNSUPPORTED_TYPE: ErrorCode = ErrorCode("E4001");
    pub const PRIVATE_EXPOSURE: ErrorCode = ErrorCode("E4002");
    pub const MISSING_CATEGORY: ErrorCode = ErrorCode("E4003");
    pub const UNUSED_CATEGORY: ErrorCode = ErrorCode("E4004");
    pub const MISSING_REPLICATION_CONDITION: ErrorCode = ErrorCode("E4005");
    pub const INVALID_CUSTOM_CONDITION: ErrorCode = ErrorCode("E4006");
    pub const INVALID_REP_NOTIFY: ErrorCode = ErrorCode("E4007");
    pub const MISSING_ARRAY_DIM: ErrorCode = ErrorCode("E4008");
    pub const NESTED_CONTAINER: ErrorCode = ErrorCode("E4009");
    pub const EXPOSED_CLASS_FIELD: ErrorCode = ErrorCode("E4010");
    pub const PROPERTY_WITHOUT_GETTER: ErrorCode = ErrorCode("E4011");
    pub const STATIC_MEMBER: ErrorCode = ErrorCode("E4012");

    pub const FUNCTION_OUTSIDE_CLASS: ErrorCode = ErrorCode("E5001");
    pub const INVALID_FUNCTION_FLAGS: ErrorCode = ErrorCode("E5002");
    pub const FUNCTION_WITHOUT_BODY: ErrorCode = ErrorCode("E5003");
    pub const MISSING_VALIDATE_METHOD: ErrorCode = ErrorCode("E5004");
    pub const GENERATED_NAME_CONFLICT: ErrorCode = ErrorCode("E5005");
    pub const FIXED_ARRAY_PARAMETER: ErrorCode = ErrorCode("E5006");

    pub const UNSUPPORTED_INITIALIZER: ErrorCode = ErrorCode("E6001");
    pub const BASE_CTOR_CALL_NOT_FOUND: ErrorCode = ErrorCode("E6002");
    pub const SETTER_STILL_REFERENCED: ErrorCode = ErrorCode("E6003");
    pub const BACKING_FIELD_ADDRESS: ErrorCode = ErrorCode("E6004");
}

/// Severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<ErrorCode>,
    pub message: String,
    /// Symbol the diagnostic refers to, e.g. `Game.Pawn::Health`
    pub symbol: Option<String>,
    pub location: Option<SourceLocation>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Create a new diagnostic
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            code: None,
            message: message.into(),
            symbol: None,
            location: None,
            notes: Vec::new(),
        }
    }

    /// Create an error diagnostic
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Create a warning diagnostic
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Set the error code
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach the symbol this diagnostic refers to
    pub fn at_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Attach a source location, keeping any more specific one already set
    pub fn with_location(mut self, location: Option<SourceLocation>) -> Self {
        if self.location.is_none() {
            self.location = location;
        }
        self
    }

    /// Add a note (additional context)
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Add a help suggestion
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.notes.push(format!("help: {}", help.into()));
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render as plain text, one header line followed by location and notes
    pub fn render(&self) -> String {
        let mut out = String::new();
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.code {
            Some(code) => out.push_str(&format!("{}[{}]: {}", severity, code, self.message)),
            None => out.push_str(&format!("{}: {}", severity, self.message)),
        }
        if let Some(loc) = &self.location {
            out.push_str(&format!("\n  --> {}:{}:{}", loc.file, loc.line, loc.column));
        }
        if let Some(symbol) = &self.symbol {
            out.push_str(&format!("\n  in {}", symbol));
        }
        for note in &self.notes {
            out.push_str(&format!("\n  = {}", note));
        }
        out
    }

    /// Format as JSON for IDE integration
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&JsonDiagnostic::from_diagnostic(self))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// JSON representation of a diagnostic for IDE integration
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonDiagnostic {
    /// Error code (e.g., "E3002")
    pub code: Option<String>,
    /// Severity level
    pub severity: Severity,
    /// Main error message
    pub message: String,
    /// Symbol the diagnostic refers to
    pub symbol: Option<String>,
    /// Source file path
    pub file: Option<String>,
    /// Line (1-indexed)
    pub line: Option<u32>,
    /// Column (1-indexed)
    pub column: Option<u32>,
    /// Additional notes and help
    pub notes: Vec<String>,
}

impl JsonDiagnostic {
    /// Convert a Diagnostic to JSON representation
    pub fn from_diagnostic(diag: &Diagnostic) -> Self {
        JsonDiagnostic {
            code: diag.code.map(|c| c.0.to_string()),
            severity: diag.severity,
            message: diag.message.clone(),
            symbol: diag.symbol.clone(),
            file: diag.location.as_ref().map(|l| l.file.clone()),
            line: diag.location.as_ref().map(|l| l.line),
            column: diag.location.as_ref().map(|l| l.column),
            notes: diag.notes.clone(),
        }
    }
}

/// Accumulated diagnostics for one module
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diagnostics);
    }

    /// Check whether any error-severity diagnostic was recorded
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.items.len() - self.error_count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    /// Errors only
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.is_error())
    }

    /// Check for an error with the given code
    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.items.iter().any(|d| d.code == Some(code))
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }

    /// Format all diagnostics as a JSON array
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let items: Vec<JsonDiagnostic> = self.items.iter().map(JsonDiagnostic::from_diagnostic).collect();
        serde_json::to_string_pretty(&items)
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
