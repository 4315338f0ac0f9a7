//! The error type shared by every compilation stage.

/// Shorthand for results carrying a [`CompileError`].
pub type Result<T, E = CompileError> = std::result::Result<T, E>;

/// A compile-time failure.
///
/// Every failure aborts the whole compilation; the variants only group
/// messages by category so callers can match on them in tests and tools.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// The source text could not be tokenized or parsed.
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// A statement or expression form outside the supported subset.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Element type, shape or operand-role mismatch, or a conflicting redeclaration.
    #[error("type mismatch: {0}")]
    Type(String),

    /// Rebinding, unknown symbols or unbalanced block nesting.
    #[error("symbol error: {0}")]
    Symbol(String),

    /// Invalid declaration fields, selector values or kernel selection.
    #[error("configuration error: {0}")]
    Config(String),

    /// A memory reference whose shape can neither be read nor inferred.
    #[error(
        "memref {memref} missing shape and cannot be inferred; declare an explicit shape or use only immediate offsets"
    )]
    ShapeInference { memref: String },

    /// A generic instruction carrying a field the lowering pass cannot express.
    #[error("{instruction}: field {field} not supported by the tile assembly exporter")]
    UnsupportedField { instruction: String, field: String },

    /// Host metadata sidecar could not be decoded or inferred.
    #[error("host spec: {0}")]
    HostSpec(String),

    /// Another error, attributed to the statement on `line`.
    #[error("line {line}: {source}")]
    At {
        line: usize,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    /// Attributes the error to a source line unless it already carries one.
    pub fn at(self, line: usize) -> Self {
        match self {
            Self::At { .. } | Self::Syntax { .. } => self,
            other => Self::At {
                line,
                source: Box::new(other),
            },
        }
    }

    /// Returns the innermost error, skipping line attribution.
    pub fn root(&self) -> &CompileError {
        match self {
            Self::At { source, .. } => source.root(),
            other => other,
        }
    }

    /// Source line the error was attributed to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::At { line, .. } | Self::Syntax { line, .. } => Some(*line),
            _ => None,
        }
    }
}
