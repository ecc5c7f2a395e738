use std::path::PathBuf;

/// Errors raised while parsing, importing or expanding quest macros.
///
/// Line numbers are 1-based positions in the line stream being processed.
#[derive(Debug, thiserror::Error)]
pub enum MacroError {
    #[error("line {line}: macro definition has no name: `{text}`")]
    MalformedDefinition { line: usize, text: String },

    #[error("line {line}: macro `{name}` is missing `end macro`")]
    UnterminatedDefinition { line: usize, name: String },

    #[error("line {line}: `import macro` is not allowed inside a macro definition")]
    MisplacedImport { line: usize },

    #[error("line {line}: unknown macro `{name}`")]
    UnknownMacro { line: usize, name: String },

    #[error("line {line}: macro `{name}` not found in `{file}`")]
    ImportNotFound {
        line: usize,
        name: String,
        file: String,
    },

    #[error("in `{file}`: {source}")]
    Imported {
        file: String,
        source: Box<MacroError>,
    },

    #[error("malformed import directive: `{text}`")]
    MalformedImport { text: String },

    #[error("line {line}: malformed macro insertion: `{text}`")]
    MalformedInsertion { line: usize, text: String },

    #[error("line {line}: `end macro` outside of a macro definition")]
    UnexpectedEndMarker { line: usize },

    #[error("config error in {file}: {message}")]
    Config { file: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MacroError>;
