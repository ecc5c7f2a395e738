use std::sync::Arc;

/// Placeholder replaced with the full instance name of each expansion.
pub const INSTANCE_PLACEHOLDER: &str = "$";

/// A named macro template parsed from a `macro ... end macro` block
#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    /// Tokens of the definition line: keyword, name, formal parameters
    signature: Vec<String>,
    /// Raw body lines. `None` until a complete block has been parsed
    body: Option<Vec<String>>,
    /// Macros inserted inside this macro's body, in declaration order
    insertions: Vec<NestedInsertion>,
}

/// An insertion recorded inside another macro's body
#[derive(Debug, Clone, PartialEq)]
pub struct NestedInsertion {
    pub target: Arc<Macro>,
    /// Tokens of the insertion line: keyword, instance name, macro name, arguments
    pub signature: Vec<String>,
}

impl Macro {
    /// A macro known only by its signature. Expands to no lines of its own.
    pub fn declared(signature: Vec<String>) -> Self {
        Self {
            signature,
            body: None,
            insertions: Vec::new(),
        }
    }

    pub fn new(
        signature: Vec<String>,
        body: Vec<String>,
        insertions: Vec<NestedInsertion>,
    ) -> Self {
        Self {
            signature,
            body: Some(body),
            insertions,
        }
    }

    /// Declared name (second signature token)
    pub fn name(&self) -> &str {
        self.signature.get(1).map(String::as_str).unwrap_or_default()
    }

    pub fn signature(&self) -> &[String] {
        &self.signature
    }

    /// Formal parameter tokens, matched against invocation arguments by position
    pub fn params(&self) -> &[String] {
        self.signature.get(2..).unwrap_or_default()
    }

    /// Body lines, or `None` if this macro was never parsed as a full block
    pub fn body(&self) -> Option<&[String]> {
        self.body.as_deref()
    }

    pub fn insertions(&self) -> &[NestedInsertion] {
        &self.insertions
    }

    /// True when there is no body content to expand
    pub fn is_empty(&self) -> bool {
        self.body.is_none()
    }
}

impl NestedInsertion {
    pub fn instance_name(&self) -> &str {
        self.signature.get(1).map(String::as_str).unwrap_or_default()
    }
}
