//! Quest macro expansion.
//!
//! Parses `macro ... end macro` blocks out of quest scripts, resolves
//! `import macro` directives against quest-pack files and flattens
//! `macro <instance>: <Name> ...` insertions into plain script lines.

pub mod ast;
pub mod config;
pub mod error;
pub mod import;
pub mod parser;
pub mod processor;

pub use ast::{Macro, NestedInsertion};
pub use config::MacroConfig;
pub use error::{MacroError, Result};
pub use import::{FsQuestResources, MacroSession, MemoryQuestResources, QuestResources};
pub use parser::{Directive, classify, parse_definition};
pub use processor::{MacroRegistry, expand_script, flatten, resolve_macro};
