use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, warn};

use crate::ast::{INSTANCE_PLACEHOLDER, Macro};
use crate::error::{MacroError, Result};
use crate::import::{MacroSession, QuestResources, import_target};
use crate::parser::{Directive, classify, owned, parse_definition};

/// Script-scope registry of macro definitions, keyed by name.
///
/// Redefining a name replaces the earlier macro; macros already holding the
/// old definition as a nested insertion keep it.
#[derive(Debug, Default, Clone)]
pub struct MacroRegistry(HashMap<String, Arc<Macro>>);

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a macro under its own name, returning the definition it replaced
    pub fn define(&mut self, definition: Arc<Macro>) -> Option<Arc<Macro>> {
        let name = definition.name().to_string();
        self.define_as(name, definition)
    }

    /// Register a macro under an alias, e.g. the spelling used by an import
    pub fn define_as(
        &mut self,
        name: impl Into<String>,
        definition: Arc<Macro>,
    ) -> Option<Arc<Macro>> {
        let name = name.into();
        let previous = self.0.insert(name.clone(), definition);
        if previous.is_some() {
            warn!("macro `{name}` redefined");
        }
        previous
    }

    /// Get a macro definition by name
    pub fn get(&self, name: &str) -> Option<&Arc<Macro>> {
        self.0.get(name)
    }

    /// Check if a macro is defined
    pub fn is_defined(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Find the macro an insertion line refers to.
///
/// `tokens` is the insertion split on whitespace and `:`; the target name is
/// the third token.
pub(crate) fn lookup_insertion<'r>(
    tokens: &[&str],
    registry: &'r MacroRegistry,
    line: usize,
    text: &str,
) -> Result<&'r Arc<Macro>> {
    let [_, _, name, ..] = tokens else {
        return Err(MacroError::MalformedInsertion {
            line,
            text: text.trim().to_string(),
        });
    };

    registry.get(name).ok_or_else(|| {
        error!("line {line}: macro `{name}` is not defined before use");
        MacroError::UnknownMacro {
            line,
            name: name.to_string(),
        }
    })
}

/// Expand a single `macro <instance>: <Name> [args...]` line into script lines.
pub fn resolve_macro(line: &str, registry: &MacroRegistry) -> Result<Vec<String>> {
    resolve_at(line, 1, registry)
}

fn resolve_at(text: &str, line: usize, registry: &MacroRegistry) -> Result<Vec<String>> {
    let Directive::Insertion(tokens) = classify(text) else {
        return Err(MacroError::MalformedInsertion {
            line,
            text: text.trim().to_string(),
        });
    };
    let target = lookup_insertion(&tokens, registry, line, text)?;

    let mut out = Vec::new();
    flatten(target, &owned(&tokens), None, &mut out);
    Ok(out)
}

/// Flatten one expansion of `definition` into `out`.
///
/// `invocation` holds the insertion tokens (keyword, instance name, macro
/// name, arguments). Body lines come first, then every nested insertion in
/// declaration order, each instance named `<parent>.<instance>`. Nested
/// insertions expand with the tokens recorded at parse time; the enclosing
/// frame's parameters are not applied to them.
pub fn flatten(
    definition: &Macro,
    invocation: &[String],
    parent: Option<&str>,
    out: &mut Vec<String>,
) {
    let local = invocation.get(1).map(String::as_str).unwrap_or_default();
    let instance = match parent {
        Some(parent) => format!("{parent}.{local}"),
        None => local.to_string(),
    };
    let bindings = bind(definition, invocation);

    if let Some(body) = definition.body() {
        out.extend(
            body.iter()
                .map(|line| substitute(line, &instance, &bindings).trim().to_string()),
        );
    }

    for nested in definition.insertions() {
        flatten(&nested.target, &nested.signature, Some(&instance), out);
    }
}

/// Pair formal parameters with invocation arguments by position
fn bind<'a>(definition: &'a Macro, invocation: &'a [String]) -> Vec<(&'a str, &'a str)> {
    let params = definition.params();
    let args = invocation.get(3..).unwrap_or_default();
    if args.len() < params.len() {
        warn!(
            "macro `{}` expects {} arguments, got {}",
            definition.name(),
            params.len(),
            args.len()
        );
    }

    params
        .iter()
        .zip(args)
        .map(|(param, arg)| (param.as_str(), arg.as_str()))
        .collect()
}

/// Plain substring replacement: placeholder first, then parameters in order
fn substitute(line: &str, instance: &str, bindings: &[(&str, &str)]) -> String {
    let mut line = line.replace(INSTANCE_PLACEHOLDER, instance);
    for (param, arg) in bindings {
        line = line.replace(param, arg);
    }
    line
}

/// Expand every macro directive in a quest script block.
///
/// Definitions and imports are registered in a script-local registry and
/// removed from the output; insertions are replaced by their flattened
/// lines; all other lines pass through unchanged.
pub fn expand_script<S, R>(lines: &[S], session: &MacroSession<R>) -> Result<Vec<String>>
where
    S: AsRef<str>,
    R: QuestResources,
{
    let mut registry = MacroRegistry::new();
    let mut out = Vec::with_capacity(lines.len());
    let mut cursor = 0;

    while let Some(text) = lines.get(cursor) {
        let text: &str = text.as_ref();
        let line = cursor + 1;
        match classify(text) {
            Directive::Definition(_) => {
                let (definition, consumed) = parse_definition(lines, cursor, &mut registry)?;
                debug!("line {line}: registered macro `{}`", definition.name());
                registry.define(Arc::new(definition));
                cursor += consumed;
                continue;
            }
            Directive::Import(tokens) => {
                let (name, file) = import_target(&tokens).unwrap_or_default();
                let Some(imported) = session.import(text)? else {
                    return Err(MacroError::ImportNotFound {
                        line,
                        name: name.to_string(),
                        file: file.to_string(),
                    });
                };
                // callers insert by the name the directive spells
                if name != imported.name() {
                    registry.define_as(name, Arc::clone(&imported));
                }
                registry.define(imported);
            }
            Directive::Insertion(_) => out.extend(resolve_at(text, line, &registry)?),
            Directive::EndMarker => return Err(MacroError::UnexpectedEndMarker { line }),
            Directive::BodyLine(text) => out.push(text.to_string()),
        }
        cursor += 1;
    }

    Ok(out)
}
