use std::sync::Arc;

use log::debug;
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::ast::{Macro, NestedInsertion};
use crate::error::{MacroError, Result};
use crate::processor::{MacroRegistry, lookup_insertion};

#[derive(Parser)]
#[grammar = "src/directive.pest"]
pub struct DirectiveParser;

/// A classified script line
#[derive(Debug, Clone, PartialEq)]
pub enum Directive<'a> {
    /// `macro <Name> [params...]`: whitespace tokens, keyword included
    Definition(Vec<&'a str>),
    /// `macro <instance>: <Name> [args...]`: tokens split on whitespace and `:`
    Insertion(Vec<&'a str>),
    /// `import macro <Name> from <File>`: whitespace tokens
    Import(Vec<&'a str>),
    /// `end macro`
    EndMarker,
    /// Any other line, verbatim
    BodyLine(&'a str),
}

/// Classify a single script line.
///
/// Lines the grammar cannot make sense of are treated as plain body lines.
pub fn classify(line: &str) -> Directive<'_> {
    let Ok(mut pairs) = DirectiveParser::parse(Rule::line, line) else {
        return Directive::BodyLine(line);
    };
    let Some(directive) = pairs.next().and_then(|pair| pair.into_inner().next()) else {
        return Directive::BodyLine(line);
    };

    match directive.as_rule() {
        Rule::definition => Directive::Definition(tokens(directive)),
        Rule::insertion => Directive::Insertion(tokens(directive)),
        Rule::import => Directive::Import(tokens(directive)),
        Rule::end_marker => Directive::EndMarker,
        _ => Directive::BodyLine(line),
    }
}

fn tokens(pair: Pair<'_, Rule>) -> Vec<&str> {
    pair.into_inner().map(|p| p.as_str()).collect()
}

pub(crate) fn owned(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}

/// Parse the macro definition starting at `lines[start]`.
///
/// Nested definitions are registered into `registry` as they are parsed, so
/// they are visible to the rest of the block and to the caller. Insertions
/// must reference macros already present in `registry`.
///
/// Returns the macro and the number of lines consumed, header and
/// `end macro` included.
pub fn parse_definition<S: AsRef<str>>(
    lines: &[S],
    start: usize,
    registry: &mut MacroRegistry,
) -> Result<(Macro, usize)> {
    let header: &str = lines.get(start).map(|l| l.as_ref()).unwrap_or_default();
    let signature = match classify(header) {
        Directive::Definition(tokens) if tokens.len() >= 2 => owned(&tokens),
        _ => {
            return Err(MacroError::MalformedDefinition {
                line: start + 1,
                text: header.trim().to_string(),
            });
        }
    };

    let mut body = Vec::new();
    let mut insertions = Vec::new();
    let mut cursor = start + 1;

    while let Some(line) = lines.get(cursor) {
        let line: &str = line.as_ref();
        match classify(line) {
            Directive::EndMarker => {
                let consumed = cursor + 1 - start;
                return Ok((Macro::new(signature, body, insertions), consumed));
            }
            Directive::Definition(_) => {
                let (nested, consumed) = parse_definition(lines, cursor, registry)?;
                debug!("registered nested macro `{}` in `{}`", nested.name(), signature[1]);
                registry.define(Arc::new(nested));
                cursor += consumed;
                continue;
            }
            Directive::Insertion(tokens) => {
                let target = lookup_insertion(&tokens, registry, cursor + 1, line)?;
                insertions.push(NestedInsertion {
                    target: Arc::clone(target),
                    signature: owned(&tokens),
                });
            }
            Directive::Import(_) => {
                return Err(MacroError::MisplacedImport { line: cursor + 1 });
            }
            Directive::BodyLine(text) => body.push(text.to_string()),
        }
        cursor += 1;
    }

    Err(MacroError::UnterminatedDefinition {
        line: start + 1,
        name: signature[1].clone(),
    })
}
