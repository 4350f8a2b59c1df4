//! pkg-config descriptor parsing
//!
//! Just enough of the `.pc` format for provider synthesis: variable
//! definitions with `${var}` expansion, plus the Name / Version /
//! Requires fields. Compile and link flags are irrelevant to packaging
//! and are carried through untouched as opaque fields we never read.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PcError {
    #[error("missing {field} field")]
    MissingField { field: &'static str },

    #[error("undefined variable ${{{name}}}")]
    UndefinedVariable { name: String },

    #[error("unparseable line: {line:?}")]
    Malformed { line: String },
}

/// The slice of a pkg-config descriptor the scanner consumes
#[derive(Debug, Clone, Default)]
pub struct PcDescriptor {
    pub name: String,
    pub version: String,
    pub requires: Vec<String>,
    pub requires_private: Vec<String>,
}

/// Parse a `.pc` document.
///
/// # Errors
///
/// Returns an error for a line with no `=`/`:` separator, a reference to
/// an undefined variable, or a descriptor lacking `Name:`/`Version:`.
pub fn parse(source: &str) -> Result<PcDescriptor, PcError> {
    let mut variables: HashMap<String, String> = HashMap::new();
    let mut fields: HashMap<String, String> = HashMap::new();

    for raw in source.lines() {
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Whichever separator comes first decides whether this is a
        // variable definition or a keyword field.
        let eq = line.find('=');
        let colon = line.find(':');
        match (eq, colon) {
            (Some(e), None) => {
                let key = line[..e].trim().to_string();
                let value = expand(line[e + 1..].trim(), &variables)?;
                variables.insert(key, value);
            }
            (Some(e), c) if c.map_or(true, |c| e < c) => {
                let key = line[..e].trim().to_string();
                let value = expand(line[e + 1..].trim(), &variables)?;
                variables.insert(key, value);
            }
            (_, Some(c)) => {
                let key = line[..c].trim().to_string();
                let value = expand(line[c + 1..].trim(), &variables)?;
                fields.insert(key, value);
            }
            (None, None) => {
                return Err(PcError::Malformed {
                    line: line.to_string(),
                })
            }
        }
    }

    let name = fields
        .remove("Name")
        .ok_or(PcError::MissingField { field: "Name" })?;
    let version = fields
        .remove("Version")
        .ok_or(PcError::MissingField { field: "Version" })?;

    Ok(PcDescriptor {
        name,
        version,
        requires: split_requires(fields.get("Requires").map_or("", String::as_str)),
        requires_private: split_requires(
            fields.get("Requires.private").map_or("", String::as_str),
        ),
    })
}

fn expand(value: &str, variables: &HashMap<String, String>) -> Result<String, PcError> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(PcError::Malformed {
                line: value.to_string(),
            });
        };
        let name = &after[..end];
        let substitution = variables
            .get(name)
            .ok_or_else(|| PcError::UndefinedVariable {
                name: name.to_string(),
            })?;
        out.push_str(substitution);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Extract the module identifiers from a Requires list, dropping any
/// version constraints (`glib-2.0 >= 2.50, gio-2.0` yields both names).
fn split_requires(value: &str) -> Vec<String> {
    const OPERATOR_CHARS: [char; 4] = ['<', '>', '=', '!'];

    let mut out = Vec::new();
    let mut skip_version = false;
    for token in value
        .split([',', ' ', '\t'])
        .filter(|token| !token.is_empty())
    {
        if skip_version {
            skip_version = false;
            continue;
        }
        match token.find(OPERATOR_CHARS) {
            Some(0) => {
                // ">=" alone means the version follows as its own token,
                // ">=2.76" already carries it
                skip_version = token.chars().all(|c| OPERATOR_CHARS.contains(&c));
            }
            Some(pos) => out.push(token[..pos].to_string()),
            None => out.push(token.to_string()),
        }
    }
    out
}
