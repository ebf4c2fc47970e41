//! Variable expansion for rendered compose documents.
//!
//! The compose template is written against `${VAR}` references which are
//! resolved here from an explicit map, so the document installed into an
//! environment directory is fully expanded and never inherits values from
//! the invoking shell.

use std::collections::BTreeMap;

use crate::{EposctlError, EposctlResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Expands `${VAR}` and `$VAR` references in `input` from `vars`.
///
/// `$$` produces a literal `$`. A reference to a variable missing from the
/// map is an error rather than an empty substitution, so a typo in a
/// template surfaces at render time instead of as a half-configured stack.
pub fn expand(input: &str, vars: &BTreeMap<String, String>) -> EposctlResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }

        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('{') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(EposctlError::custom(anyhow::anyhow!(
                        "unterminated `${{` reference in template"
                    )));
                }
                out.push_str(lookup(vars, &name)?);
            }
            Some(c) if c.is_ascii_alphabetic() || *c == '_' => {
                let mut name = String::new();
                while let Some(c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        name.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(lookup(vars, &name)?);
            }
            _ => out.push('$'),
        }
    }

    Ok(out)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn lookup<'a>(vars: &'a BTreeMap<String, String>, name: &str) -> EposctlResult<&'a str> {
    if name.is_empty() {
        return Err(EposctlError::custom(anyhow::anyhow!(
            "empty variable reference in template"
        )));
    }

    vars.get(name)
        .map(String::as_str)
        .ok_or_else(|| EposctlError::UndefinedVariable(name.to_string()))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expand_braced_and_bare_references() -> anyhow::Result<()> {
        let vars = vars(&[("NAME", "production"), ("PORT", "33000")]);

        assert_eq!(expand("env=${NAME}", &vars)?, "env=production");
        assert_eq!(expand("port: $PORT.", &vars)?, "port: 33000.");
        assert_eq!(expand("${NAME}-$PORT", &vars)?, "production-33000");

        Ok(())
    }

    #[test]
    fn test_expand_dollar_escape_and_literals() -> anyhow::Result<()> {
        let vars = vars(&[("A", "x")]);

        assert_eq!(expand("cost: $$5", &vars)?, "cost: $5");
        assert_eq!(expand("$5 and $ alone", &vars)?, "$5 and $ alone");
        assert_eq!(expand("trailing $", &vars)?, "trailing $");

        Ok(())
    }

    #[test]
    fn test_expand_undefined_variable_is_an_error() {
        let vars = vars(&[]);

        let err = expand("image: ${MISSING}", &vars).unwrap_err();
        assert!(matches!(
            err,
            EposctlError::UndefinedVariable(name) if name == "MISSING"
        ));
    }

    #[test]
    fn test_expand_unterminated_reference_is_an_error() {
        let vars = vars(&[("A", "x")]);
        assert!(expand("broken ${A", &vars).is_err());
    }
}
