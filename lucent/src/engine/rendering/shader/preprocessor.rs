//! Line based `#define`/`#ifdef` expansion for WGSL sources.
//!
//! WGSL has no preprocessor of its own, but shader permutations are still selected through
//! defines the same way they are for GLSL. Supported directives:
//!
//! - `#define NAME [value]` and `#undef NAME`
//! - `#ifdef NAME`, `#ifndef NAME`
//! - `#if EXPR` and `#elif EXPR` where `EXPR` combines `NAME`, `defined(NAME)`, `!`, `&&` and `||`
//! - `#else`, `#endif`
//!
//! Defines with a value are substituted into the remaining source on identifier boundaries.

use crate::rendering::shader::ShaderDefines;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessError {
    pub line: usize,
    pub reason: String,
}

impl PreprocessError {
    fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Branch {
    /// Whether the enclosing block is emitting.
    parent_active: bool,
    /// Whether this branch is currently emitting.
    active: bool,
    /// Whether any branch of this conditional has been taken already.
    taken: bool,
    seen_else: bool,
}

pub struct Preprocessor {
    macros: BTreeMap<String, String>,
}

impl Preprocessor {
    pub fn new(defines: &ShaderDefines) -> Self {
        Self {
            macros: defines
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn is_active(stack: &[Branch]) -> bool {
        stack.last().is_none_or(|b| b.active)
    }

    pub fn process(mut self, source: &str) -> Result<String, PreprocessError> {
        let mut output = String::with_capacity(source.len());
        let mut stack: Vec<Branch> = Vec::new();

        for (i, line) in source.lines().enumerate() {
            let line_no = i + 1;
            let trimmed = line.trim_start();

            let Some(directive) = trimmed.strip_prefix('#') else {
                if Self::is_active(&stack) {
                    output.push_str(&self.substitute(line));
                }
                // Keep line numbers stable for diagnostics.
                output.push('\n');
                continue;
            };

            let directive = directive.trim();
            let (keyword, rest) = directive
                .split_once(char::is_whitespace)
                .map(|(k, r)| (k, r.trim()))
                .unwrap_or((directive, ""));

            let active = Self::is_active(&stack);

            match keyword {
                "define" if active => {
                    let (name, value) = rest
                        .split_once(char::is_whitespace)
                        .map(|(n, v)| (n, v.trim()))
                        .unwrap_or((rest, ""));
                    if !is_identifier(name) {
                        return Err(PreprocessError::new(line_no, format!("invalid macro name '{name}'")));
                    }
                    self.macros.insert(name.to_string(), value.to_string());
                }
                "undef" if active => {
                    self.macros.remove(rest);
                }
                "define" | "undef" => {}
                "ifdef" | "ifndef" => {
                    if !is_identifier(rest) {
                        return Err(PreprocessError::new(line_no, format!("expected identifier after #{keyword}")));
                    }
                    let defined = self.macros.contains_key(rest);
                    let condition = defined == (keyword == "ifdef");
                    stack.push(Branch {
                        parent_active: active,
                        active: active && condition,
                        taken: condition,
                        seen_else: false,
                    });
                }
                "if" => {
                    let condition = self.evaluate(rest, line_no)?;
                    stack.push(Branch {
                        parent_active: active,
                        active: active && condition,
                        taken: condition,
                        seen_else: false,
                    });
                }
                "elif" => {
                    let condition = self.evaluate(rest, line_no)?;
                    let Some(branch) = stack.last_mut() else {
                        return Err(PreprocessError::new(line_no, "#elif without #if"));
                    };
                    if branch.seen_else {
                        return Err(PreprocessError::new(line_no, "#elif after #else"));
                    }
                    let take = !branch.taken && condition;
                    branch.active = branch.parent_active && take;
                    branch.taken |= take;
                }
                "else" => {
                    let Some(branch) = stack.last_mut() else {
                        return Err(PreprocessError::new(line_no, "#else without #if"));
                    };
                    if branch.seen_else {
                        return Err(PreprocessError::new(line_no, "duplicate #else"));
                    }
                    branch.seen_else = true;
                    branch.active = branch.parent_active && !branch.taken;
                    branch.taken = true;
                }
                "endif" => {
                    if stack.pop().is_none() {
                        return Err(PreprocessError::new(line_no, "#endif without #if"));
                    }
                }
                _ if !active => {}
                other => {
                    return Err(PreprocessError::new(line_no, format!("unknown directive #{other}")));
                }
            }

            output.push('\n');
        }

        if !stack.is_empty() {
            return Err(PreprocessError::new(
                source.lines().count(),
                format!("{} unterminated conditional block(s)", stack.len()),
            ));
        }

        Ok(output)
    }

    fn is_truthy(&self, name: &str) -> bool {
        self.macros
            .get(name)
            .is_some_and(|value| value.is_empty() || value.trim() != "0")
    }

    fn evaluate(&self, expression: &str, line: usize) -> Result<bool, PreprocessError> {
        if expression.is_empty() {
            return Err(PreprocessError::new(line, "expected expression"));
        }

        // `||` binds weaker than `&&`, split on it first.
        let mut any = false;
        for alternative in expression.split("||") {
            let mut all = true;
            for term in alternative.split("&&") {
                all &= self.evaluate_term(term.trim(), line)?;
            }
            any |= all;
        }
        Ok(any)
    }

    fn evaluate_term(&self, term: &str, line: usize) -> Result<bool, PreprocessError> {
        if let Some(negated) = term.strip_prefix('!') {
            return Ok(!self.evaluate_term(negated.trim(), line)?);
        }

        if let Some(inner) = term.strip_prefix("defined") {
            let inner = inner.trim();
            let name = inner
                .strip_prefix('(')
                .and_then(|s| s.strip_suffix(')'))
                .unwrap_or(inner)
                .trim();
            if !is_identifier(name) {
                return Err(PreprocessError::new(line, format!("malformed defined() in '{term}'")));
            }
            return Ok(self.macros.contains_key(name));
        }

        match term {
            "0" => Ok(false),
            "1" => Ok(true),
            name if is_identifier(name) => Ok(self.is_truthy(name)),
            _ => Err(PreprocessError::new(line, format!("expected evaluator, found '{term}'"))),
        }
    }

    fn substitute(&self, line: &str) -> String {
        if self.macros.values().all(String::is_empty) {
            return line.to_string();
        }

        let mut result = String::with_capacity(line.len());
        let mut rest = line;

        while let Some(start) = rest.find(is_identifier_start) {
            result.push_str(&rest[..start]);
            let tail = &rest[start..];
            let end = tail
                .find(|c: char| !is_identifier_char(c))
                .unwrap_or(tail.len());
            let ident = &tail[..end];

            match self.macros.get(ident) {
                Some(value) if !value.is_empty() => result.push_str(value),
                _ => result.push_str(ident),
            }
            rest = &tail[end..];
        }

        result.push_str(rest);
        result
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_identifier_start) && chars.all(is_identifier_char)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str, defines: &[(&str, &str)]) -> Result<String, PreprocessError> {
        let defines: ShaderDefines = defines.iter().copied().collect();
        Preprocessor::new(&defines).process(source)
    }

    #[test]
    fn selects_branches_by_defines() {
        let source = "#ifdef SKINNED\nskinned\n#else\nstatic\n#endif\n";

        let skinned = run(source, &[("SKINNED", "")]).unwrap();
        assert!(skinned.contains("skinned"));
        assert!(!skinned.contains("static"));

        let plain = run(source, &[]).unwrap();
        assert!(plain.contains("static"));
        assert!(!plain.contains("skinned"));
    }

    #[test]
    fn evaluates_combined_conditions() {
        let source = "#if defined(A) && !defined(B) || C\nhit\n#elif B\nb\n#endif\n";

        assert!(run(source, &[("A", "")]).unwrap().contains("hit"));
        assert!(run(source, &[("C", "1")]).unwrap().contains("hit"));
        assert!(!run(source, &[("C", "0")]).unwrap().contains("hit"));
        let only_b = run(source, &[("A", ""), ("B", "1")]).unwrap();
        assert!(only_b.contains('b'));
        assert!(!only_b.contains("hit"));
    }

    #[test]
    fn substitutes_valued_macros_on_identifier_boundaries() {
        let source = "#define COUNT 4\nvar<private> lights: array<f32, COUNT>;\nlet COUNTER = 1;\n";
        let out = run(source, &[]).unwrap();

        assert!(out.contains("array<f32, 4>"));
        assert!(out.contains("let COUNTER = 1;"));
    }

    #[test]
    fn keeps_line_numbers_and_reports_unbalanced_blocks() {
        let out = run("a\n#ifdef X\nb\n#endif\nc\n", &[]).unwrap();
        assert_eq!(out.lines().count(), 5);

        let err = run("#ifdef X\nb\n", &[]).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(run("#endif\n", &[]).is_err());
        assert!(run("#if || X\n#endif\n", &[]).is_err());
    }
}
