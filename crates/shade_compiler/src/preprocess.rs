//! Line-oriented preprocessor.
//!
//! Handles comments, line continuations, object- and function-like macros,
//! conditional compilation, `#include` with `#pragma once`, and `#error`.
//! Every output line records the file and line it came from so later stages
//! can report positions in the original source.

use crate::message::{code, Location, Messages};
use shade_common::ShaderMacro;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAX_INCLUDE_DEPTH: usize = 32;
const MAX_EXPANSION_DEPTH: usize = 64;

/// Pragmas accepted without a warning.
const KNOWN_PRAGMAS: &[&str] = &[
    "once",
    "pack_matrix",
    "warning",
    "def",
    "message",
    "region",
    "endregion",
    "dxc",
];

/// Inputs to [`preprocess`].
#[derive(Debug, Clone, Copy)]
pub struct PreprocessInput<'a> {
    /// Source text of the main file.
    pub source: &'a str,
    /// Name used in messages for the main file.
    pub source_name: &'a str,
    /// Directory of the main file, searched first for includes.
    pub source_dir: Option<&'a Path>,
    /// Macros defined before the first line, in order.
    pub macros: &'a [ShaderMacro],
    /// Include search paths, in order.
    pub include_paths: &'a [PathBuf],
}

/// Preprocessor output.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Expanded text, one line per logical input line.
    pub text: String,
    /// Origin of each output line.
    pub lines: Vec<Location>,
    /// Files pulled in through `#include`, in first-seen order.
    pub includes: Vec<PathBuf>,
    /// Messages produced while preprocessing.
    pub messages: Messages,
}

impl Preprocessed {
    /// Maps a 0-based output line and 1-based column back to the source.
    pub fn locate(&self, line: usize, col: u32) -> Option<Location> {
        self.lines.get(line).map(|l| Location::new(l.file.clone(), l.line, col))
    }
}

/// Runs the preprocessor over `input`.
pub fn preprocess(input: &PreprocessInput<'_>) -> Preprocessed {
    let mut pp = Preprocessor {
        include_paths: input.include_paths,
        macros: HashMap::new(),
        once: HashSet::new(),
        out: String::new(),
        lines: Vec::new(),
        includes: Vec::new(),
        messages: Messages::new(),
        depth: 0,
    };
    for m in input.macros {
        let body = if m.definition.is_empty() { "1" } else { m.definition.as_str() };
        pp.macros.insert(
            m.name.clone(),
            Macro {
                params: None,
                body: body.to_string(),
            },
        );
    }
    pp.process_file(
        input.source,
        Arc::from(input.source_name),
        input.source_dir.map(Path::to_path_buf),
        None,
    );
    Preprocessed {
        text: pp.out,
        lines: pp.lines,
        includes: pp.includes,
        messages: pp.messages,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Macro {
    params: Option<Vec<String>>,
    body: String,
}

struct Cond {
    parent_active: bool,
    active: bool,
    taken: bool,
    else_seen: bool,
}

struct Preprocessor<'a> {
    include_paths: &'a [PathBuf],
    macros: HashMap<String, Macro>,
    once: HashSet<PathBuf>,
    out: String,
    lines: Vec<Location>,
    includes: Vec<PathBuf>,
    messages: Messages,
    depth: usize,
}

impl Preprocessor<'_> {
    fn emit(&mut self, text: &str, file: &Arc<str>, line: u32) {
        self.out.push_str(text);
        self.out.push('\n');
        self.lines.push(Location::new(file.clone(), line, 1));
    }

    fn process_file(&mut self, text: &str, name: Arc<str>, dir: Option<PathBuf>, path: Option<PathBuf>) {
        let stripped = strip_comments(text);
        let mut conds: Vec<Cond> = Vec::new();

        for (line_no, logical) in logical_lines(&stripped) {
            let at = |col: u32| Some(Location::new(name.clone(), line_no, col));
            let active = conds.last().map_or(true, |c| c.active);
            let trimmed = logical.trim_start();

            let Some(directive) = trimmed.strip_prefix('#') else {
                if active {
                    let expanded = self.expand(&logical, &mut Vec::new(), 0);
                    self.emit(&expanded, &name, line_no);
                } else {
                    self.emit("", &name, line_no);
                }
                continue;
            };
            self.emit("", &name, line_no);

            let directive = directive.trim_start();
            let kw_len = directive
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(directive.len());
            let (kw, rest) = directive.split_at(kw_len);
            let rest = rest.trim();

            match kw {
                "if" | "ifdef" | "ifndef" => {
                    let value = active
                        && match kw {
                            "ifdef" => self.macros.contains_key(first_ident(rest)),
                            "ifndef" => !self.macros.contains_key(first_ident(rest)),
                            _ => self.eval_condition(rest, at(1)),
                        };
                    conds.push(Cond {
                        parent_active: active,
                        active: value,
                        taken: value,
                        else_seen: false,
                    });
                }
                "elif" => {
                    let Some(top) = conds.last() else {
                        self.messages.error(code::PREPROCESSOR, at(1), "#elif without #if");
                        continue;
                    };
                    if top.else_seen {
                        self.messages.error(code::PREPROCESSOR, at(1), "#elif after #else");
                        continue;
                    }
                    let evaluate = top.parent_active && !top.taken;
                    let value = evaluate && self.eval_condition(rest, at(1));
                    if let Some(top) = conds.last_mut() {
                        top.active = value;
                        top.taken |= value;
                    }
                }
                "else" => match conds.last_mut() {
                    Some(top) if !top.else_seen => {
                        top.active = top.parent_active && !top.taken;
                        top.taken = true;
                        top.else_seen = true;
                    }
                    Some(_) => self.messages.error(code::PREPROCESSOR, at(1), "duplicate #else"),
                    None => self.messages.error(code::PREPROCESSOR, at(1), "#else without #if"),
                },
                "endif" => {
                    if conds.pop().is_none() {
                        self.messages.error(code::PREPROCESSOR, at(1), "#endif without #if");
                    }
                }
                _ if !active => {}
                "" => {}
                "define" => self.define(rest, at(1)),
                "undef" => {
                    self.macros.remove(first_ident(rest));
                }
                "include" => self.include(rest, &dir, at(1)),
                "pragma" => {
                    let pragma = first_ident(rest);
                    if pragma == "once" {
                        if let Some(p) = &path {
                            self.once.insert(p.clone());
                        }
                    } else if !KNOWN_PRAGMAS.contains(&pragma) {
                        self.messages.warning(
                            code::UNKNOWN_PRAGMA,
                            at(1),
                            format!("unknown pragma '{pragma}' ignored"),
                        );
                    }
                }
                "error" => {
                    self.messages.error(code::ERROR_DIRECTIVE, at(1), format!("#error: {rest}"));
                }
                "line" => {}
                other => {
                    self.messages.error(
                        code::PREPROCESSOR,
                        at(1),
                        format!("invalid preprocessor command '{other}'"),
                    );
                }
            }
        }

        if !conds.is_empty() {
            let line = text.lines().count() as u32;
            self.messages.error(
                code::PREPROCESSOR,
                Some(Location::new(name.clone(), line.max(1), 1)),
                "unterminated conditional directive",
            );
        }
    }

    fn define(&mut self, rest: &str, at: Option<Location>) {
        let name = first_ident(rest);
        if name.is_empty() {
            self.messages.error(code::PREPROCESSOR, at, "macro name missing");
            return;
        }
        let after = &rest[name.len()..];
        let (params, body) = if let Some(inner) = after.strip_prefix('(') {
            let Some(close) = inner.find(')') else {
                self.messages.error(code::PREPROCESSOR, at, format!("'{name}': missing ')' in macro parameter list"));
                return;
            };
            let params: Vec<String> = inner[..close]
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            (Some(params), inner[close + 1..].trim())
        } else {
            (None, after.trim())
        };
        let new = Macro {
            params,
            body: body.to_string(),
        };
        if let Some(old) = self.macros.get(name) {
            if *old != new {
                self.messages.warning(code::MACRO_REDEFINED, at, format!("'{name}': macro redefinition"));
            }
        }
        self.macros.insert(name.to_string(), new);
    }

    fn include(&mut self, rest: &str, dir: &Option<PathBuf>, at: Option<Location>) {
        let target = match (rest.chars().next(), rest.get(1..)) {
            (Some('"'), Some(tail)) => tail.split_once('"').map(|(t, _)| t),
            (Some('<'), Some(tail)) => tail.split_once('>').map(|(t, _)| t),
            _ => None,
        };
        let Some(target) = target else {
            self.messages.error(code::PREPROCESSOR, at, "#include expects \"FILENAME\" or <FILENAME>");
            return;
        };

        let Some(found) = self.resolve_include(target, dir.as_deref()) else {
            self.messages.error(
                code::INCLUDE_NOT_FOUND,
                at,
                format!("failed to open source file: '{target}'"),
            );
            return;
        };
        let identity = std::fs::canonicalize(&found).unwrap_or_else(|_| found.clone());
        if self.once.contains(&identity) {
            return;
        }
        if self.depth >= MAX_INCLUDE_DEPTH {
            self.messages.error(code::PREPROCESSOR, at, "#include nested too deeply");
            return;
        }
        let content = match std::fs::read_to_string(&found) {
            Ok(c) => c,
            Err(e) => {
                self.messages.error(
                    code::INCLUDE_NOT_FOUND,
                    at,
                    format!("failed to open source file: '{target}': {e}"),
                );
                return;
            }
        };
        if !self.includes.contains(&found) {
            self.includes.push(found.clone());
        }
        self.depth += 1;
        self.process_file(
            &content,
            Arc::from(found.to_string_lossy().as_ref()),
            found.parent().map(Path::to_path_buf),
            Some(identity),
        );
        self.depth -= 1;
    }

    fn resolve_include(&self, target: &str, dir: Option<&Path>) -> Option<PathBuf> {
        let target = Path::new(target);
        if target.is_absolute() {
            return target.is_file().then(|| target.to_path_buf());
        }
        dir.into_iter()
            .chain(self.include_paths.iter().map(PathBuf::as_path))
            .map(|d| d.join(target))
            .find(|p| p.is_file())
    }

    fn eval_condition(&mut self, expr: &str, at: Option<Location>) -> bool {
        let resolved = self.replace_defined(expr);
        let expanded = self.expand(&resolved, &mut Vec::new(), 0);
        match eval_expr(&expanded) {
            Ok(v) => v != 0,
            Err(e) => {
                self.messages.error(code::PREPROCESSOR, at, format!("invalid #if expression: {e}"));
                false
            }
        }
    }

    fn replace_defined(&self, expr: &str) -> String {
        let mut out = String::new();
        let mut rest = expr;
        while let Some(pos) = find_ident(rest, "defined") {
            out.push_str(&rest[..pos]);
            let mut tail = rest[pos + "defined".len()..].trim_start();
            let paren = tail.starts_with('(');
            if paren {
                tail = tail[1..].trim_start();
            }
            let name = first_ident(tail);
            tail = tail[name.len()..].trim_start();
            if paren {
                tail = tail.strip_prefix(')').unwrap_or(tail);
            }
            out.push_str(if self.macros.contains_key(name) { " 1 " } else { " 0 " });
            rest = tail;
        }
        out.push_str(rest);
        out
    }

    /// Expands macros in `text`. Names in `hide` are not expanded again.
    fn expand(&self, text: &str, hide: &mut Vec<String>, depth: usize) -> String {
        if depth > MAX_EXPANSION_DEPTH {
            return text.to_string();
        }
        let bytes = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if b == b'"' || b == b'\'' {
                let end = skip_quoted(bytes, i);
                out.push_str(&text[i..end]);
                i = end;
                continue;
            }
            if b.is_ascii_digit() {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.' || bytes[i] == b'_') {
                    i += 1;
                }
                out.push_str(&text[start..i]);
                continue;
            }
            if !is_ident_start(b) {
                let ch = text[i..].chars().next().unwrap_or(' ');
                out.push(ch);
                i += ch.len_utf8();
                continue;
            }
            let start = i;
            while i < bytes.len() && is_ident_char(bytes[i]) {
                i += 1;
            }
            let name = &text[start..i];
            let Some(mac) = self.macros.get(name).filter(|_| !hide.iter().any(|h| h == name)) else {
                out.push_str(name);
                continue;
            };
            match &mac.params {
                None => {
                    hide.push(name.to_string());
                    out.push_str(&self.expand(&mac.body, hide, depth + 1));
                    hide.pop();
                }
                Some(params) => {
                    let mut j = i;
                    while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                        j += 1;
                    }
                    let Some((args, end)) = (bytes.get(j) == Some(&b'('))
                        .then(|| split_args(text, j))
                        .flatten()
                    else {
                        out.push_str(name);
                        continue;
                    };
                    let expanded_args: Vec<String> = args
                        .iter()
                        .map(|a| self.expand(a.trim(), hide, depth + 1))
                        .collect();
                    let body = substitute(&mac.body, params, &args, &expanded_args);
                    hide.push(name.to_string());
                    out.push_str(&self.expand(&body, hide, depth + 1));
                    hide.pop();
                    i = end;
                }
            }
        }
        out
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn first_ident(s: &str) -> &str {
    let s = s.trim_start();
    let end = s
        .bytes()
        .position(|b| !is_ident_char(b))
        .unwrap_or(s.len());
    &s[..end]
}

/// Finds `word` as a whole identifier in `s`.
fn find_ident(s: &str, word: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut from = 0;
    while let Some(rel) = s[from..].find(word) {
        let pos = from + rel;
        let before_ok = pos == 0 || !is_ident_char(bytes[pos - 1]);
        let after = pos + word.len();
        let after_ok = after >= bytes.len() || !is_ident_char(bytes[after]);
        if before_ok && after_ok {
            return Some(pos);
        }
        from = pos + word.len();
    }
    None
}

fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                while i < bytes.len() && (bytes[i] & 0xC0) == 0x80 {
                    i += 1;
                }
            }
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Splits a parenthesized argument list starting at `open`. Returns the raw
/// arguments and the index after the closing parenthesis.
fn split_args(text: &str, open: usize) -> Option<(Vec<String>, usize)> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut args = Vec::new();
    let mut start = open + 1;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    let last = &text[start..i];
                    if !(args.is_empty() && last.trim().is_empty()) {
                        args.push(last.to_string());
                    }
                    return Some((args, i + 1));
                }
            }
            b',' if depth == 1 => {
                args.push(text[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Replaces parameters in a function-like macro body. `#p` stringizes the raw
/// argument and `a ## b` pastes tokens.
fn substitute(body: &str, params: &[String], raw: &[String], expanded: &[String]) -> String {
    let bytes = body.as_bytes();
    let mut out = String::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' || b == b'\'' {
            let end = skip_quoted(bytes, i);
            out.push_str(&body[i..end]);
            i = end;
            continue;
        }
        if b == b'#' && bytes.get(i + 1) == Some(&b'#') {
            while out.ends_with(char::is_whitespace) {
                out.pop();
            }
            i += 2;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            let name = first_ident(&body[i..]);
            if let Some(idx) = params.iter().position(|p| p == name).filter(|_| !name.is_empty()) {
                out.push_str(raw.get(idx).map_or("", |a| a.trim()));
                i += name.len();
            }
            continue;
        }
        if b == b'#' {
            let name = first_ident(&body[i + 1..]);
            if let Some(idx) = params.iter().position(|p| p == name).filter(|_| !name.is_empty()) {
                let skipped = body[i + 1..].len() - body[i + 1..].trim_start().len();
                out.push('"');
                out.push_str(&raw.get(idx).map_or(String::new(), |a| a.trim().replace('"', "\\\"")));
                out.push('"');
                i += 1 + skipped + name.len();
                continue;
            }
        }
        if is_ident_start(b) {
            let start = i;
            while i < bytes.len() && is_ident_char(bytes[i]) {
                i += 1;
            }
            let word = &body[start..i];
            let pasted_next = body[i..].trim_start().starts_with("##");
            match params.iter().position(|p| p == word) {
                Some(idx) if pasted_next => out.push_str(raw.get(idx).map_or("", |a| a.trim())),
                Some(idx) => out.push_str(expanded.get(idx).map_or("", String::as_str)),
                None => out.push_str(word),
            }
            continue;
        }
        let ch = body[i..].chars().next().unwrap_or(' ');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Removes comments, keeping newlines so line numbers stay aligned.
fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let end = skip_quoted(bytes, i);
                let end = text[i..end].find('\n').map_or(end, |n| i + n);
                out.push_str(&text[i..end]);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                out.push(' ');
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    if bytes[i] == b'\n' {
                        out.push('\n');
                    }
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            _ => {
                let ch = text[i..].chars().next().unwrap_or(' ');
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }
    out
}

/// Joins backslash-continued lines. Yields each logical line with the
/// 1-based number of its first physical line.
fn logical_lines(text: &str) -> Vec<(u32, String)> {
    let mut result = Vec::new();
    let mut pending: Option<(u32, String)> = None;
    for (idx, raw) in text.split('\n').enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let (start, mut acc) = pending.take().unwrap_or((idx as u32 + 1, String::new()));
        if let Some(head) = line.strip_suffix('\\') {
            acc.push_str(head);
            pending = Some((start, acc));
        } else {
            acc.push_str(line);
            result.push((start, acc));
        }
    }
    if let Some(p) = pending {
        result.push(p);
    }
    if text.ends_with('\n') && result.last().is_some_and(|(_, l)| l.is_empty()) {
        result.pop();
    }
    result
}

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Num(i64),
    Op(&'static str),
}

const OPERATORS: &[&str] = &[
    "||", "&&", "==", "!=", "<=", ">=", "<<", ">>", "(", ")", "?", ":", "|", "^", "&", "<", ">", "+",
    "-", "*", "/", "%", "!", "~",
];

fn tokenize_expr(s: &str) -> Result<Vec<ExprToken>, String> {
    let bytes = s.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    'outer: while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if b.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
                i += 1;
            }
            let lit = s[start..i].trim_end_matches(['u', 'U', 'l', 'L']);
            let value = if let Some(hex) = lit.strip_prefix("0x").or_else(|| lit.strip_prefix("0X")) {
                i64::from_str_radix(hex, 16)
            } else {
                lit.parse::<i64>()
            };
            tokens.push(ExprToken::Num(value.map_err(|_| format!("bad number '{}'", &s[start..i]))?));
            continue;
        }
        if is_ident_start(b) {
            let start = i;
            while i < bytes.len() && is_ident_char(bytes[i]) {
                i += 1;
            }
            tokens.push(ExprToken::Num(i64::from(&s[start..i] == "true")));
            continue;
        }
        for op in OPERATORS {
            if s[i..].starts_with(op) {
                tokens.push(ExprToken::Op(*op));
                i += op.len();
                continue 'outer;
            }
        }
        return Err(format!("unexpected character '{}'", b as char));
    }
    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<ExprToken>,
    pos: usize,
}

fn binary_precedence(op: &str) -> Option<u8> {
    Some(match op {
        "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" => 6,
        "<" | ">" | "<=" | ">=" => 7,
        "<<" | ">>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    })
}

impl ExprParser {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(ExprToken::Op(op)) => Some(op),
            _ => None,
        }
    }

    fn expect(&mut self, op: &str) -> Result<(), String> {
        if self.peek_op() == Some(op) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected '{op}'"))
        }
    }

    fn ternary(&mut self) -> Result<i64, String> {
        let cond = self.binary(1)?;
        if self.peek_op() == Some("?") {
            self.pos += 1;
            let a = self.ternary()?;
            self.expect(":")?;
            let b = self.ternary()?;
            return Ok(if cond != 0 { a } else { b });
        }
        Ok(cond)
    }

    fn binary(&mut self, min: u8) -> Result<i64, String> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek_op() {
            let Some(prec) = binary_precedence(op).filter(|&p| p >= min) else {
                break;
            };
            self.pos += 1;
            let rhs = self.binary(prec + 1)?;
            lhs = match op {
                "||" => i64::from(lhs != 0 || rhs != 0),
                "&&" => i64::from(lhs != 0 && rhs != 0),
                "|" => lhs | rhs,
                "^" => lhs ^ rhs,
                "&" => lhs & rhs,
                "==" => i64::from(lhs == rhs),
                "!=" => i64::from(lhs != rhs),
                "<" => i64::from(lhs < rhs),
                ">" => i64::from(lhs > rhs),
                "<=" => i64::from(lhs <= rhs),
                ">=" => i64::from(lhs >= rhs),
                "<<" => lhs.wrapping_shl(rhs as u32),
                ">>" => lhs.wrapping_shr(rhs as u32),
                "+" => lhs.wrapping_add(rhs),
                "-" => lhs.wrapping_sub(rhs),
                "*" => lhs.wrapping_mul(rhs),
                "/" | "%" if rhs == 0 => return Err("division by zero".to_string()),
                "/" => lhs.wrapping_div(rhs),
                _ => lhs.wrapping_rem(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<i64, String> {
        match self.tokens.get(self.pos).cloned() {
            Some(ExprToken::Num(n)) => {
                self.pos += 1;
                Ok(n)
            }
            Some(ExprToken::Op("(")) => {
                self.pos += 1;
                let v = self.ternary()?;
                self.expect(")")?;
                Ok(v)
            }
            Some(ExprToken::Op(op @ ("!" | "-" | "+" | "~"))) => {
                self.pos += 1;
                let v = self.unary()?;
                Ok(match op {
                    "!" => i64::from(v == 0),
                    "-" => v.wrapping_neg(),
                    "~" => !v,
                    _ => v,
                })
            }
            Some(ExprToken::Op(op)) => Err(format!("unexpected '{op}'")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

/// Evaluates an integer `#if` expression after macro expansion.
fn eval_expr(s: &str) -> Result<i64, String> {
    let tokens = tokenize_expr(s)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = ExprParser { tokens, pos: 0 };
    let v = parser.ternary()?;
    if parser.pos != parser.tokens.len() {
        return Err("trailing tokens".to_string());
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str, macros: &[ShaderMacro]) -> Preprocessed {
        preprocess(&PreprocessInput {
            source: src,
            source_name: "test.hlsl",
            source_dir: None,
            macros,
            include_paths: &[],
        })
    }

    fn lines(p: &Preprocessed) -> Vec<&str> {
        p.text.lines().filter(|l| !l.trim().is_empty()).collect()
    }

    #[test]
    fn comments_are_removed_but_lines_kept() {
        let p = run("a // x\n/* multi\nline */ b\n", &[]);
        assert_eq!(p.lines.len(), 3);
        assert_eq!(p.lines[2].line, 3);
        assert!(!p.text.contains('x'));
        assert!(p.text.contains('b'));
    }

    #[test]
    fn object_macro_and_option_macro() {
        let p = run("#define SCALE 2\nx = SCALE * QUALITY;\n", &[ShaderMacro::new("QUALITY", "")]);
        assert_eq!(lines(&p), vec!["x = 2 * 1;"]);
    }

    #[test]
    fn function_macro_with_nested_parens() {
        let p = run("#define MUL(a, b) ((a) * (b))\ny = MUL(f(1, 2), 3);\n", &[]);
        assert_eq!(lines(&p), vec!["y = ((f(1, 2)) * (3));"]);
    }

    #[test]
    fn function_macro_name_without_parens_is_left_alone() {
        let p = run("#define F(x) x\nint F;\n", &[]);
        assert_eq!(lines(&p), vec!["int F;"]);
    }

    #[test]
    fn token_paste_and_stringize() {
        let p = run("#define CAT(a, b) a ## b\n#define STR(a) #a\nCAT(tex, 0) STR(hi)\n", &[]);
        assert_eq!(lines(&p), vec!["tex0 \"hi\""]);
    }

    #[test]
    fn self_referential_macro_terminates() {
        let p = run("#define X X + 1\nX\n", &[]);
        assert_eq!(lines(&p), vec!["X + 1"]);
    }

    #[test]
    fn conditionals() {
        let src = "#if defined(A) && B > 1\nyes\n#elif B == 1\nmid\n#else\nno\n#endif\n";
        let a = run(src, &[ShaderMacro::new("A", ""), ShaderMacro::new("B", "2")]);
        assert_eq!(lines(&a), vec!["yes"]);
        let b = run(src, &[ShaderMacro::new("B", "1")]);
        assert_eq!(lines(&b), vec!["mid"]);
        let c = run(src, &[]);
        assert_eq!(lines(&c), vec!["no"]);
        assert!(c.messages.is_empty());
    }

    #[test]
    fn ifdef_nesting_in_inactive_region() {
        let src = "#ifdef MISSING\n#if 1/0\nbad\n#endif\n#else\ngood\n#endif\n";
        let p = run(src, &[]);
        assert_eq!(lines(&p), vec!["good"]);
        assert!(!p.messages.has_errors());
    }

    #[test]
    fn unterminated_if_is_error() {
        let p = run("#ifdef A\nx\n", &[]);
        assert!(p.messages.has_errors());
    }

    #[test]
    fn error_directive() {
        let p = run("#error unsupported\n", &[]);
        assert!(p.messages.has_errors());
        let msg = p.messages.iter().next().unwrap();
        assert_eq!(msg.code, code::ERROR_DIRECTIVE);
        assert_eq!(msg.location.as_ref().unwrap().line, 1);
    }

    #[test]
    fn unknown_pragma_warns() {
        let p = run("#pragma once\n#pragma pack_matrix(row_major)\n#pragma bogus\n", &[]);
        assert_eq!(p.messages.len(), 1);
        assert!(!p.messages.has_errors());
    }

    #[test]
    fn redefinition_warns_only_when_different() {
        let same = run("#define A 1\n#define A 1\n", &[]);
        assert!(same.messages.is_empty());
        let diff = run("#define A 1\n#define A 2\n", &[]);
        assert_eq!(diff.messages.len(), 1);
    }

    #[test]
    fn line_continuation() {
        let p = run("#define LONG 1 + \\\n 2\nLONG\n", &[]);
        assert_eq!(lines(&p), vec!["1 +  2"]);
        assert_eq!(p.lines.last().unwrap().line, 3);
    }

    #[test]
    fn include_search_and_pragma_once() {
        let dir = tempfile::tempdir().unwrap();
        let inc = dir.path().join("inc");
        std::fs::create_dir(&inc).unwrap();
        std::fs::write(inc.join("common.hlsli"), "#pragma once\nfloat common_value;\n").unwrap();
        let paths = vec![inc.clone()];
        let p = preprocess(&PreprocessInput {
            source: "#include \"common.hlsli\"\n#include <common.hlsli>\nmain\n",
            source_name: "main.hlsl",
            source_dir: Some(dir.path()),
            macros: &[],
            include_paths: &paths,
        });
        assert!(p.messages.is_empty(), "{:?}", p.messages);
        assert_eq!(p.text.matches("common_value").count(), 1);
        assert_eq!(p.includes.len(), 1);
        let origin = p.lines.iter().find(|l| l.file.ends_with("common.hlsli"));
        assert!(origin.is_some());
    }

    #[test]
    fn missing_include_is_error() {
        let p = run("#include \"nope.hlsli\"\n", &[]);
        let msg = p.messages.iter().next().unwrap();
        assert_eq!(msg.code, code::INCLUDE_NOT_FOUND);
    }

    #[test]
    fn expression_evaluator() {
        assert_eq!(eval_expr("1 + 2 * 3").unwrap(), 7);
        assert_eq!(eval_expr("(1 + 2) * 3").unwrap(), 9);
        assert_eq!(eval_expr("!0 && 0x10 == 16").unwrap(), 1);
        assert_eq!(eval_expr("1 ? 5 : 6").unwrap(), 5);
        assert_eq!(eval_expr("-3 < 2u").unwrap(), 1);
        assert_eq!(eval_expr("UNKNOWN").unwrap(), 0);
        assert!(eval_expr("1 /").is_err());
        assert!(eval_expr("4 / 0").is_err());
    }
}
