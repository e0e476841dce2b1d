//! Compiler messages and their backend-specific rendering.

use std::fmt;
use std::sync::Arc;

/// Message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Compilation fails.
    Error,
    /// Compilation succeeds with a note.
    Warning,
}

/// A point in the original (pre-expansion) source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// File name as given to the compiler or resolved by `#include`.
    pub file: Arc<str>,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub col: u32,
}

impl Location {
    /// Creates a location.
    pub fn new(file: Arc<str>, line: u32, col: u32) -> Self {
        Self { file, line, col }
    }
}

/// Numeric message codes, rendered as `X####` by the legacy backend.
pub mod code {
    /// Generic syntax error.
    pub const SYNTAX: u16 = 3000;
    /// Undeclared identifier.
    pub const UNDECLARED: u16 = 3004;
    /// Entry point not found.
    pub const ENTRY_NOT_FOUND: u16 = 3501;
    /// Input parameter without semantics.
    pub const MISSING_INPUT_SEMANTIC: u16 = 3502;
    /// Return value without semantics.
    pub const MISSING_RETURN_SEMANTIC: u16 = 3503;
    /// Missing or invalid stage attribute.
    pub const STAGE_ATTRIBUTE: u16 = 3514;
    /// Unknown pragma.
    pub const UNKNOWN_PRAGMA: u16 = 3568;
    /// Unbounded resource array not permitted.
    pub const UNBOUNDED_ARRAY: u16 = 3530;
    /// Register binding conflict.
    pub const REGISTER_OVERLAP: u16 = 4500;
    /// Register class does not match the resource.
    pub const REGISTER_CLASS: u16 = 4501;
    /// Semantic not valid for the profile.
    pub const INVALID_SEMANTIC: u16 = 4502;
    /// Feature requires a higher shader model.
    pub const MODEL_REQUIRED: u16 = 4509;
    /// `#error` directive.
    pub const ERROR_DIRECTIVE: u16 = 1504;
    /// Unresolvable `#include`.
    pub const INCLUDE_NOT_FOUND: u16 = 1507;
    /// Malformed preprocessor directive or expression.
    pub const PREPROCESSOR: u16 = 1500;
    /// Macro redefined with a different body.
    pub const MACRO_REDEFINED: u16 = 1519;
    /// Unsupported profile or stage.
    pub const UNSUPPORTED_TARGET: u16 = 6000;
    /// Bytecode chunk could not be written.
    pub const CODE_GENERATION: u16 = 6001;
}

/// One compiler message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Severity.
    pub severity: Severity,
    /// Numeric code.
    pub code: u16,
    /// Where the problem was found, if anywhere in particular.
    pub location: Option<Location>,
    /// Human-readable text.
    pub text: String,
}

impl Message {
    /// Creates an error.
    pub fn error(code: u16, location: Option<Location>, text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            location,
            text: text.into(),
        }
    }

    /// Creates a warning.
    pub fn warning(code: u16, location: Option<Location>, text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            location,
            text: text.into(),
        }
    }

    /// Renders the message in the given style.
    pub fn render(&self, style: MessageStyle) -> String {
        RenderedMessage { msg: self, style }.to_string()
    }
}

/// Output format for messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStyle {
    /// `file:line:col: error: text`
    Clang,
    /// `file(line,col): error X3004: text`
    Legacy,
}

struct RenderedMessage<'a> {
    msg: &'a Message,
    style: MessageStyle,
}

impl fmt::Display for RenderedMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.msg.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.style {
            MessageStyle::Clang => {
                if let Some(loc) = &self.msg.location {
                    write!(f, "{}:{}:{}: ", loc.file, loc.line, loc.col)?;
                }
                write!(f, "{sev}: {}", self.msg.text)
            }
            MessageStyle::Legacy => {
                if let Some(loc) = &self.msg.location {
                    write!(f, "{}({},{}): ", loc.file, loc.line, loc.col)?;
                }
                write!(f, "{sev} X{:04}: {}", self.msg.code, self.msg.text)
            }
        }
    }
}

/// An ordered collection of messages.
#[derive(Debug, Default, Clone)]
pub struct Messages {
    items: Vec<Message>,
}

impl Messages {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message.
    pub fn push(&mut self, msg: Message) {
        self.items.push(msg);
    }

    /// Appends an error.
    pub fn error(&mut self, code: u16, location: Option<Location>, text: impl Into<String>) {
        self.push(Message::error(code, location, text));
    }

    /// Appends a warning.
    pub fn warning(&mut self, code: u16, location: Option<Location>, text: impl Into<String>) {
        self.push(Message::warning(code, location, text));
    }

    /// Moves every message from `other` into `self`.
    pub fn extend(&mut self, other: Messages) {
        self.items.extend(other.items);
    }

    /// Returns `true` if any error has been recorded.
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|m| m.severity == Severity::Error)
    }

    /// Turns every warning into an error.
    pub fn promote_warnings(&mut self) {
        for m in &mut self.items {
            m.severity = Severity::Error;
        }
    }

    /// Iterates over the messages.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.items.iter()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Renders errors and warnings into separate lists.
    pub fn render_split(&self, style: MessageStyle) -> (Vec<String>, Vec<String>) {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for m in &self.items {
            match m.severity {
                Severity::Error => errors.push(m.render(style)),
                Severity::Warning => warnings.push(m.render(style)),
            }
        }
        (errors, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Option<Location> {
        Some(Location::new(Arc::from("blur.hlsl"), 12, 5))
    }

    #[test]
    fn clang_style() {
        let m = Message::error(code::UNDECLARED, loc(), "use of undeclared identifier 'x'");
        assert_eq!(
            m.render(MessageStyle::Clang),
            "blur.hlsl:12:5: error: use of undeclared identifier 'x'"
        );
    }

    #[test]
    fn legacy_style() {
        let m = Message::warning(code::UNKNOWN_PRAGMA, loc(), "unknown pragma ignored");
        assert_eq!(
            m.render(MessageStyle::Legacy),
            "blur.hlsl(12,5): warning X3568: unknown pragma ignored"
        );
    }

    #[test]
    fn without_location() {
        let m = Message::error(code::UNSUPPORTED_TARGET, None, "bad profile");
        assert_eq!(m.render(MessageStyle::Clang), "error: bad profile");
        assert_eq!(m.render(MessageStyle::Legacy), "error X6000: bad profile");
    }

    #[test]
    fn promote_warnings_turns_all_into_errors() {
        let mut msgs = Messages::new();
        msgs.warning(code::UNKNOWN_PRAGMA, None, "w");
        assert!(!msgs.has_errors());
        msgs.promote_warnings();
        assert!(msgs.has_errors());
        let (errors, warnings) = msgs.render_split(MessageStyle::Clang);
        assert_eq!(errors.len(), 1);
        assert!(warnings.is_empty());
    }
}
