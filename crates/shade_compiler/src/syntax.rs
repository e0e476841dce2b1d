//! Declaration scanner.
//!
//! Recognizes the top-level structure of a shader: attributes, structs,
//! functions, constant buffers and resource declarations. Function bodies are
//! not parsed into statements; the scanner records the identifiers they use
//! and the functions they call, which is all that entry validation, register
//! allocation and code generation need.

use crate::lexer::{Token, TokenKind};
use crate::message::{code, Location, Messages};
use crate::preprocess::Preprocessed;
use serde::{Deserialize, Serialize};

/// A position in preprocessed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    /// 0-based output line.
    pub line: usize,
    /// 1-based column.
    pub col: u32,
}

impl Pos {
    fn of(tok: &Token<'_>) -> Self {
        Self {
            line: tok.line,
            col: tok.col,
        }
    }

    /// Maps back to the original source.
    pub fn locate(self, pre: &Preprocessed) -> Option<Location> {
        pre.locate(self.line, self.col)
    }
}

/// A bracketed attribute such as `[numthreads(8, 8, 1)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name as written.
    pub name: String,
    /// Arguments, with string quotes removed.
    pub args: Vec<String>,
    /// Where the attribute starts.
    pub pos: Pos,
}

impl Attribute {
    /// Parses argument `i` as an unsigned integer.
    pub fn arg_u32(&self, i: usize) -> Option<u32> {
        parse_uint(self.args.get(i)?)
    }
}

/// Array extent of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArraySize {
    /// A fixed number of elements.
    Fixed(u32),
    /// `[]`
    Unbounded,
}

/// A struct member or constant-buffer member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Type name.
    pub ty: String,
    /// Member name.
    pub name: String,
    /// Semantic after `:`, if any.
    pub semantic: Option<String>,
    /// Array extent.
    pub array: Option<ArraySize>,
    /// Where the member is declared.
    pub pos: Pos,
}

/// A `struct` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    /// Struct name.
    pub name: String,
    /// Members in declaration order.
    pub fields: Vec<Field>,
    /// Where the declaration starts.
    pub pos: Pos,
}

/// Register class of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegisterClass {
    /// `b` registers.
    ConstantBuffer,
    /// `t` registers.
    ShaderResource,
    /// `s` registers.
    Sampler,
    /// `u` registers.
    UnorderedAccess,
}

impl RegisterClass {
    /// Register prefix letter.
    pub fn prefix(self) -> char {
        match self {
            RegisterClass::ConstantBuffer => 'b',
            RegisterClass::ShaderResource => 't',
            RegisterClass::Sampler => 's',
            RegisterClass::UnorderedAccess => 'u',
        }
    }

    /// Looks up a class by prefix letter.
    pub fn from_prefix(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'b' => Some(RegisterClass::ConstantBuffer),
            't' => Some(RegisterClass::ShaderResource),
            's' => Some(RegisterClass::Sampler),
            'u' => Some(RegisterClass::UnorderedAccess),
            _ => None,
        }
    }
}

/// What a resource declaration binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// `cbuffer` or `ConstantBuffer<T>`.
    ConstantBuffer,
    /// `tbuffer` or `TextureBuffer<T>`.
    TextureBuffer,
    /// `Texture*` objects.
    Texture,
    /// Read-only buffers.
    Buffer,
    /// Sampler states.
    Sampler,
    /// Read-write resources.
    Uav,
    /// Ray-tracing acceleration structures.
    AccelerationStructure,
}

impl ResourceKind {
    /// Register class this kind binds to.
    pub fn class(self) -> RegisterClass {
        match self {
            ResourceKind::ConstantBuffer => RegisterClass::ConstantBuffer,
            ResourceKind::TextureBuffer
            | ResourceKind::Texture
            | ResourceKind::Buffer
            | ResourceKind::AccelerationStructure => RegisterClass::ShaderResource,
            ResourceKind::Sampler => RegisterClass::Sampler,
            ResourceKind::Uav => RegisterClass::UnorderedAccess,
        }
    }

    /// Classifies an object type name (without template arguments).
    pub fn from_type_name(base: &str) -> Option<Self> {
        let kind = match base {
            "ConstantBuffer" => ResourceKind::ConstantBuffer,
            "TextureBuffer" => ResourceKind::TextureBuffer,
            "Buffer" | "StructuredBuffer" | "ByteAddressBuffer" => ResourceKind::Buffer,
            "RaytracingAccelerationStructure" => ResourceKind::AccelerationStructure,
            "SamplerState" | "SamplerComparisonState" | "sampler" | "sampler1D" | "sampler2D"
            | "sampler3D" | "samplerCUBE" => ResourceKind::Sampler,
            "AppendStructuredBuffer" | "ConsumeStructuredBuffer" => ResourceKind::Uav,
            b if b.starts_with("RW") || b.starts_with("RasterizerOrdered") => ResourceKind::Uav,
            b if b.starts_with("Texture") => ResourceKind::Texture,
            _ => return None,
        };
        Some(kind)
    }
}

/// An explicit `register(...)` annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpec {
    /// Register class from the prefix letter.
    pub class: RegisterClass,
    /// Slot number.
    pub slot: u32,
    /// Register space.
    pub space: u32,
}

/// A resource or constant-buffer declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDecl {
    /// Declared name.
    pub name: String,
    /// Full type text, e.g. `Texture2D<float4>`.
    pub type_name: String,
    /// Resource classification.
    pub kind: ResourceKind,
    /// Array extent.
    pub array: Option<ArraySize>,
    /// Explicit register, if any.
    pub register: Option<RegisterSpec>,
    /// Members of a constant buffer.
    pub members: Vec<Field>,
    /// Where the declaration starts.
    pub pos: Pos,
}

/// A loose uniform at global scope; these are gathered into `$Globals`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVar {
    /// Type name.
    pub ty: String,
    /// Variable name.
    pub name: String,
    /// Where the variable is declared.
    pub pos: Pos,
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Qualifiers such as `in`, `out`, `triangle`.
    pub qualifiers: Vec<String>,
    /// Type name.
    pub ty: String,
    /// Parameter name.
    pub name: String,
    /// Semantic after `:`, if any.
    pub semantic: Option<String>,
    /// Array extent.
    pub array: Option<ArraySize>,
    /// Where the parameter is declared.
    pub pos: Pos,
}

impl Param {
    /// Returns `true` for pure outputs (`out`, `vertices`, `indices`, ...).
    pub fn is_output(&self) -> bool {
        self.qualifiers.iter().any(|q| q == "out")
    }
}

/// An identifier used inside a function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentUse {
    /// Identifier text.
    pub name: String,
    /// Whether it is immediately followed by `(`.
    pub is_call: bool,
    /// Where it appears.
    pub pos: Pos,
}

/// A function definition or prototype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// Attributes written before the function.
    pub attributes: Vec<Attribute>,
    /// Return type text.
    pub return_type: String,
    /// Semantic on the return value.
    pub return_semantic: Option<String>,
    /// Parameters in order.
    pub params: Vec<Param>,
    /// Body, absent for prototypes.
    pub body: Option<FunctionBody>,
    /// Where the name appears.
    pub pos: Pos,
}

/// What the scanner keeps of a function body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionBody {
    /// Identifiers in order of appearance.
    pub idents: Vec<IdentUse>,
    /// Whitespace-normalized token text.
    pub text: String,
}

impl Function {
    /// Finds an attribute by case-insensitive name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Names called from the body.
    pub fn calls(&self) -> impl Iterator<Item = &str> {
        self.body
            .iter()
            .flat_map(|b| b.idents.iter())
            .filter(|i| i.is_call)
            .map(|i| i.name.as_str())
    }
}

/// Everything the scanner found in one translation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationUnit {
    /// Functions in declaration order.
    pub functions: Vec<Function>,
    /// Structs in declaration order.
    pub structs: Vec<StructDecl>,
    /// Resources and constant buffers in declaration order.
    pub resources: Vec<ResourceDecl>,
    /// Loose uniforms.
    pub globals: Vec<GlobalVar>,
}

impl TranslationUnit {
    /// Finds a function definition by name, falling back to a prototype.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions
            .iter()
            .find(|f| f.name == name && f.body.is_some())
            .or_else(|| self.functions.iter().find(|f| f.name == name))
    }

    /// Finds a struct by name.
    pub fn struct_decl(&self, name: &str) -> Option<&StructDecl> {
        self.structs.iter().find(|s| s.name == name)
    }
}

/// Parses an unsigned literal such as `64`, `0x40` or `8u`.
pub fn parse_uint(text: &str) -> Option<u32> {
    let t = text.trim().trim_end_matches(['u', 'U', 'l', 'L']);
    match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => t.parse().ok(),
    }
}

const TYPE_MODIFIERS: &[&str] = &[
    "static", "const", "uniform", "extern", "groupshared", "precise", "inline", "volatile",
    "shared", "export", "row_major", "column_major", "nointerpolation", "linear", "centroid",
    "noperspective", "sample", "globallycoherent", "unsigned", "snorm", "unorm",
];

const PARAM_QUALIFIERS: &[&str] = &[
    "in", "out", "inout", "uniform", "const", "precise", "nointerpolation", "linear", "centroid",
    "noperspective", "sample", "point", "line", "triangle", "lineadj", "triangleadj", "vertices",
    "primitives", "indices", "payload", "row_major", "column_major", "snorm", "unorm",
];

/// Scans a token stream into a [`TranslationUnit`].
pub fn scan(tokens: &[Token<'_>], pre: &Preprocessed, messages: &mut Messages) -> TranslationUnit {
    if !check_balance(tokens, pre, messages) {
        return TranslationUnit::default();
    }
    let mut scanner = Scanner {
        toks: tokens,
        pos: 0,
        pre,
        messages,
        unit: TranslationUnit::default(),
    };
    scanner.scan_all();
    let mut unit = scanner.unit;
    resolve_buffer_members(&mut unit);
    unit
}

/// Reports the first unbalanced `()`, `[]` or `{}`.
fn check_balance(tokens: &[Token<'_>], pre: &Preprocessed, messages: &mut Messages) -> bool {
    let mut stack: Vec<&Token<'_>> = Vec::new();
    for tok in tokens {
        if tok.kind == TokenKind::Eof {
            if let Some(open) = stack.last() {
                let close = closing(open.text);
                messages.error(
                    code::SYNTAX,
                    Pos::of(tok).locate(pre),
                    format!("syntax error: unexpected end of file, expected '{close}'"),
                );
                return false;
            }
            break;
        }
        if tok.kind != TokenKind::Punct {
            continue;
        }
        match tok.text {
            "(" | "[" | "{" => stack.push(tok),
            ")" | "]" | "}" => match stack.pop() {
                Some(open) if closing(open.text) == tok.text => {}
                _ => {
                    messages.error(
                        code::SYNTAX,
                        Pos::of(tok).locate(pre),
                        format!("syntax error: unexpected token '{}'", tok.text),
                    );
                    return false;
                }
            },
            _ => {}
        }
    }
    true
}

fn closing(open: &str) -> &'static str {
    match open {
        "(" => ")",
        "[" => "]",
        _ => "}",
    }
}

/// Copies struct members into `ConstantBuffer<T>` declarations.
fn resolve_buffer_members(unit: &mut TranslationUnit) {
    for res in &mut unit.resources {
        if res.members.is_empty() && matches!(res.kind, ResourceKind::ConstantBuffer | ResourceKind::TextureBuffer) {
            if let Some(inner) = template_argument(&res.type_name) {
                if let Some(s) = unit.structs.iter().find(|s| s.name == inner) {
                    res.members = s.fields.clone();
                }
            }
        }
    }
}

/// Returns the text between the outer `<` and `>`.
pub fn template_argument(ty: &str) -> Option<&str> {
    let open = ty.find('<')?;
    let close = ty.rfind('>')?;
    (close > open).then(|| ty[open + 1..close].trim())
}

/// Strips template arguments from a type name.
pub fn base_type(ty: &str) -> &str {
    ty.split('<').next().unwrap_or(ty).trim()
}

struct Reported;

type Scan<T> = Result<T, Reported>;

struct Scanner<'t, 'a, 'm> {
    toks: &'t [Token<'a>],
    pos: usize,
    pre: &'t Preprocessed,
    messages: &'m mut Messages,
    unit: TranslationUnit,
}

impl<'a> Scanner<'_, 'a, '_> {
    fn peek(&self) -> Token<'a> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Token<'a> {
        let last = self.toks.len().saturating_sub(1);
        self.toks[(self.pos + n).min(last)]
    }

    fn bump(&mut self) -> Token<'a> {
        let tok = self.peek();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek().is_punct(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error_at(&mut self, tok: Token<'a>, text: String) -> Reported {
        let loc = Pos::of(&tok).locate(self.pre);
        self.messages.error(code::SYNTAX, loc, text);
        Reported
    }

    fn unexpected(&mut self) -> Reported {
        let tok = self.peek();
        let text = if tok.kind == TokenKind::Eof {
            "syntax error: unexpected end of file".to_string()
        } else {
            format!("syntax error: unexpected token '{}'", tok.text)
        };
        self.error_at(tok, text)
    }

    fn expect_punct(&mut self, c: char) -> Scan<()> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_ident(&mut self) -> Scan<Token<'a>> {
        if self.peek().kind == TokenKind::Ident {
            Ok(self.bump())
        } else {
            Err(self.unexpected())
        }
    }

    /// Skips a balanced group starting at the current opening delimiter.
    fn skip_group(&mut self) {
        let mut depth = 0usize;
        loop {
            let tok = self.bump();
            match tok.text {
                "(" | "[" | "{" if tok.kind == TokenKind::Punct => depth += 1,
                ")" | "]" | "}" if tok.kind == TokenKind::Punct => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ if tok.kind == TokenKind::Eof => return,
                _ => {}
            }
        }
    }

    /// Skips to just past the next top-level `;` or balanced `{...}`.
    fn recover(&mut self) {
        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::Eof => return,
                TokenKind::Punct if tok.text == ";" => {
                    self.pos += 1;
                    return;
                }
                TokenKind::Punct if tok.text == "{" => {
                    self.skip_group();
                    self.eat_punct(';');
                    return;
                }
                TokenKind::Punct if matches!(tok.text, "(" | "[") => self.skip_group(),
                _ => self.pos += 1,
            }
        }
    }

    fn scan_all(&mut self) {
        let mut attrs = Vec::new();
        loop {
            let tok = self.peek();
            let result = match tok.kind {
                TokenKind::Eof => break,
                TokenKind::Punct if tok.text == ";" => {
                    self.pos += 1;
                    Ok(())
                }
                TokenKind::Punct if tok.text == "[" => self.attributes(&mut attrs),
                TokenKind::Ident if tok.text == "struct" => self.struct_decl(),
                TokenKind::Ident if tok.text == "cbuffer" || tok.text == "tbuffer" => self.cbuffer(),
                TokenKind::Ident if tok.text == "typedef" => {
                    self.recover();
                    Ok(())
                }
                TokenKind::Ident => self.declaration(std::mem::take(&mut attrs)),
                _ => Err(self.unexpected()),
            };
            if result.is_err() {
                attrs.clear();
                self.recover();
            }
        }
    }

    fn attributes(&mut self, out: &mut Vec<Attribute>) -> Scan<()> {
        while self.peek().is_punct('[') {
            if self.peek_at(1).is_punct('[') {
                self.skip_group();
                continue;
            }
            self.pos += 1;
            let name = self.expect_ident()?;
            let mut args = Vec::new();
            if self.eat_punct('(') {
                let mut current = String::new();
                let mut depth = 0usize;
                loop {
                    let tok = self.bump();
                    match tok.kind {
                        TokenKind::Punct if tok.text == "(" => depth += 1,
                        TokenKind::Punct if tok.text == ")" && depth == 0 => break,
                        TokenKind::Punct if tok.text == ")" => depth -= 1,
                        TokenKind::Punct if tok.text == "," && depth == 0 => {
                            args.push(std::mem::take(&mut current));
                            continue;
                        }
                        TokenKind::Eof => return Err(self.unexpected()),
                        _ => {}
                    }
                    let text = tok.text.trim_matches('"');
                    current.push_str(text);
                }
                if !current.is_empty() || !args.is_empty() {
                    args.push(current);
                }
            }
            self.expect_punct(']')?;
            out.push(Attribute {
                name: name.text.to_string(),
                args,
                pos: Pos::of(&name),
            });
        }
        Ok(())
    }

    /// Parses a type: an identifier with optional template arguments.
    fn type_name(&mut self) -> Scan<String> {
        let first = self.expect_ident()?;
        let mut ty = first.text.to_string();
        if first.text == "unsigned" && self.peek().kind == TokenKind::Ident {
            ty = format!("unsigned {}", self.bump().text);
        }
        if self.peek().is_punct('<') {
            let mut depth = 0usize;
            loop {
                let tok = self.bump();
                match tok.text {
                    "<" => depth += 1,
                    ">" => depth -= 1,
                    _ if tok.kind == TokenKind::Eof => return Err(self.unexpected()),
                    _ => {}
                }
                ty.push_str(tok.text);
                if tok.text == "," {
                    ty.push(' ');
                }
                if depth == 0 {
                    break;
                }
            }
        }
        Ok(ty)
    }

    fn array_suffix(&mut self) -> Scan<Option<ArraySize>> {
        let mut size: Option<ArraySize> = None;
        while self.eat_punct('[') {
            if self.eat_punct(']') {
                size = Some(ArraySize::Unbounded);
                continue;
            }
            let tok = self.bump();
            let n = if tok.kind == TokenKind::Number && self.peek().is_punct(']') {
                parse_uint(tok.text).unwrap_or(1)
            } else {
                while !self.peek().is_punct(']') && self.peek().kind != TokenKind::Eof {
                    if self.peek().is_punct('[') || self.peek().is_punct('(') {
                        self.skip_group();
                    } else {
                        self.pos += 1;
                    }
                }
                1
            };
            self.expect_punct(']')?;
            size = Some(match size {
                Some(ArraySize::Fixed(prev)) => ArraySize::Fixed(prev.saturating_mul(n)),
                Some(ArraySize::Unbounded) => ArraySize::Unbounded,
                None => ArraySize::Fixed(n),
            });
        }
        Ok(size)
    }

    /// Parses `: register(...)`, `: packoffset(...)` or `: SEMANTIC` suffixes.
    fn annotations(&mut self) -> Scan<(Option<String>, Option<RegisterSpec>)> {
        let mut semantic = None;
        let mut register = None;
        while self.peek().is_punct(':') && self.peek_at(1).kind == TokenKind::Ident {
            self.pos += 1;
            let name = self.bump();
            match name.text {
                "register" => register = Some(self.register_spec(name)?),
                "packoffset" => self.skip_group(),
                _ => semantic = Some(name.text.to_string()),
            }
        }
        Ok((semantic, register))
    }

    fn register_spec(&mut self, at: Token<'a>) -> Scan<RegisterSpec> {
        self.expect_punct('(')?;
        let mut parts = Vec::new();
        loop {
            let tok = self.bump();
            match tok.kind {
                TokenKind::Ident => parts.push(tok.text),
                TokenKind::Punct if tok.text == "," => {}
                TokenKind::Punct if tok.text == ")" => break,
                _ => return Err(self.error_at(tok, "invalid register specification".to_string())),
            }
        }
        let mut slot_part = None;
        let mut space = 0;
        for part in parts {
            if let Some(n) = part.strip_prefix("space") {
                match parse_uint(n) {
                    Some(v) => space = v,
                    None => return Err(self.error_at(at, format!("invalid register space '{part}'"))),
                }
            } else if RegisterClass::from_prefix(part.chars().next().unwrap_or(' ')).is_some()
                && parse_uint(&part[1..]).is_some()
            {
                slot_part = Some(part);
            }
        }
        let Some(part) = slot_part else {
            return Err(self.error_at(at, "invalid register specification".to_string()));
        };
        let class = RegisterClass::from_prefix(part.chars().next().unwrap_or(' '));
        let slot = parse_uint(&part[1..]);
        match (class, slot) {
            (Some(class), Some(slot)) => Ok(RegisterSpec { class, slot, space }),
            _ => Err(self.error_at(at, "invalid register specification".to_string())),
        }
    }

    /// Skips a `= initializer` up to the next `,` or terminator at depth zero.
    fn skip_initializer(&mut self, terminators: &[char]) {
        loop {
            let tok = self.peek();
            if tok.kind == TokenKind::Eof || terminators.iter().any(|&c| tok.is_punct(c)) {
                return;
            }
            if tok.is_punct('(') || tok.is_punct('[') || tok.is_punct('{') {
                self.skip_group();
            } else {
                self.pos += 1;
            }
        }
    }

    fn fields(&mut self) -> Scan<Vec<Field>> {
        self.expect_punct('{')?;
        let mut fields = Vec::new();
        while !self.eat_punct('}') {
            while self.peek().kind == TokenKind::Ident && TYPE_MODIFIERS.contains(&self.peek().text) {
                self.pos += 1;
            }
            let ty = self.type_name()?;
            loop {
                let name = self.expect_ident()?;
                let array = self.array_suffix()?;
                let (semantic, _) = self.annotations()?;
                if self.eat_punct('=') {
                    self.skip_initializer(&[',', ';']);
                }
                fields.push(Field {
                    ty: ty.clone(),
                    name: name.text.to_string(),
                    semantic,
                    array,
                    pos: Pos::of(&name),
                });
                if !self.eat_punct(',') {
                    break;
                }
            }
            self.expect_punct(';')?;
        }
        Ok(fields)
    }

    fn struct_decl(&mut self) -> Scan<()> {
        let kw = self.bump();
        let name = self.expect_ident()?;
        let fields = self.fields()?;
        self.unit.structs.push(StructDecl {
            name: name.text.to_string(),
            fields,
            pos: Pos::of(&kw),
        });
        if !self.eat_punct(';') {
            self.recover();
        }
        Ok(())
    }

    fn cbuffer(&mut self) -> Scan<()> {
        let kw = self.bump();
        let name = self.expect_ident()?;
        let (_, register) = self.annotations()?;
        let members = self.fields()?;
        self.eat_punct(';');
        let kind = if kw.text == "tbuffer" {
            ResourceKind::TextureBuffer
        } else {
            ResourceKind::ConstantBuffer
        };
        self.unit.resources.push(ResourceDecl {
            name: name.text.to_string(),
            type_name: kw.text.to_string(),
            kind,
            array: None,
            register,
            members,
            pos: Pos::of(&name),
        });
        Ok(())
    }

    fn declaration(&mut self, attributes: Vec<Attribute>) -> Scan<()> {
        let mut modifiers = Vec::new();
        while self.peek().kind == TokenKind::Ident
            && TYPE_MODIFIERS.contains(&self.peek().text)
            && self.peek_at(1).kind == TokenKind::Ident
        {
            modifiers.push(self.bump().text);
        }
        let ty = self.type_name()?;
        let name = self.expect_ident()?;
        if self.peek().is_punct('(') {
            return self.function(attributes, ty, name);
        }

        let kind = ResourceKind::from_type_name(base_type(&ty));
        let uniform = !modifiers
            .iter()
            .any(|m| matches!(*m, "static" | "groupshared"));
        let mut name = name;
        loop {
            let array = self.array_suffix()?;
            let (_, register) = self.annotations()?;
            if self.eat_punct('=') {
                self.skip_initializer(&[',', ';']);
            }
            match kind {
                Some(kind) => self.unit.resources.push(ResourceDecl {
                    name: name.text.to_string(),
                    type_name: ty.clone(),
                    kind,
                    array,
                    register,
                    members: Vec::new(),
                    pos: Pos::of(&name),
                }),
                None if uniform => self.unit.globals.push(GlobalVar {
                    ty: ty.clone(),
                    name: name.text.to_string(),
                    pos: Pos::of(&name),
                }),
                None => {}
            }
            if !self.eat_punct(',') {
                break;
            }
            name = self.expect_ident()?;
        }
        self.expect_punct(';')
    }

    fn params(&mut self) -> Scan<Vec<Param>> {
        self.expect_punct('(')?;
        let mut params = Vec::new();
        if self.peek().is_ident("void") && self.peek_at(1).is_punct(')') {
            self.pos += 1;
        }
        while !self.eat_punct(')') {
            let mut qualifiers = Vec::new();
            while self.peek().kind == TokenKind::Ident
                && PARAM_QUALIFIERS.contains(&self.peek().text)
                && self.peek_at(1).kind == TokenKind::Ident
            {
                qualifiers.push(self.bump().text.to_string());
            }
            let ty = self.type_name()?;
            let name = self.expect_ident()?;
            let array = self.array_suffix()?;
            let (semantic, _) = self.annotations()?;
            if self.eat_punct('=') {
                self.skip_initializer(&[',', ')']);
            }
            params.push(Param {
                qualifiers,
                ty,
                name: name.text.to_string(),
                semantic,
                array,
                pos: Pos::of(&name),
            });
            if !self.eat_punct(',') {
                self.expect_punct(')')?;
                break;
            }
        }
        Ok(params)
    }

    fn function(&mut self, attributes: Vec<Attribute>, return_type: String, name: Token<'a>) -> Scan<()> {
        let params = self.params()?;
        let (return_semantic, _) = self.annotations()?;
        let body = if self.eat_punct(';') {
            None
        } else if self.peek().is_punct('{') {
            Some(self.body())
        } else {
            return Err(self.unexpected());
        };
        self.unit.functions.push(Function {
            name: name.text.to_string(),
            attributes,
            return_type,
            return_semantic,
            params,
            body,
            pos: Pos::of(&name),
        });
        Ok(())
    }

    /// Consumes a balanced `{...}` body, recording identifiers and checking
    /// that statements inside blocks are terminated.
    fn body(&mut self) -> FunctionBody {
        #[derive(Clone, Copy, PartialEq)]
        enum Brace {
            Block,
            Initializer,
        }
        let mut body = FunctionBody::default();
        let mut braces: Vec<Brace> = Vec::new();
        let mut prev: Option<Token<'a>> = None;
        loop {
            let tok = self.bump();
            if tok.kind == TokenKind::Eof {
                break;
            }
            if !body.text.is_empty() {
                body.text.push(' ');
            }
            body.text.push_str(tok.text);

            match tok.kind {
                TokenKind::Ident => body.idents.push(IdentUse {
                    name: tok.text.to_string(),
                    is_call: self.peek().is_punct('('),
                    pos: Pos::of(&tok),
                }),
                TokenKind::Punct if tok.text == "{" => {
                    let in_init = braces.last() == Some(&Brace::Initializer);
                    let initializer = prev.is_some_and(|p| {
                        p.is_punct('=') || (in_init && (p.is_punct(',') || p.is_punct('{')))
                    });
                    braces.push(if initializer { Brace::Initializer } else { Brace::Block });
                }
                TokenKind::Punct if tok.text == "}" => {
                    let kind = braces.pop();
                    let terminated = prev.map_or(true, |p| p.is_punct(';') || p.is_punct('}') || p.is_punct('{'));
                    if kind == Some(Brace::Block) && !terminated {
                        let _ = self.error_at(tok, "syntax error: missing ';' before '}'".to_string());
                    }
                    if braces.is_empty() {
                        break;
                    }
                }
                _ => {}
            }
            prev = Some(tok);
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::preprocess::{preprocess, PreprocessInput};

    fn scan_src(src: &str) -> (TranslationUnit, Messages) {
        let pre = preprocess(&PreprocessInput {
            source: src,
            source_name: "t.hlsl",
            source_dir: None,
            macros: &[],
            include_paths: &[],
        });
        let mut msgs = Messages::new();
        let toks = lex(&pre, &mut msgs);
        let unit = scan(&toks, &pre, &mut msgs);
        (unit, msgs)
    }

    #[test]
    fn simple_pixel_shader() {
        let (unit, msgs) = scan_src("float4 main(): SV_Target { return float4(1,0,0,1); }");
        assert!(msgs.is_empty(), "{msgs:?}");
        let f = unit.function("main").unwrap();
        assert_eq!(f.return_type, "float4");
        assert_eq!(f.return_semantic.as_deref(), Some("SV_Target"));
        assert!(f.params.is_empty());
        assert!(f.calls().any(|c| c == "float4"));
    }

    #[test]
    fn resources_and_buffers() {
        let src = r#"
struct Light { float3 dir; float pad; };
cbuffer Frame : register(b1) { float4x4 view; float time; };
ConstantBuffer<Light> light : register(b2, space1);
Texture2D<float4> albedo : register(t0), normal;
SamplerState linearSampler;
RWStructuredBuffer<uint> counters : register(u3);
Texture2D bindless[] : register(t0, space2);
float exposure;
static const float PI = 3.14159;
groupshared float cache[64];
"#;
        let (unit, msgs) = scan_src(src);
        assert!(msgs.is_empty(), "{msgs:?}");
        let names: Vec<_> = unit.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Frame", "light", "albedo", "normal", "linearSampler", "counters", "bindless"]
        );
        let frame = &unit.resources[0];
        assert_eq!(frame.kind, ResourceKind::ConstantBuffer);
        assert_eq!(frame.register.unwrap().slot, 1);
        assert_eq!(frame.members.len(), 2);
        let light = &unit.resources[1];
        assert_eq!(light.register.unwrap().space, 1);
        assert_eq!(light.members.len(), 2);
        assert_eq!(unit.resources[2].type_name, "Texture2D<float4>");
        assert!(unit.resources[3].register.is_none());
        assert_eq!(unit.resources[4].kind, ResourceKind::Sampler);
        assert_eq!(unit.resources[5].kind, ResourceKind::Uav);
        assert_eq!(unit.resources[6].array, Some(ArraySize::Unbounded));
        assert_eq!(unit.globals.len(), 1);
        assert_eq!(unit.globals[0].name, "exposure");
    }

    #[test]
    fn attributes_and_params() {
        let src = r#"
[numthreads(8, 8, 1)]
void main(uint3 id : SV_DispatchThreadID, in uint gi : SV_GroupIndex) { }

[maxvertexcount(3)]
void gs(triangle float4 pos[3] : SV_Position, inout TriangleStream<float4> stream) { }
"#;
        let (unit, msgs) = scan_src(src);
        assert!(msgs.is_empty(), "{msgs:?}");
        let cs = unit.function("main").unwrap();
        let attr = cs.attribute("NumThreads").unwrap();
        assert_eq!(attr.arg_u32(0), Some(8));
        assert_eq!(attr.arg_u32(2), Some(1));
        assert_eq!(cs.params[0].semantic.as_deref(), Some("SV_DispatchThreadID"));
        let gs = unit.function("gs").unwrap();
        assert_eq!(gs.params[0].qualifiers, vec!["triangle"]);
        assert_eq!(gs.params[0].array, Some(ArraySize::Fixed(3)));
        assert_eq!(gs.params[1].ty, "TriangleStream<float4>");
        assert!(gs.params[1].qualifiers.contains(&"inout".to_string()));
    }

    #[test]
    fn string_attribute_args() {
        let (unit, _) = scan_src("[shader(\"miss\")] void m(inout float4 p) { }");
        let f = unit.function("m").unwrap();
        assert_eq!(f.attribute("shader").unwrap().args, vec!["miss"]);
    }

    #[test]
    fn unbalanced_braces_reported() {
        let (_, msgs) = scan_src("float4 main() : SV_Target { return 1;");
        assert!(msgs.has_errors());
        let (_, msgs) = scan_src("float4 main() : SV_Target { return 1; }}");
        assert!(msgs.has_errors());
    }

    #[test]
    fn missing_semicolon_reported() {
        let (_, msgs) = scan_src("float4 main() : SV_Target { return float4(1,0,0,1) }");
        assert!(msgs.has_errors());
        let loc = msgs.iter().next().unwrap().location.clone().unwrap();
        assert_eq!(loc.line, 1);
    }

    #[test]
    fn initializer_lists_are_not_blocks() {
        let (_, msgs) = scan_src(
            "float f() { float a[2] = { 1, 2 }; float2x2 m = { {1, 0}, {0, 1} }; return a[0]; }",
        );
        assert!(msgs.is_empty(), "{msgs:?}");
    }

    #[test]
    fn garbage_at_top_level() {
        let (unit, msgs) = scan_src("float4 main() : SV_Target { return 0; }\n= 3;\nfloat g(){return 1;}");
        assert!(msgs.has_errors());
        assert!(unit.function("g").is_some());
    }

    #[test]
    fn calls_are_recorded() {
        let (unit, _) = scan_src("float helper(float x) { return x; }\nfloat4 main() : SV_Target { return helper(1).xxxx; }");
        let main = unit.function("main").unwrap();
        assert!(main.calls().any(|c| c == "helper"));
    }
}
