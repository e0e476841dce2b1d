//! Compile options shared by every backend.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::ShaderModel;

/// A preprocessor macro supplied with a compile request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShaderMacro {
    /// Macro name.
    pub name: String,
    /// Macro body. An empty definition defines the macro as `1`.
    pub definition: String,
}

impl ShaderMacro {
    /// Creates a macro with the given name and definition.
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
        }
    }

    /// Parses a `NAME=VALUE` or bare `NAME` command-line define. A bare
    /// name is defined as `1`.
    pub fn parse_define(define: &str) -> Self {
        match define.split_once('=') {
            Some((name, value)) => Self::new(name.trim(), value.trim()),
            None => Self::new(define.trim(), "1"),
        }
    }
}

/// Boolean switches that change code generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompileFlags {
    /// Embed debug information (and produce a disassembly listing).
    pub debug_info: bool,
    /// Run the optimizer at [`CompileOptions::optimization_level`].
    pub optimize: bool,
    /// Treat every warning as an error.
    pub warnings_as_errors: bool,
    /// Strict IEEE-754 numerics.
    pub strict_numerics: bool,
    /// Allow unbounded resource arrays (`Texture2D t[]`).
    pub unbounded_resource_arrays: bool,
}

impl Default for CompileFlags {
    fn default() -> Self {
        Self {
            debug_info: false,
            optimize: true,
            warnings_as_errors: false,
            strict_numerics: false,
            unbounded_resource_arrays: false,
        }
    }
}

/// Everything besides the source text and entry point that affects the
/// output of a compilation.
///
/// Options are treated as immutable once handed to a compile request and
/// participate in full in the request fingerprint, including macro order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Target shader-model tier.
    pub target_model: ShaderModel,
    /// Ordered macro definitions.
    pub macros: Vec<ShaderMacro>,
    /// Include search paths, searched in order after the including file's directory.
    pub include_paths: Vec<PathBuf>,
    /// Code generation switches.
    pub flags: CompileFlags,
    /// Optimization level, 0 through 3.
    pub optimization_level: u8,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            target_model: ShaderModel::default(),
            macros: Vec::new(),
            include_paths: Vec::new(),
            flags: CompileFlags::default(),
            optimization_level: 3,
        }
    }
}

impl CompileOptions {
    /// Highest accepted optimization level.
    pub const MAX_OPTIMIZATION_LEVEL: u8 = 3;

    /// Creates default options targeting the given tier.
    pub fn for_model(model: ShaderModel) -> Self {
        Self {
            target_model: model,
            ..Self::default()
        }
    }

    /// Appends a macro definition.
    pub fn with_macro(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.macros.push(ShaderMacro::new(name, definition));
        self
    }

    /// Appends an include search path.
    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    /// Sets the target tier.
    pub fn with_model(mut self, model: ShaderModel) -> Self {
        self.target_model = model;
        self
    }

    /// Enables or disables debug information.
    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.flags.debug_info = enabled;
        self
    }

    /// Sets the optimization level and enables the optimizer.
    pub fn with_optimization_level(mut self, level: u8) -> Self {
        self.flags.optimize = true;
        self.optimization_level = level;
        self
    }

    /// Returns the effective optimization level, or `None` when the optimizer is disabled.
    pub fn effective_optimization(&self) -> Option<u8> {
        self.flags.optimize.then_some(self.optimization_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = CompileOptions::default();
        assert_eq!(opts.target_model, ShaderModel::SM_6_4);
        assert_eq!(opts.optimization_level, 3);
        assert!(opts.flags.optimize);
        assert!(!opts.flags.debug_info);
        assert!(opts.macros.is_empty());
    }

    #[test]
    fn parse_define_forms() {
        assert_eq!(ShaderMacro::parse_define("QUALITY=2"), ShaderMacro::new("QUALITY", "2"));
        assert_eq!(ShaderMacro::parse_define("FAST"), ShaderMacro::new("FAST", "1"));
        assert_eq!(ShaderMacro::parse_define(" A = b c "), ShaderMacro::new("A", "b c"));
    }

    #[test]
    fn builder_preserves_macro_order() {
        let opts = CompileOptions::default()
            .with_macro("B", "1")
            .with_macro("A", "2");
        assert_eq!(opts.macros[0].name, "B");
        assert_eq!(opts.macros[1].name, "A");
    }

    #[test]
    fn effective_optimization_respects_flag() {
        let mut opts = CompileOptions::default().with_optimization_level(1);
        assert_eq!(opts.effective_optimization(), Some(1));
        opts.flags.optimize = false;
        assert_eq!(opts.effective_optimization(), None);
    }
}
