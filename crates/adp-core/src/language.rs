//! Language Profiles for Comment and Structure Scanning
//!
//! A `LanguageProfile` captures everything the engine needs to know about a
//! host language: comment delimiters, string delimiters, and the keywords that
//! open classes, functions and variables. Adding a language means adding one
//! profile value; no scanning code branches on the language name.
//!
//! ## Builtin Profiles
//!
//! - Python (.py)
//! - JavaScript (.js, .jsx, .mjs, .cjs)
//! - TypeScript (.ts, .tsx)
//! - Java (.java)
//! - C# (.cs)
//! - Rust (.rs)
//! - Go (.go)

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

// ============================================================================
// Structural Styles
// ============================================================================

/// How a language delimits nested blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStyle {
    /// `{` ... `}`
    #[default]
    Braces,
    /// Significant indentation (a block ends at the first dedent)
    Indentation,
}

/// Heuristic for declarations that carry no function keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MethodStyle {
    /// Only keyword-introduced functions are recognized
    #[default]
    None,
    /// `name(args) {` class members and `const name = (...) =>` bindings
    JsStyle,
    /// `Type name(args)` typed signatures (Java, C#)
    CStyle,
}

// ============================================================================
// Language Profile
// ============================================================================

/// Comment and structure rules for one host language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageProfile {
    /// Profile name (e.g. "python")
    pub name: String,
    /// File extensions without the leading dot
    pub extensions: Vec<String>,
    /// Line comment token (e.g. "//", "#")
    pub line_comment: Option<String>,
    /// Block comment open/close delimiters (e.g. "/*", "*/")
    pub block_comment: Option<(String, String)>,
    /// Docstring delimiters; each opens and closes with the same token
    pub docstrings: Vec<String>,
    /// Single-line string delimiters (terminate at end of line)
    pub strings: Vec<String>,
    /// String delimiters that may span lines (e.g. JS template literals)
    pub multiline_strings: Vec<String>,
    /// `'x'` character literals where `'` is not a string delimiter (Rust lifetimes)
    pub char_literals: bool,
    /// Block delimiting style
    pub block_style: BlockStyle,
    /// Keywords introducing class-like constructs
    pub class_keywords: Vec<String>,
    /// Keywords introducing functions
    pub function_keywords: Vec<String>,
    /// Keywords introducing variable bindings
    pub variable_keywords: Vec<String>,
    /// Words that may precede a declaration keyword
    pub modifiers: Vec<String>,
    /// Heuristic for keyword-less method declarations
    pub method_style: MethodStyle,
    /// Treat `name = value` lines as variable declarations
    pub assignment_variables: bool,
    /// Line prefixes skipped between a comment and its construct (decorators)
    pub decorator_prefixes: Vec<String>,
}

impl Default for LanguageProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            extensions: Vec::new(),
            line_comment: None,
            block_comment: None,
            docstrings: Vec::new(),
            strings: vec!["\"".to_string(), "'".to_string()],
            multiline_strings: Vec::new(),
            char_literals: false,
            block_style: BlockStyle::Braces,
            class_keywords: Vec::new(),
            function_keywords: Vec::new(),
            variable_keywords: Vec::new(),
            modifiers: Vec::new(),
            method_style: MethodStyle::None,
            assignment_variables: false,
            decorator_prefixes: Vec::new(),
        }
    }
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn c_family_comments(profile: LanguageProfile) -> LanguageProfile {
    LanguageProfile {
        line_comment: Some("//".to_string()),
        block_comment: Some(("/*".to_string(), "*/".to_string())),
        ..profile
    }
}

impl LanguageProfile {
    pub fn python() -> Self {
        Self {
            name: "python".to_string(),
            extensions: words(&["py", "pyi"]),
            line_comment: Some("#".to_string()),
            block_comment: None,
            docstrings: words(&["\"\"\"", "'''"]),
            block_style: BlockStyle::Indentation,
            class_keywords: words(&["class"]),
            function_keywords: words(&["def"]),
            modifiers: words(&["async"]),
            assignment_variables: true,
            decorator_prefixes: words(&["@"]),
            ..Self::default()
        }
    }

    pub fn javascript() -> Self {
        c_family_comments(Self {
            name: "javascript".to_string(),
            extensions: words(&["js", "jsx", "mjs", "cjs"]),
            multiline_strings: words(&["`"]),
            class_keywords: words(&["class"]),
            function_keywords: words(&["function", "function*"]),
            variable_keywords: words(&["const", "let", "var"]),
            modifiers: words(&["export", "default", "async", "static"]),
            method_style: MethodStyle::JsStyle,
            decorator_prefixes: words(&["@"]),
            ..Self::default()
        })
    }

    pub fn typescript() -> Self {
        c_family_comments(Self {
            name: "typescript".to_string(),
            extensions: words(&["ts", "tsx", "mts", "cts"]),
            multiline_strings: words(&["`"]),
            class_keywords: words(&["class", "interface", "enum", "namespace"]),
            function_keywords: words(&["function", "function*"]),
            variable_keywords: words(&["const", "let", "var"]),
            modifiers: words(&[
                "export", "default", "async", "static", "abstract", "declare", "public",
                "private", "protected", "readonly",
            ]),
            method_style: MethodStyle::JsStyle,
            decorator_prefixes: words(&["@"]),
            ..Self::default()
        })
    }

    pub fn java() -> Self {
        c_family_comments(Self {
            name: "java".to_string(),
            extensions: words(&["java"]),
            class_keywords: words(&["class", "interface", "enum", "record", "@interface"]),
            modifiers: words(&[
                "public", "private", "protected", "static", "final", "abstract", "sealed",
                "synchronized", "native", "default", "strictfp",
            ]),
            method_style: MethodStyle::CStyle,
            decorator_prefixes: words(&["@"]),
            ..Self::default()
        })
    }

    pub fn csharp() -> Self {
        c_family_comments(Self {
            name: "csharp".to_string(),
            extensions: words(&["cs"]),
            class_keywords: words(&["class", "interface", "enum", "struct", "record"]),
            modifiers: words(&[
                "public", "private", "protected", "internal", "static", "sealed", "abstract",
                "partial", "virtual", "override", "async", "readonly", "unsafe", "extern", "new",
            ]),
            method_style: MethodStyle::CStyle,
            decorator_prefixes: words(&["["]),
            ..Self::default()
        })
    }

    pub fn rust() -> Self {
        c_family_comments(Self {
            name: "rust".to_string(),
            extensions: words(&["rs"]),
            strings: words(&["\""]),
            char_literals: true,
            class_keywords: words(&["struct", "enum", "trait", "impl", "mod", "union"]),
            function_keywords: words(&["fn"]),
            variable_keywords: words(&["const", "static", "let"]),
            modifiers: words(&["pub", "async", "unsafe", "extern", "const", "default"]),
            decorator_prefixes: words(&["#["]),
            ..Self::default()
        })
    }

    pub fn go() -> Self {
        c_family_comments(Self {
            name: "go".to_string(),
            extensions: words(&["go"]),
            multiline_strings: words(&["`"]),
            class_keywords: words(&["type"]),
            function_keywords: words(&["func"]),
            variable_keywords: words(&["var", "const"]),
            ..Self::default()
        })
    }

    /// All builtin profiles.
    pub fn builtins() -> Vec<Self> {
        vec![
            Self::python(),
            Self::javascript(),
            Self::typescript(),
            Self::java(),
            Self::csharp(),
            Self::rust(),
            Self::go(),
        ]
    }

    /// Whether the profile recognizes any comment syntax at all.
    pub fn has_comments(&self) -> bool {
        self.line_comment.is_some() || self.block_comment.is_some() || !self.docstrings.is_empty()
    }
}

// ============================================================================
// Language Registry
// ============================================================================

/// Lookup of language profiles by file extension.
///
/// The registry is populated before a run and only read afterwards; scan
/// tasks share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    by_extension: HashMap<String, Arc<LanguageProfile>>,
    by_name: HashMap<String, Arc<LanguageProfile>>,
}

static BUILTIN_REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every builtin profile.
    pub fn with_builtins() -> Self {
        BUILTIN_REGISTRY
            .get_or_init(|| {
                let mut registry = Self::new();
                for profile in LanguageProfile::builtins() {
                    registry.register(profile);
                }
                registry
            })
            .clone()
    }

    /// Register a profile, replacing earlier profiles with the same name or
    /// claiming the same extensions.
    pub fn register(&mut self, profile: LanguageProfile) -> Arc<LanguageProfile> {
        let profile = Arc::new(profile);
        if let Some(previous) = self.by_name.insert(profile.name.clone(), profile.clone()) {
            self.by_extension
                .retain(|_, existing| !Arc::ptr_eq(existing, &previous));
        }
        for ext in &profile.extensions {
            self.by_extension
                .insert(ext.trim_start_matches('.').to_lowercase(), profile.clone());
        }
        profile
    }

    /// Look up a profile by extension (case-insensitive, leading dot allowed).
    pub fn for_extension(&self, ext: &str) -> Option<Arc<LanguageProfile>> {
        self.by_extension
            .get(ext.trim_start_matches('.').to_lowercase().as_str())
            .cloned()
    }

    /// Look up a profile by file path.
    pub fn for_path(&self, path: &Path) -> Option<Arc<LanguageProfile>> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.for_extension(ext))
    }

    /// Look up a profile by name.
    pub fn by_name(&self, name: &str) -> Option<Arc<LanguageProfile>> {
        self.by_name.get(name).cloned()
    }

    /// Iterate over registered profiles in name order.
    pub fn profiles(&self) -> Vec<Arc<LanguageProfile>> {
        let mut profiles: Vec<_> = self.by_name.values().cloned().collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        profiles
    }

    /// All registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.by_extension.keys().map(|s| s.as_str()).collect();
        exts.sort_unstable();
        exts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup_by_extension() {
        let registry = LanguageRegistry::with_builtins();
        assert_eq!(registry.for_extension("py").unwrap().name, "python");
        assert_eq!(registry.for_extension(".TSX").unwrap().name, "typescript");
        assert_eq!(registry.for_extension("cs").unwrap().name, "csharp");
        assert!(registry.for_extension("txt").is_none());
    }

    #[test]
    fn test_lookup_by_path() {
        let registry = LanguageRegistry::with_builtins();
        let profile = registry.for_path(Path::new("src/main.rs")).unwrap();
        assert_eq!(profile.name, "rust");
        assert!(registry.for_path(Path::new("Makefile")).is_none());
    }

    #[test]
    fn test_register_replaces_profile_and_extensions() {
        let mut registry = LanguageRegistry::with_builtins();
        let custom = LanguageProfile {
            name: "python".to_string(),
            extensions: vec!["pyw".to_string()],
            line_comment: Some("#".to_string()),
            ..LanguageProfile::default()
        };
        registry.register(custom);

        assert!(registry.for_extension("py").is_none());
        assert_eq!(registry.for_extension("pyw").unwrap().name, "python");
    }

    #[test]
    fn test_profile_deserializes_from_toml() {
        let profile: LanguageProfile = toml::from_str(
            r#"
            name = "lua"
            extensions = ["lua"]
            line_comment = "--"
            block_comment = ["--[[", "]]"]
            function_keywords = ["function"]
            variable_keywords = ["local"]
            "#,
        )
        .unwrap();

        assert_eq!(profile.name, "lua");
        assert_eq!(
            profile.block_comment,
            Some(("--[[".to_string(), "]]".to_string()))
        );
        assert_eq!(profile.block_style, BlockStyle::Braces);
        assert_eq!(profile.strings, vec!["\"", "'"]);
    }

    #[test]
    fn test_builtins_have_comments() {
        for profile in LanguageProfile::builtins() {
            assert!(profile.has_comments(), "{} has no comments", profile.name);
        }
    }
}
