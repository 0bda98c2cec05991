//! Grammar selection and the compiled declaration queries.

use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tree_sitter::{Language, Query};

const JAVASCRIPT_QUERY: &str = r"
(function_declaration name: (identifier) @name) @decl
(generator_function_declaration name: (identifier) @name) @decl
(class_declaration name: (identifier) @name) @decl
(method_definition name: (property_identifier) @name) @decl
(lexical_declaration (variable_declarator name: (identifier) @name value: (arrow_function))) @decl
(variable_declaration (variable_declarator name: (identifier) @name value: (arrow_function))) @decl
(assignment_expression left: (_) @name right: (arrow_function)) @decl
(pair key: (_) @name value: (arrow_function)) @decl
(arrow_function) @decl
";

// class names are `type_identifier` in the TypeScript grammars
const TYPESCRIPT_QUERY: &str = r"
(function_declaration name: (identifier) @name) @decl
(generator_function_declaration name: (identifier) @name) @decl
(class_declaration name: (type_identifier) @name) @decl
(abstract_class_declaration name: (type_identifier) @name) @decl
(method_definition name: (property_identifier) @name) @decl
(method_signature name: (property_identifier) @name) @decl
(abstract_method_signature name: (property_identifier) @name) @decl
(lexical_declaration (variable_declarator name: (identifier) @name value: (arrow_function))) @decl
(variable_declaration (variable_declarator name: (identifier) @name value: (arrow_function))) @decl
(assignment_expression left: (_) @name right: (arrow_function)) @decl
(pair key: (_) @name value: (arrow_function)) @decl
(arrow_function) @decl
";

/// Chunking grammar, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grammar {
    JavaScript,
    TypeScript,
    Tsx,
}

/// A grammar with its declaration query, compiled once per process.
pub(crate) struct Compiled {
    pub language: Language,
    /// `None` when the query failed to compile against the grammar.
    pub query: Option<Query>,
}

impl Grammar {
    /// `.js`/`.mjs` → JavaScript, `.tsx` → TSX, anything else → TypeScript.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("js" | "mjs") => Self::JavaScript,
            Some("tsx") => Self::Tsx,
            _ => Self::TypeScript,
        }
    }

    /// Identifier stored in entry metadata and tags.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
        }
    }

    pub(crate) fn compiled(self) -> &'static Compiled {
        static JAVASCRIPT: OnceLock<Compiled> = OnceLock::new();
        static TYPESCRIPT: OnceLock<Compiled> = OnceLock::new();
        static TSX: OnceLock<Compiled> = OnceLock::new();

        match self {
            Self::JavaScript => JAVASCRIPT.get_or_init(|| {
                compile(
                    self,
                    tree_sitter_javascript::LANGUAGE.into(),
                    JAVASCRIPT_QUERY,
                )
            }),
            Self::TypeScript => TYPESCRIPT.get_or_init(|| {
                compile(
                    self,
                    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                    TYPESCRIPT_QUERY,
                )
            }),
            Self::Tsx => TSX.get_or_init(|| {
                compile(
                    self,
                    tree_sitter_typescript::LANGUAGE_TSX.into(),
                    TYPESCRIPT_QUERY,
                )
            }),
        }
    }
}

impl std::fmt::Display for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

fn compile(grammar: Grammar, language: Language, source: &str) -> Compiled {
    let query = match Query::new(&language, source) {
        Ok(q) => Some(q),
        Err(e) => {
            tracing::warn!(grammar = grammar.id(), "declaration query failed to compile: {e}");
            None
        }
    };
    Compiled { language, query }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_path_javascript_variants() {
        for name in ["a.js", "dir/b.mjs"] {
            assert_eq!(Grammar::from_path(Path::new(name)), Grammar::JavaScript, "{name}");
        }
    }

    #[test]
    fn from_path_tsx() {
        assert_eq!(Grammar::from_path(Path::new("App.tsx")), Grammar::Tsx);
    }

    #[test]
    fn from_path_defaults_to_typescript() {
        for name in ["a.ts", "README.md", "Makefile", "x.jsx"] {
            assert_eq!(Grammar::from_path(Path::new(name)), Grammar::TypeScript, "{name}");
        }
    }

    #[test]
    fn queries_compile_for_every_grammar() {
        for g in [Grammar::JavaScript, Grammar::TypeScript, Grammar::Tsx] {
            assert!(g.compiled().query.is_some(), "{g}");
        }
    }

    #[test]
    fn compiled_is_memoized() {
        let a: *const Compiled = Grammar::Tsx.compiled();
        let b: *const Compiled = Grammar::Tsx.compiled();
        assert_eq!(a, b);
    }

    #[test]
    fn id_matches_display() {
        for g in [Grammar::JavaScript, Grammar::TypeScript, Grammar::Tsx] {
            assert_eq!(g.to_string(), g.id());
        }
    }
}
