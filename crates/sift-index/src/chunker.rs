//! Declaration-level chunking via tree-sitter queries.

use std::collections::HashSet;

use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator, Tree};

use crate::languages::Grammar;

/// Kind of the single chunk emitted when the source cannot be queried.
pub const FILE_KIND: &str = "file";
/// Kind of the single chunk emitted when no declaration matched.
pub const SCRIPT_KIND: &str = "script";
pub const ANONYMOUS: &str = "anonymous";

/// Parents whose own pattern already names the arrow function they hold.
const NAMING_PARENTS: &[&str] = &["variable_declarator", "assignment_expression", "pair"];

/// A declaration-sized piece of a source file. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// Grammar node kind, or [`FILE_KIND`] / [`SCRIPT_KIND`].
    pub kind: String,
    pub name: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    /// Byte range within the source; tells apart chunks on the same lines.
    pub start_byte: usize,
    pub end_byte: usize,
}

/// Split `code` into function, class, method and arrow-function chunks.
///
/// Never fails and never returns an empty list for non-empty input: if the
/// source cannot be parsed or queried the whole text becomes one `file` chunk,
/// and if nothing matched it becomes one `script` chunk.
#[must_use]
pub fn chunk(code: &str, grammar: Grammar) -> Vec<Chunk> {
    if code.is_empty() {
        return Vec::new();
    }

    let compiled = grammar.compiled();
    let Some(query) = compiled.query.as_ref() else {
        return vec![whole(code, FILE_KIND)];
    };

    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&compiled.language) {
        tracing::warn!(grammar = grammar.id(), "set_language failed: {e}");
        return vec![whole(code, FILE_KIND)];
    }
    let Some(tree) = parser.parse(code, None) else {
        tracing::debug!(grammar = grammar.id(), "parse failed, using whole file");
        return vec![whole(code, FILE_KIND)];
    };

    let chunks = declarations(&tree, query, code);
    if chunks.is_empty() {
        vec![whole(code, SCRIPT_KIND)]
    } else {
        chunks
    }
}

fn declarations(tree: &Tree, query: &Query, code: &str) -> Vec<Chunk> {
    let (Some(decl_idx), name_idx) = (
        query.capture_index_for_name("decl"),
        query.capture_index_for_name("name"),
    ) else {
        return Vec::new();
    };

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), code.as_bytes());
    let mut seen = HashSet::new();
    let mut chunks = Vec::new();

    while let Some(m) = matches.next() {
        let mut decl = None;
        let mut name = None;
        for cap in m.captures {
            if cap.index == decl_idx {
                decl = Some(cap.node);
            } else if Some(cap.index) == name_idx {
                name = Some(cap.node);
            }
        }
        let Some(node) = decl else {
            continue;
        };
        if name.is_none()
            && node
                .parent()
                .is_some_and(|p| NAMING_PARENTS.contains(&p.kind()))
        {
            continue;
        }
        if !seen.insert((node.start_byte(), node.end_byte())) {
            continue;
        }

        let name = name
            .and_then(|n| n.utf8_text(code.as_bytes()).ok())
            .unwrap_or(ANONYMOUS);
        chunks.push(Chunk {
            text: code[node.byte_range()].to_owned(),
            kind: node.kind().to_owned(),
            name: name.to_owned(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
        });
    }

    chunks
}

fn whole(code: &str, kind: &str) -> Chunk {
    Chunk {
        text: code.to_owned(),
        kind: kind.to_owned(),
        name: ANONYMOUS.to_owned(),
        start_line: 1,
        end_line: code.lines().count().max(1),
        start_byte: 0,
        end_byte: code.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(chunk("", Grammar::TypeScript).is_empty());
    }

    #[test]
    fn typescript_function() {
        let code = "function foo(a: number): number {\n  return a + 1;\n}\n";
        let chunks = chunk(code, Grammar::TypeScript);
        assert_eq!(chunks.len(), 1);
        let c = &chunks[0];
        assert_eq!(c.name, "foo");
        assert_eq!(c.kind, "function_declaration");
        assert_eq!((c.start_line, c.end_line), (1, 3));
        assert!(c.text.starts_with("function foo"));
        assert!(c.text.ends_with('}'));
    }

    #[test]
    fn typescript_class_and_methods() {
        let code = "\
export class Greeter {
  greet(name: string) {
    return `hi ${name}`;
  }

  wave() {}
}
";
        let chunks = chunk(code, Grammar::TypeScript);
        assert_eq!(names(&chunks), ["Greeter", "greet", "wave"]);
        assert_eq!(chunks[0].kind, "class_declaration");
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 7));
        assert_eq!(chunks[1].kind, "method_definition");
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (2, 4));
    }

    #[test]
    fn typescript_interface_method_signature() {
        let code = "interface Store {\n  add(x: string): void;\n}\n";
        let chunks = chunk(code, Grammar::TypeScript);
        assert_eq!(names(&chunks), ["add"]);
        assert_eq!(chunks[0].kind, "method_signature");
    }

    #[test]
    fn javascript_class_uses_identifier_name() {
        let code = "class Cache {\n  get(k) { return this.m[k]; }\n}\n";
        let chunks = chunk(code, Grammar::JavaScript);
        assert_eq!(names(&chunks), ["Cache", "get"]);
    }

    #[test]
    fn arrow_function_binding() {
        let code = "const add = (a, b) => a + b;\nlet n = 3;\n";
        let chunks = chunk(code, Grammar::JavaScript);
        assert_eq!(names(&chunks), ["add"]);
        assert_eq!(chunks[0].text, "const add = (a, b) => a + b;");
        assert_eq!(chunks[0].kind, "lexical_declaration");
    }

    #[test]
    fn default_exported_arrow_is_anonymous() {
        let code = "export default () => 42;\n";
        let chunks = chunk(code, Grammar::TypeScript);
        assert_eq!(names(&chunks), [ANONYMOUS]);
        assert_eq!(chunks[0].kind, "arrow_function");
    }

    #[test]
    fn var_bound_arrow() {
        let chunks = chunk("var f = () => 1;\n", Grammar::JavaScript);
        assert_eq!(names(&chunks), ["f"]);
        assert_eq!(chunks[0].kind, "variable_declaration");
    }

    #[test]
    fn member_assigned_arrow_is_named_after_target() {
        let code = "module.exports.handler = async (req) => {\n  return req.body;\n};\n";
        let chunks = chunk(code, Grammar::JavaScript);
        assert_eq!(names(&chunks), ["module.exports.handler"]);
        assert_eq!(chunks[0].kind, "assignment_expression");
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 3));
    }

    #[test]
    fn object_property_arrow_is_named_after_key() {
        let code = "export const api = { run: () => 1 };\n";
        let chunks = chunk(code, Grammar::TypeScript);
        assert_eq!(names(&chunks), ["run"]);
        assert_eq!(chunks[0].kind, "pair");
        assert_eq!(chunks[0].text, "run: () => 1");
    }

    #[test]
    fn callback_arrow_is_anonymous() {
        let code = "foo(() => {\n  bar();\n});\n";
        let chunks = chunk(code, Grammar::JavaScript);
        assert_eq!(names(&chunks), [ANONYMOUS]);
        assert_eq!(chunks[0].kind, "arrow_function");
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 3));
    }

    #[test]
    fn same_name_on_one_line_differs_by_byte_range() {
        let code = "class A { f() {} } class B { f() {} }";
        let chunks = chunk(code, Grammar::JavaScript);
        assert_eq!(names(&chunks), ["A", "f", "B", "f"]);
        assert_ne!(
            (chunks[1].start_byte, chunks[1].end_byte),
            (chunks[3].start_byte, chunks[3].end_byte)
        );
        assert_eq!(&code[chunks[3].start_byte..chunks[3].end_byte], "f() {}");
    }

    #[test]
    fn tsx_component() {
        let code = "export function App() {\n  return <div>hello</div>;\n}\n";
        let chunks = chunk(code, Grammar::Tsx);
        assert_eq!(names(&chunks), ["App"]);
    }

    #[test]
    fn script_without_declarations_is_one_chunk() {
        let code = "console.log('hi');\nprocess.exit(0);\n";
        let chunks = chunk(code, Grammar::JavaScript);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, SCRIPT_KIND);
        assert_eq!(chunks[0].text, code);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 2));
    }

    #[test]
    fn prose_still_produces_a_chunk() {
        let code = "# Notes\n\nSome *markdown* text.\n";
        let chunks = chunk(code, Grammar::from_path(std::path::Path::new("notes.md")));
        assert!(!chunks.is_empty());
    }

    #[test]
    fn whitespace_only_input_is_a_script_chunk() {
        let chunks = chunk("\n\n", Grammar::TypeScript);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "\n\n");
    }

    #[test]
    fn whole_file_chunk_covers_input() {
        let c = whole("a\nb\nc", FILE_KIND);
        assert_eq!(c.text, "a\nb\nc");
        assert_eq!((c.start_line, c.end_line), (1, 3));
        assert_eq!((c.start_byte, c.end_byte), (0, 5));
        assert_eq!(c.name, ANONYMOUS);
    }
}
