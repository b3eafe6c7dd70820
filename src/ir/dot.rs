//! Graphviz rendering of a finished block graph.
//!
//! Read-only serialization: one record-shaped node per surviving block
//! listing its instructions, edges labeled with their relation kind,
//! dominance edges dashed. Intended for `dot -Tpng` style inspection of
//! compiler output.

use std::fmt::Write;

use crate::ir::{BlockGraph, BlockRelation};

/// Renders the graph in Graphviz `dot` syntax.
#[must_use]
pub fn render_dot(graph: &BlockGraph) -> String {
    let mut out = String::from("digraph blocks {\n    node [shape=record];\n");

    for block in graph.blocks() {
        let Some(number) = block.number() else {
            continue;
        };
        let body = block
            .instructions()
            .iter()
            .map(|instr| escape(&instr.to_string()))
            .collect::<Vec<_>>()
            .join(" | ");
        let _ = writeln!(out, "    bb{number} [label=\"BB{number} | {{{body}}}\"];");
    }

    for block in graph.blocks() {
        let Some(from) = block.number() else {
            continue;
        };
        for (child, relation) in block.children() {
            let child = graph.block(*child);
            if child.is_deleted() {
                continue;
            }
            let Some(to) = child.number() else {
                continue;
            };
            let style = if *relation == BlockRelation::Dom {
                " style=dashed"
            } else {
                ""
            };
            let _ = writeln!(out, "    bb{from} -> bb{to} [label=\"{relation}\"{style}];");
        }
    }

    out.push_str("}\n");
    out
}

/// Escapes the characters Graphviz record labels treat specially.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        if matches!(character, '{' | '}' | '|' | '<' | '>' | '"' | '\\') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}
