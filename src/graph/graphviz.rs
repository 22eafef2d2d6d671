//! Graphviz dump of a compiled frame graph.
//!
//! Passes are orange boxes (grey when culled), resources are one record per
//! version labelled with their descriptor. Imported resources are sky blue.
//! Edges: pass → resource for writes, resource → pass for reads.

use std::fmt::{self, Write};

use super::frame_graph::FrameGraph;
use crate::rhi::GraphicsBackend;

impl<B: GraphicsBackend> FrameGraph<'_, B> {
    /// Writes the graph in DOT format. Call after
    /// [`compile`](Self::compile) for accurate culling and reference counts.
    pub fn write_graphviz<W: Write>(&self, w: &mut W) -> fmt::Result {
        let registry = &self.registry;

        writeln!(w, "digraph FrameGraph {{")?;
        writeln!(w, "  rankdir=LR;")?;
        writeln!(w, "  node [shape=record, fontname=\"helvetica\", fontsize=10];")?;

        for (index, pass) in registry.passes.iter().enumerate() {
            let fill = if pass.is_culled() { "lightgray" } else { "orange" };
            writeln!(
                w,
                "  P{index} [label=\"{{{} | Refs: {}}}\", style=\"rounded,filled\", fillcolor={fill}];",
                escape(&pass.name),
                pass.ref_count
            )?;
        }

        for (index, node) in registry.nodes.iter().enumerate() {
            let entry = &registry.entries[node.entry];
            let fill = if entry.imported { "skyblue" } else { "lightsteelblue" };
            writeln!(
                w,
                "  R{index} [label=\"{{{} | v{} | {} | Refs: {}}}\", style=filled, fillcolor={fill}];",
                escape(&entry.name),
                node.version,
                escape(&entry.desc.to_string()),
                node.ref_count
            )?;
        }

        for (index, pass) in registry.passes.iter().enumerate() {
            for &node in &pass.writes {
                writeln!(w, "  P{index} -> R{node} [color=orangered];")?;
            }
            for &node in &pass.reads {
                writeln!(w, "  R{node} -> P{index} [color=olivedrab];")?;
            }
        }

        writeln!(w, "}}")
    }
}

/// Escapes characters that are special inside record labels.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '"' | '{' | '}' | '|' | '<' | '>' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::adapter::{FrameGraphBuffer, FrameGraphTexture};
    use crate::rhi::{HeadlessBackend, PixelFormat};
    use crate::transient::{BufferDesc, TextureDesc};

    #[test]
    fn labels_use_descriptor_strings() {
        let mut fg = FrameGraph::<HeadlessBackend>::new();
        fg.add_callback_pass(
            "Lighting",
            |b| {
                let color = b.create::<FrameGraphTexture>(
                    "SceneColor",
                    TextureDesc::new_2d(256, 256, PixelFormat::Rgba16F),
                );
                let lights = b.create::<FrameGraphBuffer>("Lights", BufferDesc { size: 64 });
                b.write(color);
                b.write(lights);
                b.set_side_effect();
            },
            |_, _, _| Ok(()),
        );
        fg.compile();

        let mut dot = String::new();
        fg.write_graphviz(&mut dot).unwrap();

        assert!(dot.starts_with("digraph FrameGraph {"));
        assert!(dot.contains("256x256 [RGBA16F]"));
        assert!(dot.contains("size: 64 bytes"));
        assert!(dot.contains("P0 -> R0"));
        assert!(dot.contains("P0 -> R1"));
    }

    #[test]
    fn escapes_record_syntax() {
        assert_eq!(escape("a|b{c}"), "a\\|b\\{c\\}");
    }
}
