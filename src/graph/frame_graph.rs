//! Frame Graph
//!
//! Passes are declared once per frame with a setup closure (what they
//! create, read and write) and an execute closure (the device work). The
//! graph then:
//!
//! 1. **Compiles**: counts references and culls every pass whose outputs
//!    nobody reads, unless it has a side effect (explicit, or a write to an
//!    imported resource).
//! 2. **Executes** the surviving passes in declaration order, acquiring each
//!    transient resource from the pool right before its first user and
//!    releasing it right after its last one.
//!
//! ```rust,ignore
//! let mut fg = FrameGraph::new();
//! let backbuffer = import_texture(&mut fg, "Backbuffer", &backbuffer);
//!
//! let gbuffer = fg.add_callback_pass(
//!     "GBuffer",
//!     |builder| {
//!         let albedo = builder.create::<FrameGraphTexture>("Albedo", albedo_desc);
//!         builder.write(albedo)
//!     },
//!     |&albedo, resources, rc| { /* draw */ Ok(()) },
//! );
//! fg.add_callback_pass(
//!     "Compose",
//!     |builder| {
//!         builder.read(gbuffer);
//!         builder.write(backbuffer);
//!     },
//!     |_, resources, rc| { /* full screen triangle */ Ok(()) },
//! );
//!
//! fg.compile();
//! fg.execute(&mut rc, &mut transient_resources)?;
//! ```

use super::adapter::{TransientResource, create_physical, destroy_physical};
use super::builder::PassBuilder;
use super::handle::Handle;
use super::pass_resources::PassResources;
use super::registry::{PassNode, Registry};
use crate::errors::Result;
use crate::rhi::{GraphicsBackend, RenderContext};
use crate::transient::TransientResources;

type ExecFn<'a, B> =
    Box<dyn FnOnce(&PassResources<'_, 'a>, &mut RenderContext<B>) -> Result<()> + 'a>;

/// Per-frame declarative pass graph.
///
/// `'a` bounds imported resources and pass closures.
pub struct FrameGraph<'a, B: GraphicsBackend> {
    pub(super) registry: Registry<'a>,
    execs: Vec<Option<ExecFn<'a, B>>>,
    compiled: bool,
}

impl<B: GraphicsBackend> Default for FrameGraph<'_, B> {
    fn default() -> Self {
        Self {
            registry: Registry::default(),
            execs: Vec::new(),
            compiled: false,
        }
    }
}

impl<'a, B: GraphicsBackend> FrameGraph<'a, B> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pass. `setup` declares its resources and returns the data the
    /// pass exposes to later passes (usually handles); `exec` receives that
    /// data back when the pass runs.
    pub fn add_callback_pass<Data, Setup, Exec>(
        &mut self,
        name: &str,
        setup: Setup,
        exec: Exec,
    ) -> Data
    where
        B: 'a,
        Data: Clone + 'a,
        Setup: FnOnce(&mut PassBuilder<'_, 'a>) -> Data,
        Exec: FnOnce(&Data, &PassResources<'_, 'a>, &mut RenderContext<B>) -> Result<()> + 'a,
    {
        let pass = self.registry.passes.len();
        self.registry.passes.push(PassNode {
            name: name.to_string(),
            ..Default::default()
        });

        let data = setup(&mut PassBuilder::new(&mut self.registry, pass));

        let captured = data.clone();
        self.execs.push(Some(Box::new(
            move |resources: &PassResources<'_, 'a>, rc: &mut RenderContext<B>| {
                exec(&captured, resources, rc)
            },
        )));
        self.compiled = false;
        data
    }

    /// Registers a resource owned outside the graph. Its descriptor is
    /// derived from the resource's current properties; the pool never sees
    /// it.
    pub fn import<T: TransientResource>(
        &mut self,
        name: &str,
        resource: &'a T::Physical,
    ) -> Handle<T> {
        let desc = T::describe(resource);
        let node = self
            .registry
            .add_entry(name, desc.into(), Some(T::import(resource)));
        self.compiled = false;
        Handle::new(node)
    }

    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.registry.passes.len()
    }

    /// Number of distinct resources (versions of one resource count once).
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.registry.entries.len()
    }

    /// `Some(true)` if the compiled graph skips the pass named `name`.
    #[must_use]
    pub fn is_culled(&self, name: &str) -> Option<bool> {
        self.registry
            .passes
            .iter()
            .find(|p| p.name == name)
            .map(PassNode::is_culled)
    }

    /// Counts references, culls unused passes and computes resource
    /// lifetimes. Called by [`execute`](Self::execute) if needed.
    pub fn compile(&mut self) {
        let Registry {
            entries,
            nodes,
            passes,
        } = &mut self.registry;

        for node in nodes.iter_mut() {
            node.ref_count = 0;
            node.producer = None;
        }
        for (index, pass) in passes.iter_mut().enumerate() {
            pass.ref_count = pass.writes.len() as u32;
            for &read in &pass.reads {
                nodes[read].ref_count += 1;
            }
            for &write in &pass.writes {
                nodes[write].producer = Some(index);
            }
        }

        // Walk back from unreferenced nodes, releasing their producers.
        let mut unreferenced: Vec<usize> = (0..nodes.len())
            .filter(|&n| nodes[n].ref_count == 0)
            .collect();
        while let Some(node) = unreferenced.pop() {
            let Some(producer) = nodes[node].producer else {
                continue;
            };
            let pass = &mut passes[producer];
            if pass.side_effect {
                continue;
            }
            debug_assert!(pass.ref_count > 0);
            pass.ref_count -= 1;
            if pass.ref_count == 0 {
                for &read in &pass.reads {
                    let read_node = &mut nodes[read];
                    read_node.ref_count -= 1;
                    if read_node.ref_count == 0 {
                        unreferenced.push(read);
                    }
                }
            }
        }

        for entry in entries.iter_mut() {
            entry.first_use = None;
            entry.last_use = None;
        }
        let mut culled = 0;
        for (index, pass) in passes.iter().enumerate() {
            if pass.is_culled() {
                log::debug!("Frame graph: culled pass `{}`", pass.name);
                culled += 1;
                continue;
            }
            for &node in pass.creates.iter().chain(&pass.reads).chain(&pass.writes) {
                let entry = &mut entries[nodes[node].entry];
                entry.first_use.get_or_insert(index);
                entry.last_use = Some(index);
            }
        }

        log::trace!(
            "Frame graph compiled: {} passes ({culled} culled), {} resources",
            passes.len(),
            entries.len()
        );
        self.compiled = true;
    }

    /// Runs every surviving pass, in declaration order.
    ///
    /// On error the remaining passes are skipped and every transient
    /// resource still held is returned to the pool.
    pub fn execute(
        mut self,
        rc: &mut RenderContext<B>,
        pool: &mut TransientResources,
    ) -> Result<()> {
        if !self.compiled {
            self.compile();
        }

        for pass in 0..self.registry.passes.len() {
            if self.registry.passes[pass].is_culled() {
                continue;
            }

            if let Err(err) = self.run_pass(pass, rc, pool) {
                log::error!(
                    "Frame graph pass `{}` failed: {err}",
                    self.registry.passes[pass].name
                );
                self.release_resources(None, pool);
                return Err(err);
            }

            self.release_resources(Some(pass), pool);
        }
        Ok(())
    }

    fn run_pass(
        &mut self,
        pass: usize,
        rc: &mut RenderContext<B>,
        pool: &mut TransientResources,
    ) -> Result<()> {
        for entry in &mut self.registry.entries {
            if !entry.imported && entry.first_use == Some(pass) {
                entry.physical = Some(create_physical(&entry.desc, rc, pool)?);
            }
        }

        let Some(exec) = self.execs[pass].take() else {
            return Ok(());
        };
        log::trace!("Frame graph: executing `{}`", self.registry.passes[pass].name);
        exec(&PassResources::new(&self.registry, pass), rc)
    }

    /// Releases the transient resources whose last user is `pass`, or all
    /// of them when `pass` is `None`.
    fn release_resources(&mut self, pass: Option<usize>, pool: &mut TransientResources) {
        for entry in &mut self.registry.entries {
            if entry.imported || pass.is_some_and(|p| entry.last_use != Some(p)) {
                continue;
            }
            if let Some(physical) = entry.physical.take() {
                destroy_physical(&entry.desc, physical, pool);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::adapter::FrameGraphTexture;
    use crate::rhi::{HeadlessBackend, PixelFormat};
    use crate::transient::TextureDesc;

    type Graph<'a> = FrameGraph<'a, HeadlessBackend>;

    fn desc() -> TextureDesc {
        TextureDesc::new_2d(64, 64, PixelFormat::Rgba8Unorm)
    }

    #[test]
    fn unread_outputs_cull_their_chain() {
        let mut fg = Graph::new();
        let a = fg.add_callback_pass(
            "A",
            |b| {
                let t = b.create::<FrameGraphTexture>("A.out", desc());
                b.write(t)
            },
            |_, _, _| Ok(()),
        );
        fg.add_callback_pass(
            "B",
            |b| {
                b.read(a);
                let t = b.create::<FrameGraphTexture>("B.out", desc());
                b.write(t)
            },
            |_, _, _| Ok(()),
        );
        fg.compile();

        assert_eq!(fg.is_culled("A"), Some(true));
        assert_eq!(fg.is_culled("B"), Some(true));
    }

    #[test]
    fn side_effects_keep_producers_alive() {
        let mut fg = Graph::new();
        let a = fg.add_callback_pass(
            "A",
            |b| {
                let t = b.create::<FrameGraphTexture>("A.out", desc());
                b.write(t)
            },
            |_, _, _| Ok(()),
        );
        fg.add_callback_pass(
            "Present",
            |b| {
                b.read(a);
                b.set_side_effect();
            },
            |_, _, _| Ok(()),
        );
        fg.add_callback_pass("Orphan", |_| (), |_, _, _| Ok(()));
        fg.compile();

        assert_eq!(fg.is_culled("A"), Some(false));
        assert_eq!(fg.is_culled("Present"), Some(false));
        assert_eq!(fg.is_culled("Orphan"), Some(true));
        assert_eq!(fg.is_culled("Missing"), None);
    }

    #[test]
    fn writes_to_foreign_resources_are_renamed() {
        let mut fg = Graph::new();
        let (created, first) = fg.add_callback_pass(
            "A",
            |b| {
                let t = b.create::<FrameGraphTexture>("T", desc());
                (t, b.write(t))
            },
            |_, _, _| Ok(()),
        );
        assert_eq!(created, first);

        let second = fg.add_callback_pass("B", |b| b.write(first), |_, _, _| Ok(()));
        assert_ne!(first, second);
        assert_eq!(fg.resource_count(), 1);
        assert_eq!(fg.registry.nodes[second.index()].version, 1);
    }
}
