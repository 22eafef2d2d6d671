use super::adapter::TransientResource;
use super::handle::Handle;
use super::registry::Registry;

/// Declares the resources a pass creates, reads and writes.
///
/// Handed to the setup closure of
/// [`FrameGraph::add_callback_pass`](super::FrameGraph::add_callback_pass).
pub struct PassBuilder<'g, 'a> {
    registry: &'g mut Registry<'a>,
    pass: usize,
}

impl<'g, 'a> PassBuilder<'g, 'a> {
    pub(crate) fn new(registry: &'g mut Registry<'a>, pass: usize) -> Self {
        Self { registry, pass }
    }

    /// Declares a transient resource. It is acquired from the pool right
    /// before the first pass using it runs and released right after the
    /// last one.
    pub fn create<T: TransientResource>(&mut self, name: &str, desc: T::Desc) -> Handle<T> {
        let node = self.registry.add_entry(name, desc.into(), None);
        self.registry.passes[self.pass].creates.push(node);
        Handle::new(node)
    }

    pub fn read<T: TransientResource>(&mut self, handle: Handle<T>) -> Handle<T> {
        let node = handle.index();
        debug_assert!(node < self.registry.nodes.len(), "read of a foreign handle");

        let pass = &mut self.registry.passes[self.pass];
        if !pass.reads.contains(&node) {
            pass.reads.push(node);
        }
        handle
    }

    /// Declares a write and returns the handle later passes must use.
    ///
    /// A resource created by this pass keeps its handle. Any other resource
    /// is read and then renamed to a new version, which orders this pass
    /// after every earlier writer. Writing an imported resource marks the
    /// pass as having a side effect.
    pub fn write<T: TransientResource>(&mut self, handle: Handle<T>) -> Handle<T> {
        let node = handle.index();
        debug_assert!(node < self.registry.nodes.len(), "write of a foreign handle");

        if self.registry.entry_of(node).imported {
            self.set_side_effect();
        }

        if self.registry.passes[self.pass].creates.contains(&node) {
            let pass = &mut self.registry.passes[self.pass];
            if !pass.writes.contains(&node) {
                pass.writes.push(node);
            }
            return handle;
        }

        self.read(handle);
        let renamed = self.registry.clone_node(node);
        self.registry.passes[self.pass].writes.push(renamed);
        Handle::new(renamed)
    }

    /// Keeps the pass even if nothing reads its outputs.
    pub fn set_side_effect(&mut self) {
        self.registry.passes[self.pass].side_effect = true;
    }
}
