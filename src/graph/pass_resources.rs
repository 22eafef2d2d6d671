use super::adapter::TransientResource;
use super::handle::Handle;
use super::registry::Registry;
use crate::errors::{Result, RhiError};

/// Physical resources visible to one executing pass.
pub struct PassResources<'r, 'a> {
    registry: &'r Registry<'a>,
    pass: usize,
}

impl<'r, 'a> PassResources<'r, 'a> {
    pub(crate) fn new(registry: &'r Registry<'a>, pass: usize) -> Self {
        Self { registry, pass }
    }

    /// Name of the executing pass.
    #[must_use]
    pub fn pass_name(&self) -> &str {
        &self.registry.passes[self.pass].name
    }

    /// Resolves `handle` to its physical resource.
    ///
    /// The pass must have declared the handle in its setup.
    pub fn get<T: TransientResource>(&self, handle: Handle<T>) -> Result<&'r T::Physical> {
        let node = self.checked_node(handle)?;
        let entry = self.registry.entry_of(node);
        entry
            .physical
            .as_ref()
            .and_then(T::resolve)
            .ok_or_else(|| {
                RhiError::FrameGraph(format!(
                    "resource `{}` is not available in pass `{}`",
                    entry.name,
                    self.pass_name()
                ))
            })
    }

    /// Descriptor `handle` was created or imported with.
    pub fn descriptor<T: TransientResource>(&self, handle: Handle<T>) -> Result<&'r T::Desc> {
        let node = self.checked_node(handle)?;
        let entry = self.registry.entry_of(node);
        T::descriptor(&entry.desc).ok_or_else(|| {
            RhiError::FrameGraph(format!("resource `{}` has a different kind", entry.name))
        })
    }

    fn checked_node<T>(&self, handle: Handle<T>) -> Result<usize> {
        let node = handle.index();
        if node >= self.registry.nodes.len() {
            return Err(RhiError::FrameGraph(format!("invalid handle {handle:?}")));
        }
        debug_assert!(
            self.registry.passes[self.pass].accesses(node),
            "pass `{}` uses an undeclared resource `{}`",
            self.pass_name(),
            self.registry.entry_of(node).name
        );
        Ok(node)
    }
}
