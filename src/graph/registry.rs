//! Bookkeeping shared by the builder, the compiler and the executor.

use smallvec::SmallVec;

use super::adapter::PhysicalResource;
use crate::transient::ResourceDesc;

/// One physical resource slot of the graph (all versions share it).
#[derive(Debug)]
pub(crate) struct ResourceEntry<'a> {
    pub name: String,
    pub desc: ResourceDesc,
    /// Present from import for imported entries, between first and last
    /// use for transient ones.
    pub physical: Option<PhysicalResource<'a>>,
    pub imported: bool,
    /// Latest version handed out.
    pub version: u32,
    /// First and last non-culled pass touching the entry.
    pub first_use: Option<usize>,
    pub last_use: Option<usize>,
}

/// One version of a resource.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResourceNode {
    pub entry: usize,
    pub version: u32,
    pub producer: Option<usize>,
    pub ref_count: u32,
}

/// Declared accesses of a pass.
#[derive(Debug, Default)]
pub(crate) struct PassNode {
    pub name: String,
    pub creates: SmallVec<[usize; 4]>,
    pub reads: SmallVec<[usize; 4]>,
    pub writes: SmallVec<[usize; 4]>,
    pub side_effect: bool,
    pub ref_count: u32,
}

impl PassNode {
    pub fn is_culled(&self) -> bool {
        self.ref_count == 0 && !self.side_effect
    }

    /// `true` if the pass declared `node` in any way.
    pub fn accesses(&self, node: usize) -> bool {
        self.creates.contains(&node) || self.reads.contains(&node) || self.writes.contains(&node)
    }
}

/// Nodes, entries and pass declarations of one frame graph.
#[derive(Debug, Default)]
pub(crate) struct Registry<'a> {
    pub entries: Vec<ResourceEntry<'a>>,
    pub nodes: Vec<ResourceNode>,
    pub passes: Vec<PassNode>,
}

impl<'a> Registry<'a> {
    pub fn add_entry(
        &mut self,
        name: &str,
        desc: ResourceDesc,
        physical: Option<PhysicalResource<'a>>,
    ) -> usize {
        let imported = physical.is_some();
        self.entries.push(ResourceEntry {
            name: name.to_string(),
            desc,
            physical,
            imported,
            version: 0,
            first_use: None,
            last_use: None,
        });
        self.nodes.push(ResourceNode {
            entry: self.entries.len() - 1,
            version: 0,
            producer: None,
            ref_count: 0,
        });
        self.nodes.len() - 1
    }

    /// New version of the entry behind `node`.
    pub fn clone_node(&mut self, node: usize) -> usize {
        let entry = self.nodes[node].entry;
        let resource = &mut self.entries[entry];
        resource.version += 1;
        self.nodes.push(ResourceNode {
            entry,
            version: resource.version,
            producer: None,
            ref_count: 0,
        });
        self.nodes.len() - 1
    }

    pub fn entry_of(&self, node: usize) -> &ResourceEntry<'a> {
        &self.entries[self.nodes[node].entry]
    }
}
