//! Frame graph and its adapter to the transient pool.
//!
//! - [`FrameGraph`]: per-frame declarative pass graph with culling
//! - [`PassBuilder`] / [`PassResources`]: declaration and execution views
//! - [`Blackboard`]: type-keyed handle store shared by pass builders
//! - [`adapter`]: pool-backed [`FrameGraphTexture`] / [`FrameGraphBuffer`],
//!   imports of long-lived resources

pub mod adapter;
mod blackboard;
mod builder;
mod frame_graph;
mod graphviz;
mod handle;
mod pass_resources;
mod registry;

pub use adapter::{
    FrameGraphBuffer, FrameGraphTexture, PhysicalResource, TransientResource, get_buffer,
    get_texture, import_buffer, import_texture,
};
pub use blackboard::Blackboard;
pub use builder::PassBuilder;
pub use frame_graph::FrameGraph;
pub use handle::Handle;
pub use pass_resources::PassResources;
