//! Transient resources.
//!
//! [`TextureDesc`] / [`BufferDesc`] describe what a pass wants;
//! [`TransientResources`] hands out physical resources for them and takes
//! them back, recycling idle ones across frames.

pub mod descriptor;
pub mod pool;

pub use descriptor::{BufferDesc, ResourceDesc, TextureDesc, WrapMode, descriptor_hash};
pub use pool::{PoolStats, TransientResources};
