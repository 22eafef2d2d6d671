//! Raw device object handles.
//!
//! Handles are `slotmap` keys. A backend hands them out from its own slot
//! maps, so a destroyed handle can never alias a newer object. The null key
//! plays the role of the "default / empty" handle: destroying it is a no-op
//! and binding it is an invariant violation.

use slotmap::new_key_type;

new_key_type! {
    /// A device texture.
    pub struct TextureId;
    /// A 2D reinterpretation of one face / layer / mip of a texture.
    pub struct ViewId;
    /// A device buffer.
    pub struct BufferId;
    /// A standalone sampler object.
    pub struct SamplerId;
    /// A linked shader program (graphics or compute).
    pub struct ProgramId;
    /// A vertex input layout object.
    pub struct VertexArrayId;
    /// An offscreen render target set opened by `begin_rendering`.
    pub struct FramebufferId;
}
