use std::any::{Any, TypeId};
use std::fmt;

use rustc_hash::FxHashMap;

/// Type-keyed store for passing pass outputs between the functions that
/// build a frame graph.
///
/// ```rust,ignore
/// #[derive(Clone, Copy)]
/// struct GBufferData { albedo: Handle<FrameGraphTexture>, depth: Handle<FrameGraphTexture> }
///
/// blackboard.add(gbuffer_pass(&mut fg));
/// let gbuffer = blackboard.get::<GBufferData>().copied();
/// ```
#[derive(Default)]
pub struct Blackboard {
    storage: FxHashMap<TypeId, Box<dyn Any>>,
}

impl Blackboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data`, replacing an earlier value of the same type.
    pub fn add<T: 'static>(&mut self, data: T) {
        self.storage.insert(TypeId::of::<T>(), Box::new(data));
    }

    #[must_use]
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.storage
            .get(&TypeId::of::<T>())
            .and_then(|data| data.downcast_ref())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.storage
            .get_mut(&TypeId::of::<T>())
            .and_then(|data| data.downcast_mut())
    }

    #[must_use]
    pub fn has<T: 'static>(&self) -> bool {
        self.storage.contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.storage
            .remove(&TypeId::of::<T>())
            .and_then(|data| data.downcast().ok())
            .map(|data| *data)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn clear(&mut self) {
        self.storage.clear();
    }
}

impl fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blackboard")
            .field("entries", &self.storage.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct SceneColor(u32);

    #[test]
    fn values_are_keyed_by_type() {
        let mut blackboard = Blackboard::new();
        assert!(!blackboard.has::<SceneColor>());

        blackboard.add(SceneColor(1));
        blackboard.add(7_u64);
        assert_eq!(blackboard.get::<SceneColor>(), Some(&SceneColor(1)));
        assert_eq!(blackboard.get::<u64>(), Some(&7));

        blackboard.add(SceneColor(2));
        assert_eq!(blackboard.len(), 2);
        if let Some(color) = blackboard.get_mut::<SceneColor>() {
            color.0 += 1;
        }
        assert_eq!(blackboard.remove::<SceneColor>(), Some(SceneColor(3)));
        assert!(blackboard.get::<SceneColor>().is_none());
    }
}
