use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Typed reference to one version of a frame graph resource.
///
/// Writing a resource that another pass already produced yields a new
/// handle (a new version), so the order of writers is explicit in the
/// graph. Handles are only meaningful for the graph that issued them.
pub struct Handle<T> {
    pub(crate) node: u32,
    marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub(crate) fn new(node: usize) -> Self {
        Self {
            node: node as u32,
            marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.node as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.node)
    }
}
