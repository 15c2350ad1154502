use core::iter::FusedIterator;

use crate::Error;

/// An iterator over the layers of an error chain, from the outermost layer
/// to the root.
///
/// Created by [`Error::layers`]. Every item is itself an [`Error`] handle
/// whose outermost layer is the visited one, so the per-layer accessors
/// ([`Error::own_context`], [`Error::own_stack_trace`]) can be used on it.
#[must_use]
#[derive(Clone)]
pub struct Layers<'a> {
    next: Option<&'a Error>,
}

impl<'a> Layers<'a> {
    pub(crate) fn new(error: &'a Error) -> Self {
        Self { next: Some(error) }
    }
}

impl<'a> Iterator for Layers<'a> {
    type Item = &'a Error;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.predecessor();
        Some(current)
    }
}

impl FusedIterator for Layers<'_> {}
