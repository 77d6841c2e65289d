// Seen Set - grow-only record of message identities already handled
//
// A G-Set without merge: elements are added once and never removed, which is
// what makes forwarding at-most-once.

use std::collections::HashSet;
use std::hash::Hash;

#[derive(Clone, Debug)]
pub struct SeenSet<T>
where
    T: Eq + Hash + Clone,
{
    elements: HashSet<T>,
}

impl<T> Default for SeenSet<T>
where
    T: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SeenSet<T>
where
    T: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            elements: HashSet::new(),
        }
    }

    /// Record an element; returns true only on its first arrival
    pub fn mark(&mut self, element: &T) -> bool {
        if self.elements.contains(element) {
            return false;
        }
        self.elements.insert(element.clone())
    }

    pub fn contains(&self, element: &T) -> bool {
        self.elements.contains(element)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
