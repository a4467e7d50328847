use std::hash;
use std::fmt;
use std::ops::Deref;
use std::ptr;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

/// A hash-consed node. Two `Hc` values built by the same factory are equal
/// exactly when they point at the same allocation.
#[derive(Debug)]
pub struct Hc<T>(Rc<T>);

impl<T> Clone for Hc<T> {
    fn clone(&self) -> Self { Hc(self.0.clone()) }
}

impl<T: Clone> Hc<T> {
    pub fn cloned(&self) -> T {
        let Hc(inner) = self;
        T::clone(inner)
    }
}

impl<T> Hc<T> {
    pub fn as_ptr(&self) -> *const T { Rc::as_ptr(&self.0) }
}

impl<T> PartialEq for Hc<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl<T> Eq for Hc<T> { }

impl<T> hash::Hash for Hc<T> {
    #[inline]
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        ptr::hash(self.as_ptr(), state);
    }
}

impl<T> Deref for Hc<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: fmt::Display> fmt::Display for Hc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Interning table. Entries hold weak references so that nodes nobody refers
/// to anymore can be collected with [`HcFactory::sweep`].
#[derive(Debug)]
pub struct HcFactory<T: hash::Hash + Eq + Clone> {
    table: AHashMap<T, Weak<T>>,
}

impl<T: hash::Hash + Eq + Clone> HcFactory<T> {
    pub fn with_capacity(capacity: usize) -> HcFactory<T> {
        HcFactory {
            table: AHashMap::with_capacity(capacity)
        }
    }

    pub fn get(&self, element: &T) -> Option<Hc<T>> {
        self.table
            .get(element)
            .and_then(Weak::upgrade)
            .map(Hc)
    }

    pub fn make(&mut self, element: T) -> Hc<T> {
        match self.get(&element) {
            Some(hc) => hc,
            None => {
                let rc = Rc::new(element.clone());
                self.table.insert(element, Rc::downgrade(&rc));
                Hc(rc)
            }
        }
    }

    pub fn len(&self) -> usize { self.table.len() }

    pub fn is_empty(&self) -> bool { self.table.is_empty() }

    /// Drops every entry whose node is no longer alive.
    pub fn sweep(&mut self) -> usize {
        let before = self.table.len();
        self.table.retain(|_, weak| weak.strong_count() > 0);
        before - self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_elements_share_a_node() {
        let mut factory = HcFactory::with_capacity(4);
        let a = factory.make((1, "x"));
        let b = factory.make((1, "x"));
        let c = factory.make((2, "x"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(factory.len(), 2);
    }

    #[test]
    fn sweep_forgets_dead_nodes() {
        let mut factory = HcFactory::with_capacity(4);
        let kept = factory.make(1u32);
        {
            let _dropped = factory.make(2u32);
        }
        assert_eq!(factory.sweep(), 1);
        assert_eq!(factory.get(&1), Some(kept));
        assert_eq!(factory.get(&2), None);
    }
}
