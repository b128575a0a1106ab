//! Pull-based repeated fields.
//!
//! Response fields such as "every binding of every layer" are not built up
//! front.  A [`Repeated`] only knows its length and how to produce the element
//! at a given index; the encoder pulls elements one at a time, in index order,
//! while it writes the frame.

use std::fmt;

/// A repeated field whose elements are generated on demand.
pub struct Repeated<'a, T> {
    len: usize,
    generate: Box<dyn Fn(usize) -> T + 'a>,
}

impl<'a, T> Repeated<'a, T> {
    /// Creates a field of `len` elements produced by `generate(index)`.
    pub fn new(len: usize, generate: impl Fn(usize) -> T + 'a) -> Self {
        Self {
            len,
            generate: Box::new(generate),
        }
    }

    /// A field with no elements.
    pub fn empty() -> Self {
        Self::new(0, |_| unreachable!("empty repeated field has no elements"))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Generates the element at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<T> {
        (index < self.len).then(|| (self.generate)(index))
    }

    /// Generates every element in index order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |index| (self.generate)(index))
    }
}

impl<'a, T: Clone + 'a> Repeated<'a, T> {
    /// A field backed by an existing slice.
    pub fn from_slice(items: &'a [T]) -> Self {
        Self::new(items.len(), move |index| items[index].clone())
    }
}

impl<T> fmt::Debug for Repeated<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repeated").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_elements_are_generated_lazily_in_order() {
        // Arrange
        let calls = Cell::new(0);
        let field = Repeated::new(3, |i| {
            calls.set(calls.get() + 1);
            i * 10
        });
        assert_eq!(calls.get(), 0);

        // Act
        let items: Vec<_> = field.iter().collect();

        // Assert
        assert_eq!(items, vec![0, 10, 20]);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_get_past_end_returns_none() {
        let field = Repeated::new(2, |i| i);
        assert_eq!(field.get(1), Some(1));
        assert_eq!(field.get(2), None);
        assert!(Repeated::<u8>::empty().get(0).is_none());
    }

    #[test]
    fn test_from_slice_clones_elements() {
        let names = ["a".to_string(), "b".to_string()];
        let field = Repeated::from_slice(&names);
        assert_eq!(field.iter().collect::<Vec<_>>(), names.to_vec());
    }
}
