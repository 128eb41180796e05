/// Append-only ordered sequence.
///
/// This is the staging area produced by [`crate::AvlTree::in_order_traversal`]
/// and consumed by merges. Elements keep the order in which they were appended;
/// the only way to combine two lists is [`List::merge`], which places every
/// element of the other list after the elements of this one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct List<T> {
    /// Elements in sequence order.
    values: Vec<T>,
}

impl<T> List<T> {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Creates a list with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of elements in the list.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Indicates whether the list is empty or not.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Appends a value to the end of the list.
    ///
    /// # Arguments
    ///
    /// * `value` - the value to append.
    pub fn push(&mut self, value: T) {
        self.values.push(value);
    }

    /// Returns the value at the specified position, if there is one.
    ///
    /// # Arguments
    ///
    /// * `index` - zero-based position in the list.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.values.get(index)
    }

    pub fn first(&self) -> Option<&T> {
        self.values.first()
    }

    pub fn last(&self) -> Option<&T> {
        self.values.last()
    }

    /// Appends every element of `other` after the elements of this list.
    ///
    /// Both sides keep their internal order; the result is a concatenation,
    /// not a sorted merge.
    ///
    /// # Arguments
    ///
    /// * `other` - the list to append.
    pub fn merge(&mut self, mut other: List<T>) {
        self.values.append(&mut other.values);
    }

    /// An iterator visiting all elements in sequence order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }
}

impl<T> FromIterator<T> for List<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for List<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a List<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use crate::collections::List;

    #[test]
    fn test_push_and_get() {
        let mut list = List::new();
        assert!(list.is_empty());

        for i in 0..10u32 {
            list.push(i);
        }

        assert_eq!(list.len(), 10);
        assert_eq!(list.get(0), Some(&0));
        assert_eq!(list.get(9), Some(&9));
        assert_eq!(list.get(10), None);
        assert_eq!(list.first(), Some(&0));
        assert_eq!(list.last(), Some(&9));
    }

    #[test]
    fn test_merge_concatenates() {
        let mut list: List<i32> = [1, 3, 5].into_iter().collect();
        let other: List<i32> = [2, 4].into_iter().collect();

        list.merge(other);

        // concatenation keeps each side's order, it does not sort
        assert_eq!(list.into_iter().collect::<Vec<_>>(), vec![1, 3, 5, 2, 4]);
    }

    #[test]
    fn test_merge_with_empty() {
        let mut list: List<&str> = List::with_capacity(2);
        list.merge(["a", "b"].into_iter().collect());
        assert_eq!(list.len(), 2);

        list.merge(List::new());
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
