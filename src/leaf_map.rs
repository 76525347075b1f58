//! A [`Truncation`] paired with a parallel value vector.

use crate::error::TreeError;
use crate::label::NodeLabel;
use crate::truncation::Truncation;

/// `(Truncation, Vec<V>)` with one value per leaf.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafMap<V> {
    truncation: Truncation,
    values: Vec<V>,
}

impl<V> LeafMap<V> {
    pub fn from_parts(truncation: Truncation, values: Vec<V>) -> Result<Self, TreeError> {
        if truncation.len() != values.len() {
            return Err(TreeError::MismatchedDimension {
                expected: truncation.len(),
                actual: values.len(),
            });
        }
        Ok(LeafMap { truncation, values })
    }

    pub(crate) fn from_parts_unchecked(truncation: Truncation, values: Vec<V>) -> Self {
        debug_assert_eq!(truncation.len(), values.len());
        LeafMap { truncation, values }
    }

    pub fn truncation(&self) -> &Truncation {
        &self.truncation
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<(&NodeLabel, &V)> {
        self.truncation.get(index).zip(self.values.get(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeLabel, &V)> {
        self.truncation.leaves().iter().zip(self.values.iter())
    }

    /// Walks a label-descent stream from the root downward and returns the
    /// deepest label along it that is a leaf of this map, together with its
    /// value. Returns `None` for the value if the stream is exhausted
    /// before reaching one of our leaves (the descended point falls outside
    /// this leaf map's domain).
    pub fn query<I: IntoIterator<Item = NodeLabel>>(&self, descent: I) -> (NodeLabel, Option<&V>) {
        let mut last = NodeLabel::root();
        for label in descent {
            last = label.clone();
            if let Ok(idx) = self.truncation.leaves().binary_search(&label) {
                return (label, Some(&self.values[idx]));
            }
        }
        (last, None)
    }
}

impl<V: Clone> LeafMap<V> {
    /// Parallel sub-sequence over `range`. `range` must come from
    /// [`Truncation::subtree`] or similar, so the slice remains a sorted
    /// antichain.
    pub fn slice(&self, range: std::ops::Range<usize>) -> LeafMap<V> {
        let leaves = self.truncation.leaves()[range.clone()].to_vec();
        let values = self.values[range].to_vec();
        LeafMap::from_parts_unchecked(Truncation::from_sorted_antichain_unchecked(leaves), values)
    }

    /// Concatenates leaf maps whose truncations are already known to
    /// interleave into one sorted antichain (e.g. disjoint contiguous
    /// ranges produced by the same parent truncation).
    pub fn concat(maps: &[LeafMap<V>]) -> LeafMap<V> {
        let mut leaves = Vec::new();
        let mut values = Vec::new();
        for m in maps {
            leaves.extend(m.truncation.leaves().iter().cloned());
            values.extend(m.values.iter().cloned());
        }
        LeafMap::from_parts_unchecked(Truncation::from_sorted_antichain_unchecked(leaves), values)
    }
}
