//! Node-address algebra for the infinite binary space partition.
//!
//! A [`NodeLabel`] addresses a node by a single positive integer encoding its
//! root-to-node path: the most significant bit is a sentinel marking the
//! root, and each subsequent bit is `0` for a left child, `1` for a right
//! child. All operations below are pure bit manipulations on that integer;
//! there are no parent back-pointers anywhere in this crate.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TreeError;

/// Address of a node in the infinite binary tree.
///
/// `NodeLabel(1)` is the root. `NodeLabel(lab)` at depth `d` has
/// `d = bitLength(lab) - 1` path bits below the sentinel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeLabel(BigUint);

impl NodeLabel {
    /// The root label, `1`.
    pub fn root() -> Self {
        NodeLabel(BigUint::one())
    }

    /// Builds a label from its raw integer value, rejecting `0`.
    pub fn from_biguint(value: BigUint) -> Result<Self, TreeError> {
        if value.is_zero() {
            return Err(TreeError::LabelNotPositive);
        }
        Ok(NodeLabel(value))
    }

    /// Builds a label from a small integer, for tests and call sites that
    /// know the label fits in a `u64`.
    pub fn from_u64(value: u64) -> Result<Self, TreeError> {
        if value == 0 {
            return Err(TreeError::LabelNotPositive);
        }
        Ok(NodeLabel(BigUint::from(value)))
    }

    /// Depth of the node: the root is depth 0.
    pub fn depth(&self) -> u64 {
        self.0.bits() - 1
    }

    pub fn is_root(&self) -> bool {
        self.0.is_one()
    }

    /// Parent label, or `None` at the root.
    pub fn parent(&self) -> Option<NodeLabel> {
        if self.is_root() {
            None
        } else {
            Some(NodeLabel(&self.0 >> 1u32))
        }
    }

    pub fn left(&self) -> NodeLabel {
        NodeLabel(&self.0 << 1u32)
    }

    pub fn right(&self) -> NodeLabel {
        NodeLabel((&self.0 << 1u32) | BigUint::one())
    }

    /// Sibling label, or `None` at the root (the root has no sibling).
    pub fn sibling(&self) -> Option<NodeLabel> {
        if self.is_root() {
            None
        } else {
            Some(NodeLabel(&self.0 ^ &BigUint::one()))
        }
    }

    /// `true` iff this node is the left child of its parent.
    pub fn is_left_child(&self) -> bool {
        !self.is_root() && (&self.0 & BigUint::one()).is_zero()
    }

    pub fn is_right_child(&self) -> bool {
        !self.is_root() && !self.is_left_child()
    }

    /// The ancestor of `self` at `target_depth`, which must not exceed
    /// `self.depth()`.
    fn truncate_to(&self, target_depth: u64) -> NodeLabel {
        debug_assert!(target_depth <= self.depth());
        NodeLabel(&self.0 >> (self.depth() - target_depth))
    }

    /// `true` iff `self` is a proper or improper ancestor... no: `self` is a
    /// strict ancestor of `other` (the spec's `isAncestorOf`, which excludes
    /// equality).
    pub fn is_ancestor_of(&self, other: &NodeLabel) -> bool {
        self.depth() < other.depth() && other.truncate_to(self.depth()).0 == self.0
    }

    pub fn is_ancestor_of_or_eq(&self, other: &NodeLabel) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    fn left_right_split(&self, other: &NodeLabel) -> (NodeLabel, NodeLabel) {
        let md = self.depth().min(other.depth());
        (self.truncate_to(md), other.truncate_to(md))
    }

    /// Strict left/right total order used to keep truncations canonically
    /// sorted. `is_ancestor_of(a, b) => !is_left_of(a, b) && !is_right_of(a, b)`.
    pub fn is_left_of(&self, other: &NodeLabel) -> bool {
        let (ta, tb) = self.left_right_split(other);
        ta.0 != tb.0 && ta.0 < tb.0
    }

    pub fn is_right_of(&self, other: &NodeLabel) -> bool {
        let (ta, tb) = self.left_right_split(other);
        ta.0 != tb.0 && ta.0 > tb.0
    }

    /// `true` iff `self` is the parent, a child, or the sibling of `other`.
    pub fn adjacent(&self, other: &NodeLabel) -> bool {
        self.parent().as_ref() == Some(other)
            || other.parent().as_ref() == Some(self)
            || self.sibling().as_ref() == Some(other)
    }

    /// Lowest common ancestor of `self` and `other`.
    pub fn join(&self, other: &NodeLabel) -> NodeLabel {
        let (mut x, mut y) = self.left_right_split(other);
        while x.0 != y.0 {
            x.0 >>= 1u32;
            y.0 >>= 1u32;
        }
        x
    }

    /// Path bits from root to `self`, excluding the sentinel: `false` is a
    /// left step, `true` a right step.
    pub fn path_bits(&self) -> Vec<bool> {
        let digits = self.0.to_str_radix(2);
        digits.bytes().skip(1).map(|b| b == b'1').collect()
    }

    /// Proper ancestors of `self`, shallowest first (root first, parent
    /// last). Empty at the root.
    pub fn ancestors(&self) -> Vec<NodeLabel> {
        let d = self.depth();
        (0..d).map(|k| self.truncate_to(k)).collect()
    }

    /// Ancestors from which the step towards `self` was a left turn.
    pub fn lefts(&self) -> Vec<NodeLabel> {
        self.ancestors()
            .into_iter()
            .zip(self.path_bits())
            .filter(|(_, bit)| !bit)
            .map(|(l, _)| l)
            .collect()
    }

    /// Ancestors from which the step towards `self` was a right turn.
    pub fn rights(&self) -> Vec<NodeLabel> {
        self.ancestors()
            .into_iter()
            .zip(self.path_bits())
            .filter(|(_, bit)| *bit)
            .map(|(l, _)| l)
            .collect()
    }

    /// The maximal run of ancestors starting at the root whose steps are
    /// all left turns (stops at the first right turn, or at `self` itself).
    pub fn initial_lefts(&self) -> Vec<NodeLabel> {
        self.ancestors()
            .into_iter()
            .zip(self.path_bits())
            .take_while(|(_, bit)| !bit)
            .map(|(l, _)| l)
            .collect()
    }

    /// The maximal run of ancestors starting at the root whose steps are
    /// all right turns.
    pub fn initial_rights(&self) -> Vec<NodeLabel> {
        self.ancestors()
            .into_iter()
            .zip(self.path_bits())
            .take_while(|(_, bit)| *bit)
            .map(|(l, _)| l)
            .collect()
    }

    /// The open label sequence traversed moving from `a` to `b`: excludes
    /// both endpoints, includes their join exactly once unless the join
    /// coincides with an endpoint. Empty iff `a == b`. Each consecutive pair
    /// differs by exactly one edge.
    pub fn path(a: &NodeLabel, b: &NodeLabel) -> Vec<NodeLabel> {
        if a == b {
            return Vec::new();
        }
        let j = a.join(b);
        let mut up = ancestors_down_to(a, j.depth());
        if j == *b {
            // `b` snuck in as up's last entry; it is an endpoint, not part
            // of the open interval.
            up.pop();
        }
        let mut down_raw = ancestors_down_to(b, j.depth());
        // `down_raw`'s last entry (when present) is always the join; strip
        // it here so it is not duplicated with `up`.
        down_raw.pop();
        down_raw.reverse();
        up.extend(down_raw);
        up
    }

    /// MRS name: `"X"` followed by `"L"`/`"R"` per path bit.
    pub fn mrs_name(&self) -> String {
        let mut s = String::with_capacity(self.depth() as usize + 1);
        s.push('X');
        for bit in self.path_bits() {
            s.push(if bit { 'R' } else { 'L' });
        }
        s
    }
}

/// Ancestors of `label` strictly above `target_depth`, nearest-first
/// (`label.parent()` first, the ancestor at `target_depth` last). Empty if
/// `label.depth() <= target_depth`.
fn ancestors_down_to(label: &NodeLabel, target_depth: u64) -> Vec<NodeLabel> {
    let mut v = Vec::new();
    let mut cur = label.clone();
    while let Some(p) = cur.parent() {
        if p.depth() < target_depth {
            break;
        }
        let at_target = p.depth() == target_depth;
        v.push(p.clone());
        if at_target {
            break;
        }
        cur = p;
    }
    v
}

impl PartialOrd for NodeLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Total left/right order with depth as the ancestor/descendant
/// tie-breaker (shallower first). Consistent with `Eq`: equal only when the
/// two labels are the same integer.
impl Ord for NodeLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        let (ta, tb) = self.left_right_split(other);
        if ta.0 != tb.0 {
            ta.0.cmp(&tb.0)
        } else {
            self.depth().cmp(&other.depth())
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mrs_name())
    }
}

impl Serialize for NodeLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_str_radix(16))
    }
}

impl<'de> Deserialize<'de> for NodeLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let value = BigUint::parse_bytes(s.as_bytes(), 16)
            .ok_or_else(|| D::Error::custom(format!("invalid node label hex: {s}")))?;
        NodeLabel::from_biguint(value).map_err(D::Error::custom)
    }
}
