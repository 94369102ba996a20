//! Dynamic AABB tree
//!
//! A binary tree of axis-aligned boxes over opaque [`Proxy`] handles,
//! supporting insert, remove and move while the objects it indexes are in motion.
//!
//! Leaves store a *fat* AABB: the tight bounds grown by a fixed margin and
//! stretched along the predicted displacement. A move whose new tight bounds
//! still fit inside the stored box costs nothing, which keeps small jitter
//! from restructuring the tree every tick.
//!
//! Nodes live in a generational pool, so a handle to a removed leaf is
//! rejected with [`BroadphaseError::UnknownProxy`] even after its slot is reused.

use broad2d_math::Vec2;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::aabb::Aabb;
use crate::error::BroadphaseError;

/// Default margin added on every side of a leaf's tight AABB
pub const DEFAULT_AABB_MARGIN: f32 = 0.1;
/// Default scale applied to the predicted displacement
pub const DEFAULT_DISPLACEMENT_MULTIPLIER: f32 = 4.0;
/// Default cap on how far the displacement stretch may reach
pub const DEFAULT_MAX_EXTENSION: f32 = 2.0;

new_key_type! {
    /// Key of any node in the pool, leaf or branch
    struct NodeKey;
}

/// Handle to one leaf of a [`DynamicTree`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Proxy(NodeKey);

/// How leaf boxes are enlarged beyond their tight bounds
///
/// Larger values mean fewer reinsertions under motion but more false
/// positives in queries and pair generation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FatMargins {
    /// Added on every side of the tight AABB
    pub margin: f32,
    /// Scale applied to the predicted displacement before stretching the box
    pub displacement_multiplier: f32,
    /// Maximum length of the (scaled) displacement stretch
    pub max_extension: f32,
}

impl Default for FatMargins {
    fn default() -> Self {
        Self {
            margin: DEFAULT_AABB_MARGIN,
            displacement_multiplier: DEFAULT_DISPLACEMENT_MULTIPLIER,
            max_extension: DEFAULT_MAX_EXTENSION,
        }
    }
}

#[derive(Clone, Debug)]
struct Node<T> {
    aabb: Aabb,
    parent: Option<NodeKey>,
    /// 0 for leaves
    height: u32,
    kind: NodeKind<T>,
}

#[derive(Clone, Debug)]
enum NodeKind<T> {
    Branch { left: NodeKey, right: NodeKey },
    Leaf { payload: T },
}

/// Summary of one node, for debug drawing of the tree structure
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeInfo {
    pub aabb: Aabb,
    pub depth: u32,
    pub is_leaf: bool,
}

/// A leaf reached by a ray query, with the fraction at which the ray enters its fat AABB
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayCandidate {
    pub proxy: Proxy,
    pub fraction: f32,
}

/// Balanced AABB tree with a user payload on every leaf
#[derive(Clone, Debug)]
pub struct DynamicTree<T> {
    nodes: SlotMap<NodeKey, Node<T>>,
    root: Option<NodeKey>,
    leaf_count: usize,
    margins: FatMargins,
}

impl<T> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DynamicTree<T> {
    /// Create an empty tree with the default fat margins
    pub fn new() -> Self {
        Self::with_margins(FatMargins::default())
    }

    /// Create an empty tree with custom fat margins
    pub fn with_margins(margins: FatMargins) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root: None,
            leaf_count: 0,
            margins,
        }
    }

    pub fn margins(&self) -> FatMargins {
        self.margins
    }

    /// Number of live proxies (leaves)
    #[inline]
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Number of allocated nodes, leaves and branches
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Height of the root (0 for an empty tree or a single leaf)
    pub fn height(&self) -> u32 {
        self.root.map_or(0, |root| self.nodes[root].height)
    }

    /// Whether `proxy` is a live leaf of this tree
    pub fn contains(&self, proxy: Proxy) -> bool {
        matches!(
            self.nodes.get(proxy.0),
            Some(Node { kind: NodeKind::Leaf { .. }, .. })
        )
    }

    /// The fat AABB currently stored for a proxy
    pub fn fat_aabb(&self, proxy: Proxy) -> Result<Aabb, BroadphaseError> {
        if self.contains(proxy) {
            Ok(self.nodes[proxy.0].aabb)
        } else {
            Err(BroadphaseError::UnknownProxy)
        }
    }

    /// The payload stored on a proxy's leaf
    pub fn payload(&self, proxy: Proxy) -> Result<&T, BroadphaseError> {
        match self.nodes.get(proxy.0) {
            Some(Node { kind: NodeKind::Leaf { payload }, .. }) => Ok(payload),
            _ => Err(BroadphaseError::UnknownProxy),
        }
    }

    pub fn payload_mut(&mut self, proxy: Proxy) -> Result<&mut T, BroadphaseError> {
        match self.nodes.get_mut(proxy.0) {
            Some(Node { kind: NodeKind::Leaf { payload }, .. }) => Ok(payload),
            _ => Err(BroadphaseError::UnknownProxy),
        }
    }

    /// Insert a new leaf for `aabb`, stored fattened by the margin
    pub fn insert(&mut self, aabb: Aabb, payload: T) -> Result<Proxy, BroadphaseError> {
        self.insert_predicted(aabb, Vec2::ZERO, payload)
    }

    /// Insert a new leaf, additionally stretching its box along `displacement`
    pub fn insert_predicted(
        &mut self,
        aabb: Aabb,
        displacement: Vec2,
        payload: T,
    ) -> Result<Proxy, BroadphaseError> {
        aabb.validate()?;
        let fat = self.fatten(&aabb, displacement)?;

        let leaf = self.nodes.insert(Node {
            aabb: fat,
            parent: None,
            height: 0,
            kind: NodeKind::Leaf { payload },
        });
        self.insert_leaf(leaf);
        self.leaf_count += 1;
        Ok(Proxy(leaf))
    }

    /// Remove a leaf, returning its payload
    pub fn remove(&mut self, proxy: Proxy) -> Result<T, BroadphaseError> {
        if !self.contains(proxy) {
            return Err(BroadphaseError::UnknownProxy);
        }

        self.remove_leaf(proxy.0);
        self.leaf_count -= 1;
        match self.nodes.remove(proxy.0) {
            Some(Node { kind: NodeKind::Leaf { payload }, .. }) => Ok(payload),
            _ => Err(BroadphaseError::UnknownProxy),
        }
    }

    /// Move a proxy to new tight bounds
    ///
    /// Returns `Ok(true)` if `aabb` still fits inside the stored fat AABB, in which
    /// case nothing changes. Otherwise the leaf is reinserted with a freshly
    /// fattened box (stretched along `displacement`) and `Ok(false)` is returned.
    pub fn move_proxy(
        &mut self,
        proxy: Proxy,
        aabb: Aabb,
        displacement: Vec2,
    ) -> Result<bool, BroadphaseError> {
        aabb.validate()?;
        let stored = self.fat_aabb(proxy)?;
        if stored.contains(&aabb) {
            return Ok(true);
        }

        let fat = self.fatten(&aabb, displacement)?;
        self.remove_leaf(proxy.0);
        self.nodes[proxy.0].aabb = fat;
        self.insert_leaf(proxy.0);
        Ok(false)
    }

    /// Lazily yield every proxy whose stored AABB overlaps `region`
    pub fn query(&self, region: Aabb) -> AabbQuery<'_, T> {
        AabbQuery {
            nodes: &self.nodes,
            region,
            stack: self.root.into_iter().collect(),
        }
    }

    /// Like [`query`][Self::query] but also yields each leaf's payload
    pub fn query_with_payload(&self, region: Aabb) -> impl Iterator<Item = (Proxy, &T)> + '_ {
        self.query(region)
            .filter_map(move |proxy| self.payload(proxy).ok().map(|payload| (proxy, payload)))
    }

    /// Lazily yield every proxy whose stored AABB contains `point`
    pub fn query_point(&self, point: Vec2) -> AabbQuery<'_, T> {
        self.query(Aabb::new(point, point))
    }

    /// Lazily yield leaves hit by the ray `origin + t * direction`, `t` in `[0, max_fraction]`
    ///
    /// The bound can be tightened mid-iteration with [`RayQuery::set_max_fraction`].
    pub fn ray_query(&self, origin: Vec2, direction: Vec2, max_fraction: f32) -> RayQuery<'_, T> {
        let usable = origin.is_finite() && direction.is_finite() && max_fraction >= 0.0;
        RayQuery {
            nodes: &self.nodes,
            origin,
            direction,
            max_fraction,
            stack: if usable { self.root.into_iter().collect() } else { Vec::new() },
        }
    }

    /// Iterate over every leaf with its payload and fat AABB, in pool order
    pub fn leaves(&self) -> impl Iterator<Item = (Proxy, &T, Aabb)> + '_ {
        self.nodes.iter().filter_map(|(key, node)| match &node.kind {
            NodeKind::Leaf { payload } => Some((Proxy(key), payload, node.aabb)),
            NodeKind::Branch { .. } => None,
        })
    }

    /// Every node with its depth, depth-first from the root
    pub fn nodes(&self) -> Vec<NodeInfo> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(NodeKey, u32)> = self.root.map(|r| (r, 0)).into_iter().collect();
        while let Some((key, depth)) = stack.pop() {
            let node = &self.nodes[key];
            match node.kind {
                NodeKind::Branch { left, right } => {
                    out.push(NodeInfo { aabb: node.aabb, depth, is_leaf: false });
                    stack.push((right, depth + 1));
                    stack.push((left, depth + 1));
                }
                NodeKind::Leaf { .. } => {
                    out.push(NodeInfo { aabb: node.aabb, depth, is_leaf: true });
                }
            }
        }
        out
    }

    /// Translate every stored box so that `new_origin` becomes the origin
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        for (_, node) in self.nodes.iter_mut() {
            node.aabb = node.aabb.translated(-new_origin);
        }
    }

    /// Drop every node; all outstanding proxies become stale
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.leaf_count = 0;
    }

    /// Walk the whole tree and check linkage, containment, heights and counts
    pub fn validate(&self) -> Result<(), BroadphaseError> {
        let corrupt = |msg: String| Err(BroadphaseError::CorruptTree(msg));

        let Some(root) = self.root else {
            if self.nodes.is_empty() && self.leaf_count == 0 {
                return Ok(());
            }
            return corrupt(format!("no root but {} nodes", self.nodes.len()));
        };
        match self.nodes.get(root) {
            Some(node) if node.parent.is_none() => {}
            Some(_) => return corrupt("root has a parent".into()),
            None => return corrupt("root is not in the pool".into()),
        }

        let mut visited = 0;
        let mut leaves = 0;
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            visited += 1;
            if visited > self.nodes.len() {
                return corrupt("cycle in child links".into());
            }
            let node = &self.nodes[key];
            match node.kind {
                NodeKind::Leaf { .. } => {
                    if node.height != 0 {
                        return corrupt(format!("leaf with height {}", node.height));
                    }
                    leaves += 1;
                }
                NodeKind::Branch { left, right } => {
                    let mut max_child_height = 0;
                    for child in [left, right] {
                        let Some(child_node) = self.nodes.get(child) else {
                            return corrupt("dangling child link".into());
                        };
                        if child_node.parent != Some(key) {
                            return corrupt("child does not point back at its parent".into());
                        }
                        if !node.aabb.contains(&child_node.aabb) {
                            return corrupt("branch AABB does not contain its child".into());
                        }
                        max_child_height = max_child_height.max(child_node.height);
                    }
                    if node.height != max_child_height + 1 {
                        return corrupt(format!("branch height {} is stale", node.height));
                    }
                    stack.push(left);
                    stack.push(right);
                }
            }
        }

        if visited != self.nodes.len() {
            return corrupt(format!(
                "{} nodes reachable but {} allocated",
                visited,
                self.nodes.len()
            ));
        }
        if leaves != self.leaf_count {
            return corrupt(format!("{} leaves but count says {}", leaves, self.leaf_count));
        }
        Ok(())
    }

    //
    // Internals
    //

    fn fatten(&self, aabb: &Aabb, displacement: Vec2) -> Result<Aabb, BroadphaseError> {
        let extension = (displacement * self.margins.displacement_multiplier)
            .clamp_length(self.margins.max_extension);
        let fat = aabb.fattened(self.margins.margin).extended(extension);
        fat.validate()?;
        Ok(fat)
    }

    fn children(&self, key: NodeKey) -> Option<(NodeKey, NodeKey)> {
        match self.nodes[key].kind {
            NodeKind::Branch { left, right } => Some((left, right)),
            NodeKind::Leaf { .. } => None,
        }
    }

    fn set_children(&mut self, key: NodeKey, left: NodeKey, right: NodeKey) {
        self.nodes[key].kind = NodeKind::Branch { left, right };
    }

    fn replace_child(&mut self, parent: NodeKey, old: NodeKey, new: NodeKey) {
        if let NodeKind::Branch { left, right } = &mut self.nodes[parent].kind {
            if *left == old {
                *left = new;
            } else {
                *right = new;
            }
        }
    }

    /// Recompute a branch's AABB and height from its children
    fn refit(&mut self, key: NodeKey) {
        if let Some((left, right)) = self.children(key) {
            let aabb = self.nodes[left].aabb.union(&self.nodes[right].aabb);
            let height = 1 + self.nodes[left].height.max(self.nodes[right].height);
            let node = &mut self.nodes[key];
            node.aabb = aabb;
            node.height = height;
        }
    }

    /// Cost of descending into `child` to place `leaf_aabb` below it:
    /// the perimeter the child's subtree would have to grow by.
    fn descend_cost(&self, child: NodeKey, leaf_aabb: &Aabb) -> f32 {
        let node = &self.nodes[child];
        let combined = node.aabb.union(leaf_aabb).perimeter();
        match node.kind {
            NodeKind::Leaf { .. } => combined,
            NodeKind::Branch { .. } => combined - node.aabb.perimeter(),
        }
    }

    fn insert_leaf(&mut self, leaf: NodeKey) {
        let Some(root) = self.root else {
            self.root = Some(leaf);
            self.nodes[leaf].parent = None;
            return;
        };

        let leaf_aabb = self.nodes[leaf].aabb;
        let mut sibling = root;
        while let Some((left, right)) = self.children(sibling) {
            let cost_left = self.descend_cost(left, &leaf_aabb);
            let cost_right = self.descend_cost(right, &leaf_aabb);
            sibling = if cost_left <= cost_right { left } else { right };
        }

        // the sibling leaf is replaced by a new branch holding {sibling, leaf}
        let old_parent = self.nodes[sibling].parent;
        let branch = Node {
            aabb: leaf_aabb.union(&self.nodes[sibling].aabb),
            parent: old_parent,
            height: self.nodes[sibling].height + 1,
            kind: NodeKind::Branch { left: sibling, right: leaf },
        };
        let new_parent = self.nodes.insert(branch);
        match old_parent {
            Some(parent) => self.replace_child(parent, sibling, new_parent),
            None => self.root = Some(new_parent),
        }
        self.nodes[sibling].parent = Some(new_parent);
        self.nodes[leaf].parent = Some(new_parent);

        self.fix_upwards(Some(new_parent));
    }

    fn remove_leaf(&mut self, leaf: NodeKey) {
        if self.root == Some(leaf) {
            self.root = None;
            return;
        }

        let Some(parent) = self.nodes[leaf].parent else {
            debug_assert!(false, "detached leaf that is not the root");
            return;
        };
        let grand_parent = self.nodes[parent].parent;
        let sibling = match self.children(parent) {
            Some((left, right)) if left == leaf => right,
            Some((left, _)) => left,
            None => return,
        };

        // the sibling takes the parent's slot
        self.nodes.remove(parent);
        self.nodes[leaf].parent = None;
        match grand_parent {
            Some(grand_parent) => {
                self.replace_child(grand_parent, parent, sibling);
                self.nodes[sibling].parent = Some(grand_parent);
                self.fix_upwards(Some(grand_parent));
            }
            None => {
                self.root = Some(sibling);
                self.nodes[sibling].parent = None;
            }
        }
    }

    /// Rebalance and refit every ancestor from `start` up to the root
    fn fix_upwards(&mut self, start: Option<NodeKey>) {
        let mut cursor = start;
        while let Some(key) = cursor {
            let key = self.balance(key);
            self.refit(key);
            cursor = self.nodes[key].parent;
        }
    }

    /// Rotate the taller child of `a` up if the child heights differ by more than one.
    /// Returns the root of the subtree afterwards.
    fn balance(&mut self, a: NodeKey) -> NodeKey {
        let Some((b, c)) = self.children(a) else {
            return a;
        };
        if self.nodes[a].height < 2 {
            return a;
        }

        let skew = self.nodes[c].height as i64 - self.nodes[b].height as i64;
        if skew > 1 {
            self.promote_right(a, b, c)
        } else if skew < -1 {
            self.promote_left(a, b, c)
        } else {
            a
        }
    }

    /// Make the right child `c` the parent of `a`
    fn promote_right(&mut self, a: NodeKey, b: NodeKey, c: NodeKey) -> NodeKey {
        let Some((f, g)) = self.children(c) else {
            return a;
        };
        self.take_parent_slot(a, c);

        // c keeps its taller child, a adopts the shorter one
        let (keep, give) = if self.nodes[f].height > self.nodes[g].height {
            (f, g)
        } else {
            (g, f)
        };
        self.set_children(a, b, give);
        self.nodes[give].parent = Some(a);
        self.refit(a);
        self.set_children(c, a, keep);
        self.refit(c);
        c
    }

    /// Make the left child `b` the parent of `a`
    fn promote_left(&mut self, a: NodeKey, b: NodeKey, c: NodeKey) -> NodeKey {
        let Some((d, e)) = self.children(b) else {
            return a;
        };
        self.take_parent_slot(a, b);

        let (keep, give) = if self.nodes[d].height > self.nodes[e].height {
            (d, e)
        } else {
            (e, d)
        };
        self.set_children(a, give, c);
        self.nodes[give].parent = Some(a);
        self.refit(a);
        self.set_children(b, a, keep);
        self.refit(b);
        b
    }

    /// Put `child` where `a` hangs in the tree and make it `a`'s parent
    fn take_parent_slot(&mut self, a: NodeKey, child: NodeKey) {
        let a_parent = self.nodes[a].parent;
        self.nodes[child].parent = a_parent;
        self.nodes[a].parent = Some(child);
        match a_parent {
            Some(parent) => self.replace_child(parent, a, child),
            None => self.root = Some(child),
        }
    }
}

//
// Iterators
//

/// Lazy region query over a [`DynamicTree`], see [`DynamicTree::query`]
#[derive(Debug)]
pub struct AabbQuery<'a, T> {
    nodes: &'a SlotMap<NodeKey, Node<T>>,
    region: Aabb,
    stack: Vec<NodeKey>,
}

impl<'a, T> Iterator for AabbQuery<'a, T> {
    type Item = Proxy;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(key) = self.stack.pop() {
            let node = &self.nodes[key];
            if !node.aabb.overlaps(&self.region) {
                continue;
            }
            match node.kind {
                NodeKind::Branch { left, right } => {
                    self.stack.push(right);
                    self.stack.push(left);
                }
                NodeKind::Leaf { .. } => return Some(Proxy(key)),
            }
        }
        None
    }
}

/// Lazy ray query over a [`DynamicTree`], see [`DynamicTree::ray_query`]
#[derive(Debug)]
pub struct RayQuery<'a, T> {
    nodes: &'a SlotMap<NodeKey, Node<T>>,
    origin: Vec2,
    direction: Vec2,
    max_fraction: f32,
    stack: Vec<NodeKey>,
}

impl<'a, T> RayQuery<'a, T> {
    /// Shrink the search to `t <= max_fraction`; larger values are ignored
    pub fn set_max_fraction(&mut self, max_fraction: f32) {
        if max_fraction < self.max_fraction {
            self.max_fraction = max_fraction;
        }
    }

    pub fn max_fraction(&self) -> f32 {
        self.max_fraction
    }
}

impl<'a, T> Iterator for RayQuery<'a, T> {
    type Item = RayCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(key) = self.stack.pop() {
            let node = &self.nodes[key];
            // tested on pop so a shrunk max_fraction also prunes already stacked nodes
            let Some(fraction) =
                node.aabb
                    .ray_intersection(self.origin, self.direction, self.max_fraction)
            else {
                continue;
            };
            match node.kind {
                NodeKind::Branch { left, right } => {
                    self.stack.push(right);
                    self.stack.push(left);
                }
                NodeKind::Leaf { .. } => {
                    return Some(RayCandidate {
                        proxy: Proxy(key),
                        fraction,
                    })
                }
            }
        }
        None
    }
}

#[cfg(test)]
impl<T> DynamicTree<T> {
    /// Largest height difference between the two children of any branch
    fn max_skew(&self) -> u32 {
        self.nodes
            .values()
            .filter_map(|node| match node.kind {
                NodeKind::Branch { left, right } => {
                    Some(self.nodes[left].height.abs_diff(self.nodes[right].height))
                }
                NodeKind::Leaf { .. } => None,
            })
            .max()
            .unwrap_or(0)
    }
}
