//! Dynamic AABB tree broadphase.
//!
//! A binary bounding volume hierarchy over fattened proxy boxes. Leaves are
//! proxies; internal nodes hold the union of their children. Nodes live in an
//! index arena with a free list, so proxy ids stay valid as the pool grows and
//! across rebuilds.

use glam::Vec2;

use crate::error::CollisionError;

use super::collider::{is_valid_ray, RayCastInput, ShapeCastInput};
use super::math::{cross_sv, Aabb};
use super::{TreeConfig, TREE_STACK_SIZE};

/// Null node index.
pub const NULL_NODE: i32 = -1;

/// Category bits given to proxies that do not care about filtering.
pub const DEFAULT_CATEGORY_BITS: u64 = 1;

/// Mask that accepts every category.
pub const DEFAULT_MASK_BITS: u64 = u64::MAX;

const BIN_COUNT: usize = 64;

/// Performance counters returned by tree queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Nodes popped from the traversal stack.
    pub node_visits: usize,
    /// Leaves handed to the callback.
    pub leaf_visits: usize,
}

/// Public view of a live proxy, returned by [`DynamicTree::try_proxy`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeProxy {
    /// Fattened box stored in the tree.
    pub aabb: Aabb,
    /// Filter bits of the leaf.
    pub category_bits: u64,
    /// Opaque value supplied at creation.
    pub user_data: u64,
}

#[derive(Debug, Clone, Copy)]
struct TreeNode {
    aabb: Aabb,
    /// Union of the leaf bits below this node.
    category_bits: u64,
    /// Parent index, or the next free node while on the free list.
    parent: i32,
    child1: i32,
    child2: i32,
    user_data: u64,
    /// Leaf = 0.
    height: u16,
    allocated: bool,
    /// This node or a descendant grew through `enlarge_proxy`.
    enlarged: bool,
}

impl Default for TreeNode {
    fn default() -> Self {
        Self {
            aabb: Aabb::default(),
            category_bits: DEFAULT_CATEGORY_BITS,
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            user_data: 0,
            height: 0,
            allocated: false,
            enlarged: false,
        }
    }
}

impl TreeNode {
    #[inline]
    fn is_leaf(&self) -> bool {
        self.height == 0
    }
}

// Scratch entry for rebuilds. The node may be a leaf or a retained subtree.
#[derive(Debug, Clone, Copy)]
struct RebuildItem {
    node: i32,
    aabb: Aabb,
    center: Vec2,
    bin: usize,
}

/// Dynamic AABB tree with SAH insertion and rotations.
#[derive(Debug)]
pub struct DynamicTree {
    nodes: Vec<TreeNode>,
    root: i32,
    node_count: usize,
    free_list: i32,
    proxy_count: usize,
    config: TreeConfig,
    rebuild_items: Vec<RebuildItem>,
    rebuild_nodes: Vec<i32>,
}

impl Default for DynamicTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicTree {
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    pub fn with_config(config: TreeConfig) -> Self {
        let capacity = config.initial_capacity.max(1);
        let mut tree = Self {
            nodes: Vec::with_capacity(capacity),
            root: NULL_NODE,
            node_count: 0,
            free_list: NULL_NODE,
            proxy_count: 0,
            config,
            rebuild_items: Vec::new(),
            rebuild_nodes: Vec::new(),
        };
        tree.grow_pool(capacity);
        tree
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    #[inline]
    fn node(&self, index: i32) -> &TreeNode {
        &self.nodes[index as usize]
    }

    #[inline]
    fn node_mut(&mut self, index: i32) -> &mut TreeNode {
        &mut self.nodes[index as usize]
    }

    // Append free nodes until the pool holds `capacity` nodes.
    fn grow_pool(&mut self, capacity: usize) {
        let old = self.nodes.len();
        if capacity <= old {
            return;
        }

        self.nodes.resize(capacity, TreeNode::default());
        for i in old..capacity {
            let next = if i + 1 < capacity { (i + 1) as i32 } else { self.free_list };
            self.nodes[i].parent = next;
        }
        self.free_list = old as i32;
    }

    fn allocate_node(&mut self) -> i32 {
        if self.free_list == NULL_NODE {
            let old = self.nodes.len();
            let capacity = (old * 2).max(16);
            tracing::debug!("dynamic tree pool grows from {} to {} nodes", old, capacity);
            self.grow_pool(capacity);
        }

        let index = self.free_list;
        self.free_list = self.node(index).parent;
        *self.node_mut(index) = TreeNode {
            allocated: true,
            ..Default::default()
        };
        self.node_count += 1;
        index
    }

    fn free_node(&mut self, index: i32) {
        debug_assert!(self.node(index).allocated, "double free of node {index}");
        let free_list = self.free_list;
        let node = self.node_mut(index);
        *node = TreeNode {
            parent: free_list,
            ..Default::default()
        };
        self.free_list = index;
        self.node_count -= 1;
    }

    /// Insert a proxy. The stored box is `aabb` fattened by the configured margin.
    pub fn create_proxy(&mut self, aabb: Aabb, category_bits: u64, user_data: u64) -> i32 {
        debug_assert!(aabb.is_valid(), "invalid proxy box {aabb:?}");

        let proxy_id = self.allocate_node();
        let fat = aabb.fattened(self.config.aabb_margin);
        {
            let node = self.node_mut(proxy_id);
            node.aabb = fat;
            node.user_data = user_data;
            node.category_bits = category_bits;
            node.height = 0;
        }

        self.insert_leaf(proxy_id);
        self.proxy_count += 1;
        proxy_id
    }

    /// Remove a proxy and recycle its node. Panics on a stale id in debug builds.
    pub fn destroy_proxy(&mut self, proxy_id: i32) {
        debug_assert!(self.is_live_leaf(proxy_id), "invalid proxy id {proxy_id}");

        self.remove_leaf(proxy_id);
        self.free_node(proxy_id);
        self.proxy_count -= 1;
    }

    /// Move a proxy. Re-inserts only when `aabb` escapes the stored fat box and
    /// returns whether the tree was restructured.
    pub fn move_proxy(&mut self, proxy_id: i32, aabb: Aabb) -> bool {
        debug_assert!(aabb.is_valid(), "invalid proxy box {aabb:?}");
        debug_assert!(self.is_live_leaf(proxy_id), "invalid proxy id {proxy_id}");

        if self.node(proxy_id).aabb.contains(&aabb) {
            return false;
        }

        self.remove_leaf(proxy_id);

        let fat = aabb.fattened(self.config.aabb_margin);
        let node = self.node_mut(proxy_id);
        node.aabb = fat;
        node.enlarged = false;

        self.insert_leaf(proxy_id);
        true
    }

    /// Grow a proxy to cover `aabb` without restructuring. Ancestors are enlarged
    /// and flagged for the next [`rebuild`](Self::rebuild).
    pub fn enlarge_proxy(&mut self, proxy_id: i32, aabb: Aabb) {
        debug_assert!(aabb.is_valid(), "invalid proxy box {aabb:?}");
        debug_assert!(self.is_live_leaf(proxy_id), "invalid proxy id {proxy_id}");

        if self.node(proxy_id).aabb.contains(&aabb) {
            return;
        }

        let fat = aabb.fattened(self.config.aabb_margin);
        let leaf_box = {
            let node = self.node_mut(proxy_id);
            node.aabb.enlarge(&fat);
            node.enlarged = true;
            node.aabb
        };

        let mut parent = self.node(proxy_id).parent;
        while parent != NULL_NODE {
            let node = self.node_mut(parent);
            let changed = node.aabb.enlarge(&leaf_box);
            node.enlarged = true;
            parent = node.parent;
            if !changed {
                break;
            }
        }

        // the rest of the ancestors only need the flag
        while parent != NULL_NODE {
            let node = self.node_mut(parent);
            if node.enlarged {
                break;
            }
            node.enlarged = true;
            parent = node.parent;
        }
    }

    /// Change the filter bits of a proxy. Walks every ancestor, so keep it off hot paths.
    pub fn set_category_bits(&mut self, proxy_id: i32, category_bits: u64) {
        debug_assert!(self.is_live_leaf(proxy_id), "invalid proxy id {proxy_id}");

        self.node_mut(proxy_id).category_bits = category_bits;

        let mut index = self.node(proxy_id).parent;
        while index != NULL_NODE {
            let (child1, child2) = (self.node(index).child1, self.node(index).child2);
            let bits = self.node(child1).category_bits | self.node(child2).category_bits;
            let node = self.node_mut(index);
            node.category_bits = bits;
            index = node.parent;
        }
    }

    pub fn get_category_bits(&self, proxy_id: i32) -> u64 {
        debug_assert!(self.is_live_leaf(proxy_id), "invalid proxy id {proxy_id}");
        self.node(proxy_id).category_bits
    }

    pub fn get_user_data(&self, proxy_id: i32) -> u64 {
        debug_assert!(self.is_live_leaf(proxy_id), "invalid proxy id {proxy_id}");
        self.node(proxy_id).user_data
    }

    /// The fattened box of a proxy.
    pub fn get_aabb(&self, proxy_id: i32) -> Aabb {
        debug_assert!(self.is_live_leaf(proxy_id), "invalid proxy id {proxy_id}");
        self.node(proxy_id).aabb
    }

    /// Checked lookup of a proxy.
    pub fn try_proxy(&self, proxy_id: i32) -> Result<TreeProxy, CollisionError> {
        if !self.is_live_leaf(proxy_id) {
            return Err(CollisionError::InvalidProxy { proxy_id });
        }
        let node = self.node(proxy_id);
        Ok(TreeProxy {
            aabb: node.aabb,
            category_bits: node.category_bits,
            user_data: node.user_data,
        })
    }

    fn is_live_leaf(&self, proxy_id: i32) -> bool {
        proxy_id >= 0
            && (proxy_id as usize) < self.nodes.len()
            && self.node(proxy_id).allocated
            && self.node(proxy_id).is_leaf()
    }

    /// Height of the root, zero for an empty tree or a single leaf.
    pub fn get_height(&self) -> usize {
        if self.root == NULL_NODE {
            return 0;
        }
        self.node(self.root).height as usize
    }

    /// Sum of internal node perimeters over the root perimeter. Lower is better.
    pub fn get_area_ratio(&self) -> f32 {
        if self.root == NULL_NODE {
            return 0.0;
        }

        let root_area = self.node(self.root).aabb.perimeter();
        let total_area: f32 = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, node)| node.allocated && !node.is_leaf() && *i as i32 != self.root)
            .map(|(_, node)| node.aabb.perimeter())
            .sum();

        if root_area > 0.0 {
            total_area / root_area
        } else {
            0.0
        }
    }

    /// Box around every proxy, or a zero box when empty.
    pub fn get_root_bounds(&self) -> Aabb {
        if self.root == NULL_NODE {
            return Aabb::default();
        }
        self.node(self.root).aabb
    }

    pub fn get_proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Memory held by the node pool and rebuild scratch.
    pub fn get_byte_count(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.nodes.capacity() * std::mem::size_of::<TreeNode>()
            + self.rebuild_items.capacity() * std::mem::size_of::<RebuildItem>()
            + self.rebuild_nodes.capacity() * std::mem::size_of::<i32>()
    }

    // Branch and bound search for the sibling with the lowest SAH cost.
    fn find_best_sibling(&self, box_d: Aabb) -> i32 {
        let center_d = box_d.center();
        let area_d = box_d.perimeter();

        let root_box = self.node(self.root).aabb;

        let mut area_base = root_box.perimeter();
        let mut direct_cost = root_box.union(&box_d).perimeter();
        let mut inherited_cost = 0.0;

        let mut best_sibling = self.root;
        let mut best_cost = direct_cost;

        let mut index = self.root;
        while !self.node(index).is_leaf() {
            let child1 = self.node(index).child1;
            let child2 = self.node(index).child2;

            // cost of a new parent for this node and the new leaf
            let cost = direct_cost + inherited_cost;
            if cost < best_cost {
                best_sibling = index;
                best_cost = cost;
            }

            // inheritance cost seen by the children
            inherited_cost += direct_cost - area_base;

            let node1 = self.node(child1);
            let node2 = self.node(child2);
            let leaf1 = node1.is_leaf();
            let leaf2 = node2.is_leaf();

            let box1 = node1.aabb;
            let direct_cost1 = box1.union(&box_d).perimeter();
            let mut area1 = 0.0;
            let mut lower_cost1 = f32::MAX;
            if leaf1 {
                let cost1 = direct_cost1 + inherited_cost;
                if cost1 < best_cost {
                    best_sibling = child1;
                    best_cost = cost1;
                }
            } else {
                area1 = box1.perimeter();
                lower_cost1 = inherited_cost + direct_cost1 + (area_d - area1).min(0.0);
            }

            let box2 = node2.aabb;
            let direct_cost2 = box2.union(&box_d).perimeter();
            let mut area2 = 0.0;
            let mut lower_cost2 = f32::MAX;
            if leaf2 {
                let cost2 = direct_cost2 + inherited_cost;
                if cost2 < best_cost {
                    best_sibling = child2;
                    best_cost = cost2;
                }
            } else {
                area2 = box2.perimeter();
                lower_cost2 = inherited_cost + direct_cost2 + (area_d - area2).min(0.0);
            }

            if leaf1 && leaf2 {
                break;
            }

            // can the cost still decrease?
            if best_cost <= lower_cost1 && best_cost <= lower_cost2 {
                break;
            }

            if lower_cost1 == lower_cost2 && !leaf1 {
                // both children contain D, fall back to center distance
                lower_cost1 = (box1.center() - center_d).length_squared();
                lower_cost2 = (box2.center() - center_d).length_squared();
            }

            if lower_cost1 < lower_cost2 && !leaf1 {
                index = child1;
                area_base = area1;
                direct_cost = direct_cost1;
            } else {
                index = child2;
                area_base = area2;
                direct_cost = direct_cost2;
            }
        }

        best_sibling
    }

    // Recompute box, height, filter bits and the enlarged flag from the children.
    fn refit(&mut self, index: i32) {
        let (child1, child2) = (self.node(index).child1, self.node(index).child2);
        let c1 = *self.node(child1);
        let c2 = *self.node(child2);
        let node = self.node_mut(index);
        node.aabb = c1.aabb.union(&c2.aabb);
        node.height = 1 + c1.height.max(c2.height);
        node.category_bits = c1.category_bits | c2.category_bits;
        node.enlarged = c1.enlarged || c2.enlarged;
    }

    fn replace_child(&mut self, parent: i32, old_child: i32, new_child: i32) {
        if parent == NULL_NODE {
            self.root = new_child;
            return;
        }
        let node = self.node_mut(parent);
        if node.child1 == old_child {
            node.child1 = new_child;
        } else {
            debug_assert_eq!(node.child2, old_child);
            node.child2 = new_child;
        }
    }

    // Height-based rotation at `ia`. Returns the index of the new subtree root.
    fn balance(&mut self, ia: i32) -> i32 {
        let a = *self.node(ia);
        if a.is_leaf() || a.height < 2 {
            return ia;
        }

        let ib = a.child1;
        let ic = a.child2;
        let balance = self.node(ic).height as i32 - self.node(ib).height as i32;

        if balance > 1 {
            // rotate C up
            let c = *self.node(ic);
            let (i_f, i_g) = (c.child1, c.child2);

            self.node_mut(ic).child1 = ia;
            self.node_mut(ic).parent = a.parent;
            self.node_mut(ia).parent = ic;
            self.replace_child(a.parent, ia, ic);

            if self.node(i_f).height > self.node(i_g).height {
                self.node_mut(ic).child2 = i_f;
                self.node_mut(ia).child2 = i_g;
                self.node_mut(i_g).parent = ia;
            } else {
                self.node_mut(ic).child2 = i_g;
                self.node_mut(ia).child2 = i_f;
                self.node_mut(i_f).parent = ia;
            }

            self.refit(ia);
            self.refit(ic);
            return ic;
        }

        if balance < -1 {
            // rotate B up
            let b = *self.node(ib);
            let (i_d, i_e) = (b.child1, b.child2);

            self.node_mut(ib).child1 = ia;
            self.node_mut(ib).parent = a.parent;
            self.node_mut(ia).parent = ib;
            self.replace_child(a.parent, ia, ib);

            if self.node(i_d).height > self.node(i_e).height {
                self.node_mut(ib).child2 = i_d;
                self.node_mut(ia).child1 = i_e;
                self.node_mut(i_e).parent = ia;
            } else {
                self.node_mut(ib).child2 = i_e;
                self.node_mut(ia).child1 = i_d;
                self.node_mut(i_d).parent = ia;
            }

            self.refit(ia);
            self.refit(ib);
            return ib;
        }

        ia
    }

    // Walk from `index` to the root, rebalancing and refitting.
    fn fix_upwards(&mut self, mut index: i32) {
        while index != NULL_NODE {
            index = self.balance(index);
            self.refit(index);
            index = self.node(index).parent;
        }
    }

    fn insert_leaf(&mut self, leaf: i32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.node_mut(leaf).parent = NULL_NODE;
            return;
        }

        let leaf_box = self.node(leaf).aabb;
        let sibling = self.find_best_sibling(leaf_box);

        let old_parent = self.node(sibling).parent;
        let new_parent = self.allocate_node();
        {
            let node = self.node_mut(new_parent);
            node.parent = old_parent;
            node.child1 = sibling;
            node.child2 = leaf;
        }
        self.replace_child(old_parent, sibling, new_parent);
        self.node_mut(sibling).parent = new_parent;
        self.node_mut(leaf).parent = new_parent;
        self.refit(new_parent);

        self.fix_upwards(new_parent);
    }

    fn remove_leaf(&mut self, leaf: i32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.node(leaf).parent;
        let grand_parent = self.node(parent).parent;
        let sibling = if self.node(parent).child1 == leaf {
            self.node(parent).child2
        } else {
            self.node(parent).child1
        };

        // the sibling takes the parent's place
        self.replace_child(grand_parent, parent, sibling);
        self.node_mut(sibling).parent = grand_parent;
        self.free_node(parent);
        self.node_mut(leaf).parent = NULL_NODE;

        self.fix_upwards(grand_parent);
    }

    /// Visit every proxy whose fat box overlaps `aabb` and whose category bits
    /// intersect `mask_bits`. Return `false` from the callback to stop.
    pub fn query<F>(&self, aabb: Aabb, mask_bits: u64, mut callback: F) -> TreeStats
    where
        F: FnMut(i32, u64) -> bool,
    {
        let mut stats = TreeStats::default();
        if self.root == NULL_NODE {
            return stats;
        }

        let mut stack = Vec::with_capacity(TREE_STACK_SIZE);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            let node = self.node(node_id);
            stats.node_visits += 1;

            if !node.aabb.overlaps(&aabb) || node.category_bits & mask_bits == 0 {
                continue;
            }

            if node.is_leaf() {
                stats.leaf_visits += 1;
                if !callback(node_id, node.user_data) {
                    return stats;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }

        stats
    }

    /// Cast a ray through the tree.
    ///
    /// The callback receives the ray clipped to the closest hit so far and returns
    /// a new fraction: 0 terminates, a smaller value clips the ray, the current
    /// `max_fraction` continues unclipped. A negative value skips the proxy.
    pub fn ray_cast<F>(&self, input: &RayCastInput, mask_bits: u64, mut callback: F) -> TreeStats
    where
        F: FnMut(&RayCastInput, i32, u64) -> f32,
    {
        let mut stats = TreeStats::default();
        if self.root == NULL_NODE {
            return stats;
        }
        debug_assert!(is_valid_ray(input), "invalid ray {input:?}");

        let p1 = input.origin;
        let d = input.translation;
        let r = d.normalize_or_zero();

        // perpendicular to the ray, for the separating axis test
        let v = cross_sv(1.0, r);
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;
        let mut p2 = p1 + max_fraction * d;
        let mut segment_box = Aabb::new(p1.min(p2), p1.max(p2));

        let mut sub_input = *input;

        let mut stack = Vec::with_capacity(TREE_STACK_SIZE);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            let node = self.node(node_id);
            stats.node_visits += 1;

            if node.category_bits & mask_bits == 0 || !node.aabb.overlaps(&segment_box) {
                continue;
            }

            // |dot(v, p1 - c)| > dot(|v|, h)
            let c = node.aabb.center();
            let h = node.aabb.extents();
            if abs_v.dot(h) < v.dot(p1 - c).abs() {
                continue;
            }

            if node.is_leaf() {
                sub_input.max_fraction = max_fraction;
                let value = callback(&sub_input, node_id, node.user_data);
                stats.leaf_visits += 1;

                if value == 0.0 {
                    return stats;
                }

                if 0.0 < value && value <= max_fraction {
                    max_fraction = value;
                    p2 = p1 + max_fraction * d;
                    segment_box = Aabb::new(p1.min(p2), p1.max(p2));
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }

        stats
    }

    /// Sweep a proxy through the tree. The callback contract matches [`ray_cast`](Self::ray_cast).
    pub fn shape_cast<F>(&self, input: &ShapeCastInput, mask_bits: u64, mut callback: F) -> TreeStats
    where
        F: FnMut(&ShapeCastInput, i32, u64) -> f32,
    {
        let mut stats = TreeStats::default();
        if self.root == NULL_NODE || input.proxy.count == 0 {
            return stats;
        }

        let points = input.proxy.points();
        let mut origin_box = Aabb::new(points[0], points[0]);
        for &p in &points[1..] {
            origin_box.lower = origin_box.lower.min(p);
            origin_box.upper = origin_box.upper.max(p);
        }
        let origin_box = origin_box.fattened(input.proxy.radius);

        let p1 = origin_box.center();
        let extension = origin_box.extents();

        let r = input.translation.normalize_or_zero();
        let v = cross_sv(1.0, r);
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;

        let swept = |fraction: f32| -> Aabb {
            let t = fraction * input.translation;
            Aabb::new(
                origin_box.lower.min(origin_box.lower + t),
                origin_box.upper.max(origin_box.upper + t),
            )
        };
        let mut total_box = swept(max_fraction);

        let mut sub_input = *input;

        let mut stack = Vec::with_capacity(TREE_STACK_SIZE);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            let node = self.node(node_id);
            stats.node_visits += 1;

            if node.category_bits & mask_bits == 0 || !node.aabb.overlaps(&total_box) {
                continue;
            }

            // separating axis on the swept box, node grown by the cast extents
            let c = node.aabb.center();
            let h = node.aabb.extents() + extension;
            if abs_v.dot(h) < v.dot(p1 - c).abs() {
                continue;
            }

            if node.is_leaf() {
                sub_input.max_fraction = max_fraction;
                let value = callback(&sub_input, node_id, node.user_data);
                stats.leaf_visits += 1;

                if value == 0.0 {
                    return stats;
                }

                if 0.0 < value && value < max_fraction {
                    max_fraction = value;
                    total_box = swept(max_fraction);
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }

        stats
    }

    /// Rebuild the tree with binned SAH partitioning.
    ///
    /// A partial rebuild keeps every subtree that was not enlarged and only sorts
    /// the rest; a full rebuild sorts every leaf. Returns the number of boxes sorted.
    pub fn rebuild(&mut self, full_build: bool) -> usize {
        if self.proxy_count == 0 || self.root == NULL_NODE {
            return 0;
        }

        let mut items = std::mem::take(&mut self.rebuild_items);
        items.clear();
        if items.capacity() < self.proxy_count {
            items.reserve(self.proxy_count + self.proxy_count / 2);
        }

        // Gather leaves and intact subtrees, freeing the internal nodes that are rebuilt.
        let mut stack = Vec::with_capacity(TREE_STACK_SIZE);
        stack.push(self.root);
        while let Some(index) = stack.pop() {
            let node = *self.node(index);
            if node.is_leaf() || (!node.enlarged && !full_build) {
                let detached = self.node_mut(index);
                detached.parent = NULL_NODE;
                detached.enlarged = false;
                items.push(RebuildItem {
                    node: index,
                    aabb: node.aabb,
                    center: node.aabb.center(),
                    bin: 0,
                });
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
                self.free_node(index);
            }
        }

        let leaf_count = items.len();
        self.root = self.build_range(&mut items);
        self.node_mut(self.root).parent = NULL_NODE;
        self.rebuild_items = items;

        tracing::trace!("dynamic tree rebuilt {} boxes (full = {})", leaf_count, full_build);
        leaf_count
    }

    /// Build a subtree over `items` without recursion. Internal nodes are created
    /// top down and refit in reverse creation order so children precede parents.
    fn build_range(&mut self, items: &mut [RebuildItem]) -> i32 {
        if items.len() == 1 {
            return items[0].node;
        }

        let mut created = std::mem::take(&mut self.rebuild_nodes);
        created.clear();

        let root = self.allocate_node();
        let mut stack: Vec<(i32, usize, usize)> = Vec::with_capacity(TREE_STACK_SIZE);
        stack.push((root, 0, items.len()));

        while let Some((parent, start, end)) = stack.pop() {
            created.push(parent);
            let split = start + partition_sah(&mut items[start..end]);

            let mut children = [NULL_NODE; 2];
            for (child, (lo, hi)) in children.iter_mut().zip([(start, split), (split, end)]) {
                *child = if hi - lo == 1 {
                    items[lo].node
                } else {
                    let node = self.allocate_node();
                    stack.push((node, lo, hi));
                    node
                };
                self.node_mut(*child).parent = parent;
            }

            let node = self.node_mut(parent);
            node.child1 = children[0];
            node.child2 = children[1];
        }

        for &index in created.iter().rev() {
            self.refit(index);
        }

        self.rebuild_nodes = created;
        root
    }

    /// Check the structure and metrics of the whole tree. Panics with a description
    /// on the first violation. O(n); for tests.
    pub fn validate(&self) {
        if self.root == NULL_NODE {
            assert_eq!(self.proxy_count, 0, "empty tree with {} proxies", self.proxy_count);
            assert_eq!(self.node_count, 0, "empty tree with {} nodes", self.node_count);
        } else {
            assert_eq!(self.node(self.root).parent, NULL_NODE, "root has a parent");
            let leaf_count = self.validate_node(self.root);
            assert_eq!(leaf_count, self.proxy_count, "leaf count mismatch");
        }

        // free list threads every unused slot
        let mut free_count = 0;
        let mut index = self.free_list;
        while index != NULL_NODE {
            assert!(!self.node(index).allocated, "allocated node {index} on the free list");
            free_count += 1;
            assert!(free_count <= self.nodes.len(), "free list cycle");
            index = self.node(index).parent;
        }
        assert_eq!(
            self.node_count + free_count,
            self.nodes.len(),
            "node count {} + free {} != capacity {}",
            self.node_count,
            free_count,
            self.nodes.len()
        );
    }

    // Returns the number of leaves under `index`.
    fn validate_node(&self, index: i32) -> usize {
        let node = self.node(index);
        assert!(node.allocated, "node {index} is not allocated");

        if node.is_leaf() {
            assert_eq!(node.child1, NULL_NODE, "leaf {index} has a child");
            assert_eq!(node.child2, NULL_NODE, "leaf {index} has a child");
            return 1;
        }

        let child1 = self.node(node.child1);
        let child2 = self.node(node.child2);
        assert_eq!(child1.parent, index, "child {} has the wrong parent", node.child1);
        assert_eq!(child2.parent, index, "child {} has the wrong parent", node.child2);

        let height = 1 + child1.height.max(child2.height);
        assert_eq!(node.height, height, "node {index} height");

        let aabb = child1.aabb.union(&child2.aabb);
        assert_eq!(node.aabb, aabb, "node {index} box is not the union of its children");

        assert_eq!(
            node.category_bits,
            child1.category_bits | child2.category_bits,
            "node {index} category bits"
        );

        self.validate_node(node.child1) + self.validate_node(node.child2)
    }

    /// Check that no node carries the enlarged flag. Panics otherwise. For tests.
    pub fn validate_no_enlarged(&self) {
        for (i, node) in self.nodes.iter().enumerate() {
            if node.allocated {
                assert!(!node.enlarged, "node {i} is enlarged");
            }
        }
    }
}

// Split `items` along the axis of largest center spread using binned SAH.
// Falls back to a median split when the bins collapse. Returns the left count.
fn partition_sah(items: &mut [RebuildItem]) -> usize {
    let count = items.len();
    if count <= 2 {
        return count / 2;
    }

    let mut center_box = Aabb::new(items[0].center, items[0].center);
    for item in &items[1..] {
        center_box.lower = center_box.lower.min(item.center);
        center_box.upper = center_box.upper.max(item.center);
    }

    let d = center_box.upper - center_box.lower;
    let axis = if d.x > d.y { 0 } else { 1 };
    let extent = d[axis];

    if extent < f32::EPSILON {
        return partition_mid(items, axis);
    }

    let lower = center_box.lower[axis];
    let bin_scale = BIN_COUNT as f32 / extent;

    let mut bin_counts = [0usize; BIN_COUNT];
    let mut bin_boxes = [Aabb::default(); BIN_COUNT];
    for item in items.iter_mut() {
        let bin = (((item.center[axis] - lower) * bin_scale) as usize).min(BIN_COUNT - 1);
        item.bin = bin;
        bin_boxes[bin] = if bin_counts[bin] == 0 {
            item.aabb
        } else {
            bin_boxes[bin].union(&item.aabb)
        };
        bin_counts[bin] += 1;
    }

    // plane i splits bins [0, i] from [i + 1, BIN_COUNT)
    let mut left_costs = [0.0f32; BIN_COUNT - 1];
    let mut left_box: Option<Aabb> = None;
    let mut left_count = 0;
    for i in 0..BIN_COUNT - 1 {
        if bin_counts[i] > 0 {
            left_box = Some(left_box.map_or(bin_boxes[i], |b| b.union(&bin_boxes[i])));
            left_count += bin_counts[i];
        }
        left_costs[i] = left_box.map_or(0.0, |b| b.perimeter()) * left_count as f32;
    }

    let mut best_plane = None;
    let mut best_cost = f32::MAX;
    let mut right_box: Option<Aabb> = None;
    let mut right_count = 0;
    for i in (0..BIN_COUNT - 1).rev() {
        let bin = i + 1;
        if bin_counts[bin] > 0 {
            right_box = Some(right_box.map_or(bin_boxes[bin], |b| b.union(&bin_boxes[bin])));
            right_count += bin_counts[bin];
        }

        let left = count - right_count;
        if left == 0 || right_count == 0 {
            continue;
        }

        let cost = left_costs[i] + right_box.map_or(0.0, |b| b.perimeter()) * right_count as f32;
        if cost < best_cost {
            best_cost = cost;
            best_plane = Some(i);
        }
    }

    let Some(plane) = best_plane else {
        return partition_mid(items, axis);
    };

    // in-place partition by bin
    let mut i = 0;
    let mut j = count;
    while i < j {
        if items[i].bin <= plane {
            i += 1;
        } else {
            j -= 1;
            items.swap(i, j);
        }
    }

    if i == 0 || i == count {
        return partition_mid(items, axis);
    }
    i
}

fn partition_mid(items: &mut [RebuildItem], axis: usize) -> usize {
    let mid = items.len() / 2;
    items.select_nth_unstable_by(mid, |a, b| a.center[axis].total_cmp(&b.center[axis]));
    mid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_at(x: f32, y: f32, half: f32) -> Aabb {
        Aabb::new(Vec2::new(x - half, y - half), Vec2::new(x + half, y + half))
    }

    // deterministic pseudo random values in [0, 1)
    struct Lcg(u32);

    impl Lcg {
        fn next(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (self.0 >> 8) as f32 / (1u32 << 24) as f32
        }
    }

    fn grid_tree(n: usize) -> (DynamicTree, Vec<i32>) {
        let mut tree = DynamicTree::new();
        let mut ids = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let aabb = box_at(i as f32 * 2.0, j as f32 * 2.0, 0.5);
                ids.push(tree.create_proxy(aabb, DEFAULT_CATEGORY_BITS, (i * n + j) as u64));
            }
        }
        (tree, ids)
    }

    fn collect_query(tree: &DynamicTree, aabb: Aabb) -> Vec<u64> {
        let mut found = Vec::new();
        tree.query(aabb, DEFAULT_MASK_BITS, |_, user_data| {
            found.push(user_data);
            true
        });
        found.sort_unstable();
        found
    }

    #[test]
    fn test_create_and_query() {
        let (tree, ids) = grid_tree(4);
        tree.validate();
        assert_eq!(tree.get_proxy_count(), 16);
        assert_eq!(ids.len(), 16);

        let found = collect_query(&tree, box_at(0.0, 0.0, 0.1));
        assert_eq!(found, vec![0]);

        // spans the four boxes around (1, 1)
        let found = collect_query(&tree, box_at(1.0, 1.0, 0.6));
        assert_eq!(found, vec![0, 1, 4, 5]);

        let found = collect_query(&tree, box_at(100.0, 100.0, 1.0));
        assert!(found.is_empty());
    }

    #[test]
    fn test_fat_box_and_move_inside_margin() {
        let mut tree = DynamicTree::new();
        let aabb = box_at(0.0, 0.0, 0.5);
        let id = tree.create_proxy(aabb, DEFAULT_CATEGORY_BITS, 7);
        let other = tree.create_proxy(box_at(5.0, 0.0, 0.5), DEFAULT_CATEGORY_BITS, 8);

        let fat = tree.get_aabb(id);
        assert!(fat.contains(&aabb));
        assert!((fat.lower.x + 0.6).abs() < 1e-6);

        let height = tree.get_height();
        let moved = tree.move_proxy(id, box_at(0.05, 0.0, 0.5));
        assert!(!moved);
        assert_eq!(tree.get_aabb(id), fat);
        assert_eq!(tree.get_height(), height);

        let moved = tree.move_proxy(id, box_at(3.0, 0.0, 0.5));
        assert!(moved);
        assert!(tree.get_aabb(id).contains(&box_at(3.0, 0.0, 0.5)));
        assert_eq!(tree.get_user_data(id), 7);
        assert_eq!(tree.get_user_data(other), 8);
        tree.validate();
    }

    #[test]
    fn test_zero_margin_stores_exact_boxes() {
        let mut tree = DynamicTree::with_config(TreeConfig {
            aabb_margin: 0.0,
            initial_capacity: 2,
        });
        let aabb = box_at(1.0, 2.0, 0.5);
        let id = tree.create_proxy(aabb, DEFAULT_CATEGORY_BITS, 0);
        assert_eq!(tree.get_aabb(id), aabb);

        // forces pool growth
        for i in 0..10 {
            tree.create_proxy(box_at(i as f32, 0.0, 0.25), DEFAULT_CATEGORY_BITS, i);
        }
        tree.validate();
        assert_eq!(tree.get_aabb(id), aabb);
    }

    #[test]
    fn test_destroy_recycles_and_try_proxy() {
        let (mut tree, ids) = grid_tree(3);
        tree.destroy_proxy(ids[4]);
        tree.validate();
        assert_eq!(tree.get_proxy_count(), 8);
        assert_eq!(
            tree.try_proxy(ids[4]),
            Err(CollisionError::InvalidProxy { proxy_id: ids[4] })
        );
        assert!(tree.try_proxy(-1).is_err());
        assert!(tree.try_proxy(10_000).is_err());
        assert_eq!(tree.try_proxy(ids[0]).map(|p| p.user_data), Ok(0));

        let id = tree.create_proxy(box_at(50.0, 50.0, 1.0), 2, 99);
        assert_eq!(tree.try_proxy(id).map(|p| p.category_bits), Ok(2));
        tree.validate();

        for id in tree_ids(&tree) {
            tree.destroy_proxy(id);
        }
        tree.validate();
        assert_eq!(tree.get_height(), 0);
        assert_eq!(tree.get_root_bounds(), Aabb::default());
    }

    fn tree_ids(tree: &DynamicTree) -> Vec<i32> {
        let mut ids = Vec::new();
        tree.query(tree.get_root_bounds(), DEFAULT_MASK_BITS, |id, _| {
            ids.push(id);
            true
        });
        ids
    }

    #[test]
    fn test_invariants_under_churn() {
        let mut rng = Lcg(1234);
        let mut tree = DynamicTree::new();
        let mut live: Vec<(i32, Aabb)> = Vec::new();

        for step in 0..400 {
            let r = rng.next();
            if r < 0.5 || live.is_empty() {
                let aabb = box_at(rng.next() * 50.0, rng.next() * 50.0, 0.2 + rng.next());
                let id = tree.create_proxy(aabb, DEFAULT_CATEGORY_BITS, step);
                live.push((id, aabb));
            } else if r < 0.8 {
                let k = (rng.next() * live.len() as f32) as usize % live.len();
                let (id, aabb) = live[k];
                let delta = Vec2::new(rng.next() - 0.5, rng.next() - 0.5) * 4.0;
                let moved = Aabb::new(aabb.lower + delta, aabb.upper + delta);
                tree.move_proxy(id, moved);
                live[k].1 = moved;
            } else {
                let k = (rng.next() * live.len() as f32) as usize % live.len();
                let (id, _) = live.swap_remove(k);
                tree.destroy_proxy(id);
            }

            if step % 50 == 0 {
                tree.validate();
            }
        }

        tree.validate();
        assert_eq!(tree.get_proxy_count(), live.len());
        for &(id, aabb) in &live {
            assert!(tree.get_aabb(id).contains(&aabb), "proxy {id} lost its box");
        }

        // balanced enough for a few hundred proxies
        assert!(tree.get_height() <= 20, "height = {}", tree.get_height());
    }

    #[test]
    fn test_rebuild_preserves_proxies() {
        let (mut tree, _) = grid_tree(8);
        let query = box_at(5.0, 5.0, 3.0);
        let before = collect_query(&tree, query);

        let sorted = tree.rebuild(true);
        assert_eq!(sorted, 64);
        tree.validate();
        tree.validate_no_enlarged();
        assert_eq!(tree.get_proxy_count(), 64);
        assert_eq!(collect_query(&tree, query), before);
        assert!(tree.get_height() <= 12, "height = {}", tree.get_height());
        assert!(tree.get_area_ratio() > 0.0);
    }

    #[test]
    fn test_enlarge_then_partial_rebuild() {
        let (mut tree, ids) = grid_tree(6);

        let grown = box_at(0.0, 0.0, 1.5);
        tree.enlarge_proxy(ids[0], grown);
        assert!(tree.get_aabb(ids[0]).contains(&grown));
        tree.validate();

        let sorted = tree.rebuild(false);
        assert!(sorted >= 1 && sorted < 36, "sorted = {sorted}");
        tree.validate();
        tree.validate_no_enlarged();
        assert!(tree.get_aabb(ids[0]).contains(&grown));

        let found = collect_query(&tree, box_at(-1.2, -1.2, 0.1));
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn test_rebuild_coincident_boxes() {
        let mut tree = DynamicTree::new();
        for i in 0..10 {
            tree.create_proxy(box_at(1.0, 1.0, 0.5), DEFAULT_CATEGORY_BITS, i);
        }
        assert_eq!(tree.rebuild(true), 10);
        tree.validate();
        assert_eq!(collect_query(&tree, box_at(1.0, 1.0, 0.1)).len(), 10);
    }

    #[test]
    fn test_rebuild_skewed_row() {
        // spacing grows geometrically so most splits peel off one box
        let mut tree = DynamicTree::new();
        let mut ids = Vec::new();
        for i in 0..40 {
            let x = 1.5f32.powi(i);
            ids.push(tree.create_proxy(box_at(x, 0.0, 0.5), DEFAULT_CATEGORY_BITS, i as u64));
        }
        for i in 0..2000 {
            let x = 0.25 + i as f32 * 1e-4;
            tree.create_proxy(box_at(x, 0.0, 0.5), DEFAULT_CATEGORY_BITS, 100 + i as u64);
        }

        assert_eq!(tree.rebuild(true), 2040);
        tree.validate();
        assert!(tree.get_height() < 2040);

        let all = collect_query(&tree, box_at(0.0, 0.0, 1e8));
        assert_eq!(all.len(), 2040);
        for (i, &id) in ids.iter().enumerate() {
            let x = 1.5f32.powi(i as i32);
            assert!(collect_query(&tree, box_at(x, 0.0, 0.1)).contains(&(i as u64)));
            assert!(tree.try_proxy(id).is_ok());
        }

        // the scratch buffers are reused by a second build
        let before = tree.get_byte_count();
        assert_eq!(tree.rebuild(true), 2040);
        tree.validate();
        assert_eq!(tree.get_byte_count(), before);
    }

    #[test]
    fn test_query_mask_and_early_exit() {
        let mut tree = DynamicTree::new();
        tree.create_proxy(box_at(0.0, 0.0, 0.5), 0b01, 1);
        let id = tree.create_proxy(box_at(0.2, 0.0, 0.5), 0b10, 2);

        let mut found = Vec::new();
        tree.query(box_at(0.0, 0.0, 1.0), 0b10, |_, user_data| {
            found.push(user_data);
            true
        });
        assert_eq!(found, vec![2]);

        tree.set_category_bits(id, 0b100);
        assert_eq!(tree.get_category_bits(id), 0b100);
        tree.validate();

        let mut count = 0;
        let stats = tree.query(box_at(0.0, 0.0, 1.0), DEFAULT_MASK_BITS, |_, _| {
            count += 1;
            false
        });
        assert_eq!(count, 1);
        assert_eq!(stats.leaf_visits, 1);
    }

    #[test]
    fn test_ray_cast_clips_to_closest() {
        let mut tree = DynamicTree::new();
        for i in 0..5 {
            tree.create_proxy(box_at(2.0 + 2.0 * i as f32, 0.0, 0.5), DEFAULT_CATEGORY_BITS, i);
        }

        let input = RayCastInput {
            origin: Vec2::ZERO,
            translation: Vec2::new(20.0, 0.0),
            max_fraction: 1.0,
        };

        // report the entry fraction of each fat box
        let mut closest = (u64::MAX, f32::MAX);
        let stats = tree.ray_cast(&input, DEFAULT_MASK_BITS, |sub, id, user_data| {
            let aabb = tree.get_aabb(id);
            let fraction = aabb.lower.x / sub.translation.x;
            if fraction < closest.1 {
                closest = (user_data, fraction);
            }
            fraction
        });
        assert_eq!(closest.0, 0);
        assert!(stats.leaf_visits >= 1);

        // terminate immediately
        let mut calls = 0;
        tree.ray_cast(&input, DEFAULT_MASK_BITS, |_, _, _| {
            calls += 1;
            0.0
        });
        assert_eq!(calls, 1);

        // a ray that misses everything
        let miss = RayCastInput {
            origin: Vec2::new(0.0, 5.0),
            translation: Vec2::new(20.0, 0.0),
            max_fraction: 1.0,
        };
        let mut calls = 0;
        tree.ray_cast(&miss, DEFAULT_MASK_BITS, |sub, _, _| {
            calls += 1;
            sub.max_fraction
        });
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_shape_cast_finds_swept_proxies() {
        use crate::collision::distance::make_proxy;

        let mut tree = DynamicTree::new();
        tree.create_proxy(box_at(5.0, 0.0, 0.5), DEFAULT_CATEGORY_BITS, 1);
        tree.create_proxy(box_at(5.0, 5.0, 0.5), DEFAULT_CATEGORY_BITS, 2);

        let input = ShapeCastInput {
            proxy: make_proxy(&[Vec2::ZERO], 0.25),
            translation: Vec2::new(10.0, 0.0),
            max_fraction: 1.0,
            can_encroach: false,
        };

        let mut found = Vec::new();
        tree.shape_cast(&input, DEFAULT_MASK_BITS, |sub, _, user_data| {
            found.push(user_data);
            sub.max_fraction
        });
        assert_eq!(found, vec![1]);
    }

    #[test]
    fn test_byte_count_grows() {
        let empty = DynamicTree::new().get_byte_count();
        let (tree, _) = grid_tree(10);
        assert!(tree.get_byte_count() > empty);
    }
}
