//! Version stamps and upward change propagation.
//!
//! Every parameter and registry owns one slot in a shared [`TrackerArena`].
//! A slot holds a stamp taken from a single monotone clock and a list of
//! upward *subjects*. Clicking a slot stamps it with a fresh tick and pushes
//! that tick to every subject reachable from it, so any cache that recorded an
//! older stamp knows it is stale.
//!
//! Edges are stored as indices into the arena. The subject graph must stay
//! acyclic; [`ChangeTracker::add_subject`] refuses an edge that would close a
//! cycle.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::error::{FitError, Result};

/// Index of a tracker slot in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackerId(usize);

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct TrackerNode {
    stamp: u64,
    subjects: Vec<TrackerId>,
    live: bool,
}

/// Storage for all tracker slots sharing one clock.
#[derive(Debug, Default)]
pub struct TrackerArena {
    clock: u64,
    nodes: Vec<TrackerNode>,
    free: Vec<usize>,
}

impl TrackerArena {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn node(&self, id: TrackerId) -> Option<&TrackerNode> {
        self.nodes.get(id.0).filter(|n| n.live)
    }

    fn register(&mut self) -> TrackerId {
        let stamp = self.tick();
        let node = TrackerNode {
            stamp,
            subjects: Vec::new(),
            live: true,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                TrackerId(slot)
            }
            None => {
                self.nodes.push(node);
                TrackerId(self.nodes.len() - 1)
            }
        }
    }

    fn release(&mut self, id: TrackerId) {
        let Some(node) = self.nodes.get_mut(id.0) else {
            return;
        };
        if !node.live {
            return;
        }
        node.live = false;
        node.subjects.clear();
        for other in self.nodes.iter_mut().filter(|n| n.live) {
            other.subjects.retain(|s| *s != id);
        }
        self.free.push(id.0);
    }

    fn click(&mut self, id: TrackerId) {
        if self.node(id).is_none() {
            return;
        }
        let stamp = self.tick();
        let visited = self.click_to(id, stamp);
        trace!(tracker = %id, stamp, visited, "click");
    }

    /// Raise `id` and everything above it to at least `stamp`, visiting each
    /// slot once. Returns the number of visited slots.
    fn click_to(&mut self, id: TrackerId, stamp: u64) -> usize {
        let mut visited = HashSet::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            let node = &mut self.nodes[current.0];
            node.stamp = node.stamp.max(stamp);
            pending.extend(node.subjects.iter().copied());
        }
        visited.len()
    }

    /// Whether `target` can be reached from `from` by following subject edges.
    fn reaches(&self, from: TrackerId, target: TrackerId) -> bool {
        let mut visited = HashSet::new();
        let mut pending = vec![from];
        while let Some(current) = pending.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.node(current) {
                pending.extend(node.subjects.iter().copied());
            }
        }
        false
    }
}

/// Cheap-to-clone handle on a shared [`TrackerArena`].
///
/// Every object that has to be compared for freshness must be created from
/// the same `ChangeTracker`. The handle is single-threaded; mutating shared
/// parameters from several threads is not supported.
#[derive(Clone, Default)]
pub struct ChangeTracker {
    arena: Rc<RefCell<TrackerArena>>,
}

impl fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.arena.borrow();
        f.debug_struct("ChangeTracker")
            .field("clock", &arena.clock)
            .field("slots", &(arena.nodes.len() - arena.free.len()))
            .finish()
    }
}

impl ChangeTracker {
    /// Create a new, empty tracker arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a slot. A fresh slot counts as changed.
    pub fn register(&self) -> TrackerId {
        self.arena.borrow_mut().register()
    }

    /// Free a slot and every edge pointing at it.
    ///
    /// Called from `Drop` impls, so it silently gives up if the arena is
    /// already borrowed.
    pub fn release(&self, id: TrackerId) {
        if let Ok(mut arena) = self.arena.try_borrow_mut() {
            arena.release(id);
        }
    }

    /// Mark `id` as changed and propagate the change to its subjects.
    pub fn click(&self, id: TrackerId) {
        self.arena.borrow_mut().click(id);
    }

    /// Current stamp of `id`; zero for released slots.
    pub fn stamp(&self, id: TrackerId) -> u64 {
        self.arena.borrow().node(id).map_or(0, |n| n.stamp)
    }

    /// Current value of the shared clock.
    pub fn clock(&self) -> u64 {
        self.arena.borrow().clock
    }

    /// Whether `a` changed more recently than `b`.
    pub fn is_newer(&self, a: TrackerId, b: TrackerId) -> bool {
        self.stamp(a) > self.stamp(b)
    }

    /// Register `parent` as an upward subject of `child`.
    ///
    /// The parent's stamp is raised to the child's so that adding an already
    /// modified entity invalidates caches depending on the parent.
    pub fn add_subject(&self, child: TrackerId, parent: TrackerId) -> Result<()> {
        let mut arena = self.arena.borrow_mut();
        if arena.node(child).is_none() || arena.node(parent).is_none() {
            return Err(FitError::NotFound(format!(
                "tracker {} or {} has been released",
                child, parent
            )));
        }
        if child == parent || arena.reaches(parent, child) {
            return Err(FitError::CycleDetected(format!(
                "tracker {} already propagates into {}",
                parent, child
            )));
        }
        arena.nodes[child.0].subjects.push(parent);
        let stamp = arena.nodes[child.0].stamp;
        arena.click_to(parent, stamp);
        Ok(())
    }

    /// Remove one `child → parent` edge. Returns whether an edge was removed.
    pub fn remove_subject(&self, child: TrackerId, parent: TrackerId) -> bool {
        let mut arena = self.arena.borrow_mut();
        let Some(node) = arena.nodes.get_mut(child.0).filter(|n| n.live) else {
            return false;
        };
        match node.subjects.iter().position(|s| *s == parent) {
            Some(pos) => {
                node.subjects.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Whether both handles point at the same arena.
    pub fn same_arena(&self, other: &ChangeTracker) -> bool {
        Rc::ptr_eq(&self.arena, &other.arena)
    }
}
