//! Incremental construction of a lock graph from lock events.
//!
//! The builder tracks which locks each thread holds.  Every time a thread
//! acquires a lock, an edge is recorded from the class of each lock it
//! already holds to the class of the new lock, along with the pair of stacks
//! that did the two acquisitions.  `finish` freezes everything seen so far
//! into a `Graph`.

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;

use crate::graph::{Edge, Graph, StackPair};
use crate::stack::{Stack, StackTable};

pub type ThreadId = u64;

type ClassId = usize;

struct LockClass {
    label: String,
    /// Evidence for every edge out of this class, by target class.
    out: HashMap<ClassId, EdgeEvidence>,
}

/// Counted set of stack pairs.  `pairs` keeps first-seen order so the final
/// stable sort by count is deterministic.
#[derive(Default)]
struct EdgeEvidence {
    pairs: Vec<StackPair>,
    buckets: HashMap<u64, Vec<usize>>,
}

impl EdgeEvidence {
    fn add(&mut self, s1: &Stack, s2: &Stack) {
        let hash = s1.rolling_hash() ^ s2.rolling_hash();
        let bucket = self.buckets.entry(hash).or_default();
        for &i in bucket.iter() {
            let pair = &mut self.pairs[i];
            if pair.s1 == *s1 && pair.s2 == *s2 {
                pair.count += 1;
                return;
            }
        }
        bucket.push(self.pairs.len());
        self.pairs.push(StackPair {
            s1: s1.clone(),
            s2: s2.clone(),
            count: 1,
        });
    }

    fn to_edge(&self) -> Edge {
        let stacks = self
            .pairs
            .iter()
            .cloned()
            .sorted_by(|a, b| b.count.cmp(&a.count))
            .collect();
        Edge::new(stacks)
    }
}

struct HeldLock {
    lock_id: u64,
    class: ClassId,
    rank: u64,
    stack: Stack,
}

#[derive(Default)]
struct ThreadState {
    held: Vec<HeldLock>,
}

#[derive(Default)]
pub struct GraphBuilder {
    stacks: Arc<StackTable>,
    threads: HashMap<ThreadId, ThreadState>,
    /// Class labels registered with `name_lock`.
    lock_names: HashMap<u64, String>,
    /// Resolved class of every lock acquired through `acquire`.
    lock_classes: HashMap<u64, ClassId>,
    classes: Vec<LockClass>,
    class_ids: HashMap<String, ClassId>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder::default()
    }

    /// The table stacks passed to this builder must be interned in.
    pub fn stacks(&self) -> Arc<StackTable> {
        Arc::clone(&self.stacks)
    }

    /// Registers the class label of the lock at `lock_id`.
    pub fn name_lock(&mut self, lock_id: u64, label: &str) {
        self.lock_names.insert(lock_id, label.to_string());
        // A lock acquired before it was named was given a placeholder class.
        self.lock_classes.remove(&lock_id);
    }

    pub fn acquire(&mut self, thread: ThreadId, lock_id: u64, stack: Stack) {
        let class = self.static_class(thread, lock_id, &stack);
        self.push_held(
            thread,
            HeldLock {
                lock_id,
                class,
                rank: 0,
                stack,
            },
        );
    }

    /// Like `acquire`, for locks whose class and rank are known up front.
    pub fn acquire_labeled(
        &mut self,
        thread: ThreadId,
        lock_id: u64,
        stack: Stack,
        class: &str,
        rank: u64,
    ) {
        let class = self.class_id(class);
        self.push_held(
            thread,
            HeldLock {
                lock_id,
                class,
                rank,
                stack,
            },
        );
    }

    /// Records the edges `acquire` would, without marking the lock held.
    pub fn may_acquire(&mut self, thread: ThreadId, lock_id: u64, stack: Stack) {
        let holds_any = self
            .threads
            .get(&thread)
            .map_or(false, |t| !t.held.is_empty());
        if !holds_any {
            return;
        }
        let class = self.static_class(thread, lock_id, &stack);
        let new = HeldLock {
            lock_id,
            class,
            rank: 0,
            stack,
        };
        if let Some(state) = self.threads.get(&thread) {
            for held in &state.held {
                add_out(&mut self.classes, held, &new);
            }
        }
    }

    pub fn release(&mut self, thread: ThreadId, lock_id: u64) {
        let held = match self.threads.get_mut(&thread) {
            Some(state) => &mut state.held,
            None => {
                warn!(thread, lock_id, "release by a thread that never acquired anything");
                return;
            }
        };
        match held.iter().position(|l| l.lock_id == lock_id) {
            Some(i) => {
                held.swap_remove(i);
            }
            None => warn!(thread, lock_id, "release of a lock that is not held"),
        }
    }

    /// Number of locks `thread` currently holds.
    pub fn held_count(&self, thread: ThreadId) -> usize {
        self.threads.get(&thread).map_or(0, |t| t.held.len())
    }

    /// Snapshots the classes and edges seen so far.  Nodes are numbered in
    /// label order.
    pub fn finish(&self) -> Graph {
        let order: Vec<ClassId> = (0..self.classes.len())
            .sorted_by(|&a, &b| self.classes[a].label.cmp(&self.classes[b].label))
            .collect();
        let mut node_of = vec![0; self.classes.len()];
        for (node, &class) in order.iter().enumerate() {
            node_of[class] = node;
        }

        let mut g = Graph::new(Arc::clone(&self.stacks));
        for &class in &order {
            g.add_node(&self.classes[class].label);
        }
        for &class in &order {
            let out = self.classes[class]
                .out
                .iter()
                .map(|(&target, evidence)| (node_of[target], evidence))
                .sorted_by_key(|&(target, _)| target);
            for (target, evidence) in out {
                g.add_edge(node_of[class], target, evidence.to_edge());
            }
        }
        debug!(
            nodes = g.num_nodes(),
            edges = g.num_edges(),
            stack_pairs = g.num_stack_pairs(),
            "finished lock graph"
        );
        g
    }

    fn push_held(&mut self, thread: ThreadId, new: HeldLock) {
        let state = self.threads.entry(thread).or_default();
        for held in &state.held {
            add_out(&mut self.classes, held, &new);
        }
        state.held.push(new);
    }

    fn static_class(&mut self, thread: ThreadId, lock_id: u64, stack: &Stack) -> ClassId {
        if let Some(&class) = self.lock_classes.get(&lock_id) {
            return class;
        }
        let label = match self.lock_names.get(&lock_id) {
            Some(label) => label.clone(),
            None => {
                warn!(
                    thread,
                    "acquired unlabeled lock {:#x} at:\n{}",
                    lock_id,
                    self.stacks.string_stack(stack)
                );
                format!("{:#x}", lock_id)
            }
        };
        let class = self.class_id(&label);
        self.lock_classes.insert(lock_id, class);
        class
    }

    fn class_id(&mut self, label: &str) -> ClassId {
        if let Some(&class) = self.class_ids.get(label) {
            return class;
        }
        let class = self.classes.len();
        self.classes.push(LockClass {
            label: label.to_string(),
            out: HashMap::new(),
        });
        self.class_ids.insert(label.to_string(), class);
        class
    }
}

fn add_out(classes: &mut [LockClass], held: &HeldLock, new: &HeldLock) {
    // Locks of one class must be taken in non-increasing rank order; anything
    // else is recorded as a self-edge.
    if held.class == new.class && held.rank < new.rank {
        return;
    }
    classes[held.class]
        .out
        .entry(new.class)
        .or_default()
        .add(&held.stack, &new.stack);
}
