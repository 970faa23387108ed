// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Multi-lane doubly linked chains over pooled nodes.
//!
//! A node type embeds [`Links<N>`] and can then sit on up to `N` chains at
//! once, one per lane, without any per-membership allocation. The chain
//! header owns no nodes; it records a lane index plus head and tail
//! handles into the [`Pool`] the nodes live in. Every operation takes that
//! pool explicitly, and a chain must always be used with the pool its
//! nodes were acquired from (the same discipline slab-backed lists have).
//!
//! Linking is idempotent per lane and [`Chain::remove_if_present`] accepts
//! unlinked nodes, which is what membership bookkeeping wants: a node
//! being shuffled between queues can be pushed or stripped without the
//! caller tracking where it currently sits.

use crate::memory::pool::{Pool, PoolHandle};

/// One lane's membership state inside a node.
#[derive(Debug, Clone, Copy, Default)]
pub struct Link {
    prev: Option<PoolHandle>,
    next: Option<PoolHandle>,
    linked: bool,
}

/// Embedded link storage for a node participating in up to `N` lanes.
#[derive(Debug, Clone, Copy)]
pub struct Links<const N: usize> {
    lanes: [Link; N],
}

impl<const N: usize> Default for Links<N> {
    fn default() -> Self {
        Self {
            lanes: [Link::default(); N],
        }
    }
}

impl<const N: usize> Links<N> {
    /// Whether the node is currently linked on `lane`.
    pub fn is_linked(&self, lane: usize) -> bool {
        self.lanes[lane].linked
    }
}

/// Implemented by pooled node types that embed [`Links`].
pub trait Linked<const N: usize>: Default {
    /// Shared access to the embedded links.
    fn links(&self) -> &Links<N>;
    /// Mutable access to the embedded links.
    fn links_mut(&mut self) -> &mut Links<N>;
}

/// Header of one chain: a lane index plus head/tail/len bookkeeping.
#[derive(Debug)]
pub struct Chain {
    lane: usize,
    head: Option<PoolHandle>,
    tail: Option<PoolHandle>,
    len: usize,
}

impl Chain {
    /// Creates an empty chain over `lane`.
    pub fn new(lane: usize) -> Self {
        Self {
            lane,
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// The lane this chain threads through.
    pub fn lane(&self) -> usize {
        self.lane
    }

    /// Number of linked nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the chain holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Handle of the first node, if any.
    pub fn front(&self) -> Option<PoolHandle> {
        self.head
    }

    /// Handle of the last node, if any.
    pub fn back(&self) -> Option<PoolHandle> {
        self.tail
    }

    /// Links `handle` at the front. No-op if it is already on this lane.
    pub fn push_front<T: Linked<N>, const N: usize>(
        &mut self,
        pool: &mut Pool<T>,
        handle: PoolHandle,
    ) {
        let head = self.head;
        if !self.attach(pool, handle, None, head) {
            return;
        }
        match head {
            Some(old) => self.link_of(pool, old).prev = Some(handle),
            None => self.tail = Some(handle),
        }
        self.head = Some(handle);
        self.len += 1;
    }

    /// Links `handle` at the back. No-op if it is already on this lane.
    pub fn push_back<T: Linked<N>, const N: usize>(
        &mut self,
        pool: &mut Pool<T>,
        handle: PoolHandle,
    ) {
        let tail = self.tail;
        if !self.attach(pool, handle, tail, None) {
            return;
        }
        match tail {
            Some(old) => self.link_of(pool, old).next = Some(handle),
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
        self.len += 1;
    }

    /// Unlinks `handle` from this lane.
    ///
    /// # Panics
    ///
    /// Panics if the node is not linked here; use
    /// [`Chain::remove_if_present`] when membership is uncertain.
    pub fn remove<T: Linked<N>, const N: usize>(&mut self, pool: &mut Pool<T>, handle: PoolHandle) {
        if !self.remove_if_present(pool, handle) {
            panic!(
                "chain remove of unlinked node {}:{} on lane {}",
                handle.index, handle.generation, self.lane
            );
        }
    }

    /// Unlinks `handle` if it is linked on this lane. Returns whether a
    /// removal happened; stale handles and unlinked nodes are no-ops.
    pub fn remove_if_present<T: Linked<N>, const N: usize>(
        &mut self,
        pool: &mut Pool<T>,
        handle: PoolHandle,
    ) -> bool {
        let lane = self.lane;
        let (prev, next) = match pool.get_mut(handle) {
            Some(node) => {
                let link = &mut node.links_mut().lanes[lane];
                if !link.linked {
                    return false;
                }
                let ends = (link.prev, link.next);
                *link = Link::default();
                ends
            }
            None => return false,
        };
        match prev {
            Some(p) => self.link_of(pool, p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.link_of(pool, n).prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
        true
    }

    /// Unlinks and returns the first node, if any.
    pub fn pop_front<T: Linked<N>, const N: usize>(
        &mut self,
        pool: &mut Pool<T>,
    ) -> Option<PoolHandle> {
        let head = self.head?;
        self.remove(pool, head);
        Some(head)
    }

    /// The node after `handle` on this lane. `None` past the tail, for
    /// stale handles, and for nodes not linked here.
    pub fn next_of<T: Linked<N>, const N: usize>(
        &self,
        pool: &Pool<T>,
        handle: PoolHandle,
    ) -> Option<PoolHandle> {
        pool.get(handle)?.links().lanes[self.lane].next
    }

    /// The node before `handle` on this lane.
    pub fn prev_of<T: Linked<N>, const N: usize>(
        &self,
        pool: &Pool<T>,
        handle: PoolHandle,
    ) -> Option<PoolHandle> {
        pool.get(handle)?.links().lanes[self.lane].prev
    }

    /// Whether `handle` is currently linked on this lane.
    pub fn contains<T: Linked<N>, const N: usize>(
        &self,
        pool: &Pool<T>,
        handle: PoolHandle,
    ) -> bool {
        pool.get(handle)
            .map(|node| node.links().lanes[self.lane].linked)
            .unwrap_or(false)
    }

    /// Unlinks every node. The nodes themselves stay live in the pool.
    pub fn clear<T: Linked<N>, const N: usize>(&mut self, pool: &mut Pool<T>) {
        while self.pop_front(pool).is_some() {}
    }

    /// Sets up the handle's own link. Returns false when already linked.
    fn attach<T: Linked<N>, const N: usize>(
        &mut self,
        pool: &mut Pool<T>,
        handle: PoolHandle,
        prev: Option<PoolHandle>,
        next: Option<PoolHandle>,
    ) -> bool {
        let lane = self.lane;
        let node = match pool.get_mut(handle) {
            Some(node) => node,
            None => panic!(
                "chain push of stale handle {}:{} on lane {}",
                handle.index, handle.generation, lane
            ),
        };
        let link = &mut node.links_mut().lanes[lane];
        if link.linked {
            return false;
        }
        *link = Link {
            prev,
            next,
            linked: true,
        };
        true
    }

    /// Mutable link access for a node that the chain's own pointers name.
    /// Those pointers only ever hold live handles, so absence is corruption.
    fn link_of<'p, T: Linked<N>, const N: usize>(
        &self,
        pool: &'p mut Pool<T>,
        handle: PoolHandle,
    ) -> &'p mut Link {
        let lane = self.lane;
        match pool.get_mut(handle) {
            Some(node) => &mut node.links_mut().lanes[lane],
            None => panic!(
                "chain lane {} references released slot {}:{}",
                lane, handle.index, handle.generation
            ),
        }
    }
}
