//! The graph of views derived from one storage handle.
//!
//! Each view lives in a [`ViewNode`] of an arena owned by the connector. A node may
//! *wrap* another one (a character reader wraps a byte stream, a binary reader wraps a
//! channel): `wrapper_for` points to the wrapped node and `wrapped_by` lists the
//! wrappers. Node 0 is the root, whose view is the storage handle itself.
//!
//! Two policies are attached to each node:
//! - `cascade_on_reset`: the view and the node it wraps share one position, so that
//!   using either of them desynchronizes the other, and resetting the view requires
//!   resetting the wrapped node first.
//! - `cascade_on_close`: closing the view does not close the wrapped node, which then
//!   has to be closed separately.

use std::fmt;

use ahash::{AHashMap, AHashSet};
use log::trace;
use tessera_io::{ByteChannel, CharReader, InputStream, utils::borrow_mut};

use crate::{handle::Handle, kind::ViewKind};

pub(crate) type NodeId = usize;

/// The node of the storage handle itself.
pub(crate) const ROOT: NodeId = 0;

pub(crate) struct ViewNode {
    /// The view, or `None` if the view kinds mapped to this node are known to be
    /// unavailable.
    pub view: Option<Handle>,
    pub wrapper_for: Option<NodeId>,
    pub wrapped_by: Vec<NodeId>,
    pub cascade_on_reset: bool,
    pub cascade_on_close: bool,
    /// Whether the position of the view is in sync with the node it wraps.
    pub is_valid: bool,
}

impl ViewNode {
    fn new(view: Option<Handle>) -> ViewNode {
        ViewNode {
            view,
            wrapper_for: None,
            wrapped_by: Vec::new(),
            cascade_on_reset: false,
            cascade_on_close: false,
            is_valid: true,
        }
    }
}

impl fmt::Debug for ViewNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewNode")
            .field("view", &self.view.as_ref().map(Handle::kind_name))
            .field("wrapper_for", &self.wrapper_for)
            .field("cascade_on_reset", &self.cascade_on_reset)
            .field("cascade_on_close", &self.cascade_on_close)
            .field("is_valid", &self.is_valid)
            .finish()
    }
}

pub(crate) struct ViewGraph {
    nodes: Vec<ViewNode>,
    by_kind: AHashMap<ViewKind, NodeId>,
}

impl ViewGraph {
    pub fn new(storage: Handle) -> ViewGraph {
        ViewGraph {
            nodes: vec![ViewNode::new(Some(storage))],
            by_kind: AHashMap::new(),
        }
    }

    pub fn get(&self, kind: ViewKind) -> Option<NodeId> {
        self.by_kind.get(&kind).copied()
    }

    pub fn node(&self, id: NodeId) -> &ViewNode {
        &self.nodes[id]
    }

    /// The view cached for the given kind: `None` if not computed yet,
    /// `Some(None)` if known to be unavailable.
    pub fn view(&self, kind: ViewKind) -> Option<Option<&Handle>> {
        self.get(kind).map(|id| self.nodes[id].view.as_ref())
    }

    /// Registers the view of the given kind, or the fact that there is none.
    ///
    /// `source` is the kind of the view wrapped by this one (`None` for the storage
    /// handle); it is recorded only when one of the cascade policies is set. A view
    /// which is the storage handle itself shares the root node.
    pub fn add_view(
        &mut self,
        kind: ViewKind,
        view: Option<Handle>,
        source: Option<ViewKind>,
        cascade_on_reset: bool,
        cascade_on_close: bool,
    ) -> NodeId {
        let id = match self.get(kind) {
            Some(id) => {
                debug_assert!(
                    self.nodes[id].view.is_none()
                        || view
                            .as_ref()
                            .zip(self.nodes[id].view.as_ref())
                            .is_some_and(|(a, b)| a.same_object(b))
                );
                self.invalidate_usages(id);
                id
            }
            None => {
                let id = if view.as_ref().is_some_and(|v| self.is_storage(v)) {
                    self.invalidate_usages(ROOT);
                    ROOT
                } else {
                    let wrapper_for = if cascade_on_reset || cascade_on_close {
                        match source {
                            Some(source) => self.get(source),
                            None => Some(ROOT),
                        }
                    } else {
                        None
                    };
                    let id = self.nodes.len();
                    self.nodes.push(ViewNode {
                        wrapper_for,
                        cascade_on_reset,
                        cascade_on_close,
                        ..ViewNode::new(None)
                    });
                    if let Some(target) = wrapper_for {
                        self.nodes[target].wrapped_by.push(id);
                    }
                    id
                };
                self.by_kind.insert(kind, id);
                id
            }
        };
        let node = &mut self.nodes[id];
        node.view = view;
        node.is_valid = true;
        self.invalidate_sources(id);
        id
    }

    fn is_storage(&self, view: &Handle) -> bool {
        self.nodes[ROOT]
            .view
            .as_ref()
            .is_some_and(|storage| storage.same_object(view))
    }

    /// Marks as invalid the nodes wrapped by the given one, as far as they share its
    /// position.
    pub fn invalidate_sources(&mut self, id: NodeId) {
        let mut sync = self.nodes[id].cascade_on_reset;
        let mut next = self.nodes[id].wrapper_for;
        while sync {
            let Some(target) = next else {
                break;
            };
            trace!("invalidate source node {target}");
            let node = &mut self.nodes[target];
            node.is_valid = false;
            sync = node.cascade_on_reset;
            next = node.wrapper_for;
        }
    }

    /// Marks as invalid the wrappers of the given node which share its position,
    /// recursively.
    pub fn invalidate_usages(&mut self, id: NodeId) {
        let mut pending = self.nodes[id].wrapped_by.clone();
        while let Some(wrapper) = pending.pop() {
            let node = &mut self.nodes[wrapper];
            if node.cascade_on_reset {
                trace!("invalidate usage node {wrapper}");
                node.is_valid = false;
                pending.extend_from_slice(&node.wrapped_by);
            }
        }
    }

    /// Brings the view of an invalid node back to its initial position, resetting the
    /// node it wraps first when they share a position. Returns `true` if anything was
    /// done.
    ///
    /// Does not invalidate other nodes; this is left to the caller.
    pub fn reset(&mut self, id: NodeId) -> std::io::Result<bool> {
        if self.nodes[id].is_valid {
            return Ok(false);
        }
        // Set first, in case of a cycle.
        self.nodes[id].is_valid = true;
        let result = self.reset_chain(id);
        if result.is_err() {
            self.nodes[id].is_valid = false;
        }
        result.map(|()| true)
    }

    /// Resets the wrapped node first when both share a position. A forward-only stream
    /// below is left as it is: the views above it replay what they buffered, and fail
    /// lazily if they need to go back further.
    fn reset_chain(&mut self, id: NodeId) -> std::io::Result<()> {
        if let Some(target) = self.coupled_source(id) {
            self.reset(target)?;
        }
        self.rewind(id)
    }

    /// The wrapped node whose position is shared with the given one, unless it can't be
    /// rewound at all.
    fn coupled_source(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id];
        let target = node.wrapper_for.filter(|_| node.cascade_on_reset)?;
        match &self.nodes[target].view {
            Some(Handle::Stream(stream))
                if stream.try_borrow().is_ok_and(|s| !s.mark_supported()) =>
            {
                None
            }
            _ => Some(target),
        }
    }

    fn rewind(&self, id: NodeId) -> std::io::Result<()> {
        match &self.nodes[id].view {
            Some(Handle::Stream(stream)) => borrow_mut(stream, "input stream")?.reset(),
            Some(Handle::Reader(reader)) => borrow_mut(reader, "reader")?.reset(),
            Some(Handle::Channel(channel)) => {
                let pos = self.channel_offset(id)?;
                let coupled = self.coupled_source(id).is_some();
                let mut channel = borrow_mut(channel, "channel")?;
                rewind_channel(&mut *channel, pos, coupled)
            }
            Some(Handle::DataInput(input)) => {
                borrow_mut(input, "binary reader")?.reset_buffer();
                Ok(())
            }
            // Other views have no position, or are expected to expose their resource
            // in its initial state again.
            _ => Ok(()),
        }
    }

    /// Position the channel of the given node started at, as recorded by the first
    /// binary reader wrapping it.
    fn channel_offset(&self, id: NodeId) -> std::io::Result<u64> {
        for &wrapper in &self.nodes[id].wrapped_by {
            if let Some(Handle::DataInput(input)) = &self.nodes[wrapper].view {
                return Ok(input
                    .try_borrow()
                    .map_err(|_| {
                        std::io::Error::new(
                            std::io::ErrorKind::WouldBlock,
                            "binary reader is in use by another borrower",
                        )
                    })?
                    .channel_offset());
            }
        }
        Ok(0)
    }

    /// Returns the closeable views to release when the connector is closed, keeping
    /// `keep` and everything it depends on. See [`ClosePlan`].
    pub fn close_plan(&self, keep: Option<&Handle>) -> Vec<Handle> {
        let mut plan = ClosePlan::default();
        for (id, node) in self.nodes.iter().enumerate() {
            let Some(view) = &node.view else {
                continue;
            };
            if keep.is_some_and(|keep| keep.same_object(view)) {
                self.protect(id, &mut plan);
                let mut next = Some(id);
                while let Some(current) = next {
                    if let Some(view) = &self.nodes[current].view {
                        plan.mark(view, Fate::Keep);
                    }
                    next = self.nodes[current].wrapper_for;
                }
            } else {
                plan.mark_if_absent(view);
            }
        }

        // Closing a view closes what it wraps, down to the first node whose close does
        // not cascade. Closing the wrapped views as well would close them twice.
        for (id, node) in self.nodes.iter().enumerate() {
            if node.view.as_ref().is_some_and(|view| plan.is_closed(view)) {
                for below in self.closed_along(id).skip(1) {
                    plan.mark_if_open(below, Fate::Covered);
                }
            }
        }

        // The remaining views are closed first-come. A view whose close would reach a
        // kept view is kept, and one reaching a view closed by an earlier one is skipped.
        let mut reached = AHashSet::new();
        for (id, node) in self.nodes.iter().enumerate() {
            let Some(view) = &node.view else {
                continue;
            };
            let Some(key) = ClosePlan::key(view) else {
                continue;
            };
            if !plan.is_closed(view) || reached.contains(&key) {
                continue;
            }
            let keys: Vec<usize> = self.closed_along(id).filter_map(ClosePlan::key).collect();
            if self.closed_along(id).any(|below| plan.is_kept(below)) {
                plan.mark(view, Fate::Keep);
            } else if keys.iter().any(|key| reached.contains(key)) {
                trace!("{} closed through another view", view.kind_name());
                plan.mark(view, Fate::Covered);
            } else {
                reached.extend(keys);
            }
        }
        plan.into_handles()
    }

    /// The views closed by closing the view of the given node, starting with that view.
    fn closed_along(&self, id: NodeId) -> impl Iterator<Item = &Handle> + '_ {
        let mut next = Some(id);
        std::iter::from_fn(move || {
            let node = &self.nodes[next?];
            next = node.wrapper_for.filter(|_| !node.cascade_on_close);
            Some(node)
        })
        .filter_map(|node| node.view.as_ref())
    }

    /// Protects the wrappers of the given node that would close it when closed.
    fn protect(&self, id: NodeId, plan: &mut ClosePlan) {
        for &wrapper in &self.nodes[id].wrapped_by {
            let node = &self.nodes[wrapper];
            if !node.cascade_on_close {
                if let Some(view) = &node.view {
                    plan.mark(view, Fate::Keep);
                }
                self.protect(wrapper, plan);
            }
        }
    }
}

/// Non-seekable channels are left where they are, unless their source has just been
/// reset. The binary reader over them replays its head window and checks the channel
/// position before reading from it again.
fn rewind_channel(
    channel: &mut dyn ByteChannel,
    pos: u64,
    coupled: bool,
) -> std::io::Result<()> {
    if channel.is_seekable() {
        channel.set_position(pos)
    } else if coupled {
        channel.source_rewound(pos);
        Ok(())
    } else {
        Ok(())
    }
}

impl fmt::Debug for ViewGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.by_kind.iter().collect();
        kinds.sort_by_key(|(_, id)| **id);
        f.debug_struct("ViewGraph")
            .field("nodes", &self.nodes)
            .field("kinds", &kinds)
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Fate {
    Close,
    /// Protected from closing.
    Keep,
    /// Closed by closing another view.
    Covered,
}

/// Closeable views in discovery order, each with its [`Fate`]. Views are keyed by
/// identity, so a view reachable from several nodes is listed once. Protection wins
/// over any other fate.
#[derive(Default)]
struct ClosePlan {
    entries: Vec<(Handle, Fate)>,
    index: AHashMap<usize, usize>,
}

impl ClosePlan {
    fn key(view: &Handle) -> Option<usize> {
        if view.is_closeable() {
            view.address()
        } else {
            None
        }
    }

    fn fate(&self, view: &Handle) -> Option<Fate> {
        Self::key(view)
            .and_then(|key| self.index.get(&key))
            .map(|&i| self.entries[i].1)
    }

    fn mark_if_absent(&mut self, view: &Handle) {
        if self.fate(view).is_none() {
            self.mark(view, Fate::Close);
        }
    }

    fn mark_if_open(&mut self, view: &Handle, fate: Fate) {
        if self.is_closed(view) {
            self.mark(view, fate);
        }
    }

    fn mark(&mut self, view: &Handle, fate: Fate) {
        if let Some(key) = Self::key(view) {
            match self.index.get(&key) {
                Some(&i) => self.entries[i].1 = fate,
                None => {
                    self.index.insert(key, self.entries.len());
                    self.entries.push((view.clone(), fate));
                }
            }
        }
    }

    fn is_closed(&self, view: &Handle) -> bool {
        self.fate(view) == Some(Fate::Close)
    }

    fn is_kept(&self, view: &Handle) -> bool {
        self.fate(view) == Some(Fate::Keep)
    }

    fn into_handles(self) -> Vec<Handle> {
        self.entries
            .into_iter()
            .filter_map(|(view, fate)| (fate == Fate::Close).then_some(view))
            .collect()
    }
}
