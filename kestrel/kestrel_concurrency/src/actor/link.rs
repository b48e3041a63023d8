//! Link and watch relations between actors.
//!
//! Links are symmetric: when either end terminates the other end receives an
//! exit signal. Watches are directed and token-identified: the watcher
//! receives one exit message per token. Every edge fires at most once.
//!
//! All edges and the set of live actors sit behind one mutex. Termination
//! removes the actor from the live set and takes its edges under that lock,
//! so an edge created concurrently either exists before the snapshot or sees
//! the actor as already gone and gets an immediate `noproc` notification.
//! Notifications are delivered after the lock is released.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kestrel_core::{ActorError, ActorId, Exit, ExitReason, WatchToken};
use log::{debug, trace};
use parking_lot::Mutex;

use super::actor_ref::ActorCell;

#[derive(Default)]
struct Graph {
    live: HashMap<ActorId, Arc<ActorCell>>,
    links: HashMap<ActorId, HashSet<ActorId>>,
    // watched -> (watcher, token)
    watchers: HashMap<ActorId, Vec<(ActorId, WatchToken)>>,
    // watcher -> (watched, token)
    watching: HashMap<ActorId, Vec<(ActorId, WatchToken)>>,
}

impl Graph {
    fn add_link(&mut self, a: ActorId, b: ActorId) {
        self.links.entry(a).or_default().insert(b);
        self.links.entry(b).or_default().insert(a);
    }

    fn remove_link(&mut self, a: ActorId, b: ActorId) {
        for (from, to) in [(a, b), (b, a)] {
            if let Some(peers) = self.links.get_mut(&from) {
                peers.remove(&to);
                if peers.is_empty() {
                    self.links.remove(&from);
                }
            }
        }
    }
}

fn remove_edge(
    index: &mut HashMap<ActorId, Vec<(ActorId, WatchToken)>>,
    key: ActorId,
    other: ActorId,
    token: WatchToken,
) -> bool {
    let Some(edges) = index.get_mut(&key) else {
        return false;
    };
    let before = edges.len();
    edges.retain(|&(id, t)| !(id == other && t == token));
    let removed = edges.len() != before;
    if edges.is_empty() {
        index.remove(&key);
    }
    removed
}

type Deliveries = Vec<(Arc<ActorCell>, Exit)>;

fn deliver(deliveries: Deliveries) {
    for (cell, exit) in deliveries {
        trace!("Delivering {} to {}", exit, cell.id());
        cell.sink().deliver_exit(exit);
    }
}

/// The system-wide link/watch graph.
#[derive(Default)]
pub(crate) struct LinkGraph {
    inner: Mutex<Graph>,
}

impl LinkGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a newly spawned actor, optionally linked to `link_to`, before it
    /// starts running.
    pub(crate) fn register(
        &self,
        cell: Arc<ActorCell>,
        link_to: Option<ActorId>,
    ) -> Result<(), ActorError> {
        let mut graph = self.inner.lock();
        let id = cell.id();
        if let Some(parent) = link_to {
            if !graph.live.contains_key(&parent) {
                return Err(ActorError::SpawnFailed(format!(
                    "link target {} is not alive",
                    parent
                )));
            }
            graph.add_link(id, parent);
        }
        graph.live.insert(id, cell);
        Ok(())
    }

    pub(crate) fn link(&self, a: ActorId, b: ActorId) {
        if a == b {
            return;
        }
        let mut deliveries = Deliveries::new();
        {
            let mut graph = self.inner.lock();
            let cell_a = graph.live.get(&a).cloned();
            let cell_b = graph.live.get(&b).cloned();
            match (cell_a, cell_b) {
                (Some(_), Some(_)) => graph.add_link(a, b),
                (Some(cell), None) => deliveries.push((cell, Exit::link(b, ExitReason::NoProc))),
                (None, Some(cell)) => deliveries.push((cell, Exit::link(a, ExitReason::NoProc))),
                (None, None) => {}
            }
        }
        deliver(deliveries);
    }

    pub(crate) fn unlink(&self, a: ActorId, b: ActorId) {
        self.inner.lock().remove_link(a, b);
    }

    /// Unlink `peer` from `owner` and report whether `peer` is still live.
    ///
    /// A `false` answer means `peer` has already taken its termination
    /// snapshot, which may still be delivering a link signal to `owner`.
    pub(crate) fn detach(&self, owner: ActorId, peer: ActorId) -> bool {
        let mut graph = self.inner.lock();
        graph.remove_link(owner, peer);
        graph.live.contains_key(&peer)
    }

    pub(crate) fn watch(&self, watcher: ActorId, watched: ActorId) -> WatchToken {
        let token = WatchToken::new();
        let mut deliveries = Deliveries::new();
        {
            let mut graph = self.inner.lock();
            if graph.live.contains_key(&watched) {
                graph.watchers.entry(watched).or_default().push((watcher, token));
                graph.watching.entry(watcher).or_default().push((watched, token));
            } else if let Some(cell) = graph.live.get(&watcher) {
                deliveries.push((cell.clone(), Exit::watch(token, watched, ExitReason::NoProc)));
            }
        }
        deliver(deliveries);
        token
    }

    pub(crate) fn unwatch(&self, watcher: ActorId, watched: ActorId, token: WatchToken) -> bool {
        let mut graph = self.inner.lock();
        let removed = remove_edge(&mut graph.watchers, watched, watcher, token);
        remove_edge(&mut graph.watching, watcher, watched, token);
        removed
    }

    /// Remove `id` and every edge touching it, then notify peers and watchers.
    pub(crate) fn terminate(&self, id: ActorId, reason: &ExitReason) {
        let mut deliveries = Deliveries::new();
        {
            let mut graph = self.inner.lock();
            graph.live.remove(&id);

            let peers = graph.links.remove(&id).unwrap_or_default();
            for peer in peers {
                if let Some(back) = graph.links.get_mut(&peer) {
                    back.remove(&id);
                    if back.is_empty() {
                        graph.links.remove(&peer);
                    }
                }
                if let Some(cell) = graph.live.get(&peer) {
                    deliveries.push((cell.clone(), Exit::link(id, reason.clone())));
                }
            }

            let watchers = graph.watchers.remove(&id).unwrap_or_default();
            for (watcher, token) in watchers {
                remove_edge(&mut graph.watching, watcher, id, token);
                if let Some(cell) = graph.live.get(&watcher) {
                    deliveries.push((cell.clone(), Exit::watch(token, id, reason.clone())));
                }
            }

            let watching = graph.watching.remove(&id).unwrap_or_default();
            for (watched, token) in watching {
                remove_edge(&mut graph.watchers, watched, id, token);
            }
        }

        if !deliveries.is_empty() {
            debug!(
                "Actor {} terminated ({}), notifying {} peers",
                id,
                reason,
                deliveries.len()
            );
        }
        deliver(deliveries);
    }

    pub(crate) fn is_alive(&self, id: ActorId) -> bool {
        self.inner.lock().live.contains_key(&id)
    }

    pub(crate) fn lookup(&self, id: ActorId) -> Option<Arc<ActorCell>> {
        self.inner.lock().live.get(&id).cloned()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.inner.lock().live.len()
    }

    pub(crate) fn links_of(&self, id: ActorId) -> Vec<ActorId> {
        self.inner
            .lock()
            .links
            .get(&id)
            .map(|peers| peers.iter().copied().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn watch_count(&self, watched: ActorId) -> usize {
        self.inner
            .lock()
            .watchers
            .get(&watched)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::mailbox::{Mailbox, Signal};
    use kestrel_core::MailboxConfig;
    use std::time::Instant;

    struct Node {
        id: ActorId,
        mailbox: Arc<Mailbox<()>>,
        cell: Arc<ActorCell>,
    }

    fn node(trapping: bool) -> Node {
        let id = ActorId::new();
        let mailbox = Arc::new(Mailbox::new(id, MailboxConfig::unbounded()));
        mailbox.set_trap_exits(trapping);
        let cell = Arc::new(ActorCell::new(id, None, mailbox.clone()));
        Node { id, mailbox, cell }
    }

    fn exits(node: &Node) -> Vec<Exit> {
        let mut out = Vec::new();
        let mut any = |_: &Signal<()>| Some(());
        while let Ok(Some((signal, ()))) = node.mailbox.select(Some(Instant::now()), &mut any) {
            if let Some(exit) = signal.into_exit() {
                out.push(exit);
            }
        }
        out
    }

    #[test]
    fn test_link_is_symmetric_and_fires_once() {
        let graph = LinkGraph::new();
        let a = node(true);
        let b = node(true);
        graph.register(a.cell.clone(), None).unwrap();
        graph.register(b.cell.clone(), None).unwrap();

        graph.link(a.id, b.id);
        graph.link(b.id, a.id);
        assert_eq!(graph.links_of(a.id), vec![b.id]);
        assert_eq!(graph.links_of(b.id), vec![a.id]);

        graph.terminate(a.id, &ExitReason::Shutdown);
        graph.terminate(a.id, &ExitReason::Shutdown);

        let received = exits(&b);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].from, a.id);
        assert!(received[0].token.is_none());
        assert!(graph.links_of(b.id).is_empty());
    }

    #[test]
    fn test_unlink_from_either_side() {
        let graph = LinkGraph::new();
        let a = node(true);
        let b = node(true);
        graph.register(a.cell.clone(), None).unwrap();
        graph.register(b.cell.clone(), Some(a.id)).unwrap();

        graph.unlink(b.id, a.id);
        graph.terminate(a.id, &ExitReason::Normal);
        assert!(exits(&b).is_empty());
    }

    #[test]
    fn test_detach_reports_terminated_peer() {
        let graph = LinkGraph::new();
        let owner = node(true);
        let peer = node(true);
        graph.register(owner.cell.clone(), None).unwrap();
        graph.register(peer.cell.clone(), Some(owner.id)).unwrap();

        assert!(graph.detach(owner.id, peer.id));
        assert!(graph.links_of(owner.id).is_empty());

        let late = node(true);
        graph.register(late.cell.clone(), Some(owner.id)).unwrap();
        graph.terminate(late.id, &ExitReason::Killed);
        assert!(!graph.detach(owner.id, late.id));
    }

    #[test]
    fn test_watch_tokens_fire_individually() {
        let graph = LinkGraph::new();
        let watcher = node(false);
        let watched = node(false);
        graph.register(watcher.cell.clone(), None).unwrap();
        graph.register(watched.cell.clone(), None).unwrap();

        let t1 = graph.watch(watcher.id, watched.id);
        let t2 = graph.watch(watcher.id, watched.id);
        let t3 = graph.watch(watcher.id, watched.id);
        assert_ne!(t1, t2);
        assert!(graph.unwatch(watcher.id, watched.id, t3));
        assert!(!graph.unwatch(watcher.id, watched.id, t3));
        assert_eq!(graph.watch_count(watched.id), 2);

        graph.terminate(watched.id, &ExitReason::Normal);
        let tokens: Vec<_> = exits(&watcher).into_iter().filter_map(|e| e.token).collect();
        assert_eq!(tokens, vec![t1, t2]);
        assert_eq!(graph.watch_count(watched.id), 0);
    }

    #[test]
    fn test_edges_to_dead_actor_report_noproc() {
        let graph = LinkGraph::new();
        let a = node(true);
        graph.register(a.cell.clone(), None).unwrap();
        let gone = ActorId::new();

        graph.link(a.id, gone);
        let token = graph.watch(a.id, gone);

        let received = exits(&a);
        assert_eq!(received.len(), 2);
        assert!(matches!(received[0].reason, ExitReason::NoProc));
        assert_eq!(received[1].token, Some(token));
        assert!(graph.links_of(a.id).is_empty());
    }

    #[test]
    fn test_register_linked_to_dead_parent_fails() {
        let graph = LinkGraph::new();
        let child = node(false);
        assert!(graph.register(child.cell.clone(), Some(ActorId::new())).is_err());
        assert!(!graph.is_alive(child.id));
    }
}
