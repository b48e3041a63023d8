//! Name registry for actors.

use std::collections::HashMap;

use kestrel_core::{ActorId, RegistryError};
use log::debug;
use parking_lot::RwLock;

use super::actor_ref::AnyActorRef;

/// Maps names to live actors. Entries whose actor has terminated count as free.
#[derive(Default)]
pub(crate) struct Registry {
    names: RwLock<HashMap<String, AnyActorRef>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, name: &str, actor: AnyActorRef) -> Result<(), RegistryError> {
        let mut names = self.names.write();
        if let Some(existing) = names.get(name) {
            if existing.is_alive() && existing.id() != actor.id() {
                return Err(RegistryError::NameTaken(name.to_string()));
            }
        }
        debug!("Registered name '{}' for actor {}", name, actor.id());
        names.insert(name.to_string(), actor);
        Ok(())
    }

    pub(crate) fn unregister(&self, name: &str) -> Option<AnyActorRef> {
        self.names.write().remove(name)
    }

    /// Remove `name` only if it still points at `id`.
    pub(crate) fn unregister_actor(&self, name: &str, id: ActorId) {
        let mut names = self.names.write();
        if names.get(name).map(|a| a.id()) == Some(id) {
            names.remove(name);
        }
    }

    pub(crate) fn whereis(&self, name: &str) -> Option<AnyActorRef> {
        self.names
            .read()
            .get(name)
            .filter(|actor| actor.is_alive())
            .cloned()
    }

    pub(crate) fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .names
            .read()
            .iter()
            .filter(|(_, actor)| actor.is_alive())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::actor_ref::{ActorCell, ActorRef};
    use crate::actor::mailbox::Mailbox;
    use kestrel_core::{ExitReason, MailboxConfig};
    use std::sync::Arc;

    fn detached() -> ActorRef<()> {
        let id = ActorId::new();
        let mailbox = Arc::new(Mailbox::new(id, MailboxConfig::unbounded()));
        let cell = Arc::new(ActorCell::new(id, None, mailbox.clone()));
        ActorRef::from_parts(cell, mailbox)
    }

    #[test]
    fn test_name_taken_by_live_actor() {
        let registry = Registry::new();
        let first = detached();
        let second = detached();

        registry.register("svc", first.clone().into_any()).unwrap();
        // Re-registering the same actor is fine.
        registry.register("svc", first.clone().into_any()).unwrap();
        assert!(matches!(
            registry.register("svc", second.clone().into_any()),
            Err(RegistryError::NameTaken(_))
        ));

        first.cell().finish(ExitReason::Normal);
        assert!(registry.whereis("svc").is_none());
        registry.register("svc", second.clone().into_any()).unwrap();
        assert_eq!(registry.whereis("svc").map(|a| a.id()), Some(second.id()));
    }

    #[test]
    fn test_unregister_actor_only_removes_own_entry() {
        let registry = Registry::new();
        let a = detached();
        let b = detached();
        registry.register("x", a.clone().into_any()).unwrap();
        registry.unregister_actor("x", b.id());
        assert_eq!(registry.registered(), vec!["x".to_string()]);
        registry.unregister_actor("x", a.id());
        assert!(registry.registered().is_empty());
    }
}
