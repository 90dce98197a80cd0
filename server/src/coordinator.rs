//! Session and event coordination.
//!
//! The coordinator owns every piece of mutable server state and is driven
//! from a single loop: inbound messages call into it as they arrive, and
//! the tick calls [`Coordinator::tick`]. Nothing here blocks or awaits, so
//! all mutations happen strictly one after another.

use log::{debug, error, info, warn};
use shared::{Inbound, Outbound};

use crate::error::{ChoiceError, IdentityError, MenuError};
use crate::identity::IdentityAllocator;
use crate::menu::{DispatchOutcome, MenuCatalog, OutputSink};
use crate::menus;
use crate::queue::InputQueue;
use crate::registry::{ConnectionRegistry, SessionHandle, SessionId};
use crate::scheduler::TickScheduler;
use crate::world::{AdvanceReport, World};

/// Outcome of one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub dispatched: usize,
    pub rejected: usize,
    pub orphaned: usize,
    pub economy: Option<AdvanceReport>,
}

pub struct Coordinator {
    registry: ConnectionRegistry,
    catalog: MenuCatalog,
    queue: InputQueue,
    scheduler: TickScheduler,
    world: World,
    identity: IdentityAllocator,
    root_menu: String,
}

impl Coordinator {
    /// Builds a coordinator, failing if the catalog cannot serve `root_menu`.
    pub fn new(
        catalog: MenuCatalog,
        root_menu: &str,
        world: World,
        scheduler: TickScheduler,
        identity: IdentityAllocator,
        max_sessions: usize,
    ) -> Result<Self, MenuError> {
        catalog.validate(&[root_menu])?;
        Ok(Self {
            registry: ConnectionRegistry::new(max_sessions),
            catalog,
            queue: InputQueue::new(),
            scheduler,
            world,
            identity,
            root_menu: root_menu.to_string(),
        })
    }

    /// Coordinator serving the default menus.
    pub fn with_default_menus(
        world: World,
        scheduler: TickScheduler,
        identity: IdentityAllocator,
        max_sessions: usize,
    ) -> Result<Self, MenuError> {
        let catalog = menus::default_catalog();
        catalog.validate(menus::MENU_KEYS)?;
        Self::new(catalog, menus::MAIN, world, scheduler, identity, max_sessions)
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    pub fn pending_inputs(&self) -> usize {
        self.queue.len()
    }

    /// Admits a new connection
    ///
    /// Returns `Ok(None)` when the server is full, in which case the refusal
    /// has already been written to `handle`, or when the connection is gone
    /// before it could be greeted. On success the session is greeted, its
    /// root menu is loaded silently and everyone else hears about it.
    pub fn connect(&mut self, handle: SessionHandle) -> Result<Option<SessionId>, IdentityError> {
        if self.registry.is_full() {
            warn!("Refusing connection: {} sessions live", self.registry.len());
            let _ = handle.send(Outbound::print("The tank is crowded; try again later.\n"));
            return Ok(None);
        }

        let name = {
            let registry = &self.registry;
            self.identity.allocate(|name| registry.is_name_taken(name))?
        };
        let Some(id) = self.registry.register(name.clone(), handle) else {
            return Ok(None);
        };

        let greeting = Outbound::print(format!("Welcome to the tank, {}.\n", name));
        if !self.registry.send_to(id, greeting) {
            // Never announced, so it leaves without a departure notice
            warn!("Session {} ({}) dropped before its greeting", id, name);
            self.registry.unregister(id);
            return Ok(None);
        }
        let root = self.root_menu.clone();
        if let Err(e) = self.load(id, &root, true) {
            error!("Initial load for session {} failed: {}", id, e);
        }

        let notice = Outbound::print(format!("{} has entered the tank.\n", name));
        let dead = self.registry.broadcast_except(Some(id), |_| Some(notice.clone()));
        self.prune(dead);

        Ok(Some(id))
    }

    /// Removes a session. Its queued inputs are left to be skipped.
    pub fn disconnect(&mut self, id: SessionId) -> bool {
        if !self.registry.contains(id) {
            return false;
        }
        self.prune(vec![id]);
        true
    }

    pub fn handle_inbound(&mut self, id: SessionId, message: Inbound) {
        match message {
            Inbound::RequestState => {
                if let Err(e) = self.request_state(id) {
                    error!("State request from session {} failed: {}", id, e);
                }
            }
            Inbound::KeyPress { key } => self.enqueue(id, key),
        }
    }

    /// Re-renders the session's current menu, or the root menu if it has
    /// none yet.
    pub fn request_state(&mut self, id: SessionId) -> Result<(), MenuError> {
        let Some(session) = self.registry.get(id) else {
            return Ok(());
        };
        let key = session
            .menu_key()
            .unwrap_or(self.root_menu.as_str())
            .to_string();
        self.load(id, &key, false)
    }

    pub fn enqueue(&mut self, id: SessionId, key: String) {
        self.queue.push(id, key);
    }

    /// Runs one tick
    ///
    /// Drains the input queue front to back until it is empty, dispatching
    /// each event against its session. Events for sessions that have since
    /// disconnected are dropped. Then, if this tick is due, the world
    /// economy advances.
    pub fn tick(&mut self) -> TickReport {
        let plan = self.scheduler.advance();
        let mut report = TickReport {
            tick: plan.tick,
            ..TickReport::default()
        };

        while let Some(event) = self.queue.pop() {
            if !self.registry.contains(event.session) {
                report.orphaned += 1;
                continue;
            }
            match self.dispatch(event.session, &event.key) {
                Ok(DispatchOutcome::Rejected(_)) => report.rejected += 1,
                Ok(_) => report.dispatched += 1,
                Err(e) => error!("Dispatch for session {} failed: {}", event.session, e),
            }
        }

        if plan.advance_economy {
            let advance = self.world.advance();
            debug!(
                "Tick {}: economy advanced, spawned {}, transferred {}, total {}",
                plan.tick,
                advance.food_spawned,
                advance.mass_transferred,
                self.world.total_mass()
            );
            report.economy = Some(advance);
        }

        report
    }

    fn load(&mut self, id: SessionId, key: &str, silent: bool) -> Result<(), MenuError> {
        let roster = self.registry.names();
        let Some(session) = self.registry.get_mut(id) else {
            return Ok(());
        };

        let mut out = OutputSink::default();
        let result = self
            .catalog
            .load(session, key, silent, &mut self.world, &roster, &mut out);
        self.deliver(id, out);
        result
    }

    fn dispatch(&mut self, id: SessionId, raw: &str) -> Result<DispatchOutcome, MenuError> {
        let roster = self.registry.names();
        let Some(session) = self.registry.get_mut(id) else {
            return Ok(DispatchOutcome::Rejected(ChoiceError::NoMenu));
        };

        let mut out = OutputSink::default();
        let result = self
            .catalog
            .dispatch(session, raw, &mut self.world, &roster, &mut out);
        self.deliver(id, out);
        result
    }

    /// Sends direct output to `id`, then broadcasts. Any session whose
    /// connection turns out to be gone is dropped afterwards.
    fn deliver(&mut self, id: SessionId, out: OutputSink) {
        let (direct, broadcast) = out.into_parts();
        let mut dead = Vec::new();

        for message in direct {
            if !self.registry.send_to(id, message) {
                dead.push(id);
                break;
            }
        }
        for message in broadcast {
            dead.extend(self.registry.broadcast(|_| Some(message.clone())));
        }

        dead.sort_unstable();
        dead.dedup();
        self.prune(dead);
    }

    /// Unregisters each session and tells the others it left. Departures
    /// that fail to deliver are pruned in turn.
    fn prune(&mut self, mut dead: Vec<SessionId>) {
        while let Some(id) = dead.pop() {
            let Some(session) = self.registry.unregister(id) else {
                continue;
            };
            info!("Session {} ({}) left", id, session.name);
            let notice = Outbound::print(format!("{} has left the tank.\n", session.name));
            dead.extend(self.registry.broadcast(|_| Some(notice.clone())));
        }
    }
}
