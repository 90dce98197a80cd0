//! Menu catalog and the per-session menu state machine.
//!
//! A menu is a builder registered under a string key. Loading a menu runs
//! the builder against the requesting session, stores the resulting choices
//! on the session and, unless the load is silent, renders them. Dispatch
//! parses a raw key as a 0-based index into the choices of the most recent
//! load and invokes that choice's action.
//!
//! Actions never reach into the catalog directly. A transition is requested
//! through [`MenuContext::load`] and applied right after the action returns,
//! within the same dispatch.

use log::{debug, warn};
use shared::Outbound;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ChoiceError, MenuError};
use crate::registry::{Session, SessionId};
use crate::world::{OrganismId, World};

pub const INVALID_CHOICE: &str = "Invalid choice.\n";

/// Something a choice does when picked.
pub trait Action: Send + Sync {
    fn invoke(&self, ctx: &mut MenuContext<'_>);
}

struct FnAction<F>(F);

impl<F> Action for FnAction<F>
where
    F: Fn(&mut MenuContext<'_>) + Send + Sync,
{
    fn invoke(&self, ctx: &mut MenuContext<'_>) {
        (self.0)(ctx)
    }
}

/// Produces the choices of a menu for one session.
///
/// Builders must not block. They may read the world to decide what to
/// offer and may print echo text, which is only shown on non-silent loads.
pub trait MenuBuilder: Send + Sync {
    fn build(&self, choices: &mut Vec<Choice>, ctx: &mut MenuContext<'_>);
}

struct FnBuilder<F>(F);

impl<F> MenuBuilder for FnBuilder<F>
where
    F: Fn(&mut Vec<Choice>, &mut MenuContext<'_>) + Send + Sync,
{
    fn build(&self, choices: &mut Vec<Choice>, ctx: &mut MenuContext<'_>) {
        (self.0)(choices, ctx)
    }
}

#[derive(Clone)]
pub struct Choice {
    pub label: String,
    action: Arc<dyn Action>,
}

impl Choice {
    pub fn new<F>(label: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut MenuContext<'_>) + Send + Sync + 'static,
    {
        Self::with_action(label, Arc::new(FnAction(action)))
    }

    pub fn with_action(label: impl Into<String>, action: Arc<dyn Action>) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

impl fmt::Debug for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Choice").field("label", &self.label).finish()
    }
}

/// What a session last loaded.
#[derive(Debug, Clone)]
pub struct MenuState {
    pub key: String,
    pub choices: Vec<Choice>,
}

/// Collected output of one load or dispatch.
#[derive(Debug, Default)]
pub struct OutputSink {
    direct: Vec<Outbound>,
    broadcast: Vec<Outbound>,
}

impl OutputSink {
    pub fn push(&mut self, message: Outbound) {
        self.direct.push(message);
    }

    pub fn print(&mut self, content: impl Into<String>) {
        self.push(Outbound::print(content));
    }

    pub fn broadcast(&mut self, content: impl Into<String>) {
        self.broadcast.push(Outbound::print(content));
    }

    pub fn direct(&self) -> &[Outbound] {
        &self.direct
    }

    pub fn broadcasts(&self) -> &[Outbound] {
        &self.broadcast
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.broadcast.is_empty()
    }

    fn append(&mut self, other: OutputSink) {
        self.direct.extend(other.direct);
        self.broadcast.extend(other.broadcast);
    }

    pub fn into_parts(self) -> (Vec<Outbound>, Vec<Outbound>) {
        (self.direct, self.broadcast)
    }
}

/// Everything a builder or action can see and touch.
pub struct MenuContext<'a> {
    session: &'a mut Session,
    world: &'a mut World,
    roster: &'a [String],
    out: &'a mut OutputSink,
    transition: Option<String>,
}

impl<'a> MenuContext<'a> {
    pub fn new(
        session: &'a mut Session,
        world: &'a mut World,
        roster: &'a [String],
        out: &'a mut OutputSink,
    ) -> Self {
        Self {
            session,
            world,
            roster,
            out,
            transition: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id
    }

    pub fn name(&self) -> &str {
        &self.session.name
    }

    pub fn focus(&self) -> Option<OrganismId> {
        self.session.focus
    }

    pub fn set_focus(&mut self, focus: Option<OrganismId>) {
        self.session.focus = focus;
    }

    pub fn world(&self) -> &World {
        &*self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut *self.world
    }

    /// Names of every live session, this one included.
    pub fn roster(&self) -> &[String] {
        self.roster
    }

    pub fn print(&mut self, content: impl Into<String>) {
        self.out.print(content);
    }

    /// Queues a print for every live session, this one included.
    pub fn broadcast(&mut self, content: impl Into<String>) {
        self.out.broadcast(content);
    }

    /// Requests a non-silent load of `key` once the current action returns.
    /// The last request wins.
    pub fn load(&mut self, key: &str) {
        self.transition = Some(key.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The choice ran without changing menus.
    Invoked { index: usize },
    /// The choice ran and then loaded `key`.
    Transitioned { index: usize, key: String },
    /// The input did not select a choice; nothing changed.
    Rejected(ChoiceError),
}

/// Named table of menu builders.
#[derive(Default)]
pub struct MenuCatalog {
    menus: HashMap<String, Arc<dyn MenuBuilder>>,
}

impl MenuCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `builder` under `key`, replacing any earlier definition.
    pub fn define<F>(&mut self, key: &str, builder: F)
    where
        F: Fn(&mut Vec<Choice>, &mut MenuContext<'_>) + Send + Sync + 'static,
    {
        self.define_builder(key, Arc::new(FnBuilder(builder)));
    }

    pub fn define_builder(&mut self, key: &str, builder: Arc<dyn MenuBuilder>) {
        if self.menus.insert(key.to_string(), builder).is_some() {
            debug!("Menu `{}` redefined", key);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.menus.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.menus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.menus.is_empty()
    }

    fn get(&self, key: &str) -> Result<Arc<dyn MenuBuilder>, MenuError> {
        self.menus
            .get(key)
            .cloned()
            .ok_or_else(|| MenuError::UnknownMenu(key.to_string()))
    }

    /// Fails on the first key in `keys` that is not defined.
    pub fn validate(&self, keys: &[&str]) -> Result<(), MenuError> {
        match keys.iter().find(|key| !self.contains(key)) {
            Some(key) => Err(MenuError::UnknownMenu(key.to_string())),
            None => Ok(()),
        }
    }

    /// Builds `key` for `session` and makes it the session's current menu.
    ///
    /// A non-silent load writes `clearChoices`, then whatever the builder
    /// printed, then one `choice` per entry in list order. A silent load
    /// writes nothing to the session; broadcasts requested by the builder
    /// are kept either way.
    pub fn load(
        &self,
        session: &mut Session,
        key: &str,
        silent: bool,
        world: &mut World,
        roster: &[String],
        out: &mut OutputSink,
    ) -> Result<(), MenuError> {
        let builder = self.get(key)?;
        let mut choices = Vec::new();
        let mut echo = OutputSink::default();

        let stray = {
            let mut ctx = MenuContext::new(session, world, roster, &mut echo);
            builder.build(&mut choices, &mut ctx);
            ctx.transition.take()
        };
        if let Some(target) = stray {
            warn!("Menu `{}` requested a load of `{}` while building; ignored", key, target);
        }

        if silent {
            out.broadcast.extend(echo.broadcast);
        } else {
            out.push(Outbound::ClearChoices);
            out.append(echo);
            for (index, choice) in choices.iter().enumerate() {
                out.push(Outbound::choice(index, choice.label.clone()));
            }
        }

        session.menu = Some(MenuState {
            key: key.to_string(),
            choices,
        });
        Ok(())
    }

    /// Runs the choice selected by `raw` against the session's current menu.
    ///
    /// Unparseable or out-of-range input prints [`INVALID_CHOICE`] and
    /// leaves the session untouched. There is no automatic re-render; only
    /// an explicit [`MenuContext::load`] from the action changes menus.
    pub fn dispatch(
        &self,
        session: &mut Session,
        raw: &str,
        world: &mut World,
        roster: &[String],
        out: &mut OutputSink,
    ) -> Result<DispatchOutcome, MenuError> {
        let (index, action) = match select(session, raw) {
            Ok(selected) => selected,
            Err(e) => {
                debug!("Session {} sent unusable input: {}", session.id, e);
                out.print(INVALID_CHOICE);
                return Ok(DispatchOutcome::Rejected(e));
            }
        };

        let transition = {
            let mut ctx = MenuContext::new(session, world, roster, out);
            action.invoke(&mut ctx);
            ctx.transition.take()
        };

        match transition {
            Some(key) => {
                self.load(session, &key, false, world, roster, out)?;
                Ok(DispatchOutcome::Transitioned { index, key })
            }
            None => Ok(DispatchOutcome::Invoked { index }),
        }
    }
}

fn select(session: &Session, raw: &str) -> Result<(usize, Arc<dyn Action>), ChoiceError> {
    let menu = session.menu.as_ref().ok_or(ChoiceError::NoMenu)?;
    let index: usize = raw
        .trim()
        .parse()
        .map_err(|_| ChoiceError::NotANumber(raw.to_string()))?;
    let choice = menu.choices.get(index).ok_or(ChoiceError::OutOfRange {
        index,
        len: menu.choices.len(),
    })?;
    Ok((index, Arc::clone(&choice.action)))
}
