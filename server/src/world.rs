//! Shared tank economy: organisms and food items under a total mass ceiling.
//!
//! All mutation happens on the coordinator loop, so the world is a plain
//! owned value with no interior locking. Mass only enters the tank through
//! [`World::spawn_food`] and [`World::create_organism`], both of which refuse
//! to push the tank past its ceiling. Every other rule moves mass between
//! entities without creating or destroying it.
//!
//! Quantities are [`Decimal`], so clamping to the room left under the
//! ceiling lands exactly on it and transfers add up to the last digit.

use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ConfigError, StoreError, WorldError};

pub const MAX_SATURATION: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrganismId(pub u32);

impl fmt::Display for OrganismId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FoodId(pub u32);

impl fmt::Display for FoodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "food #{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activity {
    #[default]
    None,
    Searching,
    Dancing,
    Eating,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Activity::None => "none",
            Activity::Searching => "searching",
            Activity::Dancing => "dancing",
            Activity::Eating => "eating",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organism {
    pub id: OrganismId,
    pub mass: Decimal,
    /// Stored value; may be out of range if the snapshot was edited outside
    /// the server. Read it through [`Organism::saturation`].
    saturation: Decimal,
    pub activity: Activity,
}

impl Organism {
    pub fn new(id: OrganismId, mass: Decimal, saturation: Decimal, activity: Activity) -> Self {
        Self {
            id,
            mass,
            saturation,
            activity,
        }
    }

    /// Saturation clamped to `[0, 100]`.
    pub fn saturation(&self) -> Decimal {
        clamp_saturation(self.saturation)
    }

    pub fn stored_saturation(&self) -> Decimal {
        self.saturation
    }

    fn set_saturation(&mut self, value: Decimal) {
        self.saturation = clamp_saturation(value);
    }
}

fn clamp_saturation(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, MAX_SATURATION)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub id: FoodId,
    pub mass: Decimal,
    /// Organism that has claimed this item. Resolved by lookup; the organism
    /// may not exist any more.
    pub predator: Option<OrganismId>,
}

/// Tunables for the economy. Balance is not a goal; these only need to keep
/// the tank bounded and moving.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    pub tank_ceiling: Decimal,
    pub food_per_spawn: Decimal,
    /// Spawns below this are skipped, and food eaten below it is finished.
    pub min_spawn_mass: Decimal,
    pub hunger_per_advance: Decimal,
    pub hunger_threshold: Decimal,
    pub bite: Decimal,
    pub saturation_per_mass: Decimal,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tank_ceiling: Decimal::ONE_HUNDRED,
            food_per_spawn: Decimal::ONE,
            min_spawn_mass: Decimal::new(1, 2),
            hunger_per_advance: Decimal::from(2),
            hunger_threshold: Decimal::from(50),
            bite: Decimal::new(25, 2),
            saturation_per_mass: Decimal::from(20),
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tank_ceiling <= Decimal::ZERO {
            return Err(ConfigError::InvalidCeiling(self.tank_ceiling));
        }
        if self.food_per_spawn < Decimal::ZERO {
            return Err(ConfigError::InvalidFoodPerSpawn(self.food_per_spawn));
        }
        Ok(())
    }
}

/// Persisted form of the world. Only the two record types are stored; ids
/// are recomputed on restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub organisms: Vec<Organism>,
    pub food: Vec<Food>,
}

/// Outcome of a [`World::spawn_food`] call. `food` is `None` when nothing
/// was written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spawn {
    pub food: Option<FoodId>,
    pub mass: Decimal,
}

impl Spawn {
    fn nothing() -> Self {
        Spawn {
            food: None,
            mass: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceReport {
    pub food_spawned: Decimal,
    pub mass_transferred: Decimal,
    pub claims: usize,
    pub food_consumed: usize,
}

#[derive(Debug, Clone)]
pub struct World {
    config: WorldConfig,
    organisms: BTreeMap<OrganismId, Organism>,
    food: BTreeMap<FoodId, Food>,
    next_organism_id: u32,
    next_food_id: u32,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config,
            organisms: BTreeMap::new(),
            food: BTreeMap::new(),
            next_organism_id: 1,
            next_food_id: 1,
        }
    }

    /// Rebuilds a world from persisted records. An empty snapshot yields a
    /// world holding only the bootstrap organism.
    ///
    /// A record whose id leaves no room for a successor is rejected, since
    /// the next allocation would collide with an existing id.
    pub fn restore(config: WorldConfig, snapshot: WorldSnapshot) -> Result<Self, StoreError> {
        let mut world = Self::new(config);

        for organism in snapshot.organisms {
            let next = organism.id.0.checked_add(1).ok_or_else(|| {
                StoreError::InvalidSnapshot(format!("organism id {} is out of range", organism.id))
            })?;
            world.next_organism_id = world.next_organism_id.max(next);
            world.organisms.insert(organism.id, organism);
        }
        for food in snapshot.food {
            let next = food.id.0.checked_add(1).ok_or_else(|| {
                StoreError::InvalidSnapshot(format!("{} is out of range", food.id))
            })?;
            world.next_food_id = world.next_food_id.max(next);
            world.food.insert(food.id, food);
        }

        if world.organisms.is_empty() {
            world
                .insert_bootstrap_organism()
                .map_err(|e| StoreError::InvalidSnapshot(e.to_string()))?;
        }
        Ok(world)
    }

    fn insert_bootstrap_organism(&mut self) -> Result<(), WorldError> {
        let id = self.allocate_organism_id()?;
        self.organisms.insert(
            id,
            Organism::new(id, Decimal::ONE, Decimal::from(50), Activity::None),
        );
        info!("Inserted bootstrap organism {}", id);
        Ok(())
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            organisms: self.organisms.values().cloned().collect(),
            food: self.food.values().cloned().collect(),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn organisms(&self) -> impl Iterator<Item = &Organism> {
        self.organisms.values()
    }

    pub fn food(&self) -> impl Iterator<Item = &Food> {
        self.food.values()
    }

    /// Food items paired with their predator, if it still exists.
    pub fn food_with_predators(&self) -> Vec<(&Food, Option<&Organism>)> {
        self.food
            .values()
            .map(|food| {
                let predator = food.predator.and_then(|id| self.organisms.get(&id));
                (food, predator)
            })
            .collect()
    }

    pub fn food_claimed_by(&self, id: OrganismId) -> Vec<&Food> {
        self.food
            .values()
            .filter(|food| food.predator == Some(id))
            .collect()
    }

    pub fn organism(&self, id: OrganismId) -> Result<&Organism, WorldError> {
        self.organisms
            .get(&id)
            .ok_or(WorldError::OrganismNotFound(id))
    }

    pub fn food_item(&self, id: FoodId) -> Result<&Food, WorldError> {
        self.food.get(&id).ok_or(WorldError::FoodNotFound(id))
    }

    pub fn organism_count(&self) -> usize {
        self.organisms.len()
    }

    pub fn food_count(&self) -> usize {
        self.food.len()
    }

    pub fn total_organism_mass(&self) -> Decimal {
        self.organisms.values().map(|o| o.mass).sum()
    }

    pub fn total_food_mass(&self) -> Decimal {
        self.food.values().map(|f| f.mass).sum()
    }

    pub fn total_mass(&self) -> Decimal {
        self.total_organism_mass() + self.total_food_mass()
    }

    /// Room left under the ceiling, never negative.
    pub fn available_mass(&self) -> Decimal {
        (self.config.tank_ceiling - self.total_mass()).max(Decimal::ZERO)
    }

    pub fn create_organism(
        &mut self,
        mass: Decimal,
        saturation: Decimal,
        activity: Activity,
    ) -> Result<OrganismId, WorldError> {
        let mass = mass.max(Decimal::ZERO);
        let available = self.available_mass();
        if mass > available {
            return Err(WorldError::CapacityExceeded {
                requested: mass,
                available,
            });
        }

        let id = self.allocate_organism_id()?;
        self.organisms
            .insert(id, Organism::new(id, mass, saturation, activity));
        debug!("Created organism {} with mass {}", id, mass);
        Ok(id)
    }

    /// Halves the organism in place and adds a sibling holding the other
    /// half. Returns the sibling's id.
    pub fn split_organism(&mut self, id: OrganismId) -> Result<OrganismId, WorldError> {
        if !self.organisms.contains_key(&id) {
            return Err(WorldError::OrganismNotFound(id));
        }
        let sibling_id = self.allocate_organism_id()?;
        let Some(parent) = self.organisms.get_mut(&id) else {
            return Err(WorldError::OrganismNotFound(id));
        };

        let kept = parent.mass / Decimal::from(2);
        let given = parent.mass - kept;
        parent.mass = kept;
        let sibling = Organism::new(sibling_id, given, parent.saturation, parent.activity);

        self.organisms.insert(sibling_id, sibling);
        info!("Organism {} split off {}", id, sibling_id);
        Ok(sibling_id)
    }

    pub fn spawn_food(&mut self) -> Spawn {
        let amount = self.config.food_per_spawn.min(self.available_mass());
        if amount < self.config.min_spawn_mass {
            return Spawn::nothing();
        }

        let id = FoodId(self.next_food_id);
        let Some(next) = self.next_food_id.checked_add(1) else {
            warn!("Food ids exhausted; nothing spawned");
            return Spawn::nothing();
        };
        self.next_food_id = next;
        self.food.insert(
            id,
            Food {
                id,
                mass: amount,
                predator: None,
            },
        );
        debug!("Spawned {} with mass {}", id, amount);
        Spawn {
            food: Some(id),
            mass: amount,
        }
    }

    /// Periodic economy step: spawn, hunger, claiming and feeding.
    pub fn advance(&mut self) -> AdvanceReport {
        let mut report = AdvanceReport {
            food_spawned: self.spawn_food().mass,
            ..AdvanceReport::default()
        };

        let Self {
            config,
            organisms,
            food,
            ..
        } = self;

        for organism in organisms.values_mut() {
            let id = organism.id;
            organism.set_saturation(organism.saturation() - config.hunger_per_advance);

            match organism.activity {
                Activity::Dancing => organism.activity = Activity::None,
                Activity::None if organism.saturation() < config.hunger_threshold => {
                    organism.activity = Activity::Searching;
                }
                _ => {}
            }

            if organism.activity == Activity::Searching {
                let already_claimed = food.values().any(|f| f.predator == Some(id));
                if already_claimed {
                    organism.activity = Activity::Eating;
                } else if let Some(item) = food.values_mut().find(|f| f.predator.is_none()) {
                    item.predator = Some(id);
                    organism.activity = Activity::Eating;
                    report.claims += 1;
                }
            }

            if organism.activity != Activity::Eating {
                continue;
            }

            let Some(item) = food.values_mut().find(|f| f.predator == Some(id)) else {
                organism.activity = Activity::Dancing;
                continue;
            };

            let mut bite = config.bite.min(item.mass);
            item.mass -= bite;
            let finished = item.mass < config.min_spawn_mass;
            if finished {
                bite += item.mass;
                let item_id = item.id;
                food.remove(&item_id);
                report.food_consumed += 1;
            }

            organism.mass += bite;
            organism.set_saturation(organism.saturation() + bite * config.saturation_per_mass);
            report.mass_transferred += bite;

            if finished || organism.saturation() >= MAX_SATURATION {
                organism.activity = Activity::Dancing;
            }
        }

        report
    }

    fn allocate_organism_id(&mut self) -> Result<OrganismId, WorldError> {
        let id = self.next_organism_id;
        self.next_organism_id = id.checked_add(1).ok_or(WorldError::IdsExhausted)?;
        Ok(OrganismId(id))
    }
}
