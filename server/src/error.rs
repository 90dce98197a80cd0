//! Error taxonomy for the session coordinator.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::world::{FoodId, OrganismId};

/// A menu key was loaded that the catalog never defined. This is a
/// programming error and is surfaced at startup validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MenuError {
    #[error("unknown menu `{0}`")]
    UnknownMenu(String),
}

/// Rejected choice input. Recovered locally: the offending session gets a
/// plain text message and nothing else changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChoiceError {
    #[error("`{0}` is not a choice number")]
    NotANumber(String),
    #[error("choice {index} is out of range (0..{len})")]
    OutOfRange { index: usize, len: usize },
    #[error("no menu is loaded")]
    NoMenu,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("organism {0} not found")]
    OrganismNotFound(OrganismId),
    #[error("food {0} not found")]
    FoodNotFound(FoodId),
    #[error("adding {requested:.2} would exceed the tank ceiling ({available:.2} available)")]
    CapacityExceeded { requested: Decimal, available: Decimal },
    #[error("organism ids exhausted")]
    IdsExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("name namespace exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error("snapshot rejected: {0}")]
    InvalidSnapshot(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("tick period must be greater than zero")]
    ZeroTickPeriod,
    #[error("economy interval must be at least one tick")]
    ZeroEconomyInterval,
    #[error("tank ceiling must be positive, got {0}")]
    InvalidCeiling(Decimal),
    #[error("food per spawn must not be negative, got {0}")]
    InvalidFoodPerSpawn(Decimal),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Menu(#[from] MenuError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
}
