//! Runtime configuration assembled by the binary from its command line.

use shared::{DEFAULT_PORT, DEFAULT_TICK_MS, ECONOMY_TICK_INTERVAL};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::identity::IdentityAllocator;
use crate::scheduler::TickScheduler;
use crate::world::WorldConfig;

pub const DEFAULT_MAX_CLIENTS: usize = 64;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// Port 0 lets the OS choose; see [`crate::network::Server::local_addr`].
    pub port: u16,
    pub tick: Duration,
    pub economy_every: u64,
    pub world: WorldConfig,
    pub max_clients: usize,
    pub state_file: Option<PathBuf>,
    /// Seed for session names. Unseeded servers draw from OS entropy.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            tick: Duration::from_millis(DEFAULT_TICK_MS),
            economy_every: ECONOMY_TICK_INTERVAL,
            world: WorldConfig::default(),
            max_clients: DEFAULT_MAX_CLIENTS,
            state_file: None,
            seed: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler()?;
        self.world.validate()
    }

    pub fn scheduler(&self) -> Result<TickScheduler, ConfigError> {
        TickScheduler::new(self.tick, self.economy_every)
    }

    pub fn identity(&self) -> IdentityAllocator {
        match self.seed {
            Some(seed) => IdentityAllocator::seeded(seed),
            None => IdentityAllocator::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.tick, Duration::from_millis(250));
    }

    #[test]
    fn test_zero_tick_rejected() {
        let config = ServerConfig {
            tick: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTickPeriod)));
    }

    #[test]
    fn test_zero_economy_interval_rejected() {
        let config = ServerConfig {
            economy_every: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroEconomyInterval)));
    }

    #[test]
    fn test_non_positive_ceiling_rejected() {
        let mut config = ServerConfig::default();
        config.world.tank_ceiling = Decimal::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCeiling(_))));
    }

    #[test]
    fn test_seeded_identity_is_reproducible() {
        let config = ServerConfig {
            seed: Some(11),
            ..ServerConfig::default()
        };
        let a = config.identity().allocate(|_| false).unwrap();
        let b = config.identity().allocate(|_| false).unwrap();
        assert_eq!(a, b);
    }
}
