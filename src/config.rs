use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::world::aoi::AoiRegion;
use crate::world::constants::{net, region};
use crate::world::entity::SpawnConfig;

/// World configuration, read once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    /// Region bounds and cell counts
    pub region: AoiRegion,
    /// Where new entities appear
    pub spawn: SpawnConfig,
    /// Delay between individual notifications of one fan-out (None = send back to back)
    pub notify_pacing: Option<Duration>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            region: AoiRegion::new(
                region::MIN_X,
                region::MAX_X,
                region::CNTS_X,
                region::MIN_Y,
                region::MAX_Y,
                region::CNTS_Y,
            ),
            spawn: SpawnConfig::default(),
            notify_pacing: None,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Port for the metrics endpoint (0 disables it)
    pub metrics_port: u16,
    /// Maximum number of simultaneous connections
    pub max_connections: usize,
    /// Spatial world settings
    pub world: WorldConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: net::DEFAULT_PORT,
            metrics_port: net::DEFAULT_METRICS_PORT,
            max_connections: net::DEFAULT_MAX_CONNECTIONS,
            world: WorldConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Port cannot be 0")]
    ZeroPort,
    #[error("max_connections must be at least 1")]
    NoConnections,
    #[error("Invalid world region: {0}")]
    InvalidRegion(String),
    #[error("Spawn anchor ({0}, {1}) lies outside the world region")]
    SpawnOutsideRegion(f32, f32),
}

/// Parse an environment variable, warning and keeping `current` when it is malformed
fn env_or<T: FromStr + Copy>(name: &str, current: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("Invalid {} '{}', using default", name, raw);
                current
            }
        },
        Err(_) => current,
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        let port = env_or("PORT", config.port);
        if port > 0 {
            config.port = port;
        } else {
            tracing::warn!("PORT must be > 0, using default");
        }

        config.metrics_port = env_or("METRICS_PORT", config.metrics_port);

        let max_connections = env_or("MAX_CONNECTIONS", config.max_connections);
        if max_connections > 0 {
            config.max_connections = max_connections;
        } else {
            tracing::warn!("MAX_CONNECTIONS must be > 0, using default");
        }

        let r = &mut config.world.region;
        r.min_x = env_or("AOI_MIN_X", r.min_x);
        r.max_x = env_or("AOI_MAX_X", r.max_x);
        r.cnts_x = env_or("AOI_CNTS_X", r.cnts_x);
        r.min_y = env_or("AOI_MIN_Y", r.min_y);
        r.max_y = env_or("AOI_MAX_Y", r.max_y);
        r.cnts_y = env_or("AOI_CNTS_Y", r.cnts_y);

        let s = &mut config.world.spawn;
        s.anchor_x = env_or("SPAWN_X", s.anchor_x);
        s.anchor_z = env_or("SPAWN_Z", s.anchor_z);
        s.jitter_x = env_or("SPAWN_JITTER_X", s.jitter_x);
        s.jitter_z = env_or("SPAWN_JITTER_Z", s.jitter_z);

        let pacing_ms: u64 = env_or("NOTIFY_PACING_MS", 0);
        config.world.notify_pacing = (pacing_ms > 0).then(|| Duration::from_millis(pacing_ms));

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.max_connections == 0 {
            return Err(ConfigError::NoConnections);
        }
        self.world.validate()
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.region
            .validate()
            .map_err(|e| ConfigError::InvalidRegion(e.to_string()))?;

        let (x, z) = (self.spawn.anchor_x, self.spawn.anchor_z);
        if !self.region.contains(x, z) {
            return Err(ConfigError::SpawnOutsideRegion(x, z));
        }
        Ok(())
    }
}
