//! Declarative session configuration and its validation.

use std::{collections::BTreeSet, time::Duration};

use progression_core::{
    DepositZone, LevelRewards, LevelThresholds, PayloadKind, Position, ResourceKind,
    ThresholdError, ZoneBounds, ZoneId,
};
use progression_system_advancement as advancement;
use progression_system_delivery as delivery;
use progression_system_target_resolver::TargetResolver;
use progression_world::LedgerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a session configuration is refused.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The level threshold table is malformed.
    #[error("invalid level thresholds: {0}")]
    Thresholds(#[from] ThresholdError),
    /// Two deposit zones share an identifier.
    #[error("deposit zone {0} is declared more than once")]
    DuplicateZone(u32),
    /// The default zone does not name a declared zone.
    #[error("default zone {0} is not declared")]
    UnknownDefaultZone(u32),
    /// Grants could never be split into agents.
    #[error("agents_per_grant must be at least 1")]
    NoAgents,
    /// The arc height is not a finite number.
    #[error("arc_height must be finite")]
    InvalidArcHeight,
    /// A resource capacity is declared more than once.
    #[error("capacity for {0:?} is declared more than once")]
    DuplicateCapacity(ResourceKind),
}

/// Starting capacity of a single resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapacityConfig {
    /// Resource the capacity applies to.
    pub kind: ResourceKind,
    /// Units the resource can hold.
    pub capacity: u32,
}

/// Axis-aligned deposit zone.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneConfig {
    /// Identifier of the zone.
    pub id: u32,
    /// One corner of the zone.
    pub min: Position,
    /// The opposite corner of the zone.
    pub max: Position,
    /// Point agents fly toward. Defaults to the zone center.
    #[serde(default)]
    pub drop_point: Option<Position>,
}

impl ZoneConfig {
    fn to_zone(self) -> DepositZone {
        let bounds = ZoneBounds::from_corners(self.min, self.max);
        DepositZone {
            id: ZoneId::new(self.id),
            bounds,
            drop_point: self.drop_point.unwrap_or_else(|| bounds.center()),
        }
    }
}

/// Pacing of the level advancement sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdvancementSettings {
    /// Delay between consecutive level-ups, in milliseconds.
    pub level_pacing_ms: u64,
    /// Time a gate may stay unresolved before advancement resumes, in milliseconds.
    pub gate_timeout_ms: u64,
}

impl AdvancementSettings {
    fn to_config(self) -> advancement::Config {
        advancement::Config::new(
            Duration::from_millis(self.level_pacing_ms),
            Duration::from_millis(self.gate_timeout_ms),
        )
    }
}

impl Default for AdvancementSettings {
    fn default() -> Self {
        let config = advancement::Config::default();
        Self {
            level_pacing_ms: millis(config.level_pacing()),
            gate_timeout_ms: millis(config.gate_timeout()),
        }
    }
}

/// Behaviour of the delivery agents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeliverySettings {
    /// Flight time of a single agent, in milliseconds.
    pub flight_duration_ms: u64,
    /// Maximum number of agents a grant is split across.
    pub agents_per_grant: u32,
    /// Maximum sideways offset of a flight path.
    pub arc_height: f32,
    /// Seed of the flight path jitter.
    pub rng_seed: u64,
    /// Agents synthesized per payload kind when the session starts.
    pub prewarm: u32,
}

impl DeliverySettings {
    fn to_config(&self) -> Result<delivery::Config, ConfigError> {
        if self.agents_per_grant == 0 {
            return Err(ConfigError::NoAgents);
        }
        if !self.arc_height.is_finite() {
            return Err(ConfigError::InvalidArcHeight);
        }
        Ok(delivery::Config::new(
            Duration::from_millis(self.flight_duration_ms),
            self.agents_per_grant,
            self.arc_height,
            self.rng_seed,
        ))
    }
}

impl Default for DeliverySettings {
    fn default() -> Self {
        let config = delivery::Config::default();
        Self {
            flight_duration_ms: millis(config.flight_duration()),
            agents_per_grant: config.agents_per_grant(),
            arc_height: config.arc_height(),
            rng_seed: config.rng_seed(),
            prewarm: 0,
        }
    }
}

/// Everything required to assemble a [`crate::Session`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Cumulative experience required for each level, starting at level 1.
    pub thresholds: Vec<u32>,
    /// Rewards applied once per level gained.
    #[serde(default)]
    pub rewards: LevelRewards,
    /// Starting capacities. Unlisted resources start at the default capacity.
    #[serde(default)]
    pub capacities: Vec<CapacityConfig>,
    /// Deposit zones available to resource deliveries.
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    /// Zone used when the actor stands outside every zone.
    #[serde(default)]
    pub default_zone: Option<u32>,
    /// Sequencer pacing.
    #[serde(default)]
    pub advancement: AdvancementSettings,
    /// Delivery behaviour.
    #[serde(default)]
    pub delivery: DeliverySettings,
}

impl SessionConfig {
    /// Creates a configuration with default settings around `thresholds`.
    #[must_use]
    pub fn new(thresholds: Vec<u32>) -> Self {
        Self {
            thresholds,
            rewards: LevelRewards::default(),
            capacities: Vec::new(),
            zones: Vec::new(),
            default_zone: None,
            advancement: AdvancementSettings::default(),
            delivery: DeliverySettings::default(),
        }
    }

    /// Builds the ledger configuration.
    pub fn ledger_config(&self) -> Result<LedgerConfig, ConfigError> {
        let thresholds = LevelThresholds::new(self.thresholds.clone())?;
        let mut config = LedgerConfig::new(thresholds).with_rewards(self.rewards.clone());

        let mut seen = BTreeSet::new();
        for entry in &self.capacities {
            if !seen.insert(entry.kind) {
                return Err(ConfigError::DuplicateCapacity(entry.kind));
            }
            config = config.with_capacity(entry.kind, entry.capacity);
        }
        Ok(config)
    }

    /// Builds the deposit target resolver.
    pub fn resolver(&self) -> Result<TargetResolver, ConfigError> {
        let mut ids = BTreeSet::new();
        for zone in &self.zones {
            if !ids.insert(zone.id) {
                return Err(ConfigError::DuplicateZone(zone.id));
            }
        }
        if let Some(default) = self.default_zone {
            if !ids.contains(&default) {
                return Err(ConfigError::UnknownDefaultZone(default));
            }
        }

        let zones = self.zones.iter().map(|zone| zone.to_zone()).collect();
        Ok(TargetResolver::new(
            zones,
            self.default_zone.map(ZoneId::new),
        ))
    }

    /// Builds the sequencer configuration.
    #[must_use]
    pub fn advancement_config(&self) -> advancement::Config {
        self.advancement.to_config()
    }

    /// Builds the delivery configuration.
    pub fn delivery_config(&self) -> Result<delivery::Config, ConfigError> {
        self.delivery.to_config()
    }

    /// Builds an agent pool prewarmed for every payload kind.
    #[must_use]
    pub fn pool(&self) -> delivery::ResourcePool {
        let mut pool = delivery::ResourcePool::new();
        if self.delivery.prewarm > 0 {
            for kind in PayloadKind::ALL {
                pool.prewarm(kind, self.delivery.prewarm);
            }
        }
        pool
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use progression_world::{ProgressionLedger, DEFAULT_CAPACITY};

    #[test]
    fn defaults_mirror_system_configs() {
        let config = SessionConfig::new(vec![0, 10]);
        assert_eq!(config.advancement_config(), advancement::Config::default());
        assert_eq!(
            config.delivery_config().expect("defaults are valid"),
            delivery::Config::default()
        );
        let ledger = ProgressionLedger::new(config.ledger_config().expect("defaults are valid"));
        assert_eq!(ledger.capacity(ResourceKind::Coin), DEFAULT_CAPACITY);
    }

    #[test]
    fn malformed_thresholds_are_rejected() {
        let config = SessionConfig::new(vec![0, 10, 10]);
        assert!(matches!(
            config.ledger_config(),
            Err(ConfigError::Thresholds(_))
        ));
    }

    #[test]
    fn zones_are_validated() {
        let zone = ZoneConfig {
            id: 1,
            min: Position::new(0.0, 0.0),
            max: Position::new(2.0, 2.0),
            drop_point: None,
        };
        let mut config = SessionConfig::new(vec![0]);
        config.zones = vec![zone, zone];
        assert_eq!(
            config.resolver().err(),
            Some(ConfigError::DuplicateZone(1))
        );

        config.zones = vec![zone];
        config.default_zone = Some(4);
        assert_eq!(
            config.resolver().err(),
            Some(ConfigError::UnknownDefaultZone(4))
        );

        config.default_zone = Some(1);
        let resolver = config.resolver().expect("valid zones");
        assert_eq!(resolver.zones()[0].drop_point, Position::new(1.0, 1.0));
    }

    #[test]
    fn delivery_settings_are_validated() {
        let mut config = SessionConfig::new(vec![0]);
        config.delivery.agents_per_grant = 0;
        assert_eq!(config.delivery_config().err(), Some(ConfigError::NoAgents));

        config.delivery.agents_per_grant = 3;
        config.delivery.arc_height = f32::NAN;
        assert_eq!(
            config.delivery_config().err(),
            Some(ConfigError::InvalidArcHeight)
        );
    }

    #[test]
    fn duplicate_capacities_are_rejected() {
        let mut config = SessionConfig::new(vec![0]);
        config.capacities = vec![
            CapacityConfig {
                kind: ResourceKind::Crumb,
                capacity: 5,
            },
            CapacityConfig {
                kind: ResourceKind::Crumb,
                capacity: 9,
            },
        ];
        assert_eq!(
            config.ledger_config().err(),
            Some(ConfigError::DuplicateCapacity(ResourceKind::Crumb))
        );
    }

    #[test]
    fn parses_from_toml() {
        let config: SessionConfig = toml::from_str(
            r#"
            thresholds = [0, 30, 75]
            default_zone = 2

            [rewards]
            attribute_points = 1

            [[capacities]]
            kind = "Chitin"
            capacity = 250

            [[zones]]
            id = 2
            min = { x = -10.0, y = -10.0 }
            max = { x = 10.0, y = 10.0 }

            [delivery]
            agents_per_grant = 3
            prewarm = 2
            "#,
        )
        .expect("valid toml");

        let ledger = ProgressionLedger::new(config.ledger_config().expect("valid capacities"));
        assert_eq!(ledger.capacity(ResourceKind::Chitin), 250);
        assert_eq!(config.delivery.agents_per_grant, 3);
        assert_eq!(config.advancement, AdvancementSettings::default());
        assert_eq!(config.pool().stats(PayloadKind::Coin).pooled, 2);
        assert!(config.resolver().is_ok());
        assert!(config.ledger_config().is_ok());
    }
}
