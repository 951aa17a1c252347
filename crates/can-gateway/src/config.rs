//! Gateway Configuration
//!
//! Start-up bus settings: per-bus bit rate, loopback, silent mask, static
//! forwarding rules and the initial GMLAN host. Loaded from a file with
//! `CAN_GATEWAY__*` environment overrides.

use can_protocol::{BusNumber, CanInterface, BUS_MAX};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::GatewayError;

/// Every interface in silent (listen-only) mode
pub const ALL_CAN_SILENT: u8 = 0xFF;
/// Only CAN1 may drive the bus
pub const ALL_CAN_BUT_MAIN_SILENT: u8 = 0xFE;
/// Every interface may drive the bus
pub const ALL_CAN_LIVE: u8 = 0;

/// Default rates in units of 100 bit/s: 500k on the native buses, 33.3k GMLAN
pub const DEFAULT_SPEEDS: [u32; BUS_MAX] = [5000, 5000, 5000, 333];

/// Rates the bxCAN timing table supports (units of 100 bit/s)
pub const SUPPORTED_SPEEDS: [u32; 9] = [100, 200, 333, 500, 1000, 1250, 2500, 5000, 10000];

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "CAN_GATEWAY";

/// Static forwarding rule: frames received on `from` are retransmitted on `to`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRule {
    pub from: BusNumber,
    pub to: BusNumber,
}

/// Gateway start-up configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bit rate per logical bus, units of 100 bit/s
    pub speeds: Vec<u32>,
    /// Internal loopback on every interface
    pub loopback: bool,
    /// Silent-mode bit per interface (bit 0 = CAN1)
    pub silent_mask: u8,
    /// Static forwarding rules
    pub forwarding: Vec<ForwardRule>,
    /// Interface lent to GMLAN at start-up
    pub gmlan: Option<CanInterface>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            speeds: DEFAULT_SPEEDS.to_vec(),
            loopback: false,
            silent_mask: ALL_CAN_SILENT,
            forwarding: Vec::new(),
            gmlan: None,
        }
    }
}

impl GatewayConfig {
    /// Load from a config file (any format the `config` crate recognises by
    /// extension) with environment overrides, then validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        info!("Loading gateway config from {}", path.display());

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: GatewayConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text and validate
    pub fn from_toml_str(text: &str) -> Result<Self, GatewayError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;
        let config: GatewayConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check if `speed` is a rate the peripherals can be programmed for
    pub fn is_supported_speed(speed: u32) -> bool {
        SUPPORTED_SPEEDS.contains(&speed)
    }

    /// Check table sizes, rates and the GMLAN host
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.speeds.len() != BUS_MAX {
            return Err(GatewayError::InvalidConfig(format!(
                "expected {} speeds, got {}",
                BUS_MAX,
                self.speeds.len()
            )));
        }
        if let Some(speed) = self.speeds.iter().find(|s| !Self::is_supported_speed(**s)) {
            return Err(GatewayError::InvalidConfig(format!(
                "unsupported speed {}",
                speed
            )));
        }
        if let Some(iface) = self.gmlan {
            if !iface.is_gmlan_capable() {
                return Err(GatewayError::InvalidGmlanTarget(iface as u8));
            }
        }
        Ok(())
    }

    /// Speed table as a fixed array (requires a validated config)
    pub fn speed_table(&self) -> [u32; BUS_MAX] {
        let mut table = DEFAULT_SPEEDS;
        for (slot, speed) in table.iter_mut().zip(&self.speeds) {
            *slot = *speed;
        }
        table
    }
}

/// Runtime bus settings, applied to an interface on its next init
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusSettings {
    /// Bit rate per logical bus
    pub speeds: [u32; BUS_MAX],
    /// Internal loopback
    pub loopback: bool,
    /// Silent-mode bit per interface
    pub silent_mask: u8,
}

impl BusSettings {
    /// Speed for whichever bus an interface currently serves
    pub fn speed_for(&self, bus: BusNumber) -> u32 {
        self.speeds[bus.index()]
    }

    /// Check the silent bit for an interface
    pub fn is_silent(&self, iface: CanInterface) -> bool {
        self.silent_mask & iface.mask_bit() != 0
    }
}

impl Default for BusSettings {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for BusSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            speeds: config.speed_table(),
            loopback: config.loopback,
            silent_mask: config.silent_mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.speed_table(), [5000, 5000, 5000, 333]);
        assert_eq!(config.silent_mask, ALL_CAN_SILENT);
    }

    #[test]
    fn test_parse_toml() {
        let config = GatewayConfig::from_toml_str(
            r#"
            speeds = [5000, 2500, 5000, 333]
            loopback = true
            silent_mask = 254
            gmlan = "can3"

            [[forwarding]]
            from = 0
            to = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.speed_table(), [5000, 2500, 5000, 333]);
        assert!(config.loopback);
        assert_eq!(config.silent_mask, ALL_CAN_BUT_MAIN_SILENT);
        assert_eq!(config.gmlan, Some(CanInterface::Can3));
        assert_eq!(
            config.forwarding,
            vec![ForwardRule {
                from: BusNumber::BUS0,
                to: BusNumber::BUS2
            }]
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = GatewayConfig::from_toml_str("loopback = true").unwrap();
        assert!(config.loopback);
        assert_eq!(config.speeds, DEFAULT_SPEEDS.to_vec());
    }

    #[test]
    fn test_validation_failures() {
        let short = GatewayConfig {
            speeds: vec![5000],
            ..Default::default()
        };
        assert!(matches!(short.validate(), Err(GatewayError::InvalidConfig(_))));

        let odd_rate = GatewayConfig {
            speeds: vec![5000, 5000, 4321, 333],
            ..Default::default()
        };
        assert!(matches!(odd_rate.validate(), Err(GatewayError::InvalidConfig(_))));

        let bad_gmlan = GatewayConfig {
            gmlan: Some(CanInterface::Can1),
            ..Default::default()
        };
        assert!(matches!(
            bad_gmlan.validate(),
            Err(GatewayError::InvalidGmlanTarget(0))
        ));
    }

    #[test]
    fn test_bus_settings_silent_bits() {
        let settings = BusSettings {
            silent_mask: ALL_CAN_BUT_MAIN_SILENT,
            ..Default::default()
        };
        assert!(!settings.is_silent(CanInterface::Can1));
        assert!(settings.is_silent(CanInterface::Can2));
        assert!(settings.is_silent(CanInterface::Can3));
        assert_eq!(settings.speed_for(BusNumber::GMLAN), 333);
    }
}
