// Governance configuration
//
// Loaded once at bootstrap from YAML, JSON or a file layered with ATLAS__*
// environment overrides. Fixed-point values are written as quoted decimal
// strings; floats are never accepted.

use crate::parameter_registry::{keys, GenesisConfig, ParameterRegistry, RegistryError};
use atlas_core::VerifierPolicy;
use atlas_crypto::Environment;
use atlas_economics::{validate_allocation, validate_cap, FractionBounds, GuardViolation};
use atlas_math::FixedPoint128;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("genesis parameters rejected: {0}")]
    Genesis(#[from] RegistryError),

    #[error("configured bound rejected: {0}")]
    Bounds(#[from] GuardViolation),

    #[error("minimum uptime {0} exceeds 1")]
    MinUptime(FixedPoint128),

    #[error("verifier policy lists no key schemes")]
    NoSchemes,
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Load(_) => "CONFIG_LOAD",
            ConfigError::Yaml(_) | ConfigError::Json(_) => "CONFIG_PARSE",
            ConfigError::Genesis(e) => e.code(),
            ConfigError::Bounds(e) => e.code(),
            ConfigError::MinUptime(_) => "CONFIG_MIN_UPTIME",
            ConfigError::NoSchemes => "CONFIG_NO_SCHEMES",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GovernanceConfig {
    pub environment: Environment,
    /// Only verified nodes may vote.
    pub node_gated: bool,
    pub verifier: VerifierPolicy,
    pub allocation_bounds: FractionBounds,
    pub genesis: GenesisConfig,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Dev,
            node_gated: true,
            verifier: VerifierPolicy::default(),
            allocation_bounds: FractionBounds::default(),
            genesis: GenesisConfig::default(),
        }
    }
}

impl GovernanceConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path` (format from its extension) and apply `ATLAS__` overrides,
    /// e.g. `ATLAS__NODE_GATED=false`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(::config::Environment::with_prefix("ATLAS").separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        info!(
            "loaded governance configuration from {} ({} environment)",
            path.display(),
            config.environment
        );
        Ok(config)
    }

    /// Bounds must sit inside the constitutional ranges and the genesis
    /// parameters must build a registry with a fixed-point voting cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bounds = FractionBounds::new(self.allocation_bounds.min, self.allocation_bounds.max)?;
        validate_allocation(bounds.min, &FractionBounds::default())?;
        validate_allocation(bounds.max, &FractionBounds::default())?;

        if self.verifier.supported_schemes.is_empty() {
            return Err(ConfigError::NoSchemes);
        }
        if self.verifier.min_uptime > FixedPoint128::ONE {
            return Err(ConfigError::MinUptime(self.verifier.min_uptime));
        }

        let registry = self.genesis_registry()?;
        validate_cap(registry.get_fixed(keys::MAX_VOTING_POWER_FRACTION)?)?;
        Ok(())
    }

    pub fn genesis_registry(&self) -> Result<ParameterRegistry, RegistryError> {
        ParameterRegistry::genesis(&self.genesis)
    }
}
