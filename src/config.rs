//! Configuration surface: the policy build-time inputs, loaded from a
//! layered defaults/file/environment stack.

use crate::algorithms::AlgorithmKind;
use crate::error::ThrottlerError;
use crate::limit_spec::LimitSpec;
use crate::policy::PolicyTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

fn default_key_prefix() -> String {
    "rl".to_string()
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_store_kind() -> StoreKind {
    StoreKind::Memory
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Memory,
    Remote,
}

/// The configuration surface. Deserializable directly from a layered
/// `config::Config` (defaults, optional file, `THROTTLER_`-prefixed
/// environment), generalized from a single flat rate limit to the full
/// policy surface.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    #[serde(default)]
    pub algorithm: AlgorithmKind,

    #[serde(default = "default_store_kind")]
    pub store: StoreKind,

    #[serde(default = "default_key_prefix")]
    #[validate(length(min = 1))]
    pub key_prefix: String,

    /// Remote store connection string; only consulted when `store ==
    /// Remote`. Left unvalidated here (the store constructor validates
    /// reachability) since a malformed URL is a `StoreError` at connect
    /// time, not a `Config` concern.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// scope -> limit
    #[serde(default)]
    pub default_limits: HashMap<String, LimitSpec>,

    /// tier -> scope -> limit
    #[serde(default)]
    pub tier_limits: HashMap<String, HashMap<String, LimitSpec>>,

    /// entity -> scope -> limit
    #[serde(default)]
    pub entity_overrides: HashMap<String, HashMap<String, LimitSpec>>,

    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    pub operation_timeout: Duration,

    #[serde(default)]
    pub metrics_enabled: bool,

    /// Whether a `BackendError` during admission should be treated as
    /// "allow" (fail-open) or "deny" (fail-closed, the default).
    #[serde(default)]
    pub fail_open: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::default(),
            store: default_store_kind(),
            key_prefix: default_key_prefix(),
            redis_url: None,
            default_limits: HashMap::new(),
            tier_limits: HashMap::new(),
            entity_overrides: HashMap::new(),
            operation_timeout: default_operation_timeout(),
            metrics_enabled: false,
            fail_open: false,
        }
    }
}

impl Config {
    /// Layers a config file (if present) and `THROTTLER_`-prefixed
    /// environment variables over the built-in defaults. A missing or
    /// unparseable file is not fatal: defaults apply and the condition is
    /// logged.
    pub fn load(path: &str) -> Result<Self, ThrottlerError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("THROTTLER").separator("__"))
            .build()
            .map_err(|e| ThrottlerError::config(format!("failed to build configuration: {e}")))?;

        match settings.try_deserialize::<Config>() {
            Ok(config) => {
                config.validate_all()?;
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(error = %e, path, "failed to load configuration, using defaults");
                let config = Config::default();
                config.validate_all()?;
                Ok(config)
            }
        }
    }

    /// Validates both the `validator`-derived field bounds and every
    /// embedded `LimitSpec`'s bounds (the `config` crate's deserialization
    /// does not run `validator` automatically).
    pub fn validate_all(&self) -> Result<(), ThrottlerError> {
        self.validate()
            .map_err(|e| ThrottlerError::config(format!("invalid configuration: {e}")))?;

        let validate_spec = |spec: &LimitSpec| match self.algorithm {
            AlgorithmKind::TokenBucket => spec.validate_for_token_bucket(),
            AlgorithmKind::SlidingWindow => spec.validate_bounds(),
        };

        for spec in self.default_limits.values() {
            validate_spec(spec)?;
        }
        for by_scope in self.tier_limits.values() {
            for spec in by_scope.values() {
                validate_spec(spec)?;
            }
        }
        for by_scope in self.entity_overrides.values() {
            for spec in by_scope.values() {
                validate_spec(spec)?;
            }
        }
        Ok(())
    }

    /// Builds the [`PolicyTable`] this configuration describes. The
    /// `default_limits` entry under key `"global"`, if present, seeds the
    /// global default; every other `default_limits` entry becomes a scope
    /// default.
    pub fn policy_table(&self) -> Result<PolicyTable, ThrottlerError> {
        let mut builder = PolicyTable::builder();

        if let Some(global) = self.default_limits.get("global") {
            builder = builder.global_default(*global);
        }
        for (scope, spec) in &self.default_limits {
            if scope != "global" {
                builder = builder.scope_default(scope.clone(), *spec);
            }
        }
        for (tier, by_scope) in &self.tier_limits {
            for (scope, spec) in by_scope {
                builder = builder.tier_limit(tier.clone(), scope.clone(), *spec);
            }
        }
        for (entity, by_scope) in &self.entity_overrides {
            for (scope, spec) in by_scope {
                builder = builder.entity_override(entity.clone(), scope.clone(), *spec);
            }
        }

        builder.build()
    }
}
