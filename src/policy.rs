//! Policy table: resolves the `LimitSpec` applicable to a given
//! `(entity, scope, tier)` triple.

use crate::error::ThrottlerError;
use crate::limit_spec::LimitSpec;
use std::collections::HashMap;

/// Resolution order: explicit entity override, then tier limit, then scope
/// default, then global default. The first match wins.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    global_default: Option<LimitSpec>,
    scope_defaults: HashMap<String, LimitSpec>,
    tier_limits: HashMap<String, HashMap<String, LimitSpec>>,
    entity_overrides: HashMap<String, HashMap<String, LimitSpec>>,
}

impl PolicyTable {
    pub fn builder() -> PolicyTableBuilder {
        PolicyTableBuilder::default()
    }

    /// Resolves the limit for `(entity, scope, tier)`. Returns
    /// `ConfigError` only if no row matches at all, which `build()` already
    /// guarantees cannot happen as long as a global default was set, but this
    /// defends the invariant a second time at lookup, since a table can be
    /// constructed directly via `PolicyTable::default()` + field mutation
    /// in tests.
    pub fn resolve(&self, entity: &str, scope: &str, tier: &str) -> Result<LimitSpec, ThrottlerError> {
        if let Some(by_scope) = self.entity_overrides.get(entity) {
            if let Some(spec) = by_scope.get(scope) {
                return Ok(*spec);
            }
        }
        if let Some(by_scope) = self.tier_limits.get(tier) {
            if let Some(spec) = by_scope.get(scope) {
                return Ok(*spec);
            }
        }
        if let Some(spec) = self.scope_defaults.get(scope) {
            return Ok(*spec);
        }
        self.global_default
            .ok_or_else(|| ThrottlerError::config("policy table has no matching row and no global default"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicyTableBuilder {
    global_default: Option<LimitSpec>,
    scope_defaults: HashMap<String, LimitSpec>,
    tier_limits: HashMap<String, HashMap<String, LimitSpec>>,
    entity_overrides: HashMap<String, HashMap<String, LimitSpec>>,
}

impl PolicyTableBuilder {
    pub fn global_default(mut self, spec: LimitSpec) -> Self {
        self.global_default = Some(spec);
        self
    }

    pub fn scope_default(mut self, scope: impl Into<String>, spec: LimitSpec) -> Self {
        self.scope_defaults.insert(scope.into(), spec);
        self
    }

    pub fn tier_limit(mut self, tier: impl Into<String>, scope: impl Into<String>, spec: LimitSpec) -> Self {
        self.tier_limits
            .entry(tier.into())
            .or_default()
            .insert(scope.into(), spec);
        self
    }

    pub fn entity_override(mut self, entity: impl Into<String>, scope: impl Into<String>, spec: LimitSpec) -> Self {
        self.entity_overrides
            .entry(entity.into())
            .or_default()
            .insert(scope.into(), spec);
        self
    }

    /// An empty table (no global default and no other row) is an error at
    /// build time rather than surfacing later as a confusing per-request
    /// `ConfigError`.
    pub fn build(self) -> Result<PolicyTable, ThrottlerError> {
        if self.global_default.is_none()
            && self.scope_defaults.is_empty()
            && self.tier_limits.is_empty()
            && self.entity_overrides.is_empty()
        {
            return Err(ThrottlerError::config(
                "policy table is empty: at least a global default is required",
            ));
        }
        Ok(PolicyTable {
            global_default: self.global_default,
            scope_defaults: self.scope_defaults,
            tier_limits: self.tier_limits,
            entity_overrides: self.entity_overrides,
        })
    }
}
