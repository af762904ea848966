//! Entity/scope/tier resolution: turning an incoming request into the three
//! strings that select a policy row and compose a storage key.

use std::collections::HashMap;

const KEY_SEPARATOR: char = ':';

/// What an extractor reads from. Headers are expected lower-cased by the
/// caller (as every HTTP framework's header map iterator does); this type
/// makes no assumption about which framework produced it.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub headers: HashMap<String, String>,
    pub remote_addr: String,
    pub path: String,
    /// A tier claim resolved upstream (e.g. from an auth middleware), if
    /// any. When present it takes precedence over header-based tier
    /// extraction.
    pub tier_claim: Option<String>,
}

impl RequestContext {
    pub fn new(remote_addr: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            headers: HashMap::new(),
            remote_addr: remote_addr.into(),
            path: path.into(),
            tier_claim: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_tier_claim(mut self, tier: impl Into<String>) -> Self {
        self.tier_claim = Some(tier.into());
        self
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Strategy for deriving the `entity` string. Composable, and retargeted at
/// one of the pipeline's three resolved strings instead of a whole opaque
/// key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityStrategy {
    /// Remote address, stripped of a trailing port.
    IpAddress,
    /// `X-Api-Key` header, falling back to `Authorization`.
    ApiKey,
    /// A user id claim. No JWT scheme is implemented here; this reads a
    /// plain `X-User-Id` header and otherwise falls back to `IpAddress`, per
    /// an explicit decision to leave JWT extraction as future work rather
    /// than invent a scheme.
    UserId,
    Composite(Vec<EntityStrategy>),
}

impl Default for EntityStrategy {
    fn default() -> Self {
        EntityStrategy::IpAddress
    }
}

/// Strips a trailing `:<port>` from a `host:port` or bare `host`/IPv6
/// literal. IPv6 literals are left alone unless bracketed (`[::1]:8080`).
fn strip_port(addr: &str) -> &str {
    if let Some(bracket_end) = addr.strip_prefix('[').and_then(|rest| rest.find(']')) {
        return &addr[1..bracket_end + 1];
    }
    match addr.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => addr,
    }
}

/// Default entity extractor precedence: first hop of `X-Forwarded-For`,
/// then `X-Real-IP`, then the context's own remote address with any port
/// stripped.
pub fn default_client_ip(ctx: &RequestContext) -> String {
    ctx.header("x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| ctx.header("x-real-ip"))
        .map(str::to_string)
        .unwrap_or_else(|| strip_port(&ctx.remote_addr).to_string())
}

fn extract_with(strategy: &EntityStrategy, ctx: &RequestContext) -> Option<String> {
    match strategy {
        EntityStrategy::IpAddress => Some(default_client_ip(ctx)),
        EntityStrategy::ApiKey => ctx
            .header("x-api-key")
            .or_else(|| ctx.header("authorization"))
            .map(str::to_string),
        EntityStrategy::UserId => ctx
            .header("x-user-id")
            .map(str::to_string)
            .or_else(|| Some(default_client_ip(ctx))),
        EntityStrategy::Composite(parts) => {
            let mut pieces = Vec::with_capacity(parts.len());
            for part in parts {
                pieces.push(extract_with(part, ctx)?);
            }
            Some(pieces.join("+"))
        }
    }
}

/// Resolves `entity` from a [`RequestContext`] per a configured
/// [`EntityStrategy`], escaping the result so it can never be mistaken for a
/// storage-key separator.
pub fn resolve_entity(strategy: &EntityStrategy, ctx: &RequestContext) -> String {
    let raw = extract_with(strategy, ctx).unwrap_or_else(|| "unknown".to_string());
    escape_key_component(&raw)
}

/// Resolves `scope`: a pure passthrough of the context's `path`, defaulting
/// to `"global"` when empty, with the same escaping applied.
pub fn resolve_scope(ctx: &RequestContext) -> String {
    if ctx.path.is_empty() {
        "global".to_string()
    } else {
        escape_key_component(&ctx.path)
    }
}

/// Resolves `tier`: the pre-resolved claim if present, else `"free"`.
pub fn resolve_tier(ctx: &RequestContext) -> String {
    ctx.tier_claim
        .as_deref()
        .map(escape_key_component)
        .unwrap_or_else(|| "free".to_string())
}

/// Replaces the storage-key separator and any control byte with `_`, so
/// untrusted entity/scope bytes can never forge extra key segments.
pub fn escape_key_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c == KEY_SEPARATOR || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}
