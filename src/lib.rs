//! # Throttler - a rate-limiting decision engine
//!
//! Throttler decides, for each incoming admission query, whether it is
//! allowed under a configured policy, and maintains the per-entity state
//! that makes those decisions correct under concurrency. It is a library,
//! not a service: no HTTP framework, no CLI, no example binaries live here.
//! Adapting a single `check`/`allow` call into a web framework's handler
//! chain, building a preset/dashboard around it, or speaking the Redis wire
//! protocol directly are all collaborator concerns.
//!
//! ## Core components
//!
//! - [`store`]: the persistence abstraction ([`store::Store`]), with
//!   in-memory ([`store::MemoryStore`]) and Redis-backed
//!   ([`store::RedisStore`]) implementations.
//! - [`algorithms`]: the two admission algorithms,
//!   [`algorithms::token_bucket::TokenBucketAlgorithm`] and
//!   [`algorithms::sliding_window::SlidingWindowAlgorithm`], both pure
//!   functions over an injected [`clock::Clock`].
//! - [`limit_spec`]: parses `"<count>/<unit>"` limit literals.
//! - [`entity`]: resolves `(entity, scope, tier)` from a request.
//! - [`policy`]: resolves the `LimitSpec` applicable to a resolved triple.
//! - [`pipeline`]: [`pipeline::DecisionPipeline`], the `check`/`allow`/
//!   `reset`/`health` admission surface.
//! - [`observable`]: an optional counting/health decorator,
//!   [`observable::Observable`], around a `DecisionPipeline`.
//! - [`config`]: loads [`config::Config`] from defaults, a file, and
//!   `THROTTLER_`-prefixed environment variables.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use throttler::algorithms::sliding_window::SlidingWindowAlgorithm;
//! use throttler::clock::SystemClock;
//! use throttler::limit_spec::parse_limit_spec;
//! use throttler::pipeline::DecisionPipeline;
//! use throttler::policy::PolicyTable;
//! use throttler::store::MemoryStore;
//!
//! # async fn run() -> Result<(), throttler::ThrottlerError> {
//! let policy = PolicyTable::builder()
//!     .global_default(parse_limit_spec("100/minute")?)
//!     .build()?;
//!
//! let pipeline = DecisionPipeline::new(
//!     policy,
//!     Arc::new(MemoryStore::default()),
//!     Arc::new(SlidingWindowAlgorithm),
//!     Arc::new(SystemClock),
//!     "rl",
//!     Duration::from_secs(5),
//! );
//!
//! let decision = pipeline.check("203.0.113.5", "search", "free", 1).await?;
//! assert!(decision.allowed);
//! # Ok(())
//! # }
//! ```

pub mod algorithms;
pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod limit_spec;
pub mod observable;
pub mod pipeline;
pub mod policy;
pub mod store;

pub use algorithms::{AlgorithmKind, AlgorithmState, Decision, RateLimitAlgorithm};
pub use config::Config;
pub use error::ThrottlerError;
pub use limit_spec::LimitSpec;
pub use observable::Observable;
pub use pipeline::DecisionPipeline;
pub use policy::PolicyTable;
pub use store::Store;

/// Result type alias for throttler operations.
pub type Result<T> = std::result::Result<T, ThrottlerError>;

/// Version of the throttler library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
