//! OFFNORMAL - Off-normal alarm state machine
//!
//! An off-normal alarm watches an input node and a "normal state" node of an
//! OPC-style address space. The alarm is active while both nodes carry a
//! good, non-null value and the two values differ; every real transition is
//! announced once to a [`ConditionEventSink`].
//!
//! A system off-normal alarm ([`AlarmKind::SystemOffNormal`]) runs the same
//! state machine and marks conditions whose supplying subsystem may be
//! unreachable.
//!
//! # Feature Flags
//!
//! - `normal-state-repoint` (default): allow re-pointing a live alarm at a
//!   different normal-state node with
//!   [`OffNormalAlarm::repoint_normal_state`].
//!
//! # Examples
//!
//! ```rust
//! use offnormal::bootstrap::{instantiate, BaseAlarmOptions, OffNormalOptions};
//! use offnormal::{AddressSpace, ChannelSink, DataValue, NodeId};
//! use std::sync::Arc;
//!
//! let space = AddressSpace::new();
//! let input = NodeId::string(2, "Pump1.Running");
//! space.add_variable(input.clone(), "Pump1.Running", DataValue::good(true))?;
//! space.add_variable(NodeId::string(2, "Pump1.Expected"), "Pump1.Expected", DataValue::good(true))?;
//!
//! let (sink, mut events) = ChannelSink::channel();
//! let alarm = instantiate(
//!     &space,
//!     BaseAlarmOptions::new(NodeId::string(1, "Pump1.OffNormal"), "Pump1OffNormal"),
//!     OffNormalOptions::new(input.clone(), "Pump1.Expected"),
//!     Arc::new(sink),
//! )?;
//! assert!(!alarm.is_active());
//!
//! space.write_value_from_source(&input, DataValue::good(false))?;
//! assert!(alarm.is_active());
//! assert!(events.try_recv().map(|e| e.is_active).unwrap_or(false));
//! # Ok::<(), offnormal::AlarmError>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// CORE MODULES
// ============================================================================

/// Error handling with structured error types
pub mod error;

/// OPC-style node identifiers
pub mod node_id;

/// Values, quality codes and data values
pub mod value;

/// Thread-safe address space with value change notification
pub mod address_space;

/// Resolution of configured node references
pub mod resolver;

/// Value change monitoring with the quality/null delivery policy
pub mod monitor;

/// Off-normal state decision
pub mod comparator;

/// Condition events and sinks
pub mod condition;

/// Alarm instances and their state machine
pub mod alarm;

/// Alarm construction
pub mod bootstrap;

/// Configuration management with YAML support and validation
pub mod config;

/// Alarm collection built from a configuration
pub mod manager;

// ============================================================================
// PUBLIC RE-EXPORTS
// ============================================================================

pub use address_space::{AddressSpace, NodeClass, NodeHandle, NodeRef, SubscriptionHandle};
pub use alarm::{AlarmKind, AlarmStats, AlarmSummary, InitialEvaluation, OffNormalAlarm};
pub use bootstrap::{instantiate, instantiate_system, BaseAlarmOptions, OffNormalOptions};
pub use comparator::TransitionName;
pub use condition::{ChannelSink, ConditionEvent, ConditionEventSink, LoggingSink};
pub use config::Config;
pub use error::{AlarmError, Result};
pub use manager::AlarmManager;
pub use node_id::NodeId;
pub use value::{DataValue, Quality, QualityCode, Value};

// ============================================================================
// VERSION INFORMATION
// ============================================================================

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build information
pub mod build_info {
    /// Git commit hash (if built from a git checkout)
    pub const GIT_HASH: Option<&str> = option_env!("OFFNORMAL_GIT_HASH");

    /// Build timestamp
    pub const BUILD_TIMESTAMP: &str = env!("OFFNORMAL_BUILD_TIMESTAMP");

    /// Rust version used for compilation
    pub const RUSTC_VERSION: &str = env!("OFFNORMAL_RUST_VERSION");

    /// Target triple
    pub const TARGET: &str = env!("OFFNORMAL_TARGET");

    /// Build profile (debug/release)
    pub const PROFILE: &str = env!("OFFNORMAL_PROFILE");

    /// One-line summary for startup logs
    pub fn summary() -> String {
        format!(
            "version: {}, commit: {}, target: {} ({}), built {}",
            super::VERSION,
            GIT_HASH.unwrap_or("unknown"),
            TARGET,
            PROFILE,
            BUILD_TIMESTAMP
        )
    }
}

// ============================================================================
// INITIALIZATION
// ============================================================================

/// Default log filter directive
pub const DEFAULT_LOG_DIRECTIVE: &str = "offnormal=info";

/// Initialize logging.
///
/// Installs a `tracing` subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_LOG_DIRECTIVE`]. Calling it again once a subscriber is set is a
/// no-op.
pub fn init() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_DIRECTIVE))
        .map_err(|e| AlarmError::Config(format!("Invalid log filter: {}", e)))?;

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false));

    if subscriber.try_init().is_ok() {
        tracing::info!("OFFNORMAL {} initialized ({})", VERSION, build_info::summary());
    }
    Ok(())
}
