//! Shard total and shard range resolution
//!
//! Pure functions of the configured values and the platform's recommended
//! shard count. Nothing here can fail once the inputs are parsed.

use crate::error::GatewayError;
use crate::topology::capability::CapabilitySet;
use std::fmt;
use std::ops::RangeInclusive;
use tracing::info;

/// Requested or resolved shard total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardTotal {
    /// Let the platform decide (configured as `-1`)
    Automatic,
    Fixed(u32),
}

impl ShardTotal {
    /// Decode the configured value, where `-1` means automatic
    pub fn from_config(value: i64) -> Result<Self, GatewayError> {
        match value {
            -1 => Ok(Self::Automatic),
            v if v < 1 => Err(GatewayError::Config(format!(
                "shard_total must be -1 (automatic) or a positive count, got {v}"
            ))),
            v => u32::try_from(v)
                .map(Self::Fixed)
                .map_err(|_| GatewayError::ShardIdOverflow { value: v as u64 }),
        }
    }

    pub fn is_automatic(&self) -> bool {
        matches!(self, Self::Automatic)
    }
}

impl fmt::Display for ShardTotal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => f.write_str("automatic"),
            Self::Fixed(n) => write!(f, "{n}"),
        }
    }
}

/// Inclusive range of shard indices owned by this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRange {
    pub first: u32,
    pub last: u32,
}

impl ShardRange {
    pub fn indices(&self) -> RangeInclusive<u32> {
        self.first..=self.last
    }

    pub fn len(&self) -> usize {
        (self.last - self.first) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for ShardRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.first, self.last)
    }
}

/// Never run fewer shards than the platform mandates.
pub fn resolve_shard_total(requested: ShardTotal, recommended: u32) -> ShardTotal {
    match requested {
        ShardTotal::Fixed(n) if n < recommended => {
            info!(
                requested = n,
                recommended,
                "Cannot use less than Discord's recommended shard count, using recommended count"
            );
            ShardTotal::Fixed(recommended)
        }
        other => other,
    }
}

/// Clamp the configured min/max (`-1` = unset) into `[0, total - 1]`.
///
/// `total` must be at least 1.
pub fn resolve_range(total: u32, configured_min: i64, configured_max: i64) -> ShardRange {
    let upper = total.saturating_sub(1);

    let last = if configured_max >= 0 && configured_max < i64::from(total) {
        configured_max as u32
    } else {
        upper
    };
    let first = configured_min.clamp(0, i64::from(last)) as u32;

    ShardRange { first, last }
}

/// Transient topology computed once per startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardTopology {
    pub requested: ShardTotal,
    pub recommended_minimum: u32,
    pub resolved_total: ShardTotal,
    /// `None` while the total is automatic
    pub range: Option<ShardRange>,
}

impl ShardTopology {
    /// Apply the recommended minimum and clamp the configured range
    pub fn resolve(
        requested: ShardTotal,
        configured_min: i64,
        configured_max: i64,
        recommended: u32,
    ) -> Self {
        let resolved_total = resolve_shard_total(requested, recommended);
        let range = match resolved_total {
            ShardTotal::Fixed(total) if total > 0 => {
                Some(resolve_range(total, configured_min, configured_max))
            }
            _ => None,
        };

        Self {
            requested,
            recommended_minimum: recommended,
            resolved_total,
            range,
        }
    }

    /// Shard total handed to the gateway. Automatic uses the recommendation.
    ///
    /// Never zero: the gateway always gets at least one shard.
    pub fn connection_total(&self) -> u32 {
        match self.resolved_total {
            ShardTotal::Fixed(total) => total.max(1),
            ShardTotal::Automatic => self.recommended_minimum.max(1),
        }
    }

    /// Shard indices this process connects
    pub fn connection_range(&self) -> ShardRange {
        self.range.unwrap_or(ShardRange {
            first: 0,
            last: self.connection_total().saturating_sub(1),
        })
    }
}

/// Everything the connector needs to open the gateway
#[derive(Clone)]
pub struct ConnectionParams {
    pub token: crate::config::Token,
    pub intents: twilight_gateway::Intents,
    pub capabilities: CapabilitySet,
    pub topology: ShardTopology,
    pub activity: Option<String>,
    pub auto_reconnect: bool,
    pub large_threshold: u64,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("intents", &self.intents)
            .field("capabilities", &self.capabilities)
            .field("topology", &self.topology)
            .field("activity", &self.activity)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("large_threshold", &self.large_threshold)
            .finish_non_exhaustive()
    }
}
