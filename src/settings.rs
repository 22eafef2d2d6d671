//! RHI Settings
//!
//! Configuration for the transient resource pool and for the wgpu backend.
//!
//! ```rust,ignore
//! use myth_rhi::settings::{PoolSettings, RhiSettings};
//!
//! let settings = RhiSettings {
//!     pool: PoolSettings { max_idle_seconds: 2.0 },
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

/// Default idle time after which a pooled resource is destroyed, in seconds.
pub const DEFAULT_MAX_IDLE_SECONDS: f32 = 1.0;

/// Transient pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// A released resource is destroyed once its accumulated idle time
    /// becomes strictly greater than this value.
    pub max_idle_seconds: f32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_idle_seconds: DEFAULT_MAX_IDLE_SECONDS,
        }
    }
}

/// Device creation settings for the wgpu backend.
#[derive(Debug, Clone)]
pub struct RhiSettings {
    #[cfg(feature = "wgpu")]
    pub power_preference: wgpu::PowerPreference,
    #[cfg(feature = "wgpu")]
    pub required_features: wgpu::Features,
    #[cfg(feature = "wgpu")]
    pub required_limits: wgpu::Limits,
    pub pool: PoolSettings,
}

impl Default for RhiSettings {
    fn default() -> Self {
        Self {
            #[cfg(feature = "wgpu")]
            power_preference: wgpu::PowerPreference::HighPerformance,
            #[cfg(feature = "wgpu")]
            required_features: wgpu::Features::empty(),
            #[cfg(feature = "wgpu")]
            required_limits: wgpu::Limits::default(),
            pool: PoolSettings::default(),
        }
    }
}
