mod manager;

pub use manager::{AdjointSignal, WindowGroupManager};

use crate::domain::{ChannelId, LasifError, LasifResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A `[starttime, endtime)` interval on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WindowRecord")]
pub struct Window {
    starttime: DateTime<Utc>,
    endtime: DateTime<Utc>,
    weight: f64,
}

#[derive(Deserialize)]
struct WindowRecord {
    starttime: DateTime<Utc>,
    endtime: DateTime<Utc>,
    #[serde(default = "default_weight")]
    weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl TryFrom<WindowRecord> for Window {
    type Error = LasifError;

    fn try_from(record: WindowRecord) -> Result<Self, Self::Error> {
        Self::new(record.starttime, record.endtime, record.weight)
    }
}

impl Window {
    pub fn new(starttime: DateTime<Utc>, endtime: DateTime<Utc>, weight: f64) -> LasifResult<Self> {
        if starttime >= endtime {
            return Err(LasifError::configuration(
                "CONFIG.WINDOW_BOUNDS",
                format!(
                    "window start {} is not before its end {}",
                    starttime.to_rfc3339(),
                    endtime.to_rfc3339()
                ),
            ));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(LasifError::configuration(
                "CONFIG.WINDOW_WEIGHT",
                format!("window weight {} must be finite and non-negative", weight),
            ));
        }
        Ok(Self {
            starttime,
            endtime,
            weight,
        })
    }

    pub fn starttime(&self) -> DateTime<Utc> {
        self.starttime
    }

    pub fn endtime(&self) -> DateTime<Utc> {
        self.endtime
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}

/// All windows picked on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowGroup {
    pub channel_id: ChannelId,
    #[serde(default)]
    pub windows: Vec<Window>,
}

impl WindowGroup {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            windows: Vec::new(),
        }
    }

    pub fn add_window(
        &mut self,
        starttime: DateTime<Utc>,
        endtime: DateTime<Utc>,
        weight: f64,
    ) -> LasifResult<()> {
        self.windows.push(Window::new(starttime, endtime, weight)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Window> {
        self.windows.iter()
    }
}

/// Computes the adjoint source of one window. Implementations may be
/// expensive; callers go through [`WindowGroupManager::get_or_compute_adjoint_source`].
pub trait AdjointSourceCalculator: Send + Sync {
    fn adjoint_source(&self, channel_id: &ChannelId, window: &Window) -> LasifResult<Vec<f64>>;
}
