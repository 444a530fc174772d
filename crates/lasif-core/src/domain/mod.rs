pub mod errors;
pub mod iteration;
pub mod project;

pub use errors::{LasifError, LasifErrorCategory, LasifResult};
pub use iteration::{
    Iteration, IterationEvent, IterationStation, ProcessParams, SimulationType, SolverFamily,
    SolverSettings,
};
pub use project::{Domain, LocationPolicy, ProjectConfig, ProjectPaths};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Component {
    E,
    N,
    Z,
    R,
    T,
}

impl Component {
    /// Components that exist in the recorded (geographic) frame.
    pub const GEOGRAPHIC: [Component; 3] = [Component::E, Component::N, Component::Z];

    pub fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_uppercase() {
            'E' => Some(Self::E),
            'N' => Some(Self::N),
            'Z' => Some(Self::Z),
            'R' => Some(Self::R),
            'T' => Some(Self::T),
            _ => None,
        }
    }

    pub fn parse(token: &str) -> LasifResult<Self> {
        let mut chars = token.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) => Self::from_code(code).ok_or_else(|| unknown_component(token)),
            _ => Err(unknown_component(token)),
        }
    }

    pub const fn code(self) -> char {
        match self {
            Self::E => 'E',
            Self::N => 'N',
            Self::Z => 'Z',
            Self::R => 'R',
            Self::T => 'T',
        }
    }
}

fn unknown_component(token: &str) -> LasifError {
    LasifError::configuration(
        "CONFIG.COMPONENT",
        format!(
            "Component {} in not within the list: 'E', 'N', 'Z', 'R', 'T'",
            token
        ),
    )
}

impl Display for Component {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// `NET.STA.LOC.CHA` identifier of one recorded channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId {
    network: String,
    station: String,
    location: String,
    channel: String,
}

impl ChannelId {
    pub fn parse(value: &str) -> LasifResult<Self> {
        let parts: Vec<&str> = value.split('.').collect();
        if parts.len() != 4 || parts[0].is_empty() || parts[1].is_empty() || parts[3].is_empty()
        {
            return Err(LasifError::configuration(
                "CONFIG.CHANNEL_ID",
                format!(
                    "channel id '{}' is not of the form NET.STA.LOC.CHA",
                    value
                ),
            ));
        }

        Ok(Self {
            network: parts[0].to_string(),
            station: parts[1].to_string(),
            location: parts[2].to_string(),
            channel: parts[3].to_string(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// The `NET.STA` station id this channel belongs to.
    pub fn station(&self) -> String {
        format!("{}.{}", self.network, self.station)
    }

    /// Trailing letter of the channel code.
    pub fn component_code(&self) -> char {
        self.channel.chars().last().unwrap_or(' ')
    }

    pub fn component(&self) -> Option<Component> {
        Component::from_code(self.component_code())
    }

    pub fn with_component(&self, component: Component) -> Self {
        let mut channel = self.channel.clone();
        channel.pop();
        channel.push(component.code());
        Self {
            channel,
            ..self.clone()
        }
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

impl TryFrom<String> for ChannelId {
    type Error = LasifError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChannelId> for String {
    fn from(value: ChannelId) -> Self {
        value.to_string()
    }
}

/// Splits a `NET.STA` station id into network and station codes.
pub fn split_station_id(station: &str) -> (&str, &str) {
    station.split_once('.').unwrap_or(("", station))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_name: String,
    pub origin_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub depth_in_km: f64,
    #[serde(default)]
    pub magnitude: f64,
    #[serde(default)]
    pub magnitude_type: String,
    #[serde(default)]
    pub moment_tensor: MomentTensor,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MomentTensor {
    pub m_rr: f64,
    pub m_tt: f64,
    pub m_pp: f64,
    pub m_rt: f64,
    pub m_rp: f64,
    pub m_tp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StationCoordinates {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation_in_m: f64,
    #[serde(default)]
    pub local_depth_in_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub channel_id: ChannelId,
    pub starttime: DateTime<Utc>,
    pub delta: f64,
    pub data: Vec<f64>,
}

impl Trace {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Seconds elapsed between the first sample and `time`.
    pub fn offset_of(&self, time: DateTime<Utc>) -> f64 {
        seconds(time.signed_duration_since(self.starttime))
    }

    pub fn endtime(&self) -> DateTime<Utc> {
        let span = self.delta * self.data.len().saturating_sub(1) as f64;
        self.starttime + TimeDelta::nanoseconds((span * 1.0e9).round() as i64)
    }
}

pub fn seconds(delta: TimeDelta) -> f64 {
    delta.num_seconds() as f64 + f64::from(delta.subsec_nanos()) * 1.0e-9
}

/// Observed and synthetic traces of one station for one event and iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedWaveforms {
    pub data: Vec<Trace>,
    pub synthetics: Vec<Trace>,
    pub coordinates: StationCoordinates,
}

/// Picks the trace whose channel code ends in `component`.
pub fn select_component(traces: &[Trace], component: Component) -> LasifResult<&Trace> {
    traces
        .iter()
        .find(|trace| trace.channel_id.component() == Some(component))
        .ok_or_else(|| {
            LasifError::not_found(
                "DATA.COMPONENT",
                format!("Component {} not found in stream.", component),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::{ChannelId, Component, Trace, select_component, split_station_id};
    use crate::domain::LasifErrorCategory;
    use chrono::{TimeZone, Utc};

    #[test]
    fn channel_id_exposes_station_and_component() {
        let id = ChannelId::parse("BW.FURT..BHZ").expect("channel id should parse");

        assert_eq!(id.station(), "BW.FURT");
        assert_eq!(id.location(), "");
        assert_eq!(id.component(), Some(Component::Z));
        assert_eq!(id.to_string(), "BW.FURT..BHZ");
        assert_eq!(
            id.with_component(Component::R).to_string(),
            "BW.FURT..BHR"
        );
    }

    #[test]
    fn malformed_channel_ids_are_rejected() {
        for value in ["", "BW.FURT", "BW..00.BHZ", "BW.FURT.00."] {
            let error = ChannelId::parse(value).expect_err("malformed id should fail");
            assert_eq!(error.category(), LasifErrorCategory::Configuration);
        }
    }

    #[test]
    fn component_parsing_rejects_unknown_codes() {
        assert_eq!(Component::parse("z").expect("z is valid"), Component::Z);
        assert!(Component::parse("X").is_err());
        assert!(Component::parse("ZN").is_err());
    }

    #[test]
    fn station_id_splits_into_network_and_station() {
        assert_eq!(split_station_id("IU.ANMO"), ("IU", "ANMO"));
    }

    #[test]
    fn select_component_reports_missing_channels_as_not_found() {
        let trace = Trace {
            channel_id: ChannelId::parse("IU.ANMO.00.BHN").expect("valid id"),
            starttime: Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap(),
            delta: 0.5,
            data: vec![0.0; 5],
        };
        let traces = vec![trace];

        assert!(select_component(&traces, Component::N).is_ok());
        let error = select_component(&traces, Component::Z).expect_err("Z is absent");
        assert_eq!(error.category(), LasifErrorCategory::NotFound);
    }

    #[test]
    fn trace_offsets_are_measured_in_seconds() {
        let start = Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap();
        let trace = Trace {
            channel_id: ChannelId::parse("IU.ANMO.00.BHZ").expect("valid id"),
            starttime: start,
            delta: 0.5,
            data: vec![0.0; 11],
        };

        assert_eq!(trace.endtime(), start + chrono::TimeDelta::seconds(5));
        assert!((trace.offset_of(start + chrono::TimeDelta::milliseconds(2500)) - 2.5).abs() < 1e-12);
    }
}
