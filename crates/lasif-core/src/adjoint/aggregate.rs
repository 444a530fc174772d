use crate::domain::{ChannelId, Component, LasifError, LasifResult};
use crate::windows::{AdjointSourceCalculator, WindowGroupManager};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Final three-component adjoint source of one station. All components have
/// the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct StationAdjointSource {
    pub station: String,
    pub north: Vec<f64>,
    pub east: Vec<f64>,
    pub vertical: Vec<f64>,
}

impl StationAdjointSource {
    pub fn len(&self) -> usize {
        self.vertical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertical.is_empty()
    }

    pub fn component(&self, component: Component) -> Option<&[f64]> {
        match component {
            Component::N => Some(&self.north),
            Component::E => Some(&self.east),
            Component::Z => Some(&self.vertical),
            Component::R | Component::T => None,
        }
    }
}

/// True when the signal has no variation (peak-to-peak of zero).
pub fn is_flat(signal: &[f64]) -> bool {
    let mut values = signal.iter().copied();
    let Some(first) = values.next() else {
        return true;
    };
    values.all(|value| value == first)
}

/// Weighted mean of the non-flat `(weight, signal)` contributions, scaled by
/// `scale`. `None` when nothing contributes.
pub fn combine_weighted<'a>(
    contributions: impl IntoIterator<Item = (f64, &'a [f64])>,
    scale: f64,
) -> LasifResult<Option<Vec<f64>>> {
    let mut sum: Option<Vec<f64>> = None;
    let mut total_weight = 0.0;

    for (weight, signal) in contributions {
        if is_flat(signal) {
            continue;
        }
        let accumulated = sum.get_or_insert_with(|| vec![0.0; signal.len()]);
        if accumulated.len() != signal.len() {
            return Err(LasifError::computation(
                "RUN.ADJOINT_LENGTH",
                format!(
                    "window adjoint sources differ in length ({} vs {} samples)",
                    accumulated.len(),
                    signal.len()
                ),
            ));
        }
        for (target, value) in accumulated.iter_mut().zip(signal) {
            *target += value * weight;
        }
        total_weight += weight;
    }

    match sum {
        Some(sum) if total_weight > 0.0 => Ok(Some(
            sum.into_iter()
                .map(|value| value / total_weight * scale)
                .collect(),
        )),
        _ => Ok(None),
    }
}

/// Pads missing Z/N/E components with zeros. `None` when `channels` is
/// empty; an error when the present channels differ in length.
pub fn assemble_station(
    station: &str,
    mut channels: BTreeMap<Component, Vec<f64>>,
) -> LasifResult<Option<StationAdjointSource>> {
    let Some(length) = channels.values().next().map(Vec::len) else {
        return Ok(None);
    };
    if channels.values().any(|channel| channel.len() != length) {
        let lengths: Vec<String> = channels
            .iter()
            .map(|(component, channel)| format!("{}={}", component, channel.len()))
            .collect();
        return Err(LasifError::computation(
            "RUN.ADJOINT_LENGTH",
            format!(
                "channels of station {} differ in length: {}",
                station,
                lengths.join(", ")
            ),
        ));
    }

    let mut take = |component: Component| {
        channels
            .remove(&component)
            .unwrap_or_else(|| vec![0.0; length])
    };
    Ok(Some(StationAdjointSource {
        station: station.to_string(),
        north: take(Component::N),
        east: take(Component::E),
        vertical: take(Component::Z),
    }))
}

/// Combines the windows of every channel of `station` into one adjoint
/// source per component, scaled by `scale` (event weight times station
/// weight).
pub fn aggregate_station(
    manager: &WindowGroupManager,
    station: &str,
    channel_ids: &[ChannelId],
    scale: f64,
    calculator: &dyn AdjointSourceCalculator,
) -> LasifResult<Option<StationAdjointSource>> {
    let mut channels: BTreeMap<Component, Vec<f64>> = BTreeMap::new();

    for channel_id in channel_ids {
        let Some(component) = channel_id.component().filter(|c| Component::GEOGRAPHIC.contains(c))
        else {
            warn!(channel = %channel_id, "ignoring windows on a non-geographic channel");
            continue;
        };
        if channels.contains_key(&component) {
            warn!(
                station,
                channel = %channel_id,
                "more than one channel for component {}; keeping the first one",
                component
            );
            continue;
        }

        let group = manager.get(channel_id)?;
        let mut contributions = Vec::with_capacity(group.len());
        for window in group.iter() {
            let signal = manager.get_or_compute_adjoint_source(channel_id, window, calculator)?;
            if is_flat(&signal) {
                debug!(channel = %channel_id, "discarding flat adjoint source");
                continue;
            }
            contributions.push((window.weight(), signal));
        }

        let combined = combine_weighted(
            contributions
                .iter()
                .map(|(weight, signal)| (*weight, &signal[..])),
            scale,
        )?;
        if let Some(combined) = combined {
            channels.insert(component, combined);
        }
    }

    assemble_station(station, channels)
}
