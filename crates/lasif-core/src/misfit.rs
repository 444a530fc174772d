use crate::domain::{
    ChannelId, Event, Iteration, LasifError, LasifResult, Trace, select_component,
};
use crate::sources::WaveformArchive;
use crate::windows::{AdjointSourceCalculator, Window};
use std::f64::consts::PI;

/// Fraction of the window tapered at each end.
const TAPER_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct MisfitResult {
    pub misfit_value: f64,
    /// Full trace length, zero outside the window, already time-reversed.
    pub adjoint_source: Vec<f64>,
}

pub trait MisfitFunction: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(
        &self,
        observed: &Trace,
        synthetic: &Trace,
        window: &Window,
        min_period: f64,
        max_period: f64,
    ) -> LasifResult<MisfitResult>;
}

/// L2 norm of the tapered waveform residual inside the window.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaveformDifferenceMisfit;

impl MisfitFunction for WaveformDifferenceMisfit {
    fn name(&self) -> &'static str {
        "waveform_difference"
    }

    fn evaluate(
        &self,
        observed: &Trace,
        synthetic: &Trace,
        window: &Window,
        _min_period: f64,
        _max_period: f64,
    ) -> LasifResult<MisfitResult> {
        check_sampling(observed, synthetic)?;

        let dt = observed.delta;
        let first = (observed.offset_of(window.starttime()) / dt).ceil().max(0.0) as usize;
        let last = ((observed.offset_of(window.endtime()) / dt).ceil().max(0.0) as usize)
            .min(observed.len());
        if last <= first {
            return Err(LasifError::computation(
                "RUN.MISFIT_WINDOW",
                format!(
                    "window {} - {} contains no samples of {}",
                    window.starttime().to_rfc3339(),
                    window.endtime().to_rfc3339(),
                    observed.channel_id
                ),
            ));
        }

        let taper = cosine_taper(last - first, TAPER_FRACTION);
        let mut misfit_value = 0.0;
        let mut adjoint_source = vec![0.0; observed.len()];
        for (offset, weight) in taper.iter().enumerate() {
            let index = first + offset;
            let residual = (observed.data[index] - synthetic.data[index]) * weight;
            misfit_value += 0.5 * residual * residual * dt;
            adjoint_source[index] = residual * weight;
        }
        adjoint_source.reverse();

        Ok(MisfitResult {
            misfit_value,
            adjoint_source,
        })
    }
}

fn check_sampling(observed: &Trace, synthetic: &Trace) -> LasifResult<()> {
    let same_delta = (observed.delta - synthetic.delta).abs() <= 1.0e-9 * observed.delta.abs();
    if !same_delta
        || observed.len() != synthetic.len()
        || observed.starttime != synthetic.starttime
        || observed.delta <= 0.0
    {
        return Err(LasifError::computation(
            "RUN.MISFIT_SAMPLING",
            format!(
                "observed {} ({} samples, dt={}) and synthetic {} ({} samples, dt={}) are not \
                 sampled identically",
                observed.channel_id,
                observed.len(),
                observed.delta,
                synthetic.channel_id,
                synthetic.len(),
                synthetic.delta
            ),
        ));
    }
    Ok(())
}

/// Tukey window of `len` samples with cosine flanks covering `fraction` of
/// the length at each end.
fn cosine_taper(len: usize, fraction: f64) -> Vec<f64> {
    let flank = ((len as f64) * fraction).floor() as usize;
    (0..len)
        .map(|index| {
            let distance = index.min(len - 1 - index);
            if flank == 0 || distance >= flank {
                1.0
            } else {
                0.5 * (1.0 - (PI * distance as f64 / flank as f64).cos())
            }
        })
        .collect()
}

/// Computes window adjoint sources from the archived waveforms of one event
/// and iteration.
pub struct MisfitAdjointCalculator<'a> {
    event: &'a Event,
    iteration: &'a Iteration,
    archive: &'a dyn WaveformArchive,
    misfit: &'a dyn MisfitFunction,
}

impl<'a> MisfitAdjointCalculator<'a> {
    pub fn new(
        event: &'a Event,
        iteration: &'a Iteration,
        archive: &'a dyn WaveformArchive,
        misfit: &'a dyn MisfitFunction,
    ) -> Self {
        Self {
            event,
            iteration,
            archive,
            misfit,
        }
    }
}

impl AdjointSourceCalculator for MisfitAdjointCalculator<'_> {
    fn adjoint_source(&self, channel_id: &ChannelId, window: &Window) -> LasifResult<Vec<f64>> {
        let component = channel_id.component().ok_or_else(|| {
            LasifError::configuration(
                "CONFIG.COMPONENT",
                format!("channel {} has no known component", channel_id),
            )
        })?;
        let waveforms =
            self.archive
                .matching_waveforms(self.event, self.iteration, &channel_id.station())?;
        let observed = select_component(&waveforms.data, component)?;
        let synthetic = select_component(&waveforms.synthetics, component)?;

        let result = self.misfit.evaluate(
            observed,
            synthetic,
            window,
            self.iteration.minimum_period(),
            self.iteration.maximum_period(),
        )?;
        Ok(result.adjoint_source)
    }
}
