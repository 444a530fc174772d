//! Weighted combination of window adjoint sources into per-station signals
//! and their solver-specific serialization.

mod aggregate;
mod formatter;

pub use aggregate::{
    StationAdjointSource, aggregate_station, assemble_station, combine_weighted, is_flat,
};
pub use formatter::{
    AdjointSourceWriter, OutputFormatter, SES3D_MANIFEST, SPECFEM_MANIFEST, Ses3dAdjointWriter,
    SpecfemAdjointWriter, render_ses3d_manifest, render_ses3d_source, render_specfem_component,
    render_stations_adjoint,
};
