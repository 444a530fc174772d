//! Core of the full-waveform inversion workflow: project and iteration
//! models, window and adjoint source bookkeeping, solver input and output
//! formats, and the task scheduler driving per-station work.

pub mod actions;
pub mod adjoint;
pub mod domain;
pub mod misfit;
pub mod rotations;
pub mod scheduler;
pub mod serialization;
pub mod sources;
pub mod specfem_fwi;
pub mod windows;
