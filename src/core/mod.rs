//! Core processing: the pixel-grid model, cloud masking, the spectral index
//! engine, zonal extraction, run configuration, and the staged batch
//! orchestrator that ties them together.
pub mod config;
pub mod grid;
pub mod indices;
pub mod mask;
pub mod orchestrator;
pub mod zonal;
