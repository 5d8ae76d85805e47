//! Decoder for compiled Studio models.
//!
//! A model is three files: the `.mdl` header, the `.vvd` vertex buffer and
//! the `.vtx` strip topology. [`AssetLoader`] reads them through an
//! [`AssetSource`](data::AssetSource) and produces a flat
//! [`ReconstructedMesh`](models::mesh::ReconstructedMesh), degrading to
//! coarser geometry when a companion file is missing or broken.

/// File access for a model and its companions
pub mod data;
/// Error and warning definitions
pub mod error;
/// Mesh writers
pub mod export;
/// The staged load state machine
pub mod loader;
/// Studio file formats
pub mod models;

#[cfg(test)]
mod fixtures;

pub use error::{AssetError, AssetFile, IndexPolicy, Warning};
pub use loader::{AssetLoader, LoadOptions, LoadReport, LoadResult, LoadState, LoadedAsset};
