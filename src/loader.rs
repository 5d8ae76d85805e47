//! Staged loading of a model with graceful degradation.
//!
//! [`AssetLoader::load`] walks a fixed state machine:
//!
//! ```text
//! Unloaded → HeaderParsed → HeaderValidated → VerticesLoaded → TopologyLoaded → MeshBuilt
//!     │            │               │                 │
//!     └──→ Failed ←┘               └→ BoundingBox    └→ NaiveFallback
//!                                     Fallback
//! ```
//!
//! Only problems with the primary file are fatal. A missing or unusable
//! vertex file degrades to a box over the header's hull; a missing or
//! unusable topology file degrades to triangles guessed from vertex order.
//! Every degradation is recorded as a [`Warning`].

use std::fmt;

use bon::Builder;
use glam::Vec3;
use itertools::Itertools;
use rootcause::Report;
use tracing::{debug, info, info_span, warn};

use crate::data::AssetSource;
use crate::error::{AssetError, AssetFile, IndexPolicy, Warning};
use crate::models::fallback::{bounding_box, naive_triangles};
use crate::models::header::{
    AssetHeader, BodyPart, Bone, Texture, parse_body_parts, parse_bones, parse_texture_dirs,
    parse_textures, read_header,
};
use crate::models::limits::DEGENERATE_EPSILON;
use crate::models::mesh::{BuildStats, ReconstructedMesh, build_mesh, validate_scale};
#[cfg(feature = "topology")]
use crate::models::topology::{TopologyContext, parse_topology};
use crate::models::vertex::{VertexBuffer, parse_vertices};

/// Knobs for a single load.
#[derive(Debug, Clone, Copy, PartialEq, Builder)]
pub struct LoadOptions {
    /// Multiplier applied to every output position.
    #[builder(default = 1.0)]
    pub scale: f32,
    #[builder(default)]
    pub index_policy: IndexPolicy,
    /// Triangles whose edge cross product is at or below this are dropped.
    #[builder(default = DEGENERATE_EPSILON)]
    pub degenerate_epsilon: f32,
    /// Decode the topology file. When off, triangles are always guessed.
    #[builder(default = true)]
    pub topology: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum LoadState {
    Unloaded,
    HeaderParsed,
    HeaderValidated,
    VerticesLoaded,
    TopologyLoaded,
    MeshBuilt,
    BoundingBoxFallback,
    NaiveFallback,
    Failed,
}

impl LoadState {
    pub fn can_transition_to(self, next: LoadState) -> bool {
        use LoadState::*;
        matches!(
            (self, next),
            (Unloaded, HeaderParsed)
                | (Unloaded, Failed)
                | (HeaderParsed, HeaderValidated)
                | (HeaderParsed, Failed)
                | (HeaderValidated, VerticesLoaded)
                | (HeaderValidated, BoundingBoxFallback)
                | (VerticesLoaded, TopologyLoaded)
                | (VerticesLoaded, NaiveFallback)
                | (TopologyLoaded, MeshBuilt)
        )
    }

    /// States that end a load with a usable mesh.
    pub fn is_ready(self) -> bool {
        matches!(
            self,
            LoadState::MeshBuilt | LoadState::BoundingBoxFallback | LoadState::NaiveFallback
        )
    }

    pub fn is_terminal(self) -> bool {
        self.is_ready() || self == LoadState::Failed
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which tier produced the final mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MeshOrigin {
    Topology,
    Naive,
    BoundingBox,
}

impl fmt::Display for MeshOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MeshOrigin::Topology => "topology",
            MeshOrigin::Naive => "naive",
            MeshOrigin::BoundingBox => "bounding box",
        })
    }
}

/// A successfully loaded model and everything learned along the way.
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    pub name: String,
    pub mesh: ReconstructedMesh,
    pub origin: MeshOrigin,
    pub header: AssetHeader,
    pub textures: Vec<Texture>,
    pub texture_dirs: Vec<String>,
    pub bones: Vec<Bone>,
    pub body_parts: Vec<BodyPart>,
    pub warnings: Vec<Warning>,
    pub states: Vec<LoadState>,
}

impl LoadedAsset {
    pub fn state(&self) -> LoadState {
        self.states.last().copied().unwrap_or(LoadState::Unloaded)
    }

    pub fn report(&self) -> LoadReport {
        LoadReport {
            asset: self.name.clone(),
            state: self.state(),
            origin: Some(self.origin),
            model_name: Some(self.header.name.clone()),
            version: Some(self.header.version),
            vertices: self.mesh.vertex_count(),
            triangles: self.mesh.triangle_count(),
            scale: self.mesh.scale(),
            textures: self.textures.iter().map(|t| t.name.clone()).collect(),
            bones: self.bones.len(),
            body_parts: self.body_parts.len(),
            states: self.states.clone(),
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
            error: None,
        }
    }
}

/// A load that could not produce any mesh.
#[derive(Debug)]
pub struct LoadFailure {
    pub name: String,
    /// The last state reached before failing.
    pub reached: LoadState,
    pub reason: Report<AssetError>,
    pub warnings: Vec<Warning>,
    pub states: Vec<LoadState>,
}

impl LoadFailure {
    pub fn report(&self) -> LoadReport {
        LoadReport {
            asset: self.name.clone(),
            state: LoadState::Failed,
            origin: None,
            model_name: None,
            version: None,
            vertices: 0,
            triangles: 0,
            scale: 0.0,
            textures: Vec::new(),
            bones: 0,
            body_parts: 0,
            states: self.states.clone(),
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
            error: Some(self.reason.current_context().to_string()),
        }
    }
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: failed after {}: {}",
            self.name,
            self.reached,
            self.reason.current_context()
        )
    }
}

#[derive(Debug)]
pub enum LoadResult {
    Ready(Box<LoadedAsset>),
    Failed(LoadFailure),
}

impl LoadResult {
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadResult::Ready(_))
    }

    pub fn asset(&self) -> Option<&LoadedAsset> {
        match self {
            LoadResult::Ready(asset) => Some(asset),
            LoadResult::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&LoadFailure> {
        match self {
            LoadResult::Ready(_) => None,
            LoadResult::Failed(failure) => Some(failure),
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        match self {
            LoadResult::Ready(asset) => &asset.warnings,
            LoadResult::Failed(failure) => &failure.warnings,
        }
    }

    pub fn states(&self) -> &[LoadState] {
        match self {
            LoadResult::Ready(asset) => &asset.states,
            LoadResult::Failed(failure) => &failure.states,
        }
    }

    pub fn report(&self) -> LoadReport {
        match self {
            LoadResult::Ready(asset) => asset.report(),
            LoadResult::Failed(failure) => failure.report(),
        }
    }

    pub fn into_result(self) -> Result<LoadedAsset, LoadFailure> {
        match self {
            LoadResult::Ready(asset) => Ok(*asset),
            LoadResult::Failed(failure) => Err(failure),
        }
    }
}

/// Human-readable summary of a load.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LoadReport {
    pub asset: String,
    pub state: LoadState,
    pub origin: Option<MeshOrigin>,
    pub model_name: Option<String>,
    pub version: Option<i32>,
    pub vertices: usize,
    pub triangles: usize,
    pub scale: f32,
    pub textures: Vec<String>,
    pub bones: usize,
    pub body_parts: usize,
    pub states: Vec<LoadState>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.asset, self.state)?;
        if let Some(origin) = self.origin {
            write!(f, " ({origin} mesh)")?;
        }
        writeln!(f)?;
        if let (Some(name), Some(version)) = (&self.model_name, self.version) {
            writeln!(f, "  model:      {name} (version {version})")?;
        }
        if self.origin.is_some() {
            writeln!(
                f,
                "  mesh:       {} vertices, {} triangles, scale {}",
                self.vertices, self.triangles, self.scale
            )?;
            writeln!(
                f,
                "  metadata:   {} textures, {} bones, {} body parts",
                self.textures.len(),
                self.bones,
                self.body_parts
            )?;
        }
        writeln!(f, "  states:     {}", self.states.iter().join(" → "))?;
        if let Some(error) = &self.error {
            writeln!(f, "  error:      {error}")?;
        }
        for warning in &self.warnings {
            writeln!(f, "  warning:    {warning}")?;
        }
        Ok(())
    }
}

/// Tracks the state machine and warnings of one load.
struct Progress {
    name: String,
    state: LoadState,
    states: Vec<LoadState>,
    warnings: Vec<Warning>,
}

impl Progress {
    fn new(name: String) -> Self {
        Self {
            name,
            state: LoadState::Unloaded,
            states: vec![LoadState::Unloaded],
            warnings: Vec::new(),
        }
    }

    fn advance(&mut self, next: LoadState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid load transition {} -> {next}",
            self.state
        );
        debug!(from = %self.state, to = %next, "load state");
        self.state = next;
        self.states.push(next);
    }

    fn warn(&mut self, warning: Warning) {
        warn!(%warning, "load degraded");
        self.warnings.push(warning);
    }

    fn reject(&mut self, file: AssetFile, reason: impl Into<String>) {
        self.warn(Warning::CompanionRejected {
            file,
            reason: reason.into(),
        });
    }

    fn fail(mut self, reason: Report<AssetError>) -> LoadResult {
        let reached = self.state;
        warn!(asset = %self.name, state = %reached, error = %reason.current_context(), "load failed");
        self.advance(LoadState::Failed);
        LoadResult::Failed(LoadFailure {
            name: self.name,
            reached,
            reason,
            warnings: self.warnings,
            states: self.states,
        })
    }
}

/// Header-side data gathered before the companions are touched.
struct Metadata {
    header: AssetHeader,
    textures: Vec<Texture>,
    texture_dirs: Vec<String>,
    bones: Vec<Bone>,
    body_parts: Vec<BodyPart>,
}

/// Loads one model from an [`AssetSource`].
#[derive(Debug, Clone)]
pub struct AssetLoader<S> {
    source: S,
    options: LoadOptions,
}

impl<S: AssetSource> AssetLoader<S> {
    pub fn new(source: S) -> Self {
        Self::with_options(source, LoadOptions::default())
    }

    pub fn with_options(source: S, options: LoadOptions) -> Self {
        Self { source, options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run the full pipeline. Never panics on malformed input.
    pub fn load(&self) -> LoadResult {
        let name = self.source.describe();
        let span = info_span!("load", asset = %name);
        let _enter = span.enter();
        let mut progress = Progress::new(name);

        if let Err(reason) = validate_scale(self.options.scale) {
            return progress.fail(reason);
        }

        let metadata = match self.load_primary(&mut progress) {
            Ok(metadata) => metadata,
            Err(reason) => return progress.fail(reason),
        };

        let Some(vertices) = self.load_vertices(&metadata.header, &mut progress) else {
            let (mesh, warning) = bounding_box(&metadata.header, self.options.scale);
            if let Some(warning) = warning {
                progress.warn(warning);
            }
            progress.advance(LoadState::BoundingBoxFallback);
            return self.ready(progress, metadata, mesh, MeshOrigin::BoundingBox);
        };
        progress.advance(LoadState::VerticesLoaded);
        let positions: Vec<Vec3> = vertices.positions().collect();
        drop(vertices);

        if let Some((mesh, stats)) = self.load_topology(&metadata, &positions, &mut progress) {
            progress.advance(LoadState::TopologyLoaded);
            if stats.degenerate > 0 {
                progress.warn(Warning::DegenerateTriangles {
                    dropped: stats.degenerate,
                });
            }
            progress.advance(LoadState::MeshBuilt);
            return self.ready(progress, metadata, mesh, MeshOrigin::Topology);
        }

        progress.warn(Warning::NaiveTopology);
        let triangles = naive_triangles(
            &positions,
            &metadata.body_parts,
            self.options.degenerate_epsilon,
        );
        let (mesh, _) = build_mesh(
            &positions,
            &triangles,
            self.options.scale,
            self.options.degenerate_epsilon,
        );
        progress.advance(LoadState::NaiveFallback);
        self.ready(progress, metadata, mesh, MeshOrigin::Naive)
    }

    fn ready(
        &self,
        progress: Progress,
        metadata: Metadata,
        mesh: ReconstructedMesh,
        origin: MeshOrigin,
    ) -> LoadResult {
        info!(
            state = %progress.state,
            %origin,
            vertices = mesh.vertex_count(),
            triangles = mesh.triangle_count(),
            warnings = progress.warnings.len(),
            "model loaded"
        );
        LoadResult::Ready(Box::new(LoadedAsset {
            name: progress.name,
            mesh,
            origin,
            header: metadata.header,
            textures: metadata.textures,
            texture_dirs: metadata.texture_dirs,
            bones: metadata.bones,
            body_parts: metadata.body_parts,
            warnings: progress.warnings,
            states: progress.states,
        }))
    }

    fn load_primary(&self, progress: &mut Progress) -> Result<Metadata, Report<AssetError>> {
        let file = match self.source.open(AssetFile::Model) {
            Ok(Some(file)) => file,
            Ok(None) => {
                return Err(Report::new(AssetError::Missing {
                    file: AssetFile::Model,
                }));
            }
            Err(source) => {
                return Err(Report::new(AssetError::Io {
                    file: AssetFile::Model,
                    source,
                }));
            }
        };
        let bytes = file.as_ref();

        let header = read_header(bytes)?;
        progress.advance(LoadState::HeaderParsed);
        header.validate()?;
        progress.advance(LoadState::HeaderValidated);

        let warnings = &mut progress.warnings;
        let textures = parse_textures(bytes, &header, warnings);
        let texture_dirs = parse_texture_dirs(bytes, &header, warnings);
        let bones = parse_bones(bytes, &header, warnings);
        let body_parts = parse_body_parts(bytes, &header, warnings);
        debug!(
            textures = textures.len(),
            bones = bones.len(),
            body_parts = body_parts.len(),
            "header tables decoded"
        );

        Ok(Metadata {
            header,
            textures,
            texture_dirs,
            bones,
            body_parts,
        })
    }

    fn load_vertices(&self, header: &AssetHeader, progress: &mut Progress) -> Option<VertexBuffer> {
        let file = match self.source.open(AssetFile::Vertices) {
            Ok(Some(file)) => file,
            Ok(None) => {
                progress.warn(Warning::CompanionMissing {
                    file: AssetFile::Vertices,
                });
                return None;
            }
            Err(e) => {
                progress.reject(AssetFile::Vertices, e.to_string());
                return None;
            }
        };

        match parse_vertices(file.as_ref(), header.checksum, &mut progress.warnings) {
            Ok(buffer) if buffer.is_empty() => {
                progress.reject(AssetFile::Vertices, "no vertices");
                None
            }
            Ok(buffer) => Some(buffer),
            Err(report) => {
                progress.reject(AssetFile::Vertices, report.current_context().to_string());
                None
            }
        }
    }

    /// Decode and build the topology mesh. `None` means the naive tier must
    /// take over; the reason has already been recorded.
    #[cfg(feature = "topology")]
    fn load_topology(
        &self,
        metadata: &Metadata,
        positions: &[Vec3],
        progress: &mut Progress,
    ) -> Option<(ReconstructedMesh, BuildStats)> {
        if !self.options.topology {
            debug!("topology decoding disabled");
            return None;
        }

        let file = match self.source.open(AssetFile::Topology) {
            Ok(Some(file)) => file,
            Ok(None) => {
                progress.warn(Warning::CompanionMissing {
                    file: AssetFile::Topology,
                });
                return None;
            }
            Err(e) => {
                progress.reject(AssetFile::Topology, e.to_string());
                return None;
            }
        };

        let context = TopologyContext {
            model_version: metadata.header.version,
            body_parts: &metadata.body_parts,
            index_policy: self.options.index_policy,
        };
        let list = match parse_topology(
            file.as_ref(),
            metadata.header.checksum,
            positions.len(),
            &context,
            &mut progress.warnings,
        ) {
            Ok(list) => list,
            Err(report) => {
                progress.reject(AssetFile::Topology, report.current_context().to_string());
                return None;
            }
        };
        drop(file);

        let (mesh, stats) = build_mesh(
            positions,
            &list.triangles,
            self.options.scale,
            self.options.degenerate_epsilon,
        );
        if mesh.is_empty() {
            progress.reject(AssetFile::Topology, "no usable triangles");
            return None;
        }
        Some((mesh, stats))
    }

    #[cfg(not(feature = "topology"))]
    fn load_topology(
        &self,
        _metadata: &Metadata,
        _positions: &[Vec3],
        _progress: &mut Progress,
    ) -> Option<(ReconstructedMesh, BuildStats)> {
        None
    }
}
