//! Depth-Alignment and Prediction Pipeline
//!
//! ```text
//! STAGE 1: Lithology filter   (well-log rows whose code the core table lacks are dropped)
//! STAGE 2: Depth alignment    (curves interpolated at each core depth)
//! STAGE 3: Dataset assembly   (selection, null drop, rare-class replication, split)
//! STAGE 4: Feature encoding   (train-only scaler fit, lithology indicators)
//! STAGE 5: Training           (one of six strategies, seeded)
//! STAGE 6: Derived properties (transverse conductivity from anisotropy)
//! STAGE 7: Export             (depth-indexed CSV per property, JSON run report)
//! ```
//!
//! `PipelineSession` drives the stages in order and owns every artifact.

pub mod aligner;
pub mod assembler;
pub mod derived;
pub mod encoder;
pub mod session;

pub use aligner::{filter_lithology, interpolate, DepthAligner, LithologySummary};
pub use assembler::{AssembledDataset, AssemblyRequest, DatasetAssembler, SplitPart};
pub use derived::{transverse_conductivity, AxialSource, DerivedPropertyResolver};
pub use encoder::{EncodedFeatures, FeatureEncoder, LithologyEncoding, Scaler};
pub use session::{PipelineSession, PreparedData, RunOutcome, Stage};
