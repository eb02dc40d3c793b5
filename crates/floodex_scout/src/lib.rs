//! Floodex Scout - Flood Product Discovery & Selection
//!
//! Scout finds the flood-extent rasters of an event in a multi-period
//! archive, narrows them down to the event's area of interest, and keeps a
//! resumable ledger of what each (event, algorithm) pair produced.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────┐   ┌─────────────┐   ┌───────────┐
//! │  Catalog  │──▶│ Layout +     │──▶│  Dataset  │──▶│ AOI         │──▶│ Metrics / │
//! │  (event)  │   │ Indexer      │   │  builder  │   │ selector    │   │ Retrieval │
//! └───────────┘   └──────────────┘   └───────────┘   └─────────────┘   └─────┬─────┘
//!                                                                            │
//!                                       ┌──────────┐   ┌─────────┐           │
//!                                       │  Ledger  │◀──│ Markers │◀──────────┘
//!                                       └──────────┘   └─────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Storage period**: a date range mapped to one archive root and layout version
//! - **Algorithm**: flood-detection provider; picks filename tags and sub-root
//! - **Grammar**: fixed-width filename fields per (algorithm, layer, version)
//! - **Selection ladder**: exact → simplified → bounding box, then a sanity check
//! - **Ledger**: per event, per algorithm status, rewritten as a whole

pub mod aoi;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod error;
pub mod grammar;
pub mod index;
pub mod layout;
pub mod ledger;
pub mod markers;
pub mod metrics;
pub mod pipeline;
pub mod raster;
pub mod register;
pub mod results;
pub mod retrieve;
pub mod spatial;
pub mod types;

// Re-exports for convenience
pub use aoi::{AoiSelection, AoiSelector, AoiSource, EventAoi, GeoJsonAoiSource, SelectionStage};
pub use catalog::{load_catalog, CatalogFilter};
pub use classify::classify;
pub use config::{FloodexConfig, MAX_BUFFER_DAYS};
pub use error::{FloodexError, RasterReadError, Result, SelectionError};
pub use grammar::GrammarTable;
pub use index::Indexer;
pub use layout::{LayoutRoot, LayoutVersion, StorageLayout, StoragePeriod, Sublayout};
pub use ledger::{FlushPolicy, Ledger};
pub use markers::{IndicatorDir, ResumeMarkers};
pub use metrics::{MetricsExtractor, ProcessingMode};
pub use pipeline::{BatchRunner, BatchSummary, EventReport, ExtentProcessor, PairOutcome, PairProcessor};
pub use raster::{PixelCounter, TiffPixelCounter};
pub use register::{FileRegister, FileRegisterBuilder, TileIndex};
pub use retrieve::LayersProcessor;
pub use spatial::{DatasetBuilder, SpatialDataset, SpatialRef};
pub use types::{Algorithm, FloodEvent, Layer, LayerImageSet, ProcessingStatus};
