//! # DeepGynScan Core
//!
//! Core library for the DeepGynScan cervical cytology service.
//! Provides the label taxonomy, classifier output shaping, the micrograph
//! classifier, the per-owner scan store, PDF report rendering, identity
//! checks, configuration and the HTTP router.

pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod identity;
pub mod report;
pub mod shaper;
pub mod store;
pub mod taxonomy;

// Re-export commonly used types at the crate root.
pub use api::{AppState, SharedState, router};
pub use classifier::{Classifier, ImageTensor, ModelHandle, OnnxClassifier};
pub use config::{ServiceConfig, load_config};
pub use error::{ConfigError, DeepGynError, Result};
pub use identity::{IdentityOracle, TokenIdentity};
pub use report::{RenderedReport, ReportDocument, ReportRenderer, ReportRequest};
pub use shaper::{LabelScore, PredictionResult, shape};
pub use store::{NewScan, RecordId, RecordStore, ScanRecord, SqliteRecordStore};
pub use taxonomy::{Label, RiskCategory, TAXONOMY_VERSION, category_of};
