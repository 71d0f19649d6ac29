//! Micrograph classifier: image preprocessing, the [`Classifier`] seam, the
//! ONNX implementation and the process-wide [`ModelHandle`].

use image::{RgbImage, imageops, imageops::FilterType};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tract_onnx::prelude::*;

use crate::config::ModelConfig;
use crate::error::{DeepGynError, Result};
use crate::shaper::{self, PredictionResult};

/// A preprocessed image: NHWC `[1, height, width, 3]`, channels scaled to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl ImageTensor {
    /// Decode an uploaded image and prepare it for a model with the given input size.
    pub fn from_bytes(bytes: &[u8], width: u32, height: u32) -> Result<Self> {
        if bytes.is_empty() {
            return Err(DeepGynError::invalid_input("uploaded image is empty"));
        }
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| DeepGynError::invalid_input(format!("cannot decode image: {e}")))?;
        Ok(Self::from_rgb(&decoded.to_rgb8(), width, height))
    }

    pub fn from_rgb(src: &RgbImage, width: u32, height: u32) -> Self {
        let resized = imageops::resize(src, width, height, FilterType::CatmullRom);
        let data = resized
            .into_raw()
            .into_iter()
            .map(|c| f32::from(c) / 255.0)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, 3]
    }
}

/// An image classifier producing one probability per canonical label.
///
/// Implementations must be callable from several threads; the returned
/// vector is aligned with [`crate::taxonomy::Label::ALL`].
pub trait Classifier: Send + Sync {
    /// Expected `(width, height)` of the input tensor.
    fn input_size(&self) -> (u32, u32);

    fn classify(&self, input: &ImageTensor) -> Result<Vec<f32>>;
}

/// Classifier backed by an ONNX export of the trained CNN, run with tract.
pub struct OnnxClassifier {
    width: u32,
    height: u32,
    plan: Mutex<TypedRunnableModel<TypedModel>>,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl OnnxClassifier {
    pub fn load(path: &Path, width: u32, height: u32) -> Result<Self> {
        let unavailable = |e: TractError| DeepGynError::ClassifierUnavailable {
            reason: format!("{}: {e}", path.display()),
        };
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(unavailable)?
            .with_input_fact(
                0,
                f32::fact([1, height as usize, width as usize, 3]).into(),
            )
            .map_err(unavailable)?
            .into_optimized()
            .map_err(unavailable)?
            .into_runnable()
            .map_err(unavailable)?;
        Ok(Self {
            width,
            height,
            plan: Mutex::new(plan),
        })
    }
}

impl Classifier for OnnxClassifier {
    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn classify(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let failed = |e: TractError| DeepGynError::InvalidOutput {
            message: format!("inference failed: {e}"),
        };
        let tensor = Tensor::from_shape(&input.shape(), &input.data).map_err(failed)?;

        let outputs = {
            let plan = self
                .plan
                .lock()
                .map_err(|_| DeepGynError::ClassifierUnavailable {
                    reason: "inference plan poisoned by an earlier panic".to_string(),
                })?;
            plan.run(tvec!(tensor.into())).map_err(failed)?
        };

        let first = outputs.first().ok_or_else(|| DeepGynError::InvalidOutput {
            message: "model produced no outputs".to_string(),
        })?;
        let view = first.to_array_view::<f32>().map_err(failed)?;
        Ok(view.iter().copied().collect())
    }
}

/// Process-wide classifier state, initialized once at startup.
#[derive(Clone)]
pub enum ModelHandle {
    Ready(Arc<dyn Classifier>),
    Unavailable { reason: String },
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelHandle::Ready(c) => f
                .debug_tuple("Ready")
                .field(&c.input_size())
                .finish(),
            ModelHandle::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

impl ModelHandle {
    /// Load the configured model. Failure is logged and recorded, never fatal.
    pub fn load(config: &ModelConfig) -> Self {
        if !config.path.exists() {
            let reason = format!("model file not found: {}", config.path.display());
            tracing::warn!(%reason, "classifier unavailable");
            return ModelHandle::Unavailable { reason };
        }
        match OnnxClassifier::load(&config.path, config.input_width, config.input_height) {
            Ok(classifier) => {
                tracing::info!(path = %config.path.display(), "model loaded");
                ModelHandle::Ready(Arc::new(classifier))
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load model");
                ModelHandle::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn from_classifier(classifier: Arc<dyn Classifier>) -> Self {
        ModelHandle::Ready(classifier)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ModelHandle::Ready(_))
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            ModelHandle::Ready(_) => None,
            ModelHandle::Unavailable { reason } => Some(reason),
        }
    }

    pub fn classifier(&self) -> Result<&Arc<dyn Classifier>> {
        match self {
            ModelHandle::Ready(c) => Ok(c),
            ModelHandle::Unavailable { reason } => Err(DeepGynError::ClassifierUnavailable {
                reason: reason.clone(),
            }),
        }
    }

    /// Decode, classify and shape one uploaded image. Blocking.
    pub fn analyze(&self, image_bytes: &[u8]) -> Result<PredictionResult> {
        let classifier = self.classifier()?;
        let (width, height) = classifier.input_size();
        let input = ImageTensor::from_bytes(image_bytes, width, height)?;
        let probabilities = classifier.classify(&input)?;
        shaper::shape_f32(&probabilities)
    }
}
