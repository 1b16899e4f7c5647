//! Object detection: the `Detector` contract, its backends and post-processing.

mod backend;
mod backends;
#[cfg_attr(not(feature = "backend-tract"), allow(dead_code))]
mod nms;
mod registry;
mod result;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;

pub use backend::Detector;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use nms::{bbox_iou, non_max_suppression, NMS_IOU_THRESHOLD};
pub use registry::BackendRegistry;
pub use result::{Detection, DetectionFilter, PriorityClasses};

/// Build the configured detector and warm it up.
///
/// The stub backend is always registered. When the configured backend cannot be
/// constructed and `fallback_to_stub` is set, the stub is used instead; otherwise
/// the failure is a startup error.
pub fn open_detector(settings: &DetectorSettings) -> Result<Box<dyn Detector>> {
    let filter = DetectionFilter::new(
        settings.confidence_threshold,
        PriorityClasses::new(&settings.priority_objects),
    );
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new(settings.stub_class.clone(), filter.clone()));

    if settings.backend != "stub" {
        match build_model_backend(settings, filter) {
            Ok(backend) => registry.register_boxed(backend),
            Err(err) if settings.fallback_to_stub => {
                log::warn!(
                    "detector backend '{}' unavailable, using stub: {:#}",
                    settings.backend,
                    err
                );
            }
            Err(err) => return Err(err),
        }
    }

    let chosen = if registry.contains(&settings.backend) {
        settings.backend.as_str()
    } else {
        "stub"
    };
    let mut detector = registry.take(chosen)?;
    detector.warm_up()?;
    log::info!("detector backend: {}", detector.name());
    Ok(detector)
}

#[cfg(feature = "backend-tract")]
fn build_model_backend(
    settings: &DetectorSettings,
    filter: DetectionFilter,
) -> Result<Box<dyn Detector>> {
    if settings.backend != "tract" {
        return Err(anyhow!("unknown detector backend '{}'", settings.backend));
    }
    let model = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("detector.model_path is required for the tract backend"))?;
    let labels = settings
        .labels_path
        .as_ref()
        .ok_or_else(|| anyhow!("detector.labels_path is required for the tract backend"))?;
    let backend = TractBackend::new(model, labels, settings.input_size, filter)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_model_backend(
    settings: &DetectorSettings,
    _filter: DetectionFilter,
) -> Result<Box<dyn Detector>> {
    if settings.backend == "tract" {
        return Err(anyhow!(
            "detector backend 'tract' requires the backend-tract feature"
        ));
    }
    Err(anyhow!("unknown detector backend '{}'", settings.backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuideConfig;

    #[test]
    fn stub_backend_is_opened_by_default() {
        let config = GuideConfig::defaults();
        let detector = open_detector(&config.detector).unwrap();
        assert_eq!(detector.name(), "stub");
    }

    #[test]
    fn unknown_backend_is_fatal_without_fallback() {
        let mut config = GuideConfig::defaults();
        config.detector.backend = "yolo-world".to_string();
        assert!(open_detector(&config.detector).is_err());

        config.detector.fallback_to_stub = true;
        assert_eq!(open_detector(&config.detector).unwrap().name(), "stub");
    }
}
