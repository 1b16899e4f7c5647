use crate::frame::Point;

/// One object instance reported by a detector for one frame.
///
/// Produced fresh per frame; downstream code scores and copies it but never mutates it.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// `[x1, y1, x2, y2]` in frame pixels.
    pub bbox: [f32; 4],
    pub center: Point,
    pub class_name: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    /// Class is on the configured priority list.
    pub is_priority: bool,
}

impl Detection {
    pub fn new(bbox: [f32; 4], class_name: impl Into<String>, confidence: f32) -> Self {
        let center = Point::new((bbox[0] + bbox[2]) / 2.0, (bbox[1] + bbox[3]) / 2.0);
        Self {
            bbox,
            center,
            class_name: class_name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            is_priority: false,
        }
    }

    pub fn with_priority(mut self, is_priority: bool) -> Self {
        self.is_priority = is_priority;
        self
    }

    pub fn width(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bbox[3] - self.bbox[1]).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// Case-insensitive set of preferred class names.
#[derive(Clone, Debug, Default)]
pub struct PriorityClasses {
    names: Vec<String>,
}

impl PriorityClasses {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn contains(&self, class_name: &str) -> bool {
        let needle = class_name.trim().to_lowercase();
        self.names.binary_search(&needle).is_ok()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Post-processing every backend applies to raw model output: drop low-confidence
/// detections and tag priority classes.
#[derive(Clone, Debug)]
pub struct DetectionFilter {
    pub confidence_threshold: f32,
    pub priorities: PriorityClasses,
}

impl DetectionFilter {
    pub fn new(confidence_threshold: f32, priorities: PriorityClasses) -> Self {
        Self {
            confidence_threshold,
            priorities,
        }
    }

    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections
            .into_iter()
            .filter(|det| det.confidence >= self.confidence_threshold)
            .map(|det| {
                let is_priority = self.priorities.contains(&det.class_name);
                det.with_priority(is_priority)
            })
            .collect()
    }
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self::new(0.0, PriorityClasses::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_center_is_bbox_midpoint() {
        let det = Detection::new([10.0, 20.0, 30.0, 60.0], "cup", 0.7);
        assert_eq!(det.center, Point::new(20.0, 40.0));
        assert_eq!(det.area(), 800.0);
        assert!(!det.is_priority);
    }

    #[test]
    fn inverted_bbox_has_zero_area() {
        let det = Detection::new([30.0, 20.0, 10.0, 60.0], "cup", 0.7);
        assert_eq!(det.area(), 0.0);
    }

    #[test]
    fn priority_lookup_ignores_case_and_whitespace() {
        let priorities = PriorityClasses::new(["Bottle", " dining table ", ""]);
        assert_eq!(priorities.len(), 2);
        assert!(priorities.contains("bottle"));
        assert!(priorities.contains("Dining Table"));
        assert!(!priorities.contains("table"));
    }

    #[test]
    fn filter_drops_low_confidence_and_tags_priority() {
        let filter = DetectionFilter::new(0.5, PriorityClasses::new(["cup"]));
        let kept = filter.apply(vec![
            Detection::new([0.0, 0.0, 1.0, 1.0], "cup", 0.9),
            Detection::new([0.0, 0.0, 1.0, 1.0], "chair", 0.6),
            Detection::new([0.0, 0.0, 1.0, 1.0], "cup", 0.3),
        ]);
        assert_eq!(kept.len(), 2);
        assert!(kept[0].is_priority);
        assert!(!kept[1].is_priority);
    }
}
