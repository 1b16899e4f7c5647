//! Target selection: pick the one detection to guide toward.

use crate::detect::Detection;
use crate::frame::FrameGeometry;

/// Weight of the size ratio in the selection score. A box covering the whole frame
/// halves its distance penalty.
const SIZE_WEIGHT: f32 = 0.5;

/// The detection chosen for guidance this frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub detection: Detection,
    /// Selection score, lower is better. Zero for an explicit name match.
    pub score: f32,
    /// Pixel distance from the frame centre.
    pub distance: f32,
    /// Closeness to the frame centre in `[0, 1]`, 1.0 at the centre.
    pub distance_score: f32,
    /// Chosen because its class matched the requested name.
    pub explicit_match: bool,
}

impl Target {
    fn new(detection: &Detection, geometry: &FrameGeometry, score: f32, explicit_match: bool) -> Self {
        Self {
            detection: detection.clone(),
            score,
            distance: geometry.distance_from_center(detection.center),
            distance_score: geometry.distance_score(detection.center),
            explicit_match,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.detection.class_name
    }
}

/// Select a target from one frame's detections.
///
/// 1. With `explicit_name`, the first detection whose class contains it
///    (case-insensitive) wins outright.
/// 2. Otherwise priority detections are preferred when any exist.
/// 3. Among candidates the lowest `distance * (1 - 0.5 * size_ratio)` wins; on
///    equal scores the earlier detection is kept.
pub fn select_target(
    detections: &[Detection],
    geometry: &FrameGeometry,
    explicit_name: Option<&str>,
) -> Option<Target> {
    if detections.is_empty() {
        return None;
    }

    if let Some(name) = explicit_name.map(str::trim).filter(|name| !name.is_empty()) {
        let needle = name.to_lowercase();
        if let Some(det) = detections
            .iter()
            .find(|det| det.class_name.to_lowercase().contains(&needle))
        {
            return Some(Target::new(det, geometry, 0.0, true));
        }
    }

    let has_priority = detections.iter().any(|det| det.is_priority);
    let mut best: Option<(&Detection, f32)> = None;
    for det in detections.iter().filter(|det| !has_priority || det.is_priority) {
        let score = selection_score(det, geometry);
        match best {
            Some((_, best_score)) if score >= best_score => {}
            _ => best = Some((det, score)),
        }
    }

    best.map(|(det, score)| Target::new(det, geometry, score, false))
}

fn selection_score(det: &Detection, geometry: &FrameGeometry) -> f32 {
    let dist = geometry.distance_from_center(det.center);
    let frame_area = geometry.area();
    let size_ratio = if frame_area > 0.0 {
        det.area() / frame_area
    } else {
        0.0
    };
    dist * (1.0 - SIZE_WEIGHT * size_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(cx: f32, cy: f32, half: f32, class: &str, conf: f32, priority: bool) -> Detection {
        Detection::new([cx - half, cy - half, cx + half, cy + half], class, conf).with_priority(priority)
    }

    fn geometry() -> FrameGeometry {
        FrameGeometry::new(640, 480)
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert!(select_target(&[], &geometry(), None).is_none());
        assert!(select_target(&[], &geometry(), Some("bottle")).is_none());
    }

    #[test]
    fn priority_beats_higher_confidence() {
        let dets = vec![
            det(300.0, 240.0, 20.0, "chair", 0.95, false),
            det(340.0, 240.0, 20.0, "cup", 0.40, true),
        ];
        let target = select_target(&dets, &geometry(), None).unwrap();
        assert_eq!(target.class_name(), "cup");
        assert!(!target.explicit_match);
    }

    #[test]
    fn explicit_name_wins_regardless_of_position() {
        let dets = vec![
            det(320.0, 240.0, 20.0, "cup", 0.9, true),
            det(10.0, 10.0, 5.0, "Water Bottle", 0.3, false),
        ];
        let target = select_target(&dets, &geometry(), Some("BOTTLE")).unwrap();
        assert_eq!(target.class_name(), "Water Bottle");
        assert!(target.explicit_match);
        assert_eq!(target.score, 0.0);
    }

    #[test]
    fn unmatched_name_falls_back_to_scoring() {
        let dets = vec![det(100.0, 100.0, 10.0, "cup", 0.9, true)];
        let target = select_target(&dets, &geometry(), Some("keys")).unwrap();
        assert_eq!(target.class_name(), "cup");
        assert!(!target.explicit_match);
    }

    #[test]
    fn closer_and_larger_scores_lower() {
        let dets = vec![
            det(420.0, 240.0, 10.0, "cup", 0.9, false),
            det(420.0, 240.0, 150.0, "bowl", 0.9, false),
        ];
        let target = select_target(&dets, &geometry(), None).unwrap();
        assert_eq!(target.class_name(), "bowl");
        assert!(target.score < 100.0);
    }

    #[test]
    fn ties_keep_first_detection() {
        let dets = vec![
            det(220.0, 240.0, 10.0, "cup", 0.5, false),
            det(420.0, 240.0, 10.0, "mug", 0.5, false),
        ];
        let target = select_target(&dets, &geometry(), None).unwrap();
        assert_eq!(target.class_name(), "cup");
    }

    #[test]
    fn target_carries_distance_score() {
        let dets = vec![det(320.0, 440.0, 10.0, "cup", 0.5, false)];
        let target = select_target(&dets, &geometry(), None).unwrap();
        assert!((target.distance - 200.0).abs() < 1e-3);
        assert!((target.distance_score - 0.5).abs() < 1e-6);
    }
}
