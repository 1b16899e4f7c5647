//! Greedy non-maximum suppression over detector output.

use std::cmp::Ordering;

use crate::detect::result::Detection;

/// Overlap above which the lower-confidence box of the same class is dropped.
pub const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Class-aware greedy NMS: sort by confidence descending, then suppress any later
/// box of the same class that overlaps a kept one by more than `iou_threshold`.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut suppressed = vec![false; detections.len()];
    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[j].class_name != detections[i].class_name {
                continue;
            }
            if bbox_iou(&detections[i].bbox, &detections[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    detections
        .into_iter()
        .zip(suppressed)
        .filter(|(_, dropped)| !dropped)
        .map(|(det, _)| det)
        .collect()
}

/// Intersection over union of two `[x1, y1, x2, y2]` boxes.
pub fn bbox_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}
