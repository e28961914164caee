//! Skeleton overlay rendering.
//!
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::landmarks::{DetectionResult, LandmarkSet};

/// Edges of the 33-point pose topology.
#[rustfmt::skip]
pub const POSE_CONNECTIONS: [(usize, usize); 35] = [
    (0, 1), (1, 2), (2, 3), (3, 7), (0, 4), (4, 5), (5, 6), (6, 8), (9, 10),
    (11, 12), (11, 13), (13, 15), (15, 17), (15, 19), (15, 21), (17, 19),
    (12, 14), (14, 16), (16, 18), (16, 20), (16, 22), (18, 20),
    (11, 23), (12, 24), (23, 24), (23, 25), (24, 26), (25, 27), (26, 28),
    (27, 29), (28, 30), (29, 31), (30, 32), (27, 31), (28, 32),
];

/// Edges of the 21-point hand topology.
#[rustfmt::skip]
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (0, 1), (1, 2), (2, 3), (3, 4),
    (0, 5), (5, 6), (6, 7), (7, 8),
    (5, 9), (9, 10), (10, 11), (11, 12),
    (9, 13), (13, 14), (14, 15), (15, 16),
    (13, 17), (0, 17), (17, 18), (18, 19), (19, 20),
];

const EDGE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const POINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Draws detected skeletons onto a copy of an image.
#[derive(Clone, Copy, Debug)]
pub struct SkeletonRenderer {
    edge_color: Rgb<u8>,
    point_color: Rgb<u8>,
}

impl Default for SkeletonRenderer {
    fn default() -> Self {
        Self {
            edge_color: EDGE_COLOR,
            point_color: POINT_COLOR,
        }
    }
}

impl SkeletonRenderer {
    /// Render the overlay. Without any detection the copy is left untouched.
    pub fn render(&self, image: &RgbImage, detection: &DetectionResult) -> RgbImage {
        let mut canvas = image.clone();
        if detection.is_empty() {
            return canvas;
        }

        if let Some(pose) = &detection.pose {
            self.draw_set(&mut canvas, pose, &POSE_CONNECTIONS);
        }
        for hand in &detection.hands {
            self.draw_set(&mut canvas, hand, &HAND_CONNECTIONS);
        }

        canvas
    }

    fn draw_set(&self, canvas: &mut RgbImage, set: &LandmarkSet, connections: &[(usize, usize)]) {
        let (width, height) = canvas.dimensions();
        let points: Vec<Option<(f32, f32)>> = set
            .keypoints()
            .iter()
            .map(|kp| {
                kp.to_pixel(width, height)
                    .filter(|point| near_canvas(*point, width, height))
            })
            .collect();

        // Edges first so the dots stay visible on top
        for &(a, b) in connections {
            if let (Some(Some(start)), Some(Some(end))) = (points.get(a), points.get(b)) {
                draw_line_segment_mut(canvas, *start, *end, self.edge_color);
            }
        }

        let radius = (width.min(height) / 100).max(2) as i32;
        for (x, y) in points.iter().flatten() {
            draw_filled_circle_mut(canvas, (*x as i32, *y as i32), radius, self.point_color);
        }
    }
}

/// Within one canvas size of the frame. Lines to points further out would be
/// walked pixel by pixel for nothing.
fn near_canvas((x, y): (f32, f32), width: u32, height: u32) -> bool {
    let (w, h) = (width as f32, height as f32);
    (-w..=2.0 * w).contains(&x) && (-h..=2.0 * h).contains(&y)
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::landmarks::Keypoint;

    fn hand_line() -> LandmarkSet {
        // All 21 points on a horizontal line through the image center
        LandmarkSet::new(
            (0..21)
                .map(|i| Keypoint::new(0.1 + 0.04 * i as f32, 0.5, 0.0))
                .collect(),
        )
    }

    #[test]
    fn test_no_detection_returns_unmodified_copy() {
        let image = RgbImage::from_pixel(40, 30, Rgb([12, 34, 56]));
        let rendered = SkeletonRenderer::default().render(&image, &DetectionResult::empty());

        assert_eq!(rendered, image);
    }

    #[test]
    fn test_overlay_draws_points_and_edges() {
        let image = RgbImage::new(200, 200);
        let detection = DetectionResult::new(None, vec![hand_line()]);
        let rendered = SkeletonRenderer::default().render(&image, &detection);

        assert_ne!(rendered, image);
        // Keypoint 0 sits at (20, 100)
        assert_eq!(rendered.get_pixel(20, 100), &POINT_COLOR);
        // Somewhere on the wrist-to-index edge, away from any dot
        assert_eq!(rendered.get_pixel(40, 100), &EDGE_COLOR);
        // Source image stays untouched
        assert!(image.pixels().all(|p| p == &Rgb([0, 0, 0])));
    }

    #[test]
    fn test_partial_sets_and_offscreen_points_do_not_panic() {
        let image = RgbImage::new(50, 50);
        let pose = LandmarkSet::new(vec![
            Keypoint::new(-3.0, 7.0, 0.0),
            Keypoint::new(f32::NAN, 0.5, 0.0),
            Keypoint::new(0.5, 0.5, 0.0),
        ]);
        let detection = DetectionResult::new(Some(pose), vec![]);

        let rendered = SkeletonRenderer::default().render(&image, &detection);
        assert_eq!(rendered.dimensions(), (50, 50));
        assert_eq!(rendered.get_pixel(25, 25), &POINT_COLOR);
    }

    #[test]
    fn test_far_away_points_are_skipped() {
        let image = RgbImage::new(200, 200);
        let mut hand = hand_line();
        hand.0[0] = Keypoint::new(0.5, 1.0e7, 0.0);
        let detection = DetectionResult::new(None, vec![hand]);

        let rendered = SkeletonRenderer::default().render(&image, &detection);

        // The rest of the hand is drawn, no edge heads towards the far point
        assert_eq!(rendered.get_pixel(40, 100), &EDGE_COLOR);
        assert!(rendered
            .enumerate_pixels()
            .filter(|(_, y, _)| *y > 110)
            .all(|(_, _, p)| p == &Rgb([0, 0, 0])));
    }

    #[test]
    fn test_near_canvas() {
        assert!(near_canvas((-40.0, 150.0), 100, 100));
        assert!(!near_canvas((250.0, 50.0), 100, 100));
        assert!(!near_canvas((50.0, -1.0e9), 100, 100));
    }
}
