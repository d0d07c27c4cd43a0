//! Detection annotation on frames.

use crate::{common::*, detector::Detection};

/// Offset in pixels between a box corner and its label baseline.
const LABEL_OFFSET: i32 = 15;

/// One BGR color per class.
#[derive(Debug, Clone)]
pub struct Palette {
    colors: Vec<Scalar>,
}

impl Palette {
    /// Draws colors uniformly in `[0, 255)`. A seed makes the palette reproducible.
    pub fn new(num_classes: usize, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let colors = (0..num_classes)
            .map(|_| {
                let [b, g, r]: [f64; 3] = [
                    rng.gen_range(0.0..255.0),
                    rng.gen_range(0.0..255.0),
                    rng.gen_range(0.0..255.0),
                ];
                Scalar::new(b, g, r, 0.0)
            })
            .collect();
        Self { colors }
    }

    pub fn color(&self, class: usize) -> Option<Scalar> {
        self.colors.get(class).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

impl Detection {
    /// Scales the ratio box onto a frame with `frame_size` and rounds toward zero.
    pub fn to_pixel(&self, frame_size: &HW<f32>) -> Option<TLBR<i32>> {
        let transform = Transform::from_ratio_to_pixel(*frame_size);
        let rect = &transform * &self.label.rect;
        rect.try_cast()
    }
}

pub fn label_text(name: &str, confidence: f32) -> String {
    format!("{}: {:.2}%", name, confidence * 100.0)
}

/// Places the label above the box unless it would leave the frame.
pub fn label_origin_y(start_y: i32) -> i32 {
    if start_y - LABEL_OFFSET > LABEL_OFFSET {
        start_y - LABEL_OFFSET
    } else {
        start_y + LABEL_OFFSET
    }
}

/// Draws the box and its label in the class color.
///
/// Detections whose class is not in `classes` or whose box does not fit
/// in pixel coordinates are skipped with a warning.
pub fn draw_detection(
    frame: &mut Mat,
    detection: &Detection,
    classes: &ClassList,
    palette: &Palette,
) -> Result<()> {
    let class = detection.label.class;
    let (name, color) = match (classes.name(class), palette.color(class)) {
        (Some(name), Some(color)) => (name, color),
        _ => {
            warn!("skip detection with unknown class id {}", class);
            return Ok(());
        }
    };

    let frame_size = frame.size()?;
    let frame_size = HW::try_from_hw([frame_size.height as f32, frame_size.width as f32])?;
    let rect = match detection.to_pixel(&frame_size) {
        Some(rect) => rect,
        None => {
            warn!(
                "skip detection with out of range box {:?}",
                detection.label.rect
            );
            return Ok(());
        }
    };

    imgproc::rectangle(frame, CvRect::from(&rect), color, 2, imgproc::LINE_8, 0)?;

    let text = label_text(name, detection.confidence);
    let origin = Point::new(rect.l(), label_origin_y(rect.t()));
    imgproc::put_text(
        frame,
        &text,
        origin,
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        color,
        2,
        imgproc::LINE_8,
        false,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_palette_is_reproducible() {
        let lhs = Palette::new(21, Some(3));
        let rhs = Palette::new(21, Some(3));
        assert_eq!(lhs.len(), 21);
        for class in 0..21 {
            assert_eq!(lhs.color(class), rhs.color(class));
        }
        assert!(lhs.color(21).is_none());
    }

    #[test]
    fn palette_components_are_in_range() {
        let palette = Palette::new(50, Some(0));
        for class in 0..palette.len() {
            let color = palette.color(class).unwrap();
            for component in &color.0[0..3] {
                assert!((0.0..255.0).contains(component));
            }
        }
    }

    #[test]
    fn label_text_format() {
        assert_eq!(label_text("person", 0.9876), "person: 98.76%");
        assert_eq!(label_text("dog", 1.0), "dog: 100.00%");
    }

    #[test]
    fn label_origin_moves_below_near_top() {
        assert_eq!(label_origin_y(100), 85);
        assert_eq!(label_origin_y(31), 16);
        assert_eq!(label_origin_y(30), 45);
        assert_eq!(label_origin_y(0), 15);
    }

    #[test]
    fn ratio_box_to_pixels() {
        let detection = Detection {
            label: Label {
                rect: TLBR::from_tlbr([0.25, 0.1, 0.75, 0.5]),
                class: 15,
            },
            confidence: 0.9,
        };
        let rect = detection
            .to_pixel(&HW::from_hw([300.0, 400.0]))
            .unwrap();
        assert_eq!(rect.tlbr(), [75, 40, 225, 200]);
    }

    #[test]
    fn skip_out_of_range_box() -> Result<()> {
        let detection = Detection {
            label: Label {
                rect: TLBR::from_tlbr([0.0, 0.0, 1e12, 1e12]),
                class: 0,
            },
            confidence: 0.9,
        };
        assert!(detection.to_pixel(&HW::from_hw([100.0, 100.0])).is_none());

        let mut frame =
            Mat::new_rows_cols_with_default(100, 100, core_cv::CV_8UC3, Scalar::all(0.0))?;
        let classes = ClassList::new(["background"])?;
        let palette = Palette::new(classes.len(), Some(0));
        draw_detection(&mut frame, &detection, &classes, &palette)?;
        assert_eq!(core_cv::sum_elems(&frame)?, Scalar::all(0.0));
        Ok(())
    }
}
