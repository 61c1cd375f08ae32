//! Overlay directives for the final composition.

use slidecast_media::{wrap_text, EnableWindow, OverlayDirective};
use slidecast_models::{CropAnalysis, NormalizedRect, Timeline};

use crate::config::OverlayLayout;

/// Panel rectangle on the side of the frame away from the subject.
///
/// A subject centered at or left of the middle puts the panel on the right.
pub fn panel_rect(crop: &CropAnalysis, layout: &OverlayLayout) -> NormalizedRect {
    let height = 1.0 - 2.0 * layout.margin;
    let x = if crop.crop.center_x() <= 0.5 {
        1.0 - layout.margin - layout.panel_width
    } else {
        layout.margin
    };
    NormalizedRect::new(x, layout.margin, layout.panel_width, height)
}

/// One rectangle fill followed by one text directive per wrapped line of
/// every bullet, each enabled over its bullet's window.
pub fn build_directives(
    timeline: &Timeline,
    crop: &CropAnalysis,
    layout: &OverlayLayout,
) -> Vec<OverlayDirective> {
    let rect = panel_rect(crop, layout);
    let mut directives = vec![OverlayDirective::FillRect {
        rect,
        color: layout.fill_color.clone(),
        opacity: layout.fill_opacity,
    }];

    for bullet in &timeline.bullets {
        let enable = EnableWindow::new(bullet.scheduled_start, bullet.scheduled_end);
        for (line, text) in wrap_text(&bullet.text, layout.max_chars).into_iter().enumerate() {
            directives.push(OverlayDirective::Text {
                ordinal: bullet.ordinal,
                line: line as u32,
                text,
                anchor_x: rect.x,
                anchor_y: rect.y,
                offset_x: layout.padding_px,
                offset_y: layout.padding_px + line as u32 * layout.line_height(),
                font: layout.font.clone(),
                enable,
            });
        }
    }

    directives
}
