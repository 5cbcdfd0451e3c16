use crate::error::{ReportError, Result, Stage};
use crate::metrics::{IntrusionCategory, MetricsSnapshot};
use crate::narrative::Weekday;
use crate::style::BrandingSettings;
use crate::types::Color;
use std::time::Duration;
use tiny_skia::{Paint, Pixmap, Rect, Transform};

const CHART_MARGIN: f32 = 24.0;
const GRID_DIVISIONS: u32 = 4;

/// A completed capture, tagged with the revision of the draft state it was
/// rendered from so stale results can be discarded.
#[derive(Debug, Clone)]
pub struct ChartImage {
    pub png: Vec<u8>,
    pub revision: u64,
}

/// Renders the weekly intrusion chart into a still PNG for embedding.
/// Capture waits out a bounded settle interval first; rendering mid-update
/// is how blank charts end up in documents.
#[derive(Debug, Clone)]
pub struct ChartRasterizer {
    width_px: u32,
    height_px: u32,
    settle: Duration,
}

impl Default for ChartRasterizer {
    fn default() -> Self {
        Self {
            width_px: 640,
            height_px: 320,
            settle: Duration::from_millis(150),
        }
    }
}

impl ChartRasterizer {
    pub fn new(width_px: u32, height_px: u32, settle: Duration) -> Self {
        Self {
            width_px: width_px.max(64),
            height_px: height_px.max(64),
            settle,
        }
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Async capture: settle, then rasterize. The caller compares the
    /// returned revision against its current one before merging; a capture
    /// superseded while settling is simply dropped.
    pub async fn capture(
        &self,
        metrics: &MetricsSnapshot,
        branding: &BrandingSettings,
        revision: u64,
    ) -> Result<ChartImage> {
        tokio::time::sleep(self.settle).await;
        let png = self.render_png(metrics, branding)?;
        Ok(ChartImage { png, revision })
    }

    /// Synchronous rasterization of stacked per-day intrusion bars.
    pub fn render_png(
        &self,
        metrics: &MetricsSnapshot,
        branding: &BrandingSettings,
    ) -> Result<Vec<u8>> {
        let mut pixmap = Pixmap::new(self.width_px, self.height_px).ok_or_else(|| {
            ReportError::InvalidConfiguration(format!(
                "invalid chart size {}x{}",
                self.width_px, self.height_px
            ))
        })?;
        pixmap.fill(tiny_skia::Color::from_rgba8(255, 255, 255, 255));

        let width = self.width_px as f32;
        let height = self.height_px as f32;
        let plot_left = CHART_MARGIN;
        let plot_top = CHART_MARGIN;
        let plot_width = width - CHART_MARGIN * 2.0;
        let plot_height = height - CHART_MARGIN * 2.0;
        let baseline = plot_top + plot_height;

        // Gridlines.
        let grid = paint_for(Color::rgb(0.88, 0.88, 0.88));
        for division in 0..=GRID_DIVISIONS {
            let y = plot_top + plot_height * (division as f32 / GRID_DIVISIONS as f32);
            fill_rect(&mut pixmap, plot_left, y, plot_width, 1.0, &grid);
        }

        let max_total = Weekday::ALL
            .iter()
            .map(|day| metrics.day_total(*day))
            .max()
            .unwrap_or(0)
            .max(1) as f32;

        let palette = category_palette(branding);
        let slot_width = plot_width / 7.0;
        let bar_width = slot_width * 0.6;

        for (day_idx, day) in Weekday::ALL.into_iter().enumerate() {
            let x = plot_left + slot_width * (day_idx as f32) + (slot_width - bar_width) / 2.0;
            let mut stack_top = baseline;
            for (cat_idx, category) in IntrusionCategory::ALL.into_iter().enumerate() {
                let count = metrics.count(category, day);
                if count == 0 {
                    continue;
                }
                let segment_height = plot_height * (count as f32 / max_total);
                stack_top -= segment_height;
                fill_rect(
                    &mut pixmap,
                    x,
                    stack_top,
                    bar_width,
                    segment_height,
                    &palette[cat_idx],
                );
            }
        }

        // Axis baseline drawn last so bars never cover it.
        let axis = paint_for(Color::rgb(0.45, 0.45, 0.45));
        fill_rect(&mut pixmap, plot_left, baseline, plot_width, 1.5, &axis);

        pixmap
            .encode_png()
            .map_err(|e| ReportError::transient(Stage::ChartCapture, e.to_string()))
    }
}

fn paint_for(color: Color) -> Paint<'static> {
    let (r, g, b, a) = color.to_rgba8();
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = false;
    paint
}

fn fill_rect(pixmap: &mut Pixmap, x: f32, y: f32, width: f32, height: f32, paint: &Paint<'_>) {
    if let Some(rect) = Rect::from_xywh(x, y, width, height) {
        pixmap.fill_rect(rect, paint, Transform::identity(), None);
    }
}

/// One segment color per intrusion category: accent, header, and two
/// white-mixed shades of the accent so stacks stay legible without a legend.
fn category_palette(branding: &BrandingSettings) -> [Paint<'static>; 4] {
    let accent = branding.accent_color();
    let header = branding.header_color();
    [
        paint_for(accent),
        paint_for(header),
        paint_for(mix_with_white(accent, 0.45)),
        paint_for(mix_with_white(header, 0.6)),
    ]
}

fn mix_with_white(color: Color, amount: f32) -> Color {
    let t = amount.clamp(0.0, 1.0);
    Color::rgb(
        color.r + (1.0 - color.r) * t,
        color.g + (1.0 - color.g) * t,
        color.b + (1.0 - color.b) * t,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsPatch;

    fn metrics_with_counts() -> MetricsSnapshot {
        let mut metrics = MetricsSnapshot::default();
        metrics.apply(
            &MetricsPatch::new()
                .with_count(IntrusionCategory::Human, Weekday::Monday, 5)
                .with_count(IntrusionCategory::Vehicle, Weekday::Wednesday, 2),
        );
        metrics
    }

    #[test]
    fn renders_a_valid_png() {
        let rasterizer = ChartRasterizer::default();
        let png = rasterizer
            .render_png(&metrics_with_counts(), &BrandingSettings::default())
            .expect("render");
        assert_eq!(&png[..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
    }

    #[test]
    fn empty_metrics_still_render() {
        let rasterizer = ChartRasterizer::new(128, 96, Duration::from_millis(0));
        let png = rasterizer
            .render_png(&MetricsSnapshot::default(), &BrandingSettings::default())
            .expect("render");
        assert!(!png.is_empty());
    }

    #[tokio::test]
    async fn capture_tags_the_revision() {
        let rasterizer = ChartRasterizer::new(128, 96, Duration::from_millis(1));
        let image = rasterizer
            .capture(&metrics_with_counts(), &BrandingSettings::default(), 42)
            .await
            .expect("capture");
        assert_eq!(image.revision, 42);
        assert!(!image.png.is_empty());
    }

    #[test]
    fn rendering_is_deterministic() {
        let rasterizer = ChartRasterizer::default();
        let metrics = metrics_with_counts();
        let branding = BrandingSettings::default();
        let a = rasterizer.render_png(&metrics, &branding).unwrap();
        let b = rasterizer.render_png(&metrics, &branding).unwrap();
        assert_eq!(a, b);
    }
}
