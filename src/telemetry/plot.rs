use std::io::Cursor;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use crate::telemetry::error::MonitorError;
use crate::telemetry::labels::LabelPlacer;
use crate::telemetry::metrics::{DataRect, PixelMetrics};
use crate::telemetry::palette::SeriesColor;
use crate::telemetry::range::AxisRange;
use crate::telemetry::store::ChannelStore;
use crate::telemetry::view::MonitorView;
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    /// Caption, axis labels and end labels. Needs a system font.
    pub draw_text: bool,
    pub label_font_px: u32,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 600,
            background: RGBColor(10, 10, 10),
            draw_text: true,
            label_font_px: 14,
        }
    }
}
fn rgb(color: SeriesColor) -> RGBColor {
    RGBColor(color.0, color.1, color.2)
}
/// Renders the current step plot to PNG bytes, with end labels when a
/// placer is given.
///
/// Labels are laid out against this bitmap's own plotting area, so the
/// collision pass works in the PNG's pixel space rather than the window's.
pub fn render_snapshot_png(
    store: &ChannelStore,
    range: AxisRange,
    placer: Option<&LabelPlacer>,
    style: &PlotStyle,
) -> Result<Vec<u8>, MonitorError> {
    let view = MonitorView::build(store);
    if view.is_empty() {
        return Err(MonitorError::Plot("no enabled channel has data".into()));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let label_area = if style.draw_text { 45 } else { 0 };
        let mut builder = ChartBuilder::on(&root);
        builder
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, label_area)
            .set_label_area_size(LabelAreaPosition::Bottom, label_area);
        if style.draw_text {
            builder.caption("Monitor", ("sans-serif", 20).into_font().color(&WHITE));
        }
        let mut chart =
            builder.build_cartesian_2d(0f64..view.window_secs, range.min..range.max)?;
        if style.draw_text {
            chart
                .configure_mesh()
                .x_desc("Time (s)")
                .y_desc("Value")
                .axis_desc_style(("sans-serif", 14).into_font().color(&WHITE))
                .label_style(("sans-serif", 12).into_font().color(&WHITE))
                .light_line_style(&WHITE.mix(0.1))
                .draw()?;
        }
        for channel in &view.channels {
            let color = rgb(channel.color);
            let series = channel.step_points.iter().map(|p| (p[0], p[1]));
            chart.draw_series(LineSeries::new(series, color.stroke_width(2)))?;
        }
        if let (true, Some(placer)) = (style.draw_text, placer) {
            let (width_px, height_px) = chart.plotting_area().dim_in_pixel();
            let metrics = PixelMetrics::new(
                DataRect::new((0.0, view.window_secs), range),
                width_px as f64,
                height_px as f64,
            );
            let glyph = style.label_font_px as f64 * 0.6;
            let labels = placer.place_with(store, &metrics, |text| {
                text.chars().count() as f64 * glyph + 2.0 * placer.config.padding_px
            });
            let anchor = Pos::new(HPos::Right, VPos::Center);
            chart.draw_series(labels.iter().map(|label| {
                let font = ("sans-serif", style.label_font_px)
                    .into_font()
                    .color(&rgb(label.color))
                    .pos(anchor);
                Text::new(label.text.clone(), (label.x, label.y), font)
            }))?;
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, MonitorError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| MonitorError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::parser::parse_kv_line;
    #[test]
    fn snapshot_renders_png_bytes() {
        let mut store = ChannelStore::with_time_window(5.0);
        store.update(&parse_kv_line("state:5,CHG:41"), 1.0);
        store.update(&parse_kv_line("state:6,CHG:44"), 2.0);
        let style = PlotStyle {
            width: 320,
            height: 160,
            draw_text: false,
            ..PlotStyle::default()
        };
        let png = render_snapshot_png(
            &store,
            AxisRange::new(0.0, 50.0),
            Some(&LabelPlacer::default()),
            &style,
        )
        .unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
    #[test]
    fn empty_store_is_an_error() {
        let store = ChannelStore::new();
        let result = render_snapshot_png(
            &store,
            AxisRange::default(),
            None,
            &PlotStyle::default(),
        );
        assert!(matches!(result, Err(MonitorError::Plot(_))));
    }
}
