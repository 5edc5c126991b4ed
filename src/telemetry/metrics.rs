use crate::telemetry::range::AxisRange;

/// Visible plot rectangle in data coordinates. `bottom` is the lowest value
/// on screen, `top` the highest.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DataRect {
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
}
impl DataRect {
    pub fn new(x: (f64, f64), y: AxisRange) -> Self {
        Self {
            left: x.0,
            right: x.1,
            bottom: y.min,
            top: y.max,
        }
    }
    pub fn width(&self) -> f64 {
        self.right - self.left
    }
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }
}

/// Snapshot of the view geometry handed to the range and label passes, so
/// both stay pure functions of (store, metrics, previous range).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelMetrics {
    pub view: DataRect,
    pub width_px: f64,
    pub height_px: f64,
}
impl PixelMetrics {
    pub fn new(view: DataRect, width_px: f64, height_px: f64) -> Self {
        Self {
            view,
            width_px: width_px.max(0.0),
            height_px: height_px.max(0.0),
        }
    }
    /// Data units per horizontal pixel; 0 when the plot has no size yet.
    pub fn x_per_px(&self) -> f64 {
        if self.width_px > 0.0 {
            self.view.width() / self.width_px
        } else {
            0.0
        }
    }
    pub fn y_per_px(&self) -> f64 {
        if self.height_px > 0.0 {
            self.view.height() / self.height_px
        } else {
            0.0
        }
    }
    /// Screen y with the origin at the top edge (grows downward).
    pub fn to_screen_y(&self, y: f64) -> f64 {
        let span = self.view.height();
        if span.abs() < f64::EPSILON {
            return 0.0;
        }
        (self.view.top - y) / span * self.height_px
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn maps_between_data_and_pixels() {
        let metrics = PixelMetrics::new(
            DataRect::new((0.0, 10.0), AxisRange::new(0.0, 100.0)),
            500.0,
            200.0,
        );
        assert_eq!(metrics.x_per_px(), 0.02);
        assert_eq!(metrics.y_per_px(), 0.5);
        assert_eq!(metrics.to_screen_y(100.0), 0.0);
        assert_eq!(metrics.to_screen_y(0.0), 200.0);
    }
    #[test]
    fn zero_sized_plot_has_no_pixel_scale() {
        let metrics = PixelMetrics::new(
            DataRect::new((0.0, 10.0), AxisRange::new(0.0, 100.0)),
            0.0,
            0.0,
        );
        assert_eq!(metrics.x_per_px(), 0.0);
        assert_eq!(metrics.y_per_px(), 0.0);
    }
}
