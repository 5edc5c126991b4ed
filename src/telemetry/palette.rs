/// Plain RGB triple so the core stays free of GUI types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeriesColor(pub u8, pub u8, pub u8);

pub const COLOR_TABLE: [SeriesColor; 8] = [
    SeriesColor(255, 99, 71),  // tomato
    SeriesColor(30, 144, 255), // dodger blue
    SeriesColor(50, 205, 50),  // lime green
    SeriesColor(255, 20, 147), // deep pink
    SeriesColor(138, 43, 226), // blue violet
    SeriesColor(255, 140, 0),  // dark orange
    SeriesColor(0, 206, 209),  // dark turquoise
    SeriesColor(220, 20, 60),  // crimson
];

/// Fallback for keys the store does not know.
pub const UNKNOWN_COLOR: SeriesColor = SeriesColor(200, 200, 200);

pub fn color_for_index(index: usize) -> SeriesColor {
    COLOR_TABLE[index % COLOR_TABLE.len()]
}
