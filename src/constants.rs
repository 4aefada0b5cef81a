//! Global constants for header synthesis

/// Lower percentile of the window/level auto-range
pub const DEFAULT_PERCENTILE_LOW: f64 = 1.0;

/// Upper percentile of the window/level auto-range
pub const DEFAULT_PERCENTILE_HIGH: f64 = 99.0;

/// Orientation applied when none is known: x flipped, y forward
pub const DEFAULT_IMAGE_ORIENTATION: [f64; 6] = [-1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

/// Secondary Capture Image Storage
pub const SECONDARY_CAPTURE_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.7";

/// Default value description for pixel data
pub const DEFAULT_VALUE_NAME: &str = "Gray Scale Value";

/// Default value unit for pixel data
pub const DEFAULT_VALUE_UNIT: &str = "arb. units";

/// Maximum length of a generated UID
pub const MAX_UID_LENGTH: usize = 64;
