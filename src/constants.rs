pub const QUANTILE_EPS: f64 = 1e-9;
pub const MIN_RESIDUAL: f64 = 1e-6;
pub const DEFAULT_BETA: f64 = 0.01;
pub const DEFAULT_NUM_SAMPLES: usize = 10;
pub const DEFAULT_CALIBRATION_RATIO: f64 = 0.2;
pub const DEFAULT_K: usize = 5;
pub const MAX_ERROR_MESSAGES: usize = 10;
pub const BUNDLE_FORMAT_VERSION: u32 = 1;
pub const MANIFEST_ENTRY: &str = "manifest.json";
