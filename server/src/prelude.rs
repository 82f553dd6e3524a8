pub use crate::App;
pub use slipway_types::error::{Error, SwResult};
pub use slipway_types::types::Timestamp;

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
