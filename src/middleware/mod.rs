pub mod timing;

pub use timing::{application_timing, request_timing};
