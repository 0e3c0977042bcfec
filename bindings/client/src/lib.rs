mod client;
mod error;
mod model;
mod targets;

/// Endpoint tags attached to every request, matching the names used by the service dashboards.
pub mod endpoint {
    pub const GET_ALL_PASSES: &str = "get_all_passes";
    pub const GET_PASSES_BY_ELEVATION: &str = "get_passes_by_elevation";
    pub const GET_PASS_IMAGE_VIA_API: &str = "get_pass_image_via_api";
    pub const GET_DIRECT_IMAGE: &str = "get_direct_image";
    pub const GET_PASS_SUMMARY: &str = "get_pass_summary";
    pub const GET_PASS_SUMMARY_SLOW: &str = "get_pass_summary_slow";
    pub const WORKFLOW_SUMMARY: &str = "workflow_summary";
    pub const WORKFLOW_PASSES: &str = "workflow_passes";
    pub const WORKFLOW_PASS_DETAIL: &str = "workflow_pass_detail";
    pub const WORKFLOW_PASS_IMAGE: &str = "workflow_pass_image";
}

pub mod prelude {
    pub use crate::client::{Exchange, HttpResponse, PassServicesClient, REQUEST_TIMEOUT};
    pub use crate::endpoint;
    pub use crate::error::ClientError;
    pub use crate::model::{Coordinate, ElevationRange, Pass};
    pub use crate::targets::ServiceTargets;
}
