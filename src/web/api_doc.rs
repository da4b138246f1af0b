use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

use super::api::error::ErrorResponse;
use crate::mux::{
    StationCallRequest, StationCallResponse, StationCountResponse, StationListResponse,
    StationStatus,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::coordinator::station_count,
        super::api::coordinator::station_list,
        super::api::coordinator::station_status,
        super::api::coordinator::station_call,
    ),
    components(
        schemas(
            StationCountResponse,
            StationListResponse,
            StationStatus,
            StationCallRequest,
            StationCallResponse,
            ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Carp Coordinator API",
        description = "Control plane for connected ground stations",
        version = "0.1.0"
    ),
    tags(
        (name = "coordinator", description = "Station registry and station calls")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
