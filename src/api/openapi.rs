//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{actors, auth, health, maintenance, requests};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HR Desk API",
        version = "0.4.0",
        description = "Resource request approval and loan lifecycle REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        // Auth
        auth::me,
        // Requests
        requests::list_requests,
        requests::create_request,
        requests::get_request,
        requests::update_request,
        requests::delete_request,
        requests::submit_request,
        requests::endorse_request,
        requests::decide_request,
        requests::cancel_request,
        requests::restore_request,
        // Loans
        requests::issue_items,
        requests::return_items,
        // Provisioning
        requests::report_provisioning,
        requests::retry_provisioning,
        // Maintenance
        maintenance::get_maintenance,
        maintenance::update_maintenance,
        // Actors
        actors::update_roles,
        actors::update_grade,
    ),
    components(
        schemas(
            // Actors
            crate::models::Actor,
            crate::models::Grade,
            crate::models::actor::UpdateRoles,
            crate::models::actor::UpdateGrade,
            // Requests
            crate::models::ResourceRequest,
            crate::models::RequestKind,
            crate::models::RequestStatus,
            crate::models::LineItem,
            crate::models::ApprovalEntry,
            crate::models::Decision,
            crate::models::RequestDetails,
            crate::models::RecordDecision,
            crate::models::ProvisioningReport,
            crate::models::request::CreateRequest,
            crate::models::request::UpdateRequest,
            crate::models::request::RequestQuery,
            // Loans
            crate::models::LoanTransaction,
            crate::models::TransactionStatus,
            crate::models::IssuedItem,
            crate::models::IssueItem,
            crate::models::IssueItems,
            crate::models::ReturnItems,
            crate::models::LoanMovement,
            // Maintenance
            crate::models::MaintenanceState,
            maintenance::UpdateMaintenance,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authenticated actor"),
        (name = "requests", description = "Loan and email account requests"),
        (name = "loans", description = "Equipment hand-over and return"),
        (name = "provisioning", description = "Email account provisioning"),
        (name = "maintenance", description = "Maintenance mode"),
        (name = "actors", description = "Role and grade assignment")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
