//! OpenAPI documentation for the `/api/v0` surface.
//!
//! The document is served at `/api/v0/openapi.json` and rendered at `/api/v0/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::api;
use crate::types::{Capability, CapabilitySet};

/// Registers the `ApiKey <username>:<key>` authorization scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "ApiKeyAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "Authorization",
                    "API key authentication. Include your username and key in the `Authorization` header:\n\n\
                    ```\nAuthorization: ApiKey USERNAME:API_KEY\n```\n\n\
                    Keys are issued by `POST /users/me/api-key` or `POST /authentication/api-key`.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "provstore",
        description = "Provenance bundle store with API-key authentication and per-object permissions."
    ),
    servers(
        (url = "/api/v0", description = "Bundle API")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::bundles::list_bundles,
        api::handlers::bundles::create_bundle,
        api::handlers::bundles::get_bundle,
        api::handlers::bundles::update_bundle,
        api::handlers::bundles::delete_bundle,
        api::handlers::permissions::get_own_permissions,
        api::handlers::permissions::get_user_permissions,
        api::handlers::permissions::list_group_grants,
        api::handlers::permissions::grant_user_permission,
        api::handlers::permissions::revoke_user_permission,
        api::handlers::permissions::grant_group_permission,
        api::handlers::permissions::revoke_group_permission,
        api::handlers::groups::list_groups,
        api::handlers::groups::create_group,
        api::handlers::groups::get_group,
        api::handlers::groups::delete_group,
        api::handlers::groups::add_user_to_group,
        api::handlers::groups::remove_user_from_group,
        api::handlers::users::create_user,
        api::handlers::users::get_current_user,
        api::handlers::api_keys::rotate_own_api_key,
        api::handlers::api_keys::revoke_own_api_key,
        api::handlers::api_keys::obtain_api_key,
    ),
    components(
        schemas(
            Capability,
            CapabilitySet,
            api::models::pagination::ListMeta,
            api::models::bundles::BundleCreate,
            api::models::bundles::BundleResponse,
            api::models::bundles::BundleDetailResponse,
            api::models::permissions::BundlePermissionsResponse,
            api::models::permissions::GroupGrantResponse,
            api::models::groups::GroupCreate,
            api::models::groups::GroupResponse,
            api::models::users::UserCreate,
            api::models::users::UserResponse,
            api::models::api_keys::ApiKeyLogin,
            api::models::api_keys::ApiKeyResponse,
        )
    ),
    tags(
        (name = "bundles", description = "Provenance bundle storage"),
        (name = "permissions", description = "Per-bundle grants to users and groups"),
        (name = "groups", description = "Group management and memberships"),
        (name = "users", description = "User management"),
        (name = "api_keys", description = "API key rotation and revocation"),
        (name = "authentication", description = "Exchange credentials for an API key"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::ApiDoc;
    use utoipa::OpenApi;

    #[test]
    fn test_document_lists_bundle_paths_and_security() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/bundle/"));
        assert!(doc.paths.paths.contains_key("/bundle/{id}/"));
        assert!(doc.paths.paths.contains_key("/authentication/api-key"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("ApiKeyAuth"));
        assert!(components.schemas.contains_key("BundleResponse"));
    }
}
