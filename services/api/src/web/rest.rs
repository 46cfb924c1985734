//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification. Handlers live in
//! `auth`, `documents` and `chat`; this module only gathers them.

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::web::{auth, chat, documents};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
        documents::upload_pdf_handler,
        documents::remove_pdf_handler,
        documents::list_pdfs_handler,
        chat::chat_handler,
    ),
    components(
        schemas(
            auth::CredentialsRequest,
            auth::AuthResponse,
            auth::MessageResponse,
            documents::UploadResponse,
            documents::RemoveResponse,
            chat::ChatRequest,
            chat::ChatResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Study Assistant API", description = "Per-user PDF library with retrieval-augmented question answering.")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` security scheme referenced by the protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}
