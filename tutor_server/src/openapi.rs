use axum::Router;
use tutor_core::{
    Attachment, Conversation, Message, MessageStatus, MessageType, PublicUser, User, UserRole,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_rapidoc::RapiDoc;
use utoipa_redoc::{Redoc, Servable};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ErrorOutput,
    handlers::*,
    models::{CreateUser, SigninUser},
    services::*,
    AppState,
};

pub(crate) trait OpenApiRouter {
    fn openapi(self) -> Self;
}

#[derive(OpenApi)]
#[openapi(
    paths(
        signup_handler,
        signin_handler,
        me_handler,
        profile_handler,
        list_conversation_handler,
        create_conversation_handler,
        poll_message_handler,
        read_message_handler,
        list_message_handler,
        send_message_handler,
        list_users_handler,
        impersonate_handler,
        stop_impersonating_handler,
    ),
    components(schemas(
        CreateUser,
        SigninUser,
        AuthOutput,
        ErrorOutput,
        User,
        UserRole,
        PublicUser,
        Conversation,
        ConversationSummary,
        CreateConversation,
        ConversationsOutput,
        ConversationOutput,
        Message,
        MessageStatus,
        MessageType,
        Attachment,
        CreateMessage,
        MessagesOutput,
        MessageOutput,
        SuccessOutput,
        ImpersonateUser,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "tutor", description = "Tutor messaging operations")
    )
)]
pub(crate) struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "token",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            )
        }
    }
}

impl OpenApiRouter for Router<AppState> {
    fn openapi(self) -> Self {
        self.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .merge(Redoc::with_url("/redoc", ApiDoc::openapi()))
            .merge(RapiDoc::new("/api-docs/openapi.json").path("/rapidoc"))
    }
}
