//! HTML pages rendered with handlebars

use std::sync::Arc;

use axum::{
    extract::State,
    response::{Html, IntoResponse, Response},
};
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use og_auth::{AuthError, Authenticated};

/// Template registry, built once at startup
pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    pub fn new() -> Result<Self, handlebars::TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_template_string("login", include_str!("../templates/login.hbs"))?;
        registry.register_template_string("dashboard", include_str!("../templates/dashboard.hbs"))?;
        Ok(Self { registry })
    }

    fn render<T: Serialize>(&self, name: &str, data: &T) -> Response {
        match self.registry.render(name, data) {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                error!(template = name, error = %e, "Template rendering failed");
                AuthError::internal(format!("failed to render {}", name)).into_response()
            }
        }
    }
}

/// GET /
pub async fn login_page(State(pages): State<Arc<Pages>>) -> Response {
    pages.render(
        "login",
        &json!({
            "title": "OIDC Gate",
            "provider_name": "Keycloak",
            "login_url": "/auth/login",
        }),
    )
}

/// GET /dashboard and /success-login, behind the session gate
pub async fn dashboard(
    State(pages): State<Arc<Pages>>,
    Authenticated(context): Authenticated,
) -> Response {
    pages.render(
        "dashboard",
        &json!({
            "display_name": context.record.profile.display_name,
            "email": context.record.profile.email,
            "claims": context.claims,
            "logout_url": "/auth/logout",
        }),
    )
}
