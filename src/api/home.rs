//! Home page

use axum::{Router, extract::State, response::Html, routing::get};
use axum_extra::extract::CookieJar;

use crate::AppState;
use crate::auth::{Flash, MaybeUser};

/// Create home router
///
/// Routes:
/// - GET / - Landing page
pub fn home_router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

/// GET /
///
/// Shows the pending flash message, if any, and the sign-in state.
async fn index(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    jar: CookieJar,
) -> (CookieJar, Html<String>) {
    let (jar, flash) = Flash::take(jar, state.config.should_use_secure_cookies());

    let flash_html = flash
        .map(|flash| {
            format!(
                "<p class=\"{}\">{}</p>",
                flash.kind.as_str(),
                html_escape::encode_text(&flash.message)
            )
        })
        .unwrap_or_default();

    let account_html = match user {
        Some(user) => format!(
            "<p>Signed in as {} via {}.</p>\n            <a href=\"/signout\">Sign out</a>",
            html_escape::encode_text(user.display_name()),
            html_escape::encode_text(&user.provider)
        ),
        None => "<a href=\"/signin\">Sign in</a>".to_string(),
    };

    let page = format!(
        r#"<!DOCTYPE html>
        <html>
        <head><title>sessiongate</title></head>
        <body>
            {flash_html}
            {account_html}
        </body>
        </html>
    "#
    );

    (jar, Html(page))
}
