//! Route guard.
//!
//! Intercepts every request before it reaches a page or API handler and decides, from the
//! caller's authentication state and role, whether it passes through or is redirected.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    AppState,
    auth::{self, Caller, Role},
};

/// Paths reachable without a session.
pub const PUBLIC_ROUTES: [&str; 4] = ["/", "/api/webhook/register", "/sign-in", "/sign-up"];

pub const SIGN_IN_PATH: &str = "/sign-in";
pub const USER_DASHBOARD_PATH: &str = "/dashboard";
pub const ADMIN_DASHBOARD_PATH: &str = "/admin/dashboard";
pub const ADMIN_PREFIX: &str = "/admin";
pub const ERROR_PATH: &str = "/error";

/// Framework-internal paths the guard never sees.
const INTERNAL_PREFIXES: [&str; 4] = ["/health", "/swagger-ui", "/api-docs", "/_next"];

/// Paths under these prefixes are always guarded, even when they look like static files.
const API_PREFIXES: [&str; 2] = ["/api", "/trpc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    PassThrough,
    Redirect(&'static str),
}

/// A rule inspects the path and the visitor (`None` when anonymous) and returns a redirect
/// target when it applies.
type Rule = fn(&str, Option<Role>) -> Option<&'static str>;

/// Evaluated top to bottom; the first rule that fires decides.
const RULES: [Rule; 4] = [
    anonymous_outside_public,
    admin_on_user_dashboard,
    non_admin_in_admin_area,
    authenticated_on_public,
];

pub fn is_public(path: &str) -> bool {
    PUBLIC_ROUTES.contains(&path)
}

fn anonymous_outside_public(path: &str, visitor: Option<Role>) -> Option<&'static str> {
    (visitor.is_none() && !is_public(path)).then_some(SIGN_IN_PATH)
}

fn admin_on_user_dashboard(path: &str, visitor: Option<Role>) -> Option<&'static str> {
    (visitor == Some(Role::Admin) && path == USER_DASHBOARD_PATH).then_some(ADMIN_DASHBOARD_PATH)
}

fn non_admin_in_admin_area(path: &str, visitor: Option<Role>) -> Option<&'static str> {
    (visitor == Some(Role::Standard) && path.starts_with(ADMIN_PREFIX))
        .then_some(USER_DASHBOARD_PATH)
}

fn authenticated_on_public(path: &str, visitor: Option<Role>) -> Option<&'static str> {
    match visitor {
        Some(role) if is_public(path) => Some(home_of(role)),
        _ => None,
    }
}

/// Landing page for a signed-in visitor.
pub fn home_of(role: Role) -> &'static str {
    match role {
        Role::Admin => ADMIN_DASHBOARD_PATH,
        Role::Standard => USER_DASHBOARD_PATH,
    }
}

/// evaluate
///
/// Pure decision function. `visitor` is `None` for anonymous requests.
pub fn evaluate(path: &str, visitor: Option<Role>) -> GuardDecision {
    RULES
        .iter()
        .find_map(|rule| rule(path, visitor))
        .map_or(GuardDecision::PassThrough, GuardDecision::Redirect)
}

/// is_guarded
///
/// Request matcher: static assets (a final segment with a file extension) and
/// framework-internal paths skip the guard, except anything under `/api` or `/trpc`.
pub fn is_guarded(path: &str) -> bool {
    if INTERNAL_PREFIXES.iter().any(|prefix| has_prefix(path, prefix)) {
        return false;
    }
    if API_PREFIXES.iter().any(|prefix| has_prefix(path, prefix)) {
        return true;
    }
    !is_static_asset(path)
}

/// Segment-aware prefix match: `/api` matches `/api` and `/api/x` but not `/apix`.
fn has_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// `/<anything>.<word chars>` at the end of the path.
fn is_static_asset(path: &str) -> bool {
    let rest = path.strip_prefix('/').unwrap_or(path);
    match rest.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && !ext.is_empty()
                && ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

/// route_guard
///
/// Axum middleware wrapping the whole router. Performs at most one role lookup per request,
/// and only when a session identity is present. The resolved `Caller` is stored in the
/// request extensions for the handlers. A provider failure redirects to the generic error
/// page.
pub async fn route_guard(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();

    if !is_guarded(&path) {
        return next.run(request).await;
    }

    let visitor = match auth::resolve_session(request.headers(), &state.config) {
        None => None,
        Some(user_id) => match state.identity.role_of(&user_id).await {
            Ok(role) => {
                request.extensions_mut().insert(Caller { user_id, role });
                Some(role)
            }
            Err(e) => {
                tracing::error!(%user_id, "error fetching user data from identity provider: {}", e);
                return Redirect::temporary(ERROR_PATH).into_response();
            }
        },
    };

    match evaluate(&path, visitor) {
        GuardDecision::PassThrough => next.run(request).await,
        GuardDecision::Redirect(target) => {
            tracing::debug!(%path, redirect = target, "route guard redirect");
            Redirect::temporary(target).into_response()
        }
    }
}
