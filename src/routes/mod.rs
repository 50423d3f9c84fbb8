/// Router Module Index
///
/// Splits the HTTP surface by who may reach it. The route guard in front of the whole
/// router decides redirects; the admin handlers re-check the role themselves.

/// Routes reachable without a session (health probe, identity-provider webhook).
pub mod public;

/// The admin resource endpoints under `/api/admin`.
pub mod admin;
