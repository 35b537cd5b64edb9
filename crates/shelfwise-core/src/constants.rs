pub mod paths {
    pub const PROFILE: &str = "/api/users/me/";
    pub const TOKEN: &str = "/api/token/";
    pub const TOKEN_REFRESH: &str = "/api/token/refresh/";
    pub const LOGOUT: &str = "/api/logout/";
    pub const REGISTER: &str = "/api/users/register/";
}

pub mod storage_keys {
    /// Persisted session record.
    pub const SESSION: &str = "shelfwise.session";
    /// Persisted credential cookies.
    pub const CREDENTIALS: &str = "shelfwise.credentials";
}

/// Requests against these endpoints must never be replayed after a refresh.
///
/// The refresh endpoint lives under the token path and is covered by it.
#[must_use]
pub fn is_auth_endpoint(url: &str) -> bool {
    let path = strip_origin(url);
    let path = path.split(['?', '#']).next().unwrap_or_default();
    [paths::TOKEN, paths::LOGOUT, paths::REGISTER]
        .iter()
        .any(|endpoint| path.contains(endpoint))
}

fn strip_origin(url: &str) -> &str {
    match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |index| &rest[index..]),
        None => url,
    }
}
