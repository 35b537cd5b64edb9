use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use cookie::Cookie;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use shelfwise_core::storage_keys;
use tracing::{debug, warn};

use crate::storage::StateStorage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
    path: String,
    #[serde(default)]
    secure: bool,
    /// `None` for a session cookie, which is never written to storage.
    #[serde(default)]
    expires: Option<DateTime<Utc>>,
}

impl StoredCookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    fn is_persistent(&self) -> bool {
        self.expires.is_some()
    }

    fn matches(&self, url: &Url, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
            && (!self.secure || url.scheme() == "https")
            && path_matches(&self.path, url.path())
    }
}

/// host -> cookies set by that host
type Cookies = BTreeMap<String, Vec<StoredCookie>>;

/// Cookie jar that survives restarts by writing its persistent cookies to
/// durable storage.
///
/// The server keeps the refresh credential in a cookie, so without this a new
/// process could never resume a remembered session. Cookies are host-only;
/// `Domain` is ignored.
pub struct CredentialJar {
    storage: Arc<dyn StateStorage>,
    cookies: Mutex<Cookies>,
}

impl CredentialJar {
    #[must_use]
    pub fn load(storage: Arc<dyn StateStorage>) -> Self {
        let cookies = match storage.get(storage_keys::CREDENTIALS) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!("ignoring unreadable credential jar: {err}");
                Cookies::new()
            }),
            Ok(None) => Cookies::new(),
            Err(err) => {
                warn!("failed to load credential jar: {err}");
                Cookies::new()
            }
        };
        let jar = Self {
            storage,
            cookies: Mutex::new(cookies),
        };
        {
            let mut cookies = jar.lock();
            if purge_expired(&mut cookies, Utc::now()) {
                jar.persist(&cookies);
            }
        }
        jar
    }

    /// Value of a live cookie, whatever its path.
    #[must_use]
    pub fn get(&self, host: &str, name: &str) -> Option<String> {
        let now = Utc::now();
        self.lock()
            .get(host)?
            .iter()
            .find(|cookie| cookie.name == name && !cookie.is_expired(now))
            .map(|cookie| cookie.value.clone())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().values().all(Vec::is_empty)
    }

    pub fn clear(&self) {
        let mut cookies = self.lock();
        cookies.clear();
        if let Err(err) = self.storage.remove(storage_keys::CREDENTIALS) {
            warn!("failed to evict credential jar: {err}");
        }
        debug!("cleared credential jar");
    }

    fn lock(&self) -> MutexGuard<'_, Cookies> {
        self.cookies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn persist(&self, cookies: &Cookies) {
        let durable: Cookies = cookies
            .iter()
            .map(|(host, entries)| {
                let kept: Vec<StoredCookie> = entries
                    .iter()
                    .filter(|cookie| cookie.is_persistent())
                    .cloned()
                    .collect();
                (host.clone(), kept)
            })
            .filter(|(_, entries)| !entries.is_empty())
            .collect();
        let result = if durable.is_empty() {
            self.storage.remove(storage_keys::CREDENTIALS)
        } else {
            match serde_json::to_string(&durable) {
                Ok(raw) => self.storage.set(storage_keys::CREDENTIALS, &raw),
                Err(err) => Err(err.into()),
            }
        };
        if let Err(err) = result {
            warn!("failed to persist credential jar: {err}");
        }
    }
}

impl CookieStore for CredentialJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };
        let now = Utc::now();
        let mut cookies = self.lock();
        let mut changed = false;
        for header in cookie_headers {
            let Some(parsed) = header.to_str().ok().and_then(|raw| parse(raw, url, now)) else {
                continue;
            };
            let entry = cookies.entry(host.to_string()).or_default();
            let before = entry.len();
            entry.retain(|cookie| cookie.name != parsed.name || cookie.path != parsed.path);
            changed |= entry.len() != before;
            if !parsed.value.is_empty() && !parsed.is_expired(now) {
                entry.push(parsed);
                changed = true;
            }
        }
        changed |= purge_expired(&mut cookies, now);
        if changed {
            self.persist(&cookies);
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let host = url.host_str()?;
        let now = Utc::now();
        let mut cookies = self.lock();
        if purge_expired(&mut cookies, now) {
            self.persist(&cookies);
        }
        let mut matching: Vec<&StoredCookie> = cookies
            .get(host)?
            .iter()
            .filter(|cookie| cookie.matches(url, now))
            .collect();
        if matching.is_empty() {
            return None;
        }
        // More specific paths first.
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.name.cmp(&b.name)));
        let header = matching
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&header).ok()
    }
}

fn parse(raw: &str, url: &Url, now: DateTime<Utc>) -> Option<StoredCookie> {
    let cookie = Cookie::parse(raw).ok()?;
    if cookie.name().is_empty() {
        return None;
    }
    // Max-Age wins over Expires.
    let expires = match cookie.max_age() {
        Some(max_age) => Some(
            chrono::Duration::try_seconds(max_age.whole_seconds())
                .and_then(|lifetime| now.checked_add_signed(lifetime))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        ),
        None => cookie
            .expires_datetime()
            .and_then(|at| DateTime::from_timestamp(at.unix_timestamp(), 0)),
    };
    let path = cookie
        .path()
        .filter(|path| path.starts_with('/'))
        .map_or_else(|| default_path(url.path()), str::to_string);
    Some(StoredCookie {
        name: cookie.name().to_string(),
        value: cookie.value_trimmed().to_string(),
        path,
        secure: cookie.secure().unwrap_or(false),
        expires,
    })
}

/// Directory of the request path, per RFC 6265 section 5.1.4.
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => request_path[..index].to_string(),
    }
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if cookie_path == request_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

fn purge_expired(cookies: &mut Cookies, now: DateTime<Utc>) -> bool {
    let mut changed = false;
    for entries in cookies.values_mut() {
        let before = entries.len();
        entries.retain(|cookie| !cookie.is_expired(now));
        changed |= entries.len() != before;
    }
    cookies.retain(|_, entries| !entries.is_empty());
    changed
}
