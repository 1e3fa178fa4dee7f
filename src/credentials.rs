//! OAuth credential lifecycle: load, validate, refresh or re-consent, persist.
//!
//! Acquisition (which may block on a human in a browser) is separated from use:
//! under [`ConsentPolicy::Headless`] a credential that needs fresh consent fails
//! with [`ReportError::ConsentRequired`] instead of launching a browser.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{ReportError, Result};

pub const REPORTING_SCOPE: &str = "https://www.googleapis.com/auth/webmasters.readonly";
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 10;

/// Which grant a credential carries. Each has its own token file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Read-only Search Console access
    Reporting,
    /// Read-write Google Sheets access
    Spreadsheets,
}

impl Scope {
    pub fn scopes(self) -> Vec<String> {
        match self {
            Scope::Reporting => vec![REPORTING_SCOPE.to_string()],
            Scope::Spreadsheets => vec![SPREADSHEETS_SCOPE.to_string()],
        }
    }

    /// Scopes requested when a refresh is rejected: the set's own scopes
    /// plus read-write spreadsheet access.
    pub fn reconsent_scopes(self) -> Vec<String> {
        let mut scopes = self.scopes();
        if !scopes.iter().any(|s| s == SPREADSHEETS_SCOPE) {
            scopes.push(SPREADSHEETS_SCOPE.to_string());
        }
        scopes
    }

    pub fn token_file(self) -> &'static str {
        match self {
            Scope::Reporting => "token.json",
            Scope::Spreadsheets => "token_spreadsheets.json",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Scope::Reporting => "Search Console",
            Scope::Spreadsheets => "Google Sheets",
        }
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Bearer token plus refresh metadata, in Google's authorized-user file layout.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| now + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry)
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && !self.is_expired(now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Where credentials live between runs.
pub trait CredentialStore {
    fn load(&self, scope: Scope) -> Result<Option<Credential>>;
    fn save(&self, scope: Scope, credential: &Credential) -> Result<()>;
    /// Human-readable location, for diagnostics.
    fn describe(&self, scope: Scope) -> String;
}

/// Token files in a directory, one per scope.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, scope: Scope) -> PathBuf {
        self.dir.join(scope.token_file())
    }
}

impl CredentialStore for FileStore {
    fn load(&self, scope: Scope) -> Result<Option<Credential>> {
        let path = self.path(scope);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        match serde_json::from_str::<Credential>(&content) {
            Ok(mut credential) => {
                credential.scopes = scope.scopes();
                Ok(Some(credential))
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable token file");
                Ok(None)
            }
        }
    }

    fn save(&self, scope: Scope, credential: &Credential) -> Result<()> {
        let path = self.path(scope);
        let json = serde_json::to_string_pretty(credential)?;
        fs::write(&path, json)?;
        tracing::debug!(path = %path.display(), "credential saved");
        Ok(())
    }

    fn describe(&self, scope: Scope) -> String {
        self.path(scope).display().to_string()
    }
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    credentials: RefCell<HashMap<Scope, Credential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, scope: Scope, credential: Credential) -> Self {
        self.credentials.borrow_mut().insert(scope, credential);
        self
    }

    pub fn get(&self, scope: Scope) -> Option<Credential> {
        self.credentials.borrow().get(&scope).cloned()
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self, scope: Scope) -> Result<Option<Credential>> {
        Ok(self.get(scope).map(|mut c| {
            c.scopes = scope.scopes();
            c
        }))
    }

    fn save(&self, scope: Scope, credential: &Credential) -> Result<()> {
        self.credentials
            .borrow_mut()
            .insert(scope, credential.clone());
        Ok(())
    }

    fn describe(&self, scope: Scope) -> String {
        format!("memory:{}", scope.token_file())
    }
}

/// Talks to the identity provider.
pub trait Authorizer {
    /// Exchange the refresh token for a new access token.
    /// A provider refusal is [`ReportError::RefreshRejected`].
    fn refresh(&self, credential: &Credential) -> Result<Credential>;

    /// Run a full consent flow for `scopes`. May block on the operator.
    fn consent(&self, scopes: &[String]) -> Result<Credential>;
}

/// Whether a run may block on a human to grant access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentPolicy {
    Interactive,
    Headless,
}

pub struct CredentialManager<'a> {
    store: &'a dyn CredentialStore,
    authorizer: &'a dyn Authorizer,
    policy: ConsentPolicy,
}

impl<'a> CredentialManager<'a> {
    pub fn new(
        store: &'a dyn CredentialStore,
        authorizer: &'a dyn Authorizer,
        policy: ConsentPolicy,
    ) -> Self {
        Self {
            store,
            authorizer,
            policy,
        }
    }

    /// Return a usable credential for `scope`, refreshing or re-issuing it
    /// as needed. Anything newly obtained is persisted before returning.
    pub fn obtain(&self, scope: Scope) -> Result<Credential> {
        self.obtain_at(scope, Utc::now())
    }

    fn obtain_at(&self, scope: Scope, now: DateTime<Utc>) -> Result<Credential> {
        let candidate = self.store.load(scope)?;

        if let Some(credential) = &candidate {
            if credential.is_valid(now) {
                tracing::debug!(scope = scope.label(), "stored credential is valid");
                return Ok(credential.clone());
            }
        }

        let credential = match candidate {
            Some(stale) if stale.is_expired(now) && stale.can_refresh() => {
                tracing::debug!(scope = scope.label(), "refreshing expired credential");
                match self.authorizer.refresh(&stale) {
                    Ok(fresh) => fresh,
                    Err(ReportError::RefreshRejected(reason)) => {
                        tracing::warn!(scope = scope.label(), %reason, "refresh rejected, re-consenting");
                        self.consent(scope, scope.reconsent_scopes())?
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => self.consent(scope, scope.scopes())?,
        };

        self.store.save(scope, &credential)?;
        Ok(credential)
    }

    fn consent(&self, scope: Scope, scopes: Vec<String>) -> Result<Credential> {
        match self.policy {
            ConsentPolicy::Headless => Err(ReportError::ConsentRequired {
                scope: scope.label().to_string(),
                path: self.store.describe(scope),
            }),
            ConsentPolicy::Interactive => {
                tracing::info!(scope = scope.label(), "starting consent flow");
                self.authorizer.consent(&scopes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::tempdir;

    fn credential(token: &str, expiry: Option<DateTime<Utc>>, refresh: Option<&str>) -> Credential {
        Credential {
            token: token.to_string(),
            refresh_token: refresh.map(str::to_string),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec![],
            expiry,
        }
    }

    enum RefreshOutcome {
        Fresh,
        Rejected,
        NetworkDown,
    }

    struct FakeAuthorizer {
        refresh: RefreshOutcome,
        refresh_calls: Cell<u32>,
        consent_scopes: RefCell<Vec<Vec<String>>>,
    }

    impl FakeAuthorizer {
        fn new(refresh: RefreshOutcome) -> Self {
            Self {
                refresh,
                refresh_calls: Cell::new(0),
                consent_scopes: RefCell::new(vec![]),
            }
        }
    }

    impl Authorizer for FakeAuthorizer {
        fn refresh(&self, c: &Credential) -> Result<Credential> {
            self.refresh_calls.set(self.refresh_calls.get() + 1);
            match self.refresh {
                RefreshOutcome::Fresh => Ok(Credential {
                    token: "refreshed".to_string(),
                    expiry: Some(Utc::now() + Duration::hours(1)),
                    ..c.clone()
                }),
                RefreshOutcome::Rejected => {
                    Err(ReportError::RefreshRejected("invalid_grant".to_string()))
                }
                RefreshOutcome::NetworkDown => Err(ReportError::Api {
                    status: 503,
                    body: "unavailable".to_string(),
                }),
            }
        }

        fn consent(&self, scopes: &[String]) -> Result<Credential> {
            self.consent_scopes.borrow_mut().push(scopes.to_vec());
            Ok(Credential {
                scopes: scopes.to_vec(),
                ..credential("consented", Some(Utc::now() + Duration::hours(1)), Some("r"))
            })
        }
    }

    #[test]
    fn valid_stored_credential_is_returned_untouched() {
        let store = MemoryStore::new().with(Scope::Reporting, credential("stored", None, None));
        let auth = FakeAuthorizer::new(RefreshOutcome::Fresh);
        let manager = CredentialManager::new(&store, &auth, ConsentPolicy::Interactive);

        let c = manager.obtain(Scope::Reporting).unwrap();
        assert_eq!(c.token, "stored");
        assert_eq!(c.scopes, vec![REPORTING_SCOPE]);
        assert_eq!(auth.refresh_calls.get(), 0);
        assert!(auth.consent_scopes.borrow().is_empty());
    }

    #[test]
    fn expired_credential_is_refreshed_and_persisted() {
        let past = Utc::now() - Duration::hours(1);
        let store = MemoryStore::new().with(Scope::Reporting, credential("old", Some(past), Some("r")));
        let auth = FakeAuthorizer::new(RefreshOutcome::Fresh);
        let manager = CredentialManager::new(&store, &auth, ConsentPolicy::Headless);

        let c = manager.obtain(Scope::Reporting).unwrap();
        assert_eq!(c.token, "refreshed");
        assert_eq!(store.get(Scope::Reporting).unwrap().token, "refreshed");
        assert_eq!(auth.refresh_calls.get(), 1);
    }

    #[test]
    fn rejected_refresh_falls_back_to_spreadsheet_consent() {
        let past = Utc::now() - Duration::hours(1);
        let store = MemoryStore::new().with(Scope::Reporting, credential("old", Some(past), Some("r")));
        let auth = FakeAuthorizer::new(RefreshOutcome::Rejected);
        let manager = CredentialManager::new(&store, &auth, ConsentPolicy::Interactive);

        let c = manager.obtain(Scope::Reporting).unwrap();
        assert_eq!(c.token, "consented");
        assert_eq!(
            auth.consent_scopes.borrow().as_slice(),
            &[vec![REPORTING_SCOPE.to_string(), SPREADSHEETS_SCOPE.to_string()]]
        );
        assert_eq!(store.get(Scope::Reporting).unwrap().token, "consented");
    }

    #[test]
    fn refresh_transport_failure_is_not_masked() {
        let past = Utc::now() - Duration::hours(1);
        let store = MemoryStore::new().with(Scope::Reporting, credential("old", Some(past), Some("r")));
        let auth = FakeAuthorizer::new(RefreshOutcome::NetworkDown);
        let manager = CredentialManager::new(&store, &auth, ConsentPolicy::Interactive);

        assert!(matches!(
            manager.obtain(Scope::Reporting),
            Err(ReportError::Api { status: 503, .. })
        ));
        assert!(auth.consent_scopes.borrow().is_empty());
    }

    #[test]
    fn missing_credential_runs_consent_for_its_own_scope() {
        let store = MemoryStore::new();
        let auth = FakeAuthorizer::new(RefreshOutcome::Fresh);
        let manager = CredentialManager::new(&store, &auth, ConsentPolicy::Interactive);

        manager.obtain(Scope::Spreadsheets).unwrap();
        assert_eq!(
            auth.consent_scopes.borrow().as_slice(),
            &[vec![SPREADSHEETS_SCOPE.to_string()]]
        );
        assert!(store.get(Scope::Spreadsheets).is_some());
        assert!(store.get(Scope::Reporting).is_none());
    }

    #[test]
    fn expired_without_refresh_token_needs_consent() {
        let past = Utc::now() - Duration::hours(1);
        let store = MemoryStore::new().with(Scope::Reporting, credential("old", Some(past), None));
        let auth = FakeAuthorizer::new(RefreshOutcome::Fresh);
        let manager = CredentialManager::new(&store, &auth, ConsentPolicy::Interactive);

        manager.obtain(Scope::Reporting).unwrap();
        assert_eq!(auth.refresh_calls.get(), 0);
        assert_eq!(auth.consent_scopes.borrow().len(), 1);
    }

    #[test]
    fn headless_policy_fails_fast_instead_of_consenting() {
        let store = MemoryStore::new();
        let auth = FakeAuthorizer::new(RefreshOutcome::Fresh);
        let manager = CredentialManager::new(&store, &auth, ConsentPolicy::Headless);

        let err = manager.obtain(Scope::Spreadsheets).unwrap_err();
        assert!(matches!(err, ReportError::ConsentRequired { .. }));
        assert!(err.to_string().contains("token_spreadsheets.json"));
        assert!(auth.consent_scopes.borrow().is_empty());
    }

    #[test]
    fn expiry_inside_skew_counts_as_expired() {
        let now = Utc::now();
        let c = credential("t", Some(now + Duration::seconds(5)), Some("r"));
        assert!(c.is_expired(now));
        assert!(!c.is_valid(now));
        assert!(credential("t", Some(now + Duration::minutes(5)), None).is_valid(now));
        assert!(!credential("", None, None).is_valid(now));
    }

    #[test]
    fn file_store_round_trip_rescopes_on_load() {
        let temp = tempdir().unwrap();
        let store = FileStore::new(temp.path());
        let mut c = credential("abc", Some(Utc::now() + Duration::hours(1)), Some("r"));
        c.scopes = vec!["something-else".to_string()];

        store.save(Scope::Spreadsheets, &c).unwrap();
        assert!(temp.path().join("token_spreadsheets.json").exists());
        assert!(store.load(Scope::Reporting).unwrap().is_none());

        let loaded = store.load(Scope::Spreadsheets).unwrap().unwrap();
        assert_eq!(loaded.token, "abc");
        assert_eq!(loaded.refresh_token.as_deref(), Some("r"));
        assert_eq!(loaded.scopes, vec![SPREADSHEETS_SCOPE]);
    }

    #[test]
    fn file_store_reads_google_authorized_user_layout() {
        let temp = tempdir().unwrap();
        let json = r#"{"token": "ya29.x", "refresh_token": "1//r", "token_uri": "https://oauth2.googleapis.com/token", "client_id": "id.apps.googleusercontent.com", "client_secret": "s", "scopes": ["https://www.googleapis.com/auth/webmasters.readonly"], "universe_domain": "googleapis.com", "account": "", "expiry": "2024-05-01T10:00:00.123456Z"}"#;
        std::fs::write(temp.path().join("token.json"), json).unwrap();

        let loaded = FileStore::new(temp.path())
            .load(Scope::Reporting)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.token, "ya29.x");
        assert!(loaded.is_expired(Utc::now()));
        assert!(loaded.can_refresh());
    }

    #[test]
    fn unreadable_token_file_is_treated_as_absent() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("token.json"), "not json").unwrap();
        assert!(FileStore::new(temp.path())
            .load(Scope::Reporting)
            .unwrap()
            .is_none());
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let c = credential("very-secret-token", None, Some("refresh-secret"));
        let dbg = format!("{:?}", c);
        assert!(!dbg.contains("very-secret-token"));
        assert!(!dbg.contains("refresh-secret"));
    }
}
