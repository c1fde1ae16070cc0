/// Portal session management: login handshake, expiry, invalidation.
///
/// The portal keeps its session in cookies, which ride in the shared
/// blocking client's cookie store. What this module owns on top of that is
/// the session's identity and validity: which account the configured
/// service point belongs to (the interval endpoint needs both IDs), when
/// the login happened, and whether it is still considered fresh.
///
/// Portal logins expire after a few minutes. Sync cycles run on a daily
/// cadence, so in practice every cycle re-authenticates; the TTL matters
/// for the long backfill runs that issue many requests in one process.

use std::time::{Duration, Instant};

use crate::ingest::portal::{self, ServicePointInfo};
use crate::model::{PortalError, UsageUnit};
use crate::municipalities::MunicipalityProfile;

/// How long a login is trusted before `ensure_session` re-authenticates.
/// The portal's own timeout is undocumented; ten minutes stays safely under
/// the shortest observed expiry.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(600);

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A live portal session: the resolved account identity plus validity
/// bookkeeping. The cookie itself stays in the HTTP client.
#[derive(Debug, Clone)]
pub struct Session {
    account_id: String,
    service_point: ServicePointInfo,
    established: Instant,
    ttl: Duration,
}

impl Session {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// The configured service point as the portal describes it, including
    /// meter number and service start date.
    pub fn service_point(&self) -> &ServicePointInfo {
        &self.service_point
    }

    pub fn is_expired(&self) -> bool {
        self.established.elapsed() >= self.ttl
    }
}

// ---------------------------------------------------------------------------
// Session manager
// ---------------------------------------------------------------------------

/// Owns the credential and the current session for one meter. Exactly one
/// manager exists per engine instance; it is never shared across meters.
pub struct SessionManager {
    client: reqwest::blocking::Client,
    root: String,
    profile: &'static dyn MunicipalityProfile,
    username: String,
    password: String,
    servicepoint_id: String,
    ttl: Duration,
    session: Option<Session>,
}

impl SessionManager {
    pub fn new(
        client: reqwest::blocking::Client,
        root: String,
        profile: &'static dyn MunicipalityProfile,
        username: String,
        password: String,
        servicepoint_id: String,
    ) -> Self {
        Self {
            client,
            root,
            profile,
            username,
            password,
            servicepoint_id,
            ttl: DEFAULT_SESSION_TTL,
            session: None,
        }
    }

    #[cfg(test)]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns a valid session, logging in first if none is held or the
    /// held one has aged out. Does not retry a failed login on its own —
    /// the orchestrator bounds re-authentication to once per cycle.
    ///
    /// # Errors
    /// - `PortalError::Authentication` — the portal rejected the
    ///   credentials (or refused the post-login account listing).
    /// - `PortalError::Transport` — network failure or unexpected HTTP
    ///   status during the handshake.
    /// - `PortalError::Schema` — the account listing did not contain the
    ///   configured service point, or it is not a water meter.
    pub fn ensure_session(&mut self) -> Result<&Session, PortalError> {
        let valid = self.session.as_ref().is_some_and(|s| !s.is_expired());
        if !valid {
            log::debug!(
                "no valid session for {}, performing login",
                self.profile.muni_code()
            );
            let fresh = self.login()?;
            self.session = Some(fresh);
        }
        Ok(self.session.as_ref().expect("session established above"))
    }

    /// Drops the held session, forcing a login on the next
    /// `ensure_session`. Called by the orchestrator when the portal rejects
    /// a request for authorization reasons mid-cycle.
    pub fn invalidate(&mut self) {
        if self.session.take().is_some() {
            log::info!("portal session invalidated, will re-authenticate");
        }
    }

    fn login(&self) -> Result<Session, PortalError> {
        let response = self
            .client
            .post(portal::build_login_url(&self.root))
            .json(&serde_json::json!({
                "username": self.username,
                "password": self.password,
            }))
            .send()?;

        let status = response.status().as_u16();
        match status {
            401 | 403 => return Err(PortalError::Authentication { status }),
            s if !(200..300).contains(&s) => {
                return Err(PortalError::Transport(format!("login returned HTTP {}", s)));
            }
            _ => {}
        }

        // The session cookie is now in the client's jar. Resolve which
        // account owns the configured service point; the usage endpoints
        // require both identifiers.
        let response = self
            .client
            .get(portal::build_accounts_url(&self.root))
            .header("Accept", "application/json")
            .send()?;

        let status = response.status().as_u16();
        match status {
            // A login that "succeeded" but cannot list accounts is a
            // credential problem (observed during portal-side lockouts).
            401 | 403 => return Err(PortalError::Authentication { status }),
            s if !(200..300).contains(&s) => {
                return Err(PortalError::Transport(format!(
                    "account listing returned HTTP {}",
                    s
                )));
            }
            _ => {}
        }

        let body = response.text()?;
        let accounts = self.profile.parse_accounts(&body)?;

        for account in accounts {
            if let Some(point) = account
                .service_points
                .iter()
                .find(|p| p.id == self.servicepoint_id)
            {
                if point.unit != UsageUnit::Gallon {
                    return Err(PortalError::Schema(format!(
                        "service point {} is not a supported water meter (commodity: {})",
                        point.id,
                        point.commodity.as_deref().unwrap_or("unknown")
                    )));
                }
                log::debug!(
                    "session established: account {} / service point {}",
                    account.account_id,
                    point.id
                );
                return Ok(Session {
                    account_id: account.account_id,
                    service_point: point.clone(),
                    established: Instant::now(),
                    ttl: self.ttl,
                });
            }
        }

        Err(PortalError::Schema(format!(
            "service point {} not present in the signed-in user's accounts",
            self.servicepoint_id
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::*;
    use crate::model::ErrorKind;
    use crate::municipalities::LakeCountyPublicWorks;

    static PROFILE: LakeCountyPublicWorks = LakeCountyPublicWorks;

    fn manager(server: &mockito::Server, servicepoint_id: &str) -> SessionManager {
        let client = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .build()
            .expect("client should build");
        SessionManager::new(
            client,
            server.url(),
            &PROFILE,
            "pat.larsen".to_string(),
            "hunter2".to_string(),
            servicepoint_id.to_string(),
        )
    }

    #[test]
    fn test_login_rejection_is_authentication_error() {
        let mut server = mockito::Server::new();
        let login = server
            .mock("POST", "/PortalServices/api/User/Login")
            .with_status(401)
            .create();

        let mut mgr = manager(&server, "SP-1001");
        let err = mgr.ensure_session().expect_err("401 login must fail");
        assert_eq!(err.kind(), ErrorKind::Authentication);
        login.assert();
    }

    #[test]
    fn test_login_resolves_account_and_service_point() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/PortalServices/api/User/Login")
            .with_status(200)
            .with_body("{}")
            .create();
        server
            .mock("GET", "/PortalServices/api/Account/UserAccounts")
            .with_status(200)
            .with_body(fixture_user_accounts())
            .create();

        let mut mgr = manager(&server, "SP-1001");
        let session = mgr.ensure_session().expect("login should succeed");
        assert_eq!(session.account_id(), "ACCT-1");
        assert_eq!(session.service_point().id, "SP-1001");
        assert_eq!(session.service_point().meter_number.as_deref(), Some("74-123456"));
        assert!(!session.is_expired());
    }

    #[test]
    fn test_unknown_service_point_is_schema_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/PortalServices/api/User/Login")
            .with_status(200)
            .with_body("{}")
            .create();
        server
            .mock("GET", "/PortalServices/api/Account/UserAccounts")
            .with_status(200)
            .with_body(fixture_user_accounts())
            .create();

        let mut mgr = manager(&server, "SP-DOES-NOT-EXIST");
        let err = mgr.ensure_session().expect_err("unknown service point must fail");
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_non_water_service_point_is_rejected() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/PortalServices/api/User/Login")
            .with_status(200)
            .with_body("{}")
            .create();
        server
            .mock("GET", "/PortalServices/api/Account/UserAccounts")
            .with_status(200)
            .with_body(fixture_user_accounts_gas())
            .create();

        let mut mgr = manager(&server, "SP-2001");
        let err = mgr.ensure_session().expect_err("gas meters are unsupported");
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_session_is_reused_until_invalidated() {
        let mut server = mockito::Server::new();
        let login = server
            .mock("POST", "/PortalServices/api/User/Login")
            .with_status(200)
            .with_body("{}")
            .expect(2)
            .create();
        server
            .mock("GET", "/PortalServices/api/Account/UserAccounts")
            .with_status(200)
            .with_body(fixture_user_accounts())
            .expect(2)
            .create();

        let mut mgr = manager(&server, "SP-1001");
        mgr.ensure_session().expect("first login");
        mgr.ensure_session().expect("held session should be reused");
        mgr.invalidate();
        mgr.ensure_session().expect("re-login after invalidation");
        login.assert(); // exactly two logins: initial + post-invalidate
    }

    #[test]
    fn test_expired_session_triggers_relogin() {
        let mut server = mockito::Server::new();
        let login = server
            .mock("POST", "/PortalServices/api/User/Login")
            .with_status(200)
            .with_body("{}")
            .expect(2)
            .create();
        server
            .mock("GET", "/PortalServices/api/Account/UserAccounts")
            .with_status(200)
            .with_body(fixture_user_accounts())
            .expect(2)
            .create();

        let mut mgr = manager(&server, "SP-1001").with_ttl(Duration::from_secs(0));
        mgr.ensure_session().expect("first login");
        mgr.ensure_session().expect("zero TTL forces a fresh login");
        login.assert();
    }
}
