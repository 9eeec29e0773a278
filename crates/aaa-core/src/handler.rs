//! Entry points used by the protocol bridge
//!
//! [`AccountingDispatcher`] applies decoded accounting requests to the
//! session and accounting repositories. [`AdmissionControl`] decides whether
//! an authenticated account may open another session.

use crate::accounting::AccountingRepository;
use crate::error::{Error, Result};
use crate::metrics::AaaMetrics;
use crate::model::{Account, AccountingRecord, OnlineSession};
use crate::profile_cache::ProfileCache;
use crate::session::SessionRepository;
use crate::settings::SettingsStore;
use aaa_proto::{AcctRequest, AcctStatusType};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a dispatched accounting request did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcctOutcome {
    /// Session went online
    Started,
    /// Online session counters refreshed
    Updated,
    /// Interim-Update for a session this node had not seen; it was created
    Recovered,
    /// Session closed
    Stopped,
    /// NAS restarted or shut down; this many sessions were cleared
    NasCleared(u64),
}

pub struct AccountingDispatcher {
    sessions: Arc<SessionRepository>,
    accounting: Arc<AccountingRepository>,
    metrics: Arc<AaaMetrics>,
}

impl AccountingDispatcher {
    pub fn new(
        sessions: Arc<SessionRepository>,
        accounting: Arc<AccountingRepository>,
        metrics: Arc<AaaMetrics>,
    ) -> Self {
        AccountingDispatcher {
            sessions,
            accounting,
            metrics,
        }
    }

    /// Apply one accounting request.
    ///
    /// Every failure increments the `acct_errors` counter before it is
    /// returned.
    pub async fn dispatch(&self, req: &AcctRequest) -> Result<AcctOutcome> {
        let result = match req.validate() {
            Ok(()) => self.apply(req).await,
            Err(e) => Err(Error::from(e)),
        };

        if let Err(ref e) = result {
            self.metrics.inc_acct_errors();
            warn!(
                status = ?req.status,
                session_id = %req.session_id,
                username = %req.username,
                error = %e,
                "Accounting request failed"
            );
        }
        result
    }

    async fn apply(&self, req: &AcctRequest) -> Result<AcctOutcome> {
        match req.status {
            AcctStatusType::Start => self.handle_start(req).await,
            AcctStatusType::InterimUpdate => self.handle_interim(req).await,
            AcctStatusType::Stop => self.handle_stop(req).await,
            AcctStatusType::AccountingOn | AcctStatusType::AccountingOff => {
                self.handle_nas_status(req).await
            }
        }
    }

    async fn handle_start(&self, req: &AcctRequest) -> Result<AcctOutcome> {
        let session = session_from_request(req);

        // A retransmitted Start refreshes the existing row instead of
        // opening a second accounting record
        if self.sessions.exists(&req.session_id).await? {
            debug!(session_id = %req.session_id, "Duplicate Start, refreshing session");
            self.sessions.update(&session).await?;
            return Ok(AcctOutcome::Updated);
        }

        let session = self.sessions.create(session).await?;
        self.accounting
            .create(AccountingRecord::from(&session))
            .await?;
        self.metrics.inc_online();

        info!(
            session_id = %session.acct_session_id,
            username = %session.username,
            nas_addr = %session.nas_addr,
            "Session started"
        );
        Ok(AcctOutcome::Started)
    }

    async fn handle_interim(&self, req: &AcctRequest) -> Result<AcctOutcome> {
        let session = session_from_request(req);

        match self.sessions.update(&session).await {
            Ok(()) => Ok(AcctOutcome::Updated),
            Err(e) if e.is_not_found() => {
                warn!(
                    session_id = %req.session_id,
                    username = %req.username,
                    "Interim-Update for unknown session, creating it"
                );
                self.sessions.create(session).await?;
                Ok(AcctOutcome::Recovered)
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_stop(&self, req: &AcctRequest) -> Result<AcctOutcome> {
        // The online row goes regardless of whether history can be closed
        self.sessions.delete(&req.session_id).await?;

        let mut record = AccountingRecord::from(&session_from_request(req));
        record.acct_terminate_cause = req.terminate_cause.map(|cause| cause.as_u32());
        record.acct_stop_time = Some(Utc::now());
        self.accounting.update_stop(&req.session_id, &record).await?;
        self.metrics.inc_offline();

        info!(
            session_id = %req.session_id,
            username = %req.username,
            session_time = req.session_time,
            "Session stopped"
        );
        Ok(AcctOutcome::Stopped)
    }

    async fn handle_nas_status(&self, req: &AcctRequest) -> Result<AcctOutcome> {
        let cleared = self
            .sessions
            .batch_delete_by_nas(&req.nas_addr, &req.nas_id)
            .await?;
        info!(
            status = ?req.status,
            nas_addr = %req.nas_addr,
            nas_id = %req.nas_id,
            cleared,
            "NAS accounting status, online sessions cleared"
        );
        Ok(AcctOutcome::NasCleared(cleared))
    }
}

impl std::fmt::Debug for AccountingDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountingDispatcher")
            .field("sessions", &self.sessions)
            .field("accounting", &self.accounting)
            .finish()
    }
}

/// Online row for the session an accounting request describes
pub fn session_from_request(req: &AcctRequest) -> OnlineSession {
    let mut session =
        SessionRepository::new_session(&req.session_id, &req.username, req.session_time);
    session.nas_addr = req.nas_addr.clone();
    session.nas_id = req.nas_id.clone();
    session.nas_port_id = req.nas_port_id.clone();
    session.framed_ipaddr = req.framed_ipaddr.clone();
    session.mac_addr = req.mac_addr.clone();
    session.acct_input_total = req.input_total();
    session.acct_output_total = req.output_total();
    session.acct_input_packets = req.input_packets;
    session.acct_output_packets = req.output_packets;
    session
}

/// Admission decision for an authenticated account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accept,
    Reject(String),
}

impl Admission {
    pub fn is_accept(&self) -> bool {
        matches!(self, Admission::Accept)
    }
}

pub struct AdmissionControl {
    sessions: Arc<SessionRepository>,
    profiles: Option<Arc<ProfileCache>>,
    metrics: Arc<AaaMetrics>,
    settings: Option<Arc<SettingsStore>>,
}

impl AdmissionControl {
    pub fn new(
        sessions: Arc<SessionRepository>,
        profiles: Option<Arc<ProfileCache>>,
        metrics: Arc<AaaMetrics>,
    ) -> Self {
        AdmissionControl {
            sessions,
            profiles,
            metrics,
            settings: None,
        }
    }

    /// Hold rejects for `radius.reject_delay_secs` before returning them.
    pub fn with_settings(mut self, settings: Arc<SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Check status, expiry and the concurrent-session limit.
    ///
    /// A request that cannot be decided because storage failed is counted
    /// as dropped and the error is returned.
    pub async fn check(&self, account: &Account) -> Result<Admission> {
        let decision = match self.decide(account).await {
            Ok(decision) => decision,
            Err(e) => {
                self.metrics.inc_drop();
                warn!(username = %account.username, error = %e, "Admission undecided, dropping request");
                return Err(e);
            }
        };

        match decision {
            Admission::Accept => self.metrics.inc_accept(),
            Admission::Reject(ref reason) => {
                self.metrics.inc_reject();
                debug!(username = %account.username, reason = %reason, "Admission rejected");
                let delay = self
                    .settings
                    .as_ref()
                    .map(|settings| settings.reject_delay())
                    .unwrap_or_default();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Ok(decision)
    }

    async fn decide(&self, account: &Account) -> Result<Admission> {
        if account.status.eq_ignore_ascii_case("disabled") {
            return Ok(Admission::Reject("account disabled".to_string()));
        }
        if account.is_expired(Utc::now()) {
            return Ok(Admission::Reject("account expired".to_string()));
        }

        let limit = account
            .effective_active_num(self.profiles.as_deref())
            .await;
        if limit <= 0 {
            return Ok(Admission::Accept);
        }

        let online = self.sessions.count_by_username(&account.username).await?;
        if online >= i64::from(limit) {
            return Ok(Admission::Reject(format!(
                "concurrent session limit reached ({}/{})",
                online, limit
            )));
        }
        Ok(Admission::Accept)
    }
}

impl std::fmt::Debug for AdmissionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionControl")
            .field("profiles", &self.profiles.is_some())
            .finish()
    }
}
