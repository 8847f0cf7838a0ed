//! Joining, participating in and leaving a session.
//!
//! ```text
//! LoggedOut --prepare_join--> Joining --complete_join--> Active --leave--> Leaving --> LoggedOut
//!                                |                          |
//!                                +--(error / abort)---------+--(session closed remotely)--> LoggedOut
//! ```
//!
//! While active, the lifecycle owns the participation's [`GeoFilter`] and
//! [`TrailBuilder`] and is the only writer of the participant's own record.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use convoy_shared::{Color, GeoPoint, ParticipantId, SessionCode};
use convoy_store::{
    Annotation, CleanupSummary, ConvoyStore, NewParticipant, Participant, PositionUpdate, Session,
    StoreEvent,
};

use crate::config::Tuning;
use crate::error::{ConvoyError, Result, ValidationError};
use crate::geo_filter::{GeoFilter, RawSample};
use crate::roster::{assign_color, taken_colors, validate_join};
use crate::trail::TrailBuilder;

/// Fresh codes tried before a host gives up.
const MAX_CODE_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    LoggedOut,
    Joining,
    Active,
    Leaving,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::LoggedOut => "logged-out",
            Phase::Joining => "joining",
            Phase::Active => "active",
            Phase::Leaving => "leaving",
        }
    }
}

/// Whether to start a new session or enter an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Host,
    /// The code as typed by the user.
    Guest(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub color: Color,
    pub role: Role,
}

/// A validated join, waiting for a starting position.
#[derive(Debug, Clone)]
pub struct JoinTicket {
    code: SessionCode,
    is_host: bool,
    participant_id: ParticipantId,
    display_name: String,
    color: Color,
}

impl JoinTicket {
    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// The colour actually assigned, which may differ from the requested one.
    pub fn color(&self) -> &Color {
        &self.color
    }
}

/// Everything a client needs to start rendering a session.
#[derive(Debug)]
pub struct JoinedSession {
    pub code: SessionCode,
    pub is_host: bool,
    pub me: Participant,
    pub participants: Vec<Participant>,
    pub annotations: Vec<Annotation>,
    pub feed: broadcast::Receiver<StoreEvent>,
}

#[derive(Debug)]
struct ActiveSession {
    code: SessionCode,
    me: ParticipantId,
    is_host: bool,
    filter: GeoFilter,
    trail: TrailBuilder,
}

pub struct SessionLifecycle {
    store: Arc<dyn ConvoyStore>,
    tuning: Tuning,
    phase: Phase,
    active: Option<ActiveSession>,
}

impl SessionLifecycle {
    pub fn new(store: Arc<dyn ConvoyStore>, tuning: Tuning) -> Self {
        Self {
            store,
            tuning,
            phase: Phase::LoggedOut,
            active: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn code(&self) -> Option<&SessionCode> {
        self.active.as_ref().map(|a| &a.code)
    }

    pub fn is_host(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.is_host)
    }

    pub fn filter(&self) -> Option<&GeoFilter> {
        self.active.as_ref().map(|a| &a.filter)
    }

    pub fn trail(&self) -> Option<&TrailBuilder> {
        self.active.as_ref().map(|a| &a.trail)
    }

    // ------------------------------------------------------------------
    // Join
    // ------------------------------------------------------------------

    /// Validate a join request against the current roster.
    ///
    /// A host gets a freshly generated code; codes that already have a
    /// leader are skipped.  On success the lifecycle is `Joining`.
    pub fn prepare_join(&mut self, request: &JoinRequest) -> Result<JoinTicket> {
        self.expect_phase(Phase::LoggedOut)?;
        self.phase = Phase::Joining;

        let result = self.validate(request);
        if result.is_err() {
            self.phase = Phase::LoggedOut;
        }
        result
    }

    /// Write the participant record and become `Active`.
    pub fn complete_join(&mut self, ticket: JoinTicket, position: GeoPoint) -> Result<JoinedSession> {
        self.expect_phase(Phase::Joining)?;

        let result = self.enter(ticket, position);
        if result.is_err() {
            self.phase = Phase::LoggedOut;
        }
        result
    }

    /// [`prepare_join`](Self::prepare_join) and
    /// [`complete_join`](Self::complete_join) in one go.
    pub fn join(&mut self, request: &JoinRequest, position: GeoPoint) -> Result<JoinedSession> {
        let ticket = self.prepare_join(request)?;
        self.complete_join(ticket, position)
    }

    /// Give up on a prepared join.
    pub fn abort_join(&mut self) {
        if self.phase == Phase::Joining {
            self.phase = Phase::LoggedOut;
        }
    }

    fn validate(&self, request: &JoinRequest) -> Result<JoinTicket> {
        let display_name = request.display_name.trim();
        if display_name.is_empty() {
            return Err(ValidationError::MissingName.into());
        }

        let (code, existing) = match &request.role {
            Role::Guest(raw) => {
                let code = SessionCode::parse(raw)
                    .map_err(|_| ValidationError::InvalidCode(raw.clone()))?;
                let existing = self.store.list_participants(&code)?;
                validate_join(
                    &code,
                    &existing,
                    &request.participant_id,
                    false,
                    self.tuning.max_participants,
                )?;
                (code, existing)
            }
            Role::Host => self.claim_fresh_code(&request.participant_id)?,
        };

        let color = assign_color(
            &request.color,
            taken_colors(&existing, &request.participant_id),
        );
        if color != request.color {
            debug!(requested = %request.color.as_str(), assigned = %color.as_str(), "colour taken, reassigned");
        }

        Ok(JoinTicket {
            code,
            is_host: request.role == Role::Host,
            participant_id: request.participant_id.clone(),
            display_name: display_name.to_string(),
            color,
        })
    }

    fn claim_fresh_code(&self, host: &ParticipantId) -> Result<(SessionCode, Vec<Participant>)> {
        let mut last_err = None;
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = SessionCode::generate();
            let existing = self.store.list_participants(&code)?;
            match validate_join(&code, &existing, host, true, self.tuning.max_participants) {
                Ok(()) => return Ok((code, existing)),
                Err(e @ ValidationError::CodeTaken(_)) => {
                    debug!(session = %code, "code already hosted, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or(ValidationError::InvalidCode(String::new()))
            .into())
    }

    fn enter(&mut self, ticket: JoinTicket, position: GeoPoint) -> Result<JoinedSession> {
        // Subscribe before writing so none of our own changes are missed.
        let feed = self.store.subscribe();

        if ticket.is_host {
            self.store.create_session(&Session {
                code: ticket.code.clone(),
                host_id: ticket.participant_id.clone(),
                created_at: Utc::now(),
            })?;
        }

        let me = self.store.upsert_participant(
            &ticket.code,
            &NewParticipant {
                id: ticket.participant_id.clone(),
                display_name: ticket.display_name.clone(),
                color: ticket.color.clone(),
                is_leader: ticket.is_host,
                position,
            },
        )?;
        let participants = self.store.list_participants(&ticket.code)?;
        let annotations = self.store.list_annotations(&ticket.code)?;

        info!(
            session = %ticket.code,
            participant = %ticket.participant_id,
            host = ticket.is_host,
            others = participants.len().saturating_sub(1),
            "joined session"
        );

        self.active = Some(ActiveSession {
            code: ticket.code.clone(),
            me: ticket.participant_id,
            is_host: ticket.is_host,
            filter: GeoFilter::new(&self.tuning),
            trail: TrailBuilder::new(&self.tuning),
        });
        self.phase = Phase::Active;

        Ok(JoinedSession {
            code: ticket.code,
            is_host: ticket.is_host,
            me,
            participants,
            annotations,
            feed,
        })
    }

    // ------------------------------------------------------------------
    // Active
    // ------------------------------------------------------------------

    /// Run `sample` through the filter and trail gate and publish it if
    /// due.  Returns the updated own record when a write was accepted.
    ///
    /// A failed write is logged and dropped; the filter state only advances
    /// on success, so the next sample retries.
    pub fn submit_sample(&mut self, sample: &RawSample) -> Option<Participant> {
        let active = self.active.as_mut()?;
        let publish = active.filter.evaluate(sample)?;
        let trail_point = active.trail.admit(sample, active.is_host);

        let update = PositionUpdate {
            position: publish.position,
            trail_point,
        };
        match self.store.update_position(&active.code, &active.me, &update) {
            Ok(me) => {
                active.filter.acknowledge(&publish);
                if let Some(point) = trail_point {
                    active.trail.acknowledge(point);
                }
                debug!(reason = ?publish.reason, trail = trail_point.is_some(), "position published");
                Some(me)
            }
            Err(e) => {
                warn!(session = %active.code, "position write dropped: {e}");
                None
            }
        }
    }

    /// Host-only: empty the leader's stored trail.
    pub fn clear_trail(&mut self) -> Result<Option<Participant>> {
        self.expect_phase(Phase::Active)?;
        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };
        if !active.is_host {
            return Err(ValidationError::NotHost("clear the trail").into());
        }

        match self.store.clear_trail(&active.code, &active.me) {
            Ok(me) => {
                active.trail.reset();
                info!(session = %active.code, "trail cleared");
                Ok(Some(me))
            }
            Err(e) => {
                warn!(session = %active.code, "trail clear dropped: {e}");
                Ok(None)
            }
        }
    }

    // ------------------------------------------------------------------
    // Leave
    // ------------------------------------------------------------------

    /// Leave the session.
    ///
    /// A host tears the whole session down in one atomic batch.  A guest
    /// removes its own record and tears the session down only if nobody is
    /// left.  Store failures during cleanup are logged and the lifecycle
    /// still returns to `LoggedOut`.
    pub fn leave(&mut self) -> Result<Option<CleanupSummary>> {
        self.expect_phase(Phase::Active)?;
        self.phase = Phase::Leaving;

        let summary = match self.active.take() {
            Some(active) if active.is_host => self.teardown(&active.code),
            Some(active) => {
                if let Err(e) = self.store.delete_participant(&active.code, &active.me) {
                    error!(session = %active.code, "failed to remove own record: {e}");
                }
                match self.store.list_participants(&active.code) {
                    Ok(rest) if rest.is_empty() => self.teardown(&active.code),
                    Ok(_) => None,
                    Err(e) => {
                        error!(session = %active.code, "failed to check remaining participants: {e}");
                        None
                    }
                }
            }
            None => None,
        };

        self.phase = Phase::LoggedOut;
        Ok(summary)
    }

    /// The session was removed by someone else.  Drop local state without
    /// writing anything.
    pub fn session_closed(&mut self) {
        if let Some(active) = self.active.take() {
            info!(session = %active.code, "session closed remotely");
        }
        self.phase = Phase::LoggedOut;
    }

    fn teardown(&self, code: &SessionCode) -> Option<CleanupSummary> {
        match self.store.close_session(code) {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(session = %code, "session cleanup failed: {e}");
                None
            }
        }
    }

    fn expect_phase(&self, expected: Phase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(ConvoyError::InvalidState {
                expected: expected.name(),
                actual: self.phase.name(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use convoy_shared::PALETTE;
    use convoy_store::{Change, Database};

    fn store() -> Arc<Database> {
        Arc::new(Database::open_in_memory().unwrap())
    }

    fn request(id: &str, role: Role) -> JoinRequest {
        JoinRequest {
            participant_id: ParticipantId::parse(id).unwrap(),
            display_name: id.to_uppercase(),
            color: Color::default(),
            role,
        }
    }

    fn host(db: &Arc<Database>) -> (SessionLifecycle, JoinedSession) {
        let mut lifecycle = SessionLifecycle::new(db.clone(), Tuning::default());
        let joined = lifecycle
            .join(&request("host", Role::Host), GeoPoint::new(27.0, 75.0))
            .unwrap();
        (lifecycle, joined)
    }

    fn guest(db: &Arc<Database>, id: &str, code: &SessionCode) -> (SessionLifecycle, JoinedSession) {
        let mut lifecycle = SessionLifecycle::new(db.clone(), Tuning::default());
        let joined = lifecycle
            .join(
                &request(id, Role::Guest(code.to_string().to_lowercase())),
                GeoPoint::new(27.0, 75.01),
            )
            .unwrap();
        (lifecycle, joined)
    }

    #[test]
    fn test_host_creates_session() {
        let db = store();
        let (lifecycle, joined) = host(&db);

        assert_eq!(lifecycle.phase(), Phase::Active);
        assert!(joined.is_host);
        assert!(joined.me.is_leader);
        assert_eq!(joined.me.trail, Some(Vec::new()));
        assert_eq!(joined.code.as_str().len(), 4);
        assert!(db.get_session(&joined.code).is_ok());
    }

    #[test]
    fn test_missing_name() {
        let db = store();
        let mut lifecycle = SessionLifecycle::new(db, Tuning::default());
        let mut req = request("a", Role::Host);
        req.display_name = "   ".into();

        let err = lifecycle.join(&req, GeoPoint::new(0.0, 0.0)).unwrap_err();
        assert!(matches!(
            err,
            ConvoyError::Validation(ValidationError::MissingName)
        ));
        assert_eq!(lifecycle.phase(), Phase::LoggedOut);
    }

    #[test]
    fn test_guest_into_missing_room() {
        let db = store();
        let mut lifecycle = SessionLifecycle::new(db, Tuning::default());
        let err = lifecycle
            .join(&request("g", Role::Guest("ZZZZ".into())), GeoPoint::new(0.0, 0.0))
            .unwrap_err();
        assert!(matches!(
            err,
            ConvoyError::Validation(ValidationError::RoomNotFound(_))
        ));
        assert_eq!(lifecycle.phase(), Phase::LoggedOut);
    }

    #[test]
    fn test_guest_bad_code() {
        let db = store();
        let mut lifecycle = SessionLifecycle::new(db, Tuning::default());
        let err = lifecycle
            .join(&request("g", Role::Guest("no way!".into())), GeoPoint::new(0.0, 0.0))
            .unwrap_err();
        assert!(matches!(
            err,
            ConvoyError::Validation(ValidationError::InvalidCode(_))
        ));
    }

    #[test]
    fn test_shared_identity_cannot_demote_host() {
        let db = store();
        let (_host, joined) = host(&db);

        let mut twin = SessionLifecycle::new(db.clone(), Tuning::default());
        let err = twin
            .join(
                &request("host", Role::Guest(joined.code.to_string())),
                GeoPoint::new(0.0, 0.0),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ConvoyError::Validation(ValidationError::LeaderIdentity(_))
        ));
        let stored = db.list_participants(&joined.code).unwrap();
        assert!(stored[0].is_leader);
    }

    #[test]
    fn test_guest_gets_free_colour() {
        let db = store();
        let (_host, joined) = host(&db);
        let (_guest, guest_joined) = guest(&db, "g1", &joined.code);

        assert_eq!(guest_joined.me.color, Color::from(&PALETTE[1]));
        assert!(!guest_joined.me.is_leader);
        assert_eq!(guest_joined.participants.len(), 2);
    }

    #[test]
    fn test_room_full() {
        let db = store();
        let (_host, joined) = host(&db);
        let mut guests = Vec::new();
        for i in 1..10 {
            guests.push(guest(&db, &format!("g{i}"), &joined.code));
        }

        let mut late = SessionLifecycle::new(db.clone(), Tuning::default());
        let err = late
            .join(
                &request("late", Role::Guest(joined.code.to_string())),
                GeoPoint::new(0.0, 0.0),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ConvoyError::Validation(ValidationError::RoomFull { capacity: 10, .. })
        ));

        // A returning participant still fits.
        let mut back = SessionLifecycle::new(db.clone(), Tuning::default());
        assert!(back
            .join(
                &request("g9", Role::Guest(joined.code.to_string())),
                GeoPoint::new(0.0, 0.0)
            )
            .is_ok());
    }

    #[test]
    fn test_join_twice_is_invalid_state() {
        let db = store();
        let (mut lifecycle, _) = host(&db);
        let err = lifecycle
            .join(&request("host", Role::Host), GeoPoint::new(0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, ConvoyError::InvalidState { .. }));
        assert_eq!(lifecycle.phase(), Phase::Active);
    }

    #[test]
    fn test_abort_join() {
        let db = store();
        let mut lifecycle = SessionLifecycle::new(db.clone(), Tuning::default());
        let ticket = lifecycle.prepare_join(&request("h", Role::Host)).unwrap();
        assert_eq!(lifecycle.phase(), Phase::Joining);
        lifecycle.abort_join();
        assert_eq!(lifecycle.phase(), Phase::LoggedOut);
        assert!(db.list_participants(ticket.code()).unwrap().is_empty());
    }

    #[test]
    fn test_host_sample_extends_trail() {
        let db = store();
        let (mut lifecycle, joined) = host(&db);
        let t0 = Utc::now();

        let first = RawSample::device(GeoPoint::new(27.0, 75.0), None, Some(5.0), t0);
        let me = lifecycle.submit_sample(&first).unwrap();
        assert_eq!(me.trail.as_deref(), Some(&[GeoPoint::new(27.0, 75.0)][..]));

        // Stationary and soon after: filtered out.
        let still = RawSample::device(
            GeoPoint::new(27.0, 75.0),
            None,
            Some(5.0),
            t0 + Duration::seconds(2),
        );
        assert!(lifecycle.submit_sample(&still).is_none());

        // Inaccurate fix: published but not added to the trail.
        let fuzzy = RawSample::device(
            GeoPoint::new(27.001, 75.0),
            None,
            Some(50.0),
            t0 + Duration::seconds(3),
        );
        let me = lifecycle.submit_sample(&fuzzy).unwrap();
        assert_eq!(me.position, GeoPoint::new(27.001, 75.0));
        assert_eq!(me.trail.map(|t| t.len()), Some(1));

        let stored = db.list_participants(&joined.code).unwrap();
        assert_eq!(stored[0].position, GeoPoint::new(27.001, 75.0));
    }

    #[test]
    fn test_failed_write_is_retried() {
        let db = store();
        let (mut lifecycle, joined) = host(&db);
        // Remove our record behind the lifecycle's back so the write fails.
        db.delete_participant(&joined.code, &joined.me.id).unwrap();

        let sample = RawSample::device(GeoPoint::new(27.0, 75.0), None, Some(5.0), Utc::now());
        assert!(lifecycle.submit_sample(&sample).is_none());
        assert!(lifecycle.filter().unwrap().last_upload().is_none());
        assert!(lifecycle.trail().unwrap().last_point().is_none());
    }

    #[test]
    fn test_guest_samples_never_trail() {
        let db = store();
        let (_host, joined) = host(&db);
        let (mut g, _) = guest(&db, "g1", &joined.code);

        let sample = RawSample::device(GeoPoint::new(27.0, 75.0), None, Some(5.0), Utc::now());
        let me = g.submit_sample(&sample).unwrap();
        assert_eq!(me.trail, None);
    }

    #[test]
    fn test_clear_trail_host_only() {
        let db = store();
        let (mut h, joined) = host(&db);
        let (mut g, _) = guest(&db, "g1", &joined.code);

        let sample = RawSample::device(GeoPoint::new(27.0, 75.0), None, Some(5.0), Utc::now());
        h.submit_sample(&sample).unwrap();

        assert!(matches!(
            g.clear_trail(),
            Err(ConvoyError::Validation(ValidationError::NotHost(_)))
        ));

        let me = h.clear_trail().unwrap().unwrap();
        assert_eq!(me.trail, Some(Vec::new()));
        assert!(h.trail().unwrap().last_point().is_none());
    }

    #[tokio::test]
    async fn test_host_leave_is_atomic_teardown() {
        let db = store();
        let (mut h, joined) = host(&db);
        let (_g1, _) = guest(&db, "g1", &joined.code);
        let (_g2, _) = guest(&db, "g2", &joined.code);
        db.create_annotation(&joined.code, GeoPoint::new(1.0, 1.0), "Fuel")
            .unwrap();

        let mut watcher = db.subscribe();
        let summary = h.leave().unwrap().unwrap();

        assert_eq!(summary.participants, 3);
        assert_eq!(summary.annotations, 1);
        assert_eq!(h.phase(), Phase::LoggedOut);
        assert!(db.list_participants(&joined.code).unwrap().is_empty());
        assert!(db.list_annotations(&joined.code).unwrap().is_empty());

        let event = watcher.recv().await.unwrap();
        assert!(matches!(event.change, Change::SessionClosed(_)));
        assert!(watcher.try_recv().is_err());
    }

    #[test]
    fn test_guest_leave_keeps_session() {
        let db = store();
        let (_h, joined) = host(&db);
        let (mut g, _) = guest(&db, "g1", &joined.code);

        assert_eq!(g.leave().unwrap(), None);
        assert_eq!(db.list_participants(&joined.code).unwrap().len(), 1);
        assert!(db.get_session(&joined.code).is_ok());
    }

    #[test]
    fn test_last_guest_out_cleans_up() {
        let db = store();
        let (_h, joined) = host(&db);
        let (mut g, _) = guest(&db, "g1", &joined.code);
        db.create_annotation(&joined.code, GeoPoint::new(1.0, 1.0), "Left behind")
            .unwrap();
        // The host vanished without cleaning up.
        db.delete_participant(&joined.code, &joined.me.id).unwrap();

        let summary = g.leave().unwrap().unwrap();
        assert_eq!(summary.annotations, 1);
        assert!(summary.session_removed);
    }

    #[test]
    fn test_leave_when_logged_out() {
        let db = store();
        let mut lifecycle = SessionLifecycle::new(db, Tuning::default());
        assert!(matches!(
            lifecycle.leave(),
            Err(ConvoyError::InvalidState { .. })
        ));
    }
}
