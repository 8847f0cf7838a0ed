//! The async driver of an active session.
//!
//! [`ConvoyClient`] runs one `tokio::select!` loop over three inputs: UI
//! commands, the active position source and the store change feed.  Every
//! observable consequence is reported to the UI as a [`ClientEvent`].
//!
//! The feed only carries writes made through the same store handle.  Other
//! processes sharing the database are picked up by polling
//! [`ConvoyStore::data_version`] and re-reading the session.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use convoy_shared::{AnnotationId, Color, GeoPoint, ParticipantId, SessionCode};
use convoy_store::{Annotation, Change, CleanupSummary, ConvoyStore, StoreEvent};

use crate::annotations::{AnnotationStore, PendingDeletion};
use crate::camera::{CameraCommand, CameraController, CameraEvent, CameraState};
use crate::config::Tuning;
use crate::error::{ConvoyError, Result};
use crate::lifecycle::{JoinRequest, SessionLifecycle};
use crate::position::{ActiveSource, DeviceStream, PositionSource, RouteReplay, SampleResult};
use crate::roster::{display_distance_km, taken_colors, RosterManager, RosterUpdate, RosterView};
use crate::simulation::{plan_route, RouteProvider, SimulatedCompanion, SimulationRequest};
use crate::trail::{build_segments, TrailSegment};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// User intents sent to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    SelectParticipant(ParticipantId),
    DismissSelection,
    MapDragged,
    LocateMe,
    ToggleFollow,
    ClearTrail,
    BeginPlacing,
    CancelPlacing,
    PlaceAnnotation { at: GeoPoint, text: String },
    EditAnnotation { id: AnnotationId, text: String },
    RequestDeleteAnnotation(AnnotationId),
    ConfirmDeleteAnnotation,
    CancelDeleteAnnotation,
    Leave,
}

/// The card shown for the selected participant.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SelectionInfo {
    pub id: ParticipantId,
    pub display_name: String,
    pub color: Color,
    /// From the local position, rounded to two decimals.
    pub distance_km: f64,
}

/// How the session ended.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum SessionEnd {
    /// We left; carries what the teardown removed, if we performed one.
    Left(Option<CleanupSummary>),
    /// The session was torn down by someone else.
    ClosedRemotely,
    /// The store went away.
    FeedClosed,
}

/// Everything the UI needs to render.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum ClientEvent {
    Joined {
        code: SessionCode,
        is_host: bool,
        color: Color,
    },
    Roster(RosterView),
    Trail(Vec<TrailSegment>),
    Annotations(Vec<Annotation>),
    Camera(CameraCommand),
    CameraState(CameraState),
    Selection(Option<SelectionInfo>),
    Placing(bool),
    /// Ask the user to confirm deleting this annotation.
    ConfirmDeletion(AnnotationId),
    Status(String),
    Ended(SessionEnd),
}

/// How to join.
#[derive(Debug)]
pub struct ClientOptions {
    pub request: JoinRequest,
    /// Starting position when no simulated route supplies one.
    pub start: GeoPoint,
    pub simulation: Option<SimulationRequest>,
    pub device: Option<DeviceStream>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ConvoyClient {
    store: Arc<dyn ConvoyStore>,
    tuning: Tuning,
    code: SessionCode,
    self_id: ParticipantId,
    is_host: bool,
    color: Color,

    lifecycle: SessionLifecycle,
    roster: RosterManager,
    annotations: AnnotationStore,
    camera: CameraController,
    source: ActiveSource,
    companion: Option<SimulatedCompanion>,
    feed: broadcast::Receiver<StoreEvent>,
    /// Last seen store commit counter for writes from other handles.
    store_version: Option<i64>,
    events: mpsc::Sender<ClientEvent>,

    own_position: GeoPoint,
    selected: Option<ParticipantId>,
    pending_deletion: Option<PendingDeletion>,
    /// Reported once the loop starts.
    startup_status: Option<String>,
}

impl ConvoyClient {
    /// Validate and join a session, setting up the position source.
    ///
    /// Simulation is planned between validation and the first write so the
    /// participant record starts at the route's first point.  A planning
    /// failure disables simulation and leaves the client without an
    /// automatic source; it never fails the join.
    pub async fn join<P: RouteProvider>(
        store: Arc<dyn ConvoyStore>,
        tuning: Tuning,
        options: ClientOptions,
        provider: &P,
        events: mpsc::Sender<ClientEvent>,
    ) -> Result<Self> {
        let ClientOptions {
            request,
            start,
            simulation,
            device,
        } = options;

        let mut lifecycle = SessionLifecycle::new(store.clone(), tuning.clone());
        let ticket = lifecycle.prepare_join(&request)?;

        let mut startup_status = None;
        let mut companion = None;
        let mut start = start;
        let source = match simulation {
            Some(sim) => match plan_route(provider, &sim.from, &sim.to).await {
                Ok(route) => match RouteReplay::new(route, tuning.sim_tick) {
                    Some(replay) => {
                        start = replay.start();
                        if sim.companion && ticket.is_host() {
                            companion = Some(SimulatedCompanion::new(tuning.companion_lag_points));
                        }
                        info!(from = %sim.from, to = %sim.to, points = replay.route().len(), "simulated drive ready");
                        ActiveSource::Replay(replay)
                    }
                    None => ActiveSource::Idle,
                },
                Err(e) => {
                    warn!(from = %sim.from, to = %sim.to, "simulation disabled: {e}");
                    startup_status = Some(format!("Simulation disabled: {e}"));
                    ActiveSource::Idle
                }
            },
            None => device.map_or(ActiveSource::Idle, ActiveSource::Device),
        };

        // Read before the join snapshot so no foreign commit falls between.
        let store_version = store.data_version().ok();
        let joined = lifecycle.complete_join(ticket, start)?;

        let mut roster = RosterManager::new(joined.me.id.clone(), &tuning);
        roster.replace_all(joined.participants);
        let annotations = AnnotationStore::new(
            store.clone(),
            joined.code.clone(),
            joined.is_host,
            joined.annotations,
        );
        let camera = CameraController::new(joined.me.id.clone(), joined.me.position, &tuning);

        debug!(session = %joined.code, source = source.kind(), "client ready");

        Ok(Self {
            store,
            tuning,
            code: joined.code,
            self_id: joined.me.id,
            is_host: joined.is_host,
            color: joined.me.color,
            lifecycle,
            roster,
            annotations,
            camera,
            source,
            companion,
            feed: joined.feed,
            store_version,
            events,
            own_position: joined.me.position,
            selected: None,
            pending_deletion: None,
            startup_status,
        })
    }

    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.self_id
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// Drive the session until it ends.  Dropping the command sender counts
    /// as leaving.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ClientCommand>) -> SessionEnd {
        self.emit_initial().await;

        let period = self.tuning.roster_refresh;
        let mut refresh = time::interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let period = self.tuning.store_poll;
        let mut poll = time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        break self.leave();
                    };
                    if let Some(end) = self.on_command(command).await {
                        break end;
                    }
                }
                sample = self.source.next_sample(), if !self.source.is_idle() => {
                    self.on_sample(sample).await;
                }
                event = self.feed.recv() => {
                    if let Some(end) = self.on_store_event(event).await {
                        break end;
                    }
                }
                _ = refresh.tick() => {
                    self.emit_roster().await;
                }
                _ = poll.tick() => {
                    if let Some(end) = self.poll_store().await {
                        break end;
                    }
                }
            }
        };

        info!(session = %self.code, end = ?end, "session ended");
        self.emit(ClientEvent::Ended(end.clone())).await;
        end
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn on_command(&mut self, command: ClientCommand) -> Option<SessionEnd> {
        debug!(?command, "command");
        match command {
            ClientCommand::Leave => return Some(self.leave()),
            ClientCommand::SelectParticipant(id) => self.select(id).await,
            ClientCommand::DismissSelection => {
                self.set_selection(None).await;
                self.camera_event(CameraEvent::SelectionDismissed).await;
            }
            ClientCommand::MapDragged => self.camera_event(CameraEvent::DragStarted).await,
            ClientCommand::LocateMe => {
                self.set_selection(None).await;
                self.camera_event(CameraEvent::LocateRequested).await;
            }
            ClientCommand::ToggleFollow => {
                self.set_selection(None).await;
                self.camera_event(CameraEvent::FollowToggled).await;
            }
            ClientCommand::ClearTrail => {
                // The cleared record arrives through the feed.
                if let Err(e) = self.lifecycle.clear_trail() {
                    self.report(e).await;
                }
            }
            ClientCommand::BeginPlacing => match self.annotations.begin_placing() {
                Ok(()) => self.emit(ClientEvent::Placing(true)).await,
                Err(e) => self.report(e.into()).await,
            },
            ClientCommand::CancelPlacing => {
                self.annotations.cancel_placing();
                self.emit(ClientEvent::Placing(false)).await;
            }
            ClientCommand::PlaceAnnotation { at, text } => {
                let result = self.annotations.place(at, &text);
                match result {
                    Ok(_) => {
                        self.emit(ClientEvent::Placing(false)).await;
                        self.emit_annotations().await;
                    }
                    Err(e) => self.report(e).await,
                }
            }
            ClientCommand::EditAnnotation { id, text } => {
                match self.annotations.update_text(id, &text) {
                    Ok(_) => self.emit_annotations().await,
                    Err(e) => self.report(e).await,
                }
            }
            ClientCommand::RequestDeleteAnnotation(id) => {
                match self.annotations.request_delete(id) {
                    Ok(pending) => {
                        self.pending_deletion = Some(pending);
                        self.emit(ClientEvent::ConfirmDeletion(id)).await;
                    }
                    Err(e) => self.report(e.into()).await,
                }
            }
            ClientCommand::ConfirmDeleteAnnotation => match self.pending_deletion.take() {
                Some(pending) => match self.annotations.confirm_delete(pending) {
                    Ok(_) => self.emit_annotations().await,
                    Err(e) => self.report(e).await,
                },
                None => {
                    self.emit(ClientEvent::Status("Nothing to delete".into()))
                        .await
                }
            },
            ClientCommand::CancelDeleteAnnotation => self.pending_deletion = None,
        }
        None
    }

    async fn select(&mut self, id: ParticipantId) {
        // Selecting yourself is ignored.
        if id == self.self_id {
            return;
        }
        let Some(target) = self.roster.get(&id) else {
            self.emit(ClientEvent::Status(format!("Unknown participant {id}")))
                .await;
            return;
        };
        let position = target.position;

        self.camera_event(CameraEvent::ParticipantSelected {
            id: id.clone(),
            position,
        })
        .await;
        self.set_selection(Some(id)).await;
    }

    fn leave(&mut self) -> SessionEnd {
        self.source = ActiveSource::Idle;
        let summary = match self.lifecycle.leave() {
            Ok(summary) => summary,
            Err(e) => {
                warn!(session = %self.code, "leave: {e}");
                None
            }
        };
        SessionEnd::Left(summary)
    }

    // ------------------------------------------------------------------
    // Position source
    // ------------------------------------------------------------------

    async fn on_sample(&mut self, sample: Option<SampleResult>) {
        match sample {
            Some(Ok(sample)) => {
                self.own_position = sample.position;
                self.camera_event(CameraEvent::OwnPositionChanged(sample.position))
                    .await;
                // The accepted write comes back through the feed.
                self.lifecycle.submit_sample(&sample);
                self.drive_companion();
                self.refresh_selection().await;
            }
            Some(Err(e)) => {
                warn!(session = %self.code, "position source: {e}");
                self.emit(ClientEvent::Status(format!("GPS Error: {e}")))
                    .await;
            }
            None => {
                info!(session = %self.code, source = self.source.kind(), "position source ended");
                let message = match self.source {
                    ActiveSource::Replay(_) => "Simulation finished",
                    _ => "Position source ended",
                };
                self.source = ActiveSource::Idle;
                self.emit(ClientEvent::Status(message.into())).await;
            }
        }
    }

    /// Move the simulation companion behind the host.  The companion is a
    /// plain participant record written without a join, so it only takes a
    /// seat while one is free.
    fn drive_companion(&self) {
        let (Some(companion), Some(replay)) = (&self.companion, self.source.replay()) else {
            return;
        };
        let Some(position) = companion.position(replay.route(), replay.index()) else {
            return;
        };
        if self.roster.get(companion.id()).is_none()
            && self.roster.len() >= self.tuning.max_participants
        {
            debug!(session = %self.code, "session full, companion stays out");
            return;
        }
        let record = companion.record(
            position,
            taken_colors(self.roster.participants(), companion.id()),
        );
        if let Err(e) = self.store.upsert_participant(&self.code, &record) {
            warn!(session = %self.code, "companion write dropped: {e}");
        }
    }

    // ------------------------------------------------------------------
    // Store feed
    // ------------------------------------------------------------------

    async fn on_store_event(
        &mut self,
        event: std::result::Result<StoreEvent, RecvError>,
    ) -> Option<SessionEnd> {
        match event {
            Ok(event) if event.session != self.code => None,
            Ok(event) => self.apply_change(event.change).await,
            Err(RecvError::Lagged(missed)) => {
                warn!(session = %self.code, missed, "change feed lagged, resyncing");
                self.resync().await;
                None
            }
            Err(RecvError::Closed) => {
                self.lifecycle.session_closed();
                Some(SessionEnd::FeedClosed)
            }
        }
    }

    async fn apply_change(&mut self, change: Change) -> Option<SessionEnd> {
        let annotations_changed = self.annotations.apply(&change);

        match self.roster.apply(&change) {
            RosterUpdate::Closed => return Some(self.closed_remotely()),
            RosterUpdate::Removed(id) => {
                if self.selected.as_ref() == Some(&id) {
                    self.set_selection(None).await;
                }
                self.camera_event(CameraEvent::ParticipantRemoved(id)).await;
                self.emit_roster().await;
                self.emit_trail().await;
            }
            RosterUpdate::Upserted(id) => {
                self.emit_roster().await;
                if self.roster.get(&id).is_some_and(|p| p.is_leader) {
                    self.emit_trail().await;
                }
                if self.selected.as_ref() == Some(&id) {
                    self.refresh_selection().await;
                }
            }
            RosterUpdate::Unchanged => {}
        }

        if annotations_changed {
            self.emit_annotations().await;
        }
        None
    }

    /// Pick up commits made through other store handles.
    async fn poll_store(&mut self) -> Option<SessionEnd> {
        let version = match self.store.data_version() {
            Ok(version) => version,
            Err(e) => {
                warn!(session = %self.code, "store poll failed: {e}");
                return None;
            }
        };
        if self.store_version == Some(version) {
            return None;
        }
        self.store_version = Some(version);
        debug!(session = %self.code, version, "foreign commit, resyncing");

        match self.store.session_exists(&self.code) {
            Ok(true) => {}
            Ok(false) => return Some(self.closed_remotely()),
            Err(e) => {
                warn!(session = %self.code, "session lookup failed: {e}");
                return None;
            }
        }
        self.resync().await;
        if self.roster.get(&self.self_id).is_none() {
            info!(session = %self.code, "own record removed elsewhere");
            return Some(self.closed_remotely());
        }
        None
    }

    fn closed_remotely(&mut self) -> SessionEnd {
        self.source = ActiveSource::Idle;
        self.lifecycle.session_closed();
        SessionEnd::ClosedRemotely
    }

    /// Re-read both collections after missing feed events.
    async fn resync(&mut self) {
        match self.store.list_participants(&self.code) {
            Ok(participants) => self.roster.replace_all(participants),
            Err(e) => warn!(session = %self.code, "participant resync failed: {e}"),
        }
        match self.store.list_annotations(&self.code) {
            Ok(annotations) => self.annotations.replace_all(annotations),
            Err(e) => warn!(session = %self.code, "annotation resync failed: {e}"),
        }

        if let Some(id) = self.selected.clone() {
            if self.roster.get(&id).is_none() {
                self.set_selection(None).await;
                self.camera_event(CameraEvent::ParticipantRemoved(id)).await;
            }
        }
        self.emit_roster().await;
        self.emit_trail().await;
        self.emit_annotations().await;
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    async fn emit(&mut self, event: ClientEvent) {
        if self.events.send(event).await.is_err() {
            debug!("event receiver dropped");
        }
    }

    async fn emit_initial(&mut self) {
        self.emit(ClientEvent::Joined {
            code: self.code.clone(),
            is_host: self.is_host,
            color: self.color.clone(),
        })
        .await;
        if let Some(status) = self.startup_status.take() {
            self.emit(ClientEvent::Status(status)).await;
        }
        self.emit_roster().await;
        self.emit_trail().await;
        self.emit_annotations().await;
        self.emit(ClientEvent::CameraState(self.camera.state())).await;
        self.emit(ClientEvent::Camera(CameraCommand::PanTo(self.own_position)))
            .await;
    }

    async fn emit_roster(&mut self) {
        let view = self.roster.view(Utc::now());
        self.emit(ClientEvent::Roster(view)).await;
    }

    async fn emit_trail(&mut self) {
        let segments = build_segments(self.roster.leader_trail(), self.tuning.trail_gap_km);
        self.emit(ClientEvent::Trail(segments)).await;
    }

    async fn emit_annotations(&mut self) {
        let list = self.annotations.list().to_vec();
        self.emit(ClientEvent::Annotations(list)).await;
    }

    async fn camera_event(&mut self, event: CameraEvent) {
        let before = self.camera.state();
        let command = self.camera.handle(event);
        if let Some(command) = command {
            self.emit(ClientEvent::Camera(command)).await;
        }
        let after = self.camera.state();
        if after != before {
            self.emit(ClientEvent::CameraState(after)).await;
        }
    }

    async fn set_selection(&mut self, id: Option<ParticipantId>) {
        let changed = self.selected != id;
        self.selected = id;
        if self.selected.is_some() {
            self.refresh_selection().await;
        } else if changed {
            self.emit(ClientEvent::Selection(None)).await;
        }
    }

    async fn refresh_selection(&mut self) {
        let Some(id) = &self.selected else {
            return;
        };
        let info = self.roster.get(id).map(|p| SelectionInfo {
            id: p.id.clone(),
            display_name: p.display_name.clone(),
            color: p.color.clone(),
            distance_km: display_distance_km(&self.own_position, &p.position),
        });
        self.emit(ClientEvent::Selection(info)).await;
    }

    async fn report(&mut self, error: ConvoyError) {
        debug!("rejected: {error}");
        self.emit(ClientEvent::Status(error.to_string())).await;
    }
}
