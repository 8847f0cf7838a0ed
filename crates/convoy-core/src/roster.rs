//! The live participant set of one session.
//!
//! Join-time rules (capacity, existence, leader uniqueness, colour
//! assignment) are free functions over a roster snapshot.  [`RosterManager`]
//! mirrors the store's participant collection from the change feed and
//! derives the ordered, ghost-flagged view shown to the user.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use convoy_shared::{Color, GeoPoint, ParticipantId, SessionCode, PALETTE};
use convoy_store::{Change, Participant};

use crate::config::Tuning;
use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Join rules
// ---------------------------------------------------------------------------

/// Check whether `joiner` may enter a session whose current roster is
/// `existing`.
///
/// The joiner's own stale record (a rejoin) is ignored when counting.
pub fn validate_join(
    code: &SessionCode,
    existing: &[Participant],
    joiner: &ParticipantId,
    as_host: bool,
    capacity: usize,
) -> Result<(), ValidationError> {
    // A guest reusing the leader's id would demote the only leader.
    if !as_host && existing.iter().any(|p| &p.id == joiner && p.is_leader) {
        return Err(ValidationError::LeaderIdentity(joiner.clone()));
    }
    let others: Vec<&Participant> = existing.iter().filter(|p| &p.id != joiner).collect();

    if !as_host && others.is_empty() {
        return Err(ValidationError::RoomNotFound(code.clone()));
    }
    if others.len() >= capacity {
        return Err(ValidationError::RoomFull {
            code: code.clone(),
            capacity,
        });
    }
    if as_host && others.iter().any(|p| p.is_leader) {
        return Err(ValidationError::CodeTaken(code.clone()));
    }
    Ok(())
}

/// Keep `requested` unless another participant already uses it, in which
/// case take the first free palette colour.  If the palette is exhausted the
/// requested colour is kept.
pub fn assign_color<'a, I>(requested: &Color, taken: I) -> Color
where
    I: IntoIterator<Item = &'a Color>,
{
    let taken: HashSet<&Color> = taken.into_iter().collect();
    if !taken.contains(requested) {
        return requested.clone();
    }
    PALETTE
        .iter()
        .map(Color::from)
        .find(|c| !taken.contains(c))
        .unwrap_or_else(|| requested.clone())
}

/// Colours in use by everyone except `joiner`.
pub fn taken_colors<'a>(
    existing: &'a [Participant],
    joiner: &'a ParticipantId,
) -> impl Iterator<Item = &'a Color> + 'a {
    existing
        .iter()
        .filter(move |p| &p.id != joiner)
        .map(|p| &p.color)
}

/// A participant silent for longer than `threshold` is a ghost.
pub fn is_ghost(participant: &Participant, now: DateTime<Utc>, threshold: Duration) -> bool {
    now - participant.last_active > threshold
}

/// Distance in km rounded to two decimals, as shown on a selection card.
pub fn display_distance_km(from: &GeoPoint, to: &GeoPoint) -> f64 {
    (from.distance_km(to) * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// One row of the roster list.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RosterEntry {
    pub id: ParticipantId,
    pub display_name: String,
    pub color: Color,
    pub is_leader: bool,
    pub is_self: bool,
    pub is_ghost: bool,
    pub position: GeoPoint,
    /// `None` for the leader itself, or when there is no leader.
    pub distance_from_leader_km: Option<f64>,
}

/// The roster as displayed: leader first, then everyone else by distance
/// from the leader.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RosterView {
    pub entries: Vec<RosterEntry>,
}

impl RosterView {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ghosts(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.iter().filter(|e| e.is_ghost)
    }
}

// ---------------------------------------------------------------------------
// Live roster
// ---------------------------------------------------------------------------

/// What applying a change did to the roster.
#[derive(Debug, Clone, PartialEq)]
pub enum RosterUpdate {
    Unchanged,
    Upserted(ParticipantId),
    Removed(ParticipantId),
    /// The session was torn down.
    Closed,
}

/// Local mirror of a session's participant collection.
#[derive(Debug, Clone)]
pub struct RosterManager {
    self_id: ParticipantId,
    ghost_threshold: Duration,
    /// Kept in join order.
    participants: Vec<Participant>,
}

impl RosterManager {
    pub fn new(self_id: ParticipantId, tuning: &Tuning) -> Self {
        Self {
            self_id,
            ghost_threshold: tuning.ghost_threshold,
            participants: Vec::new(),
        }
    }

    /// Replace the mirror with a fresh snapshot.
    pub fn replace_all(&mut self, participants: Vec<Participant>) {
        self.participants = participants;
    }

    pub fn apply(&mut self, change: &Change) -> RosterUpdate {
        match change {
            Change::ParticipantUpserted(p) => {
                match self.participants.iter_mut().find(|e| e.id == p.id) {
                    Some(existing) => *existing = p.clone(),
                    None => self.participants.push(p.clone()),
                }
                RosterUpdate::Upserted(p.id.clone())
            }
            Change::ParticipantRemoved(id) => {
                let before = self.participants.len();
                self.participants.retain(|p| &p.id != id);
                if self.participants.len() < before {
                    RosterUpdate::Removed(id.clone())
                } else {
                    RosterUpdate::Unchanged
                }
            }
            Change::SessionClosed(_) => {
                self.participants.clear();
                RosterUpdate::Closed
            }
            Change::AnnotationUpserted(_) | Change::AnnotationRemoved(_) => RosterUpdate::Unchanged,
        }
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }

    pub fn me(&self) -> Option<&Participant> {
        self.get(&self.self_id)
    }

    pub fn leader(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_leader)
    }

    /// The leader's stored trail, or an empty slice.
    pub fn leader_trail(&self) -> &[GeoPoint] {
        self.leader()
            .and_then(|l| l.trail.as_deref())
            .unwrap_or(&[])
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn view(&self, now: DateTime<Utc>) -> RosterView {
        let leader = self.leader().map(|l| (l.id.clone(), l.position));

        let mut entries: Vec<RosterEntry> = self
            .participants
            .iter()
            .map(|p| RosterEntry {
                id: p.id.clone(),
                display_name: p.display_name.clone(),
                color: p.color.clone(),
                is_leader: p.is_leader,
                is_self: p.id == self.self_id,
                is_ghost: is_ghost(p, now, self.ghost_threshold),
                position: p.position,
                distance_from_leader_km: match &leader {
                    Some((leader_id, at)) if leader_id != &p.id => {
                        Some(at.distance_km(&p.position))
                    }
                    _ => None,
                },
            })
            .collect();

        // Stable sort: with no leader the join order is kept.
        entries.sort_by(|a, b| {
            b.is_leader.cmp(&a.is_leader).then_with(|| {
                let da = a.distance_from_leader_km.unwrap_or(0.0);
                let db = b.distance_from_leader_km.unwrap_or(0.0);
                da.total_cmp(&db)
            })
        });

        RosterView { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_store::CleanupSummary;

    fn code() -> SessionCode {
        SessionCode::parse("TRIP").unwrap()
    }

    fn participant(id: &str, leader: bool, lng: f64) -> Participant {
        Participant {
            id: ParticipantId::parse(id).unwrap(),
            display_name: id.to_uppercase(),
            color: Color::default(),
            is_leader: leader,
            position: GeoPoint::new(0.0, lng),
            last_active: Utc::now(),
            trail: leader.then(Vec::new),
        }
    }

    fn crowd(n: usize) -> Vec<Participant> {
        (0..n)
            .map(|i| participant(&format!("p{i}"), i == 0, 0.0))
            .collect()
    }

    #[test]
    fn test_eleventh_participant_rejected() {
        let existing = crowd(10);
        let joiner = ParticipantId::parse("late").unwrap();
        assert_eq!(
            validate_join(&code(), &existing, &joiner, false, 10),
            Err(ValidationError::RoomFull {
                code: code(),
                capacity: 10
            })
        );
    }

    #[test]
    fn test_rejoin_does_not_count_self() {
        let existing = crowd(10);
        let returning = existing[9].id.clone();
        assert!(validate_join(&code(), &existing, &returning, false, 10).is_ok());
    }

    #[test]
    fn test_guest_cannot_reuse_leader_id() {
        let existing = crowd(3);
        let leader = existing[0].id.clone();
        assert_eq!(
            validate_join(&code(), &existing, &leader, false, 10),
            Err(ValidationError::LeaderIdentity(leader.clone()))
        );
        assert_eq!(
            validate_join(&code(), &existing[..1], &leader, false, 10),
            Err(ValidationError::LeaderIdentity(leader))
        );
    }

    #[test]
    fn test_guest_into_empty_room() {
        let joiner = ParticipantId::parse("guest").unwrap();
        assert_eq!(
            validate_join(&code(), &[], &joiner, false, 10),
            Err(ValidationError::RoomNotFound(code()))
        );
        assert!(validate_join(&code(), &[], &joiner, true, 10).is_ok());
    }

    #[test]
    fn test_second_host_is_rejected() {
        let existing = crowd(2);
        let joiner = ParticipantId::parse("usurper").unwrap();
        assert_eq!(
            validate_join(&code(), &existing, &joiner, true, 10),
            Err(ValidationError::CodeTaken(code()))
        );
    }

    #[test]
    fn test_assign_color_keeps_free_request() {
        let hot_pink = Color::from(&PALETTE[2]);
        let taken = [Color::from(&PALETTE[0])];
        assert_eq!(assign_color(&hot_pink, &taken), hot_pink);
    }

    #[test]
    fn test_assign_color_picks_first_free() {
        let requested = Color::from(&PALETTE[0]);
        let taken = [Color::from(&PALETTE[0]), Color::from(&PALETTE[1])];
        assert_eq!(assign_color(&requested, &taken), Color::from(&PALETTE[2]));
    }

    #[test]
    fn test_assign_color_exhausted_palette() {
        let taken: Vec<Color> = PALETTE.iter().map(Color::from).collect();
        let requested = Color::from(&PALETTE[4]);
        assert_eq!(assign_color(&requested, &taken), requested);
    }

    #[test]
    fn test_taken_colors_skip_self() {
        let mut existing = crowd(2);
        existing[1].color = Color::from(&PALETTE[3]);
        let me = existing[1].id.clone();
        let taken: Vec<&Color> = taken_colors(&existing, &me).collect();
        assert_eq!(taken, vec![&Color::from(&PALETTE[0])]);
    }

    #[test]
    fn test_ghost_threshold_is_strict() {
        let now = Utc::now();
        let mut p = participant("a", false, 0.0);
        let threshold = Duration::seconds(300);

        p.last_active = now - Duration::seconds(300);
        assert!(!is_ghost(&p, now, threshold));
        p.last_active = now - Duration::seconds(301);
        assert!(is_ghost(&p, now, threshold));
    }

    #[test]
    fn test_display_distance_rounding() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 0.01);
        // 0.01 degree of longitude at the equator is ~1.112 km.
        assert_eq!(display_distance_km(&a, &b), 1.11);
    }

    #[test]
    fn test_view_orders_leader_then_distance() {
        let me = ParticipantId::parse("near").unwrap();
        let mut roster = RosterManager::new(me.clone(), &Tuning::default());
        roster.replace_all(vec![
            participant("far", false, 0.5),
            participant("boss", true, 0.0),
            participant("near", false, 0.1),
        ]);

        let view = roster.view(Utc::now());
        let order: Vec<&str> = view.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order, vec!["boss", "near", "far"]);
        assert!(view.entries[1].is_self);
        assert_eq!(view.entries[0].distance_from_leader_km, None);
        assert!(view.entries[2].distance_from_leader_km.unwrap() > 50.0);
    }

    #[test]
    fn test_view_flags_ghosts() {
        let me = ParticipantId::parse("boss").unwrap();
        let mut roster = RosterManager::new(me, &Tuning::default());
        let mut stale = participant("stale", false, 0.0);
        stale.last_active = Utc::now() - Duration::minutes(10);
        roster.replace_all(vec![participant("boss", true, 0.0), stale]);

        let view = roster.view(Utc::now());
        let ghosts: Vec<&str> = view.ghosts().map(|e| e.id.as_str()).collect();
        assert_eq!(ghosts, vec!["stale"]);
    }

    #[test]
    fn test_apply_changes() {
        let me = ParticipantId::parse("boss").unwrap();
        let mut roster = RosterManager::new(me, &Tuning::default());

        let mut boss = participant("boss", true, 0.0);
        assert_eq!(
            roster.apply(&Change::ParticipantUpserted(boss.clone())),
            RosterUpdate::Upserted(boss.id.clone())
        );
        boss.trail = Some(vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.001)]);
        roster.apply(&Change::ParticipantUpserted(boss.clone()));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.leader_trail().len(), 2);

        let guest = participant("guest", false, 0.0);
        roster.apply(&Change::ParticipantUpserted(guest.clone()));
        assert_eq!(
            roster.apply(&Change::ParticipantRemoved(guest.id.clone())),
            RosterUpdate::Removed(guest.id.clone())
        );
        assert_eq!(
            roster.apply(&Change::ParticipantRemoved(guest.id.clone())),
            RosterUpdate::Unchanged
        );

        assert_eq!(
            roster.apply(&Change::SessionClosed(CleanupSummary::default())),
            RosterUpdate::Closed
        );
        assert!(roster.is_empty());
        assert!(roster.leader_trail().is_empty());
    }
}
