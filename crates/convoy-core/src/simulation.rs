//! Simulated drives.
//!
//! A host may replace the device's location with a replay of a route
//! between two named places.  The route is resolved once at join time
//! through a [`RouteProvider`]; a failure there disables simulation but
//! never aborts the join.  Optionally a companion participant follows the
//! host a fixed number of route points behind.

use std::collections::HashMap;
use std::future::Future;

use serde::Deserialize;
use tracing::debug;

use convoy_shared::{Color, GeoPoint, ParticipantId, PALETTE};
use convoy_store::NewParticipant;

use crate::error::SimulationSetupError;

type SetupResult<T> = std::result::Result<T, SimulationSetupError>;

/// What the host asked for at join time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRequest {
    pub from: String,
    pub to: String,
    /// Also drive a companion participant behind the host.
    pub companion: bool,
}

/// Geocoding and routing.
pub trait RouteProvider: Send + Sync {
    fn geocode(&self, place: &str) -> impl Future<Output = SetupResult<GeoPoint>> + Send;

    /// An ordered polyline from `from` to `to`.
    fn route(
        &self,
        from: GeoPoint,
        to: GeoPoint,
    ) -> impl Future<Output = SetupResult<Vec<GeoPoint>>> + Send;
}

/// Resolve both places and fetch the route between them.
pub async fn plan_route<P: RouteProvider>(
    provider: &P,
    from: &str,
    to: &str,
) -> SetupResult<Vec<GeoPoint>> {
    let start = provider.geocode(from).await?;
    let end = provider.geocode(to).await?;
    let route = provider.route(start, end).await?;
    if route.is_empty() {
        return Err(SimulationSetupError::NoRoute {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    debug!(from, to, points = route.len(), "route planned");
    Ok(route)
}

// ---------------------------------------------------------------------------
// Gazetteer
// ---------------------------------------------------------------------------

/// An offline [`RouteProvider`]: a table of named places and straight-line
/// routes densified to a fixed step.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    places: HashMap<String, GeoPoint>,
    step_km: f64,
}

#[derive(Deserialize)]
struct PlaceEntry {
    name: String,
    lat: f64,
    lng: f64,
}

impl Gazetteer {
    pub const DEFAULT_STEP_KM: f64 = 0.1;

    pub fn new(step_km: f64) -> Self {
        Self {
            places: HashMap::new(),
            step_km,
        }
    }

    pub fn with_place(mut self, name: &str, at: GeoPoint) -> Self {
        self.places.insert(normalize(name), at);
        self
    }

    /// Load a JSON array of `{"name", "lat", "lng"}` objects.
    pub fn from_json(json: &str, step_km: f64) -> SetupResult<Self> {
        let entries: Vec<PlaceEntry> = serde_json::from_str(json)
            .map_err(|e| SimulationSetupError::Provider(format!("gazetteer: {e}")))?;

        let mut gazetteer = Self::new(step_km);
        for entry in entries {
            let at = GeoPoint::checked(entry.lat, entry.lng)
                .map_err(|e| SimulationSetupError::Provider(format!("{}: {e}", entry.name)))?;
            gazetteer = gazetteer.with_place(&entry.name, at);
        }
        Ok(gazetteer)
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    fn lookup(&self, place: &str) -> SetupResult<GeoPoint> {
        self.places
            .get(&normalize(place))
            .copied()
            .ok_or_else(|| SimulationSetupError::PlaceNotFound(place.trim().to_string()))
    }

    fn interpolate(&self, from: GeoPoint, to: GeoPoint) -> Vec<GeoPoint> {
        let distance = from.distance_km(&to);
        let steps = if self.step_km > 0.0 {
            (distance / self.step_km).ceil().max(1.0) as usize
        } else {
            1
        };
        (0..=steps)
            .map(|i| {
                if i == steps {
                    return to;
                }
                let t = i as f64 / steps as f64;
                GeoPoint::new(
                    from.lat + (to.lat - from.lat) * t,
                    from.lng + (to.lng - from.lng) * t,
                )
            })
            .collect()
    }
}

impl RouteProvider for Gazetteer {
    async fn geocode(&self, place: &str) -> SetupResult<GeoPoint> {
        self.lookup(place)
    }

    async fn route(&self, from: GeoPoint, to: GeoPoint) -> SetupResult<Vec<GeoPoint>> {
        Ok(self.interpolate(from, to))
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Companion
// ---------------------------------------------------------------------------

/// A bot participant replaying the host's route a few points behind.
#[derive(Debug, Clone)]
pub struct SimulatedCompanion {
    id: ParticipantId,
    display_name: String,
    lag_points: usize,
}

impl SimulatedCompanion {
    pub const ID: &'static str = "bot_companion";
    pub const NAME: &'static str = "Sim Companion";

    pub fn new(lag_points: usize) -> Self {
        Self {
            // ID is a valid participant id.
            id: ParticipantId::parse(Self::ID).unwrap_or_else(|_| ParticipantId::generate()),
            display_name: Self::NAME.to_string(),
            lag_points,
        }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    /// Where the companion is when the host is at `route[host_index]`.
    /// `None` until the host is far enough along the route.
    pub fn position(&self, route: &[GeoPoint], host_index: usize) -> Option<GeoPoint> {
        if host_index <= self.lag_points {
            return None;
        }
        route.get(host_index - self.lag_points).copied()
    }

    /// The record written for the companion at `position`, coloured with
    /// the first palette entry not in `taken` (Hot Pink if none is free).
    pub fn record<'a, I>(&self, position: GeoPoint, taken: I) -> NewParticipant
    where
        I: IntoIterator<Item = &'a Color>,
    {
        let preferred = Color::from(&PALETTE[2]);
        NewParticipant {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            color: crate::roster::assign_color(&preferred, taken),
            is_leader: false,
            position,
        }
    }
}
