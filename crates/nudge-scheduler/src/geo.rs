//! Latest-known device position and great-circle distance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nudge_store::Position;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::LocationError;

/// Mean Earth radius used by the Haversine formula, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A position paired with the instant it was sampled.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    pub position: Position,
    pub sampled_at: DateTime<Utc>,
}

impl PositionFix {
    pub fn new(position: Position, sampled_at: DateTime<Utc>) -> Self {
        Self {
            position,
            sampled_at,
        }
    }
}

/// Callback invoked by a location provider for each fix or failure.
pub type PositionCallback = Arc<dyn Fn(Result<PositionFix, LocationError>) + Send + Sync>;

/// Push-based source of device positions.
pub trait LocationProvider: Send + Sync {
    /// Register a callback for continuous updates.
    fn on_position_update(&self, callback: PositionCallback);
}

/// Holds the single most recent position.
///
/// Updates overwrite atomically and the last write wins. No history is
/// kept and the tracker knows nothing about reminders.
#[derive(Debug)]
pub struct GeoTracker {
    latest: watch::Sender<Option<PositionFix>>,
}

impl Default for GeoTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl GeoTracker {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(None);
        Self { latest }
    }

    /// Store a new fix.
    ///
    /// Returns `false` and keeps the previous fix when the coordinates are
    /// not finite or fall outside WGS84 bounds.
    pub fn update_position(&self, fix: PositionFix) -> bool {
        if !fix.position.is_valid() {
            warn!(
                latitude = fix.position.latitude,
                longitude = fix.position.longitude,
                "rejected invalid position sample"
            );
            return false;
        }

        debug!(
            latitude = fix.position.latitude,
            longitude = fix.position.longitude,
            "position updated"
        );
        self.latest.send_replace(Some(fix));
        true
    }

    /// The latest fix, or `None` before the first sample.
    pub fn current_position(&self) -> Option<PositionFix> {
        self.latest.borrow().clone()
    }

    /// Observe position changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<PositionFix>> {
        self.latest.subscribe()
    }

    /// Feed this tracker from a provider's update stream.
    ///
    /// Provider failures are logged and dropped; the last known fix stays
    /// in place.
    pub fn follow(self: &Arc<Self>, provider: &dyn LocationProvider) {
        let tracker = Arc::clone(self);
        provider.on_position_update(Arc::new(move |update| match update {
            Ok(fix) => {
                tracker.update_position(fix);
            }
            Err(e) => {
                warn!(error = %e, "location provider failed, keeping last known position");
            }
        }));
    }
}

/// Haversine great-circle distance between two positions, in meters.
pub fn distance_meters(a: &Position, b: &Position) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push near-antipodal inputs just past 1
    let h = h.min(1.0);

    EARTH_RADIUS_METERS * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn fix(lat: f64, lon: f64) -> PositionFix {
        PositionFix::new(Position::new(lat, lon), Utc::now())
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = Position::new(37.0, -122.0);
        assert_eq!(distance_meters(&p, &p), 0.0);
    }

    #[test]
    fn test_one_degree_latitude_at_equator() {
        let d = distance_meters(&Position::new(0.0, 0.0), &Position::new(1.0, 0.0));
        let expected = 111_195.0;
        assert!(
            ((d - expected) / expected).abs() < 0.001,
            "1 degree of latitude should be ~111.2 km, got {d}"
        );
    }

    #[test]
    fn test_short_separation() {
        // ~0.001 degrees of latitude is ~111 m
        let d = distance_meters(&Position::new(37.0, -122.0), &Position::new(37.001, -122.0));
        assert!((d - 111.19).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_tracker_starts_empty() {
        let tracker = GeoTracker::new();
        assert!(tracker.current_position().is_none());
    }

    #[test]
    fn test_tracker_last_write_wins() {
        let tracker = GeoTracker::new();
        assert!(tracker.update_position(fix(1.0, 1.0)));
        assert!(tracker.update_position(fix(2.0, 2.0)));

        let current = tracker.current_position().unwrap();
        assert_eq!(current.position, Position::new(2.0, 2.0));
    }

    #[test]
    fn test_tracker_rejects_invalid_sample() {
        let tracker = GeoTracker::new();
        tracker.update_position(fix(10.0, 10.0));

        assert!(!tracker.update_position(fix(f64::NAN, 0.0)));
        assert!(!tracker.update_position(fix(95.0, 0.0)));
        assert_eq!(
            tracker.current_position().unwrap().position,
            Position::new(10.0, 10.0)
        );
    }

    #[test]
    fn test_subscribe_sees_updates() {
        let tracker = GeoTracker::new();
        let rx = tracker.subscribe();
        tracker.update_position(fix(3.0, 4.0));
        assert_eq!(
            rx.borrow().as_ref().map(|f| f.position.clone()),
            Some(Position::new(3.0, 4.0))
        );
    }

    /// Provider that hands its callback back to the test.
    #[derive(Default)]
    struct ManualProvider {
        callback: Mutex<Option<PositionCallback>>,
    }

    impl LocationProvider for ManualProvider {
        fn on_position_update(&self, callback: PositionCallback) {
            *self.callback.lock().unwrap() = Some(callback);
        }
    }

    impl ManualProvider {
        fn emit(&self, update: Result<PositionFix, LocationError>) {
            let callback = self.callback.lock().unwrap().clone().unwrap();
            callback(update);
        }
    }

    #[test]
    fn test_follow_absorbs_provider_errors() {
        let tracker = Arc::new(GeoTracker::new());
        let provider = ManualProvider::default();
        tracker.follow(&provider);

        provider.emit(Err(LocationError::PermissionDenied));
        assert!(tracker.current_position().is_none());

        provider.emit(Ok(fix(5.0, 6.0)));
        provider.emit(Err(LocationError::Timeout));
        assert_eq!(
            tracker.current_position().unwrap().position,
            Position::new(5.0, 6.0)
        );
    }

    fn coordinate() -> impl Strategy<Value = Position> {
        (-90.0..=90.0f64, -180.0..=180.0f64).prop_map(|(lat, lon)| Position::new(lat, lon))
    }

    proptest! {
        #[test]
        fn distance_is_symmetric(a in coordinate(), b in coordinate()) {
            let ab = distance_meters(&a, &b);
            let ba = distance_meters(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-6, "{} vs {}", ab, ba);
        }

        #[test]
        fn distance_is_bounded(a in coordinate(), b in coordinate()) {
            let d = distance_meters(&a, &b);
            prop_assert!(d >= 0.0);
            // Never more than half the circumference
            prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_METERS + 1e-6);
        }
    }
}
