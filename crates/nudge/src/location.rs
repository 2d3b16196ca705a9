//! Fixed-position location provider for hosts without positioning.

use chrono::Utc;
use nudge_scheduler::{LocationError, LocationProvider, PositionCallback, PositionFix};
use nudge_store::Position;

/// Reports one configured position, or that no position is available.
#[derive(Debug, Clone)]
pub struct StaticLocationProvider {
    position: Option<Position>,
}

impl StaticLocationProvider {
    pub fn new(position: Option<Position>) -> Self {
        Self { position }
    }

    /// Build from optional command-line coordinates. Both must be given.
    pub fn from_coordinates(
        latitude: Option<f64>,
        longitude: Option<f64>,
        label: Option<String>,
    ) -> Self {
        let position = match (latitude, longitude) {
            (Some(lat), Some(lon)) => {
                let position = Position::new(lat, lon);
                Some(match label {
                    Some(label) => position.with_label(label),
                    None => position,
                })
            }
            _ => None,
        };
        Self::new(position)
    }
}

impl LocationProvider for StaticLocationProvider {
    fn on_position_update(&self, callback: PositionCallback) {
        match &self.position {
            Some(position) => callback(Ok(PositionFix::new(position.clone(), Utc::now()))),
            None => callback(Err(LocationError::Unavailable(
                "no position configured".to_string(),
            ))),
        }
    }
}
