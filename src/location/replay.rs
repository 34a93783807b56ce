// Replays a recorded track as if it came from the device.
// Accepts a Google Takeout location history export or a plain list of coordinates.

use std::fs;
use std::time::Duration;

use camino::Utf8Path;
use serde::Deserialize;
use tracing::debug;

use super::{LocationError, LocationFix, Permission, PositionSource, Subscription, WatchOptions};
use crate::geo::{Coordinate, distance};

// Deserializes a string timestamp into a u64.
fn parse_str_to_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    s.parse::<u64>().map_err(serde::de::Error::custom)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TakeoutRoot {
    locations: Vec<TakeoutLocation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TakeoutLocation {
    #[serde(deserialize_with = "parse_str_to_u64")]
    timestamp_ms: u64,
    latitude_e7: i32,
    longitude_e7: i32,
}

/// An ordered list of positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    points: Vec<Coordinate>,
}

impl Track {
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    /// Loads a track from disk, trying the Takeout format first.
    pub fn from_file(path: &Utf8Path) -> Result<Self, LocationError> {
        let content = fs::read_to_string(path).map_err(|source| LocationError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|reason| LocationError::Parse {
            path: path.to_string(),
            reason,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        if let Ok(root) = serde_json::from_str::<TakeoutRoot>(content) {
            let mut locations = root.locations;
            // Exports are usually sorted, but not guaranteed to be.
            locations.sort_by_key(|loc| loc.timestamp_ms);
            let points = locations
                .into_iter()
                .map(|loc| Coordinate::from_e7(loc.latitude_e7, loc.longitude_e7))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;
            return Ok(Self { points });
        }

        // serde_yaml also accepts JSON.
        let points: Vec<Coordinate> = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// [`PositionSource`] that plays back a [`Track`].
///
/// The first point answers the initial fix request and the subscription
/// streams the rest, paced by the watch options.
#[derive(Debug)]
pub struct ReplaySource {
    track: Track,
    permission: Permission,
    speed: f64,
}

impl ReplaySource {
    pub fn new(track: Track) -> Self {
        Self {
            track,
            permission: Permission::Granted,
            speed: 1.0,
        }
    }

    /// Answer every permission request with `permission`.
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    /// Playback speed multiplier. Non-positive values are ignored.
    pub fn with_speed(mut self, speed: f64) -> Self {
        if speed > 0.0 && speed.is_finite() {
            self.speed = speed;
        }
        self
    }

    fn pacing(&self, options: &WatchOptions) -> Result<Duration, LocationError> {
        let seconds = options.min_interval_ms as f64 / 1000.0 / self.speed;
        Duration::try_from_secs_f64(seconds).map_err(|e| {
            LocationError::Subscribe(format!(
                "replay interval of {seconds}s at speed {} is out of range: {e}",
                self.speed
            ))
        })
    }
}

impl PositionSource for ReplaySource {
    async fn request_permission(&mut self) -> Permission {
        self.permission
    }

    async fn current_fix(&mut self) -> Result<LocationFix, LocationError> {
        self.track
            .points
            .first()
            .map(|c| LocationFix::now(*c))
            .ok_or_else(|| LocationError::Unavailable("track is empty".to_string()))
    }

    fn subscribe(&mut self, options: &WatchOptions) -> Result<Subscription, LocationError> {
        let pacing = self.pacing(options)?;
        let (tx, subscription) = Subscription::channel(1);
        let min_distance = options.min_distance_m;
        let points = self.track.points.clone();

        tokio::spawn(async move {
            let mut last = match points.first() {
                Some(first) => *first,
                None => return,
            };

            for point in points.into_iter().skip(1) {
                if distance(last, point) < min_distance {
                    debug!(
                        "Skipping replayed fix {:.6},{:.6} under movement threshold",
                        point.latitude(),
                        point.longitude()
                    );
                    continue;
                }

                tokio::time::sleep(pacing).await;
                if tx.send(Ok(LocationFix::now(point))).await.is_err() {
                    // Subscription cancelled.
                    return;
                }
                last = point;
            }
        });

        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_from_takeout_file_ok() {
        let track = Track::from_file(Utf8Path::new("test_data/location_history.json")).unwrap();
        assert_eq!(track.len(), 4);

        // Sorted by timestamp, not file order.
        let lats: Vec<f64> = track.points().iter().map(|c| c.latitude()).collect();
        assert_eq!(lats, vec![43.8486744, 43.8490744, 43.8500744, 43.8520744]);
        assert!((track.points()[0].longitude() - -79.0695283).abs() < 1e-9);
    }

    #[test]
    fn test_from_coordinate_list_file_ok() {
        let track = Track::from_file(Utf8Path::new("test_data/track.yaml")).unwrap();
        assert_eq!(track.len(), 3);
        assert_eq!(track.points()[2], coord(43.8518394, -79.0725697));
    }

    #[test]
    fn test_from_file_not_found() {
        let result = Track::from_file(Utf8Path::new("test_data/non_existent_file.json"));
        assert!(matches!(result, Err(LocationError::Io { .. })));
    }

    #[test]
    fn test_from_file_malformed() {
        let result = Track::from_file(Utf8Path::new("test_data/malformed.json"));
        assert!(matches!(result, Err(LocationError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_replay_first_point_is_current_fix() {
        let mut source = ReplaySource::new(Track::new(vec![coord(1.0, 1.0), coord(2.0, 2.0)]));
        assert_eq!(source.request_permission().await, Permission::Granted);
        let fix = source.current_fix().await.unwrap();
        assert_eq!(fix.coordinate, coord(1.0, 1.0));
    }

    #[tokio::test]
    async fn test_replay_empty_track_has_no_fix() {
        let mut source = ReplaySource::new(Track::default()).with_permission(Permission::Denied);
        assert_eq!(source.request_permission().await, Permission::Denied);
        assert!(matches!(
            source.current_fix().await,
            Err(LocationError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_replay_skips_small_moves() {
        let origin = coord(0.0, 0.0);
        let track = Track::new(vec![
            origin,
            origin.offset(0.00001, 0.0), // ~1 m
            origin.offset(0.001, 0.0),   // ~111 m
            origin.offset(0.00101, 0.0), // ~1 m further
            origin.offset(0.002, 0.0),
        ]);
        let mut source = ReplaySource::new(track).with_speed(1000.0);
        let options = WatchOptions {
            min_interval_ms: 1,
            ..Default::default()
        };
        let mut sub = source.subscribe(&options).unwrap();

        let mut delivered = Vec::new();
        while let Some(fix) = sub.next().await {
            delivered.push(fix.unwrap().coordinate);
        }
        assert_eq!(delivered, vec![origin.offset(0.001, 0.0), origin.offset(0.002, 0.0)]);
    }

    #[tokio::test]
    async fn test_replay_interval_out_of_range() {
        let track = Track::new(vec![coord(0.0, 0.0), coord(1.0, 1.0)]);

        let mut source = ReplaySource::new(track.clone()).with_speed(1e-300);
        let result = source.subscribe(&WatchOptions::default());
        assert!(matches!(result, Err(LocationError::Subscribe(_))));

        let mut source = ReplaySource::new(track).with_speed(1e-6);
        let options = WatchOptions {
            min_interval_ms: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(
            source.subscribe(&options),
            Err(LocationError::Subscribe(_))
        ));
    }

    #[tokio::test]
    async fn test_replay_stops_after_cancel() {
        let origin = coord(0.0, 0.0);
        let track = Track::new((0..10).map(|i| origin.offset(i as f64 * 0.01, 0.0)).collect());
        let mut source = ReplaySource::new(track).with_speed(1000.0);
        let options = WatchOptions {
            min_interval_ms: 1,
            ..Default::default()
        };
        let mut sub = source.subscribe(&options).unwrap();

        assert!(sub.next().await.is_some());
        sub.cancel();
        assert!(sub.next().await.is_none());
    }
}
