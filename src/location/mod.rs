//! The platform position service, as seen by the tracker.

pub mod replay;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::geo::{Coordinate, GeoError};

pub use replay::{ReplaySource, Track};

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("permission to access location was denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    Unavailable(String),
    #[error("failed to start position updates: {0}")]
    Subscribe(String),
    #[error("failed to read track {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse track {path}: {reason}")]
    Parse { path: String, reason: String },
    #[error(transparent)]
    Coordinate(#[from] GeoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyTier {
    Lowest,
    Low,
    Balanced,
    #[default]
    High,
    Highest,
    BestForNavigation,
}

/// Delivery policy for a position subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    pub accuracy: AccuracyTier,
    /// Minimum time between two deliveries.
    pub min_interval_ms: u64,
    /// Minimum movement before a new fix is delivered.
    pub min_distance_m: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            accuracy: AccuracyTier::High,
            min_interval_ms: 5_000,
            min_distance_m: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub coordinate: Coordinate,
    pub received_at: DateTime<Utc>,
}

impl LocationFix {
    pub fn now(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            received_at: Utc::now(),
        }
    }
}

pub type FixSender = mpsc::Sender<Result<LocationFix, LocationError>>;

/// Receiving end of a position stream.
///
/// Once cancelled nothing more is handed out, including fixes already
/// sitting in the channel buffer.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<Result<LocationFix, LocationError>>,
    cancelled: bool,
}

impl Subscription {
    /// Creates a subscription and the sender a position source feeds it through.
    pub fn channel(buffer: usize) -> (FixSender, Subscription) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            tx,
            Subscription {
                rx,
                cancelled: false,
            },
        )
    }

    /// Next delivery, or `None` once the source hung up or the subscription was cancelled.
    pub async fn next(&mut self) -> Option<Result<LocationFix, LocationError>> {
        if self.cancelled {
            return None;
        }
        self.rx.recv().await
    }

    /// Stop delivery. Safe to call more than once.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            self.rx.close();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// A source of device positions.
pub trait PositionSource: Send + 'static {
    fn request_permission(&mut self) -> impl Future<Output = Permission> + Send;

    fn current_fix(&mut self) -> impl Future<Output = Result<LocationFix, LocationError>> + Send;

    fn subscribe(&mut self, options: &WatchOptions) -> Result<Subscription, LocationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(lat: f64, lon: f64) -> LocationFix {
        LocationFix::now(Coordinate::new(lat, lon).unwrap())
    }

    #[tokio::test]
    async fn test_subscription_delivers_in_order() {
        let (tx, mut sub) = Subscription::channel(4);
        tx.send(Ok(fix(1.0, 1.0))).await.unwrap();
        tx.send(Ok(fix(2.0, 2.0))).await.unwrap();
        drop(tx);

        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.coordinate.latitude(), 1.0);
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.coordinate.latitude(), 2.0);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_discards_buffered_fixes() {
        let (tx, mut sub) = Subscription::channel(4);
        tx.send(Ok(fix(1.0, 1.0))).await.unwrap();

        sub.cancel();
        sub.cancel();
        assert!(sub.is_cancelled());
        assert!(sub.next().await.is_none());
        assert!(tx.send(Ok(fix(2.0, 2.0))).await.is_err());
    }

    #[test]
    fn test_watch_options_defaults() {
        let options = WatchOptions::default();
        assert_eq!(options.accuracy, AccuracyTier::High);
        assert_eq!(options.min_interval_ms, 5_000);
        assert_eq!(options.min_distance_m, 10.0);

        let parsed: WatchOptions = serde_yaml::from_str("accuracy: balanced").unwrap();
        assert_eq!(parsed.accuracy, AccuracyTier::Balanced);
        assert_eq!(parsed.min_interval_ms, 5_000);
    }
}
