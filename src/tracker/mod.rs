//! Live location tracking.
//!
//! [`Tracker`] owns the state and is its only writer. It pulls events from the
//! position source, the stop signal and finished address lookups one at a
//! time, feeds them through [`TrackerMachine`], and publishes every change on
//! a watch channel that views read from through a [`TrackerHandle`].

pub mod state;

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::geocode::{GeocodeOutcome, GeocodeTransport, ReverseGeocoder};
use crate::location::{LocationError, LocationFix, PositionSource, Subscription, WatchOptions};
use crate::places::CandidateGenerator;

pub use state::{
    AddressLine, Command, LOCATION_UNAVAILABLE_MSG, PERMISSION_DENIED_MSG, Phase, TrackerEvent,
    TrackerMachine, TrackerState,
};

/// Read side of a running tracker, plus its off switch.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    stop: Arc<watch::Sender<bool>>,
    snapshots: watch::Receiver<TrackerState>,
}

impl TrackerHandle {
    /// Ask the tracker to tear down. Idempotent, and fine to call before the tracker runs.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Latest published state.
    pub fn snapshot(&self) -> TrackerState {
        self.snapshots.borrow().clone()
    }

    /// A receiver that is notified on every published change.
    pub fn watch(&self) -> watch::Receiver<TrackerState> {
        self.snapshots.clone()
    }
}

pub struct Tracker<S, T> {
    source: S,
    geocoder: Arc<ReverseGeocoder<T>>,
    options: WatchOptions,
    machine: TrackerMachine,
    snapshots: watch::Sender<TrackerState>,
    stop: watch::Receiver<bool>,
}

impl<S, T> Tracker<S, T>
where
    S: PositionSource,
    T: GeocodeTransport,
{
    pub fn new(
        source: S,
        geocoder: ReverseGeocoder<T>,
        generator: CandidateGenerator,
        options: WatchOptions,
    ) -> (Self, TrackerHandle) {
        let machine = TrackerMachine::new(generator);
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.state().clone());
        let (stop_tx, stop_rx) = watch::channel(false);

        let tracker = Self {
            source,
            geocoder: Arc::new(geocoder),
            options,
            machine,
            snapshots: snapshot_tx,
            stop: stop_rx,
        };
        let handle = TrackerHandle {
            stop: Arc::new(stop_tx),
            snapshots: snapshot_rx,
        };
        (tracker, handle)
    }

    /// Drive the tracker until it reaches a terminal phase and return the final state.
    ///
    /// Lookups still in flight at that point are aborted and their results never applied.
    pub async fn run(mut self) -> TrackerState {
        let mut pending: VecDeque<Command> = self.dispatch(TrackerEvent::Start).into();
        let mut subscription: Option<Subscription> = None;
        let mut lookups: JoinSet<(u64, GeocodeOutcome)> = JoinSet::new();

        loop {
            while let Some(command) = pending.pop_front() {
                let event = match command {
                    Command::RequestPermission => tokio::select! {
                        biased;
                        _ = stop_requested(&mut self.stop) => TrackerEvent::Teardown,
                        permission = self.source.request_permission() => {
                            TrackerEvent::PermissionResolved(permission)
                        }
                    },
                    Command::AcquireFix => tokio::select! {
                        biased;
                        _ = stop_requested(&mut self.stop) => TrackerEvent::Teardown,
                        result = self.source.current_fix() => match result {
                            Ok(fix) => TrackerEvent::FixAcquired(fix),
                            Err(e) => {
                                warn!("Failed to get current position: {e}");
                                TrackerEvent::FixFailed(e.to_string())
                            }
                        },
                    },
                    Command::Subscribe => match self.source.subscribe(&self.options) {
                        Ok(started) => {
                            subscription = Some(started);
                            continue;
                        }
                        Err(e) => {
                            warn!("Failed to watch position: {e}");
                            TrackerEvent::FixFailed(e.to_string())
                        }
                    },
                    Command::ResolveAddress { cycle, coordinate } => {
                        let geocoder = Arc::clone(&self.geocoder);
                        lookups.spawn(async move { (cycle, geocoder.resolve(coordinate).await) });
                        continue;
                    }
                    Command::CancelSubscription => {
                        if let Some(active) = subscription.as_mut() {
                            active.cancel();
                        }
                        continue;
                    }
                };
                pending.extend(self.dispatch(event));
            }

            if self.machine.state().phase().is_terminal() {
                break;
            }

            if subscription.is_none() && lookups.is_empty() {
                info!("Position stream drained, stopping tracker");
                pending.extend(self.dispatch(TrackerEvent::Teardown));
                continue;
            }

            let event = tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop) => TrackerEvent::Teardown,
                Some(joined) = lookups.join_next(), if !lookups.is_empty() => match joined {
                    Ok((cycle, outcome)) => TrackerEvent::AddressResolved { cycle, outcome },
                    Err(e) => {
                        warn!("Address lookup task failed: {e}");
                        continue;
                    }
                },
                delivery = next_fix(&mut subscription) => match delivery {
                    Some(Ok(fix)) => TrackerEvent::PositionUpdate(fix),
                    Some(Err(e)) => {
                        warn!("Position stream failed: {e}");
                        TrackerEvent::FixFailed(e.to_string())
                    }
                    None => {
                        info!("Position stream ended");
                        subscription = None;
                        continue;
                    }
                },
            };
            pending.extend(self.dispatch(event));
        }

        lookups.abort_all();
        self.machine.state().clone()
    }

    fn dispatch(&mut self, event: TrackerEvent) -> Vec<Command> {
        let commands = self.machine.apply(event);
        let state = self.machine.state();
        self.snapshots.send_if_modified(|published| {
            if *published != *state {
                *published = state.clone();
                true
            } else {
                false
            }
        });
        commands
    }
}

/// Resolves once a stop was requested. Never resolves if every handle is
/// dropped without asking.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let closed = stop.wait_for(|stopped| *stopped).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

async fn next_fix(
    subscription: &mut Option<Subscription>,
) -> Option<Result<LocationFix, LocationError>> {
    match subscription {
        Some(active) => active.next().await,
        None => std::future::pending().await,
    }
}
