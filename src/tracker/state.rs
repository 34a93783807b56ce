//! Tracker state and its transition function.
//!
//! [`TrackerMachine::apply`] is the only place state changes. It never does
//! I/O; instead it hands back [`Command`]s for the driver to carry out, whose
//! results come back in as further [`TrackerEvent`]s.

use tracing::{debug, info};

use crate::geo::Coordinate;
use crate::geocode::{GeocodeOutcome, LOADING_TEXT};
use crate::location::{LocationFix, Permission};
use crate::places::{self, CandidateGenerator, PointOfInterest};

pub const PERMISSION_DENIED_MSG: &str = "Permission to access location was denied.";
pub const LOCATION_UNAVAILABLE_MSG: &str = "Unable to get your current location.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Unstarted,
    AwaitingPermission,
    AcquiringFix,
    Active,
    PermissionDenied,
    /// The position service failed; nothing more will be delivered.
    Unavailable,
    Stopped,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::PermissionDenied | Phase::Unavailable | Phase::Stopped
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Unstarted => "unstarted",
            Phase::AwaitingPermission => "awaiting-permission",
            Phase::AcquiringFix => "acquiring-fix",
            Phase::Active => "active",
            Phase::PermissionDenied => "permission-denied",
            Phase::Unavailable => "unavailable",
            Phase::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AddressLine {
    #[default]
    Loading,
    Resolved(GeocodeOutcome),
}

impl AddressLine {
    pub fn display_text(&self) -> &str {
        match self {
            AddressLine::Loading => LOADING_TEXT,
            AddressLine::Resolved(outcome) => outcome.display_text(),
        }
    }
}

/// Everything the view needs to render one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerState {
    phase: Phase,
    permission_granted: bool,
    error: Option<&'static str>,
    last_fix: Option<Coordinate>,
    address: AddressLine,
    candidates: Vec<PointOfInterest>,
    nearest: Option<PointOfInterest>,
    cycle: u64,
    address_cycle: u64,
}

impl TrackerState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True until the first fix lands or startup fails.
    pub fn loading(&self) -> bool {
        matches!(
            self.phase,
            Phase::Unstarted | Phase::AwaitingPermission | Phase::AcquiringFix
        )
    }

    pub fn active(&self) -> bool {
        self.phase == Phase::Active
    }

    pub fn permission_granted(&self) -> bool {
        self.permission_granted
    }

    pub fn error_message(&self) -> Option<&'static str> {
        self.error
    }

    pub fn last_fix(&self) -> Option<Coordinate> {
        self.last_fix
    }

    pub fn address(&self) -> &AddressLine {
        &self.address
    }

    pub fn candidates(&self) -> &[PointOfInterest] {
        &self.candidates
    }

    pub fn nearest(&self) -> Option<&PointOfInterest> {
        self.nearest.as_ref()
    }

    /// Number of position updates processed so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Cycle whose lookup produced the current address, 0 if none has landed yet.
    pub fn address_cycle(&self) -> u64 {
        self.address_cycle
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Start,
    PermissionResolved(Permission),
    /// Answer to the initial fix request.
    FixAcquired(LocationFix),
    /// Delivery from the running subscription.
    PositionUpdate(LocationFix),
    FixFailed(String),
    AddressResolved { cycle: u64, outcome: GeocodeOutcome },
    Teardown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RequestPermission,
    AcquireFix,
    Subscribe,
    ResolveAddress { cycle: u64, coordinate: Coordinate },
    CancelSubscription,
}

#[derive(Debug, Clone, Default)]
pub struct TrackerMachine {
    state: TrackerState,
    generator: CandidateGenerator,
}

impl TrackerMachine {
    pub fn new(generator: CandidateGenerator) -> Self {
        Self {
            state: TrackerState::default(),
            generator,
        }
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn apply(&mut self, event: TrackerEvent) -> Vec<Command> {
        use TrackerEvent as E;

        match (self.state.phase, event) {
            (Phase::Unstarted, E::Start) => {
                self.enter(Phase::AwaitingPermission);
                vec![Command::RequestPermission]
            }
            (Phase::AwaitingPermission, E::PermissionResolved(Permission::Granted)) => {
                self.state.permission_granted = true;
                self.enter(Phase::AcquiringFix);
                vec![Command::AcquireFix]
            }
            (Phase::AwaitingPermission, E::PermissionResolved(Permission::Denied)) => {
                self.state.error = Some(PERMISSION_DENIED_MSG);
                self.enter(Phase::PermissionDenied);
                vec![]
            }
            (Phase::AcquiringFix, E::FixAcquired(fix)) => {
                let lookup = self.run_cycle(fix);
                self.enter(Phase::Active);
                vec![lookup, Command::Subscribe]
            }
            (Phase::Active, E::PositionUpdate(fix)) => vec![self.run_cycle(fix)],
            (Phase::AcquiringFix | Phase::Active, E::FixFailed(reason)) => {
                info!("Location unavailable: {reason}");
                let was_active = self.state.phase == Phase::Active;
                self.state.error = Some(LOCATION_UNAVAILABLE_MSG);
                self.enter(Phase::Unavailable);
                if was_active {
                    vec![Command::CancelSubscription]
                } else {
                    vec![]
                }
            }
            (Phase::Active, E::AddressResolved { cycle, outcome }) => {
                if cycle > self.state.address_cycle && cycle <= self.state.cycle {
                    self.state.address = AddressLine::Resolved(outcome);
                    self.state.address_cycle = cycle;
                } else {
                    debug!(
                        "Dropping address for cycle {cycle}, already showing cycle {}",
                        self.state.address_cycle
                    );
                }
                vec![]
            }
            (phase, E::Teardown) if !phase.is_terminal() => {
                self.enter(Phase::Stopped);
                if phase == Phase::Active {
                    vec![Command::CancelSubscription]
                } else {
                    vec![]
                }
            }
            (phase, event) => {
                debug!("Ignoring {event:?} while {}", phase.label());
                vec![]
            }
        }
    }

    fn enter(&mut self, phase: Phase) {
        info!("Tracker {} -> {}", self.state.phase.label(), phase.label());
        self.state.phase = phase;
    }

    /// Recompute candidates and the nearest one for a new fix, and ask for its address.
    fn run_cycle(&mut self, fix: LocationFix) -> Command {
        let origin = fix.coordinate;
        let candidates = self.generator.generate(origin);
        let nearest = places::nearest(origin, &candidates);

        self.state.cycle += 1;
        self.state.last_fix = Some(origin);
        self.state.candidates = candidates;
        self.state.nearest = nearest;

        debug!(
            cycle = self.state.cycle,
            nearest = self.state.nearest.as_ref().map(|p| p.name.as_str()),
            "Position {:.6},{:.6}",
            origin.latitude(),
            origin.longitude()
        );

        Command::ResolveAddress {
            cycle: self.state.cycle,
            coordinate: origin,
        }
    }
}
