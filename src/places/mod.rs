//! Points of interest around the current position and nearest-point selection.

use serde::{Deserialize, Serialize};

use crate::geo::{Coordinate, distance};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub id: String,
    pub name: String,
    pub coordinate: Coordinate,
    /// Meters from the origin the point was selected against. Only set on
    /// values returned by [`nearest`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

/// A named degree offset from the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateOffset {
    pub name: String,
    pub lat_offset: f64,
    pub lon_offset: f64,
}

impl CandidateOffset {
    pub fn new(name: impl Into<String>, lat_offset: f64, lon_offset: f64) -> Self {
        Self {
            name: name.into(),
            lat_offset,
            lon_offset,
        }
    }
}

/// The three reference places placed around every fix.
pub fn default_offsets() -> Vec<CandidateOffset> {
    vec![
        CandidateOffset::new("Cheers Bar", 0.002, 0.001),
        CandidateOffset::new("Central Perk", -0.0025, 0.0015),
        CandidateOffset::new("Paddy's Irish Pub", 0.0015, -0.002),
    ]
}

/// Produces a deterministic candidate set around an origin.
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    offsets: Vec<CandidateOffset>,
}

impl Default for CandidateGenerator {
    fn default() -> Self {
        Self::new(default_offsets())
    }
}

impl CandidateGenerator {
    pub fn new(offsets: Vec<CandidateOffset>) -> Self {
        Self { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Ids are the 1-based position in the offset list, so they are stable across calls.
    pub fn generate(&self, origin: Coordinate) -> Vec<PointOfInterest> {
        self.offsets
            .iter()
            .enumerate()
            .map(|(i, offset)| PointOfInterest {
                id: (i + 1).to_string(),
                name: offset.name.clone(),
                coordinate: origin.offset(offset.lat_offset, offset.lon_offset),
                distance_m: None,
            })
            .collect()
    }
}

/// Returns the candidate closest to `origin` with its distance attached.
///
/// Ties go to the earliest candidate in the slice.
pub fn nearest(origin: Coordinate, candidates: &[PointOfInterest]) -> Option<PointOfInterest> {
    let mut best: Option<(&PointOfInterest, f64)> = None;

    for candidate in candidates {
        let d = distance(origin, candidate.coordinate);
        match best {
            Some((_, shortest)) if d >= shortest => {}
            _ => best = Some((candidate, d)),
        }
    }

    best.map(|(place, d)| PointOfInterest {
        distance_m: Some(d),
        ..place.clone()
    })
}
