//! Mutually exclusive map overlays.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::Coordinate;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OverlayError {
    #[error("no overlay regions configured")]
    Empty,
    #[error("duplicate overlay region id: {0}")]
    DuplicateId(String),
    #[error("unknown overlay region: {0}")]
    UnknownRegion(String),
}

/// A polygon drawn over the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayRegion {
    pub id: String,
    pub label: String,
    pub coordinates: Vec<Coordinate>,
    pub stroke_color: String,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: u32,
}

fn default_stroke_width() -> u32 {
    4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    Bold,
    Normal,
}

/// Which region is on the map. Exactly one is selected at any time.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySelection {
    regions: Vec<OverlayRegion>,
    selected: usize,
}

impl OverlaySelection {
    /// The first region starts out selected.
    pub fn new(regions: Vec<OverlayRegion>) -> Result<Self, OverlayError> {
        if regions.is_empty() {
            return Err(OverlayError::Empty);
        }
        for (i, region) in regions.iter().enumerate() {
            if regions[..i].iter().any(|r| r.id == region.id) {
                return Err(OverlayError::DuplicateId(region.id.clone()));
            }
        }
        Ok(Self {
            regions,
            selected: 0,
        })
    }

    pub fn select(&mut self, id: &str) -> Result<&OverlayRegion, OverlayError> {
        let index = self
            .regions
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| OverlayError::UnknownRegion(id.to_string()))?;
        self.selected = index;
        Ok(&self.regions[index])
    }

    pub fn selected(&self) -> &OverlayRegion {
        &self.regions[self.selected]
    }

    pub fn regions(&self) -> &[OverlayRegion] {
        &self.regions
    }

    /// Regions currently drawn on the map.
    pub fn visible(&self) -> impl Iterator<Item = &OverlayRegion> {
        std::iter::once(self.selected())
    }

    pub fn emphasis(&self, id: &str) -> Emphasis {
        if self.selected().id == id {
            Emphasis::Bold
        } else {
            Emphasis::Normal
        }
    }
}
