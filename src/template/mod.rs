use regex::Regex;
use std::collections::HashMap;

use crate::places::PointOfInterest;
use crate::tracker::TrackerState;

pub const DEFAULT_STATUS_TEMPLATE: &str =
    "[{phase}] {address} | nearest: {nearest.name} ({nearest.distance} m)";

lazy_static::lazy_static! {
    static ref TEMPLATE_VAR: Regex = Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)\}").unwrap();
}

/// Substitute `{name}` placeholders with values from `state`.
///
/// Unknown names render as `{unknown:name}`.
pub fn apply_template(template: &str, state: &TrackerState) -> String {
    let variables = build_variable_map(state);

    TEMPLATE_VAR
        .replace_all(template, |caps: &regex::Captures| {
            let var_name = &caps[1];
            variables
                .get(var_name)
                .cloned()
                .unwrap_or_else(|| format!("{{unknown:{var_name}}}"))
        })
        .into_owned()
}

fn build_variable_map(state: &TrackerState) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();

    vars.insert("phase", state.phase().label().to_string());
    vars.insert("cycle", state.cycle().to_string());
    vars.insert("error", state.error_message().unwrap_or("").to_string());
    vars.insert("address", state.address().display_text().to_string());

    let (lat, lon) = match state.last_fix() {
        Some(c) => (c.latitude().to_string(), c.longitude().to_string()),
        None => ("?".to_string(), "?".to_string()),
    };
    vars.insert("latitude", lat);
    vars.insert("longitude", lon);

    vars.insert("candidates.count", state.candidates().len().to_string());

    match state.nearest() {
        Some(place) => {
            vars.insert("nearest.id", place.id.clone());
            vars.insert("nearest.name", place.name.clone());
            vars.insert("nearest.distance", format_distance(place));
        }
        None => {
            vars.insert("nearest.id", String::new());
            vars.insert("nearest.name", "none".to_string());
            vars.insert("nearest.distance", "?".to_string());
        }
    }

    vars
}

fn format_distance(place: &PointOfInterest) -> String {
    match place.distance_m {
        Some(d) => format!("{d:.0}"),
        None => "?".to_string(),
    }
}

/// The text of the info panel under the map.
pub fn render_info_panel(state: &TrackerState) -> Vec<String> {
    if state.loading() {
        return vec!["Getting your location...".to_string()];
    }
    if let Some(error) = state.error_message() {
        return vec![error.to_string()];
    }
    let Some(here) = state.last_fix() else {
        return vec!["Location not available.".to_string()];
    };

    let mut lines = vec![
        "My Location".to_string(),
        format!("Address: {}", state.address().display_text()),
        format!("Latitude: {}", here.latitude()),
        format!("Longitude: {}", here.longitude()),
        String::new(),
        "Nearest Restaurant".to_string(),
    ];

    match state.nearest() {
        Some(place) => {
            lines.push(format!("Name: {}", place.name));
            lines.push(format!("Approx. distance: {} meters", format_distance(place)));
        }
        None => lines.push("No restaurants found.".to_string()),
    }

    lines
}

/// Callout text for a candidate's map marker.
pub fn marker_description(place: &PointOfInterest, state: &TrackerState) -> &'static str {
    match state.nearest() {
        Some(nearest) if nearest.id == place.id => "Nearest restaurant",
        _ => "Restaurant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::geocode::GeocodeOutcome;
    use crate::location::{LocationFix, Permission};
    use crate::places::CandidateGenerator;
    use crate::tracker::{TrackerEvent, TrackerMachine};

    fn machine_at(lat: f64, lon: f64, generator: CandidateGenerator) -> TrackerMachine {
        let mut machine = TrackerMachine::new(generator);
        machine.apply(TrackerEvent::Start);
        machine.apply(TrackerEvent::PermissionResolved(Permission::Granted));
        machine.apply(TrackerEvent::FixAcquired(LocationFix::now(
            Coordinate::new(lat, lon).unwrap(),
        )));
        machine
    }

    #[test]
    fn test_status_line() {
        let mut machine = machine_at(0.0, 0.0, CandidateGenerator::default());
        machine.apply(TrackerEvent::AddressResolved {
            cycle: 1,
            outcome: GeocodeOutcome::Found("1 Main St".to_string()),
        });

        let line = apply_template(DEFAULT_STATUS_TEMPLATE, machine.state());
        // Cheers Bar: 0.002/0.001 degrees off at the equator, about 249 m.
        assert_eq!(line, "[active] 1 Main St | nearest: Cheers Bar (249 m)");
    }

    #[test]
    fn test_unknown_variable() {
        let machine = TrackerMachine::default();
        assert_eq!(
            apply_template("{phase} {bogus.var}", machine.state()),
            "unstarted {unknown:bogus.var}"
        );
    }

    #[test]
    fn test_panel_while_loading() {
        let machine = TrackerMachine::default();
        assert_eq!(
            render_info_panel(machine.state()),
            vec!["Getting your location...".to_string()]
        );
    }

    #[test]
    fn test_panel_after_denial() {
        let mut machine = TrackerMachine::default();
        machine.apply(TrackerEvent::Start);
        machine.apply(TrackerEvent::PermissionResolved(Permission::Denied));
        assert_eq!(
            render_info_panel(machine.state()),
            vec!["Permission to access location was denied.".to_string()]
        );
    }

    #[test]
    fn test_panel_with_nearest() {
        let machine = machine_at(0.0, 0.0, CandidateGenerator::default());
        let panel = render_info_panel(machine.state());
        assert_eq!(panel[0], "My Location");
        assert_eq!(panel[1], "Address: Loading address...");
        assert_eq!(panel[2], "Latitude: 0");
        assert_eq!(panel[6], "Name: Cheers Bar");
        assert_eq!(panel[7], "Approx. distance: 249 meters");
    }

    #[test]
    fn test_panel_without_candidates() {
        let machine = machine_at(0.0, 0.0, CandidateGenerator::new(vec![]));
        let panel = render_info_panel(machine.state());
        assert_eq!(panel.last().unwrap(), "No restaurants found.");
        assert_eq!(
            apply_template("{nearest.name}/{nearest.distance}", machine.state()),
            "none/?"
        );
    }

    #[test]
    fn test_marker_descriptions() {
        let machine = machine_at(0.0, 0.0, CandidateGenerator::default());
        let state = machine.state();
        let labels: Vec<&str> = state
            .candidates()
            .iter()
            .map(|place| marker_description(place, state))
            .collect();
        assert_eq!(labels, vec!["Nearest restaurant", "Restaurant", "Restaurant"]);
    }
}
