//! Desired map scene and the marker commands that bring a map surface to it.
//!
//! The core never touches the map widget. It describes the scene it wants
//! (`MapView`, part of the view model) and the shell diffs it against the
//! last scene it applied with [`MapSync`].
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::model::{LatLon, Place};

pub const DEFAULT_CENTER: LatLon = LatLon {
    lat: 38.861,
    lon: 71.2761,
};
pub const DEFAULT_ZOOM: u8 = 7;
pub const SELECTION_ZOOM: u8 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileLayer {
    pub url_template: &'static str,
    pub attribution: &'static str,
    pub max_zoom: u8,
}

pub const OSM_TILES: TileLayer = TileLayer {
    url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
    attribution: "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors",
    max_zoom: 19,
};

/// Static points of interest shown on every map.
pub const POINTS_OF_INTEREST: [(&str, f64, f64); 4] = [
    ("Dushanbe", 38.5598, 68.787),
    ("Khujand", 40.2837, 69.6219),
    ("Pamir Mountains", 38.6772, 72.8696),
    ("Iskanderkul Lake", 39.0728, 68.3714),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerId {
    PointOfInterest(usize),
    Selection,
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PointOfInterest(index) => write!(f, "poi-{index}"),
            Self::Selection => f.write_str("selection"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown marker id '{0}'")]
pub struct UnknownMarker(pub String);

impl FromStr for MarkerId {
    type Err = UnknownMarker;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "selection" {
            return Ok(Self::Selection);
        }
        s.strip_prefix("poi-")
            .and_then(|index| index.parse().ok())
            .filter(|index| *index < POINTS_OF_INTEREST.len())
            .map(Self::PointOfInterest)
            .ok_or_else(|| UnknownMarker(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerKind {
    PointOfInterest,
    Selection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub id: MarkerId,
    pub kind: MarkerKind,
    pub place: Place,
    /// Whether the popup (with its "add to favorites" action) opens on placement.
    pub popup_open: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub center: LatLon,
    pub zoom: u8,
    /// Bumped on every selection, including a repeat of the current one.
    pub focus: u32,
    pub markers: Vec<MapMarker>,
}

impl Default for MapView {
    fn default() -> Self {
        Self::from_selection(None)
    }
}

impl MapView {
    /// Points of interest plus at most one marker for `selected`, centred on
    /// the selection when there is one.
    pub fn from_selection(selected: Option<&Place>) -> Self {
        let mut markers: Vec<MapMarker> = POINTS_OF_INTEREST
            .iter()
            .enumerate()
            .map(|(index, (name, lat, lon))| MapMarker {
                id: MarkerId::PointOfInterest(index),
                kind: MarkerKind::PointOfInterest,
                place: Place::new(*name, *lat, *lon),
                popup_open: false,
            })
            .collect();

        let mut center = DEFAULT_CENTER;
        let mut zoom = DEFAULT_ZOOM;

        if let Some(place) = selected {
            match place.coordinate() {
                Ok(coordinate) => {
                    center = coordinate;
                    zoom = SELECTION_ZOOM;
                    markers.push(MapMarker {
                        id: MarkerId::Selection,
                        kind: MarkerKind::Selection,
                        place: place.clone(),
                        popup_open: true,
                    });
                }
                Err(e) => warn!(name = %place.name, error = %e, "selection not drawable"),
            }
        }

        Self {
            center,
            zoom,
            focus: 0,
            markers,
        }
    }

    pub fn focused(mut self, focus: u32) -> Self {
        self.focus = focus;
        self
    }

    pub fn marker(&self, id: MarkerId) -> Option<&MapMarker> {
        self.markers.iter().find(|marker| marker.id == id)
    }

    pub fn selection_marker(&self) -> Option<&MapMarker> {
        self.marker(MarkerId::Selection)
    }

    pub fn points_of_interest(&self) -> impl Iterator<Item = &MapMarker> {
        self.markers
            .iter()
            .filter(|marker| marker.kind == MarkerKind::PointOfInterest)
    }

    pub fn to_geojson(&self) -> FeatureCollection {
        let features = self
            .markers
            .iter()
            .map(|marker| {
                let mut properties = JsonObject::new();
                properties.insert("name".into(), marker.place.name.clone().into());
                properties.insert(
                    "kind".into(),
                    match marker.kind {
                        MarkerKind::PointOfInterest => "pointOfInterest",
                        MarkerKind::Selection => "selection",
                    }
                    .into(),
                );
                properties.insert("popupOpen".into(), marker.popup_open.into());

                Feature {
                    bbox: None,
                    // GeoJSON positions are [lon, lat]
                    geometry: Some(Geometry::new(Value::Point(vec![
                        marker.place.lon,
                        marker.place.lat,
                    ]))),
                    id: Some(Id::String(marker.id.to_string())),
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarkerCommand {
    Place(MapMarker),
    Remove(MarkerId),
    Recenter { center: LatLon, zoom: u8 },
}

/// Commands that turn the `previous` scene into `desired`: removals first,
/// then placements, then a recenter if the viewport moved or the selection
/// was refocused.
pub fn reconcile(previous: Option<&MapView>, desired: &MapView) -> Vec<MarkerCommand> {
    let mut commands = Vec::new();
    let refocused = previous.is_some_and(|p| p.focus != desired.focus);
    // a refocused selection is placed again so its popup reopens
    let stale = |marker: &MapMarker| refocused && marker.id == MarkerId::Selection;

    if let Some(previous) = previous {
        for marker in &previous.markers {
            if desired.marker(marker.id) != Some(marker) || stale(marker) {
                commands.push(MarkerCommand::Remove(marker.id));
            }
        }
    }

    for marker in &desired.markers {
        let unchanged = previous.and_then(|p| p.marker(marker.id)) == Some(marker);
        if !unchanged || stale(marker) {
            commands.push(MarkerCommand::Place(marker.clone()));
        }
    }

    let moved = !previous.is_some_and(|p| p.center == desired.center && p.zoom == desired.zoom);
    if moved || refocused {
        commands.push(MarkerCommand::Recenter {
            center: desired.center,
            zoom: desired.zoom,
        });
    }

    commands
}

/// Shell-side record of the scene last applied to the map surface.
#[derive(Debug, Clone, Default)]
pub struct MapSync {
    rendered: Option<MapView>,
}

impl MapSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marker changes since the previous call. The first call places the
    /// full scene.
    pub fn commands(&mut self, desired: &MapView) -> Vec<MarkerCommand> {
        let commands = reconcile(self.rendered.as_ref(), desired);
        if !commands.is_empty() {
            debug!(count = commands.len(), focus = desired.focus, "map commands");
        }
        self.rendered = Some(desired.clone());
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed(commands: &[MarkerCommand]) -> Vec<MarkerId> {
        commands
            .iter()
            .filter_map(|c| match c {
                MarkerCommand::Place(marker) => Some(marker.id),
                _ => None,
            })
            .collect()
    }

    fn removed(commands: &[MarkerCommand]) -> Vec<MarkerId> {
        commands
            .iter()
            .filter_map(|c| match c {
                MarkerCommand::Remove(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn initial_view_has_points_of_interest() {
        let view = MapView::default();
        assert_eq!(view.center, DEFAULT_CENTER);
        assert_eq!(view.zoom, DEFAULT_ZOOM);
        assert_eq!(view.points_of_interest().count(), 4);
        assert!(view.selection_marker().is_none());
        assert_eq!(
            view.marker(MarkerId::PointOfInterest(3)).unwrap().place.name,
            "Iskanderkul Lake"
        );
    }

    #[test]
    fn selection_centres_and_zooms() {
        let place = Place::new("Hisor", 38.5263, 68.5514);
        let view = MapView::from_selection(Some(&place));
        assert_eq!(view.zoom, SELECTION_ZOOM);
        assert_eq!(view.center, LatLon::new(38.5263, 68.5514).unwrap());
        let marker = view.selection_marker().unwrap();
        assert_eq!(marker.place, place);
        assert!(marker.popup_open);
    }

    #[test]
    fn invalid_selection_is_not_drawn() {
        let place = Place::new("Nowhere", 123.0, 0.0);
        let view = MapView::from_selection(Some(&place));
        assert!(view.selection_marker().is_none());
        assert_eq!(view.zoom, DEFAULT_ZOOM);
    }

    #[test]
    fn first_reconcile_places_everything() {
        let view = MapView::default();
        let commands = reconcile(None, &view);
        assert_eq!(placed(&commands).len(), 4);
        assert!(removed(&commands).is_empty());
        assert_eq!(
            commands.last(),
            Some(&MarkerCommand::Recenter {
                center: DEFAULT_CENTER,
                zoom: DEFAULT_ZOOM
            })
        );
    }

    #[test]
    fn unchanged_view_needs_no_commands() {
        let view = MapView::default();
        assert!(reconcile(Some(&view), &view).is_empty());
    }

    #[test]
    fn new_selection_replaces_previous_marker() {
        let first = MapView::from_selection(Some(&Place::new("A", 38.0, 68.0)));
        let second = MapView::from_selection(Some(&Place::new("B", 39.0, 69.0)));

        let commands = reconcile(Some(&first), &second);
        assert_eq!(removed(&commands), [MarkerId::Selection]);
        assert_eq!(placed(&commands), [MarkerId::Selection]);
        assert!(matches!(commands[0], MarkerCommand::Remove(_)));

        let applied = MapView::from_selection(Some(&Place::new("B", 39.0, 69.0)));
        let selections = applied
            .markers
            .iter()
            .filter(|m| m.kind == MarkerKind::Selection)
            .count();
        assert_eq!(selections, 1);
    }

    #[test]
    fn points_of_interest_are_never_removed() {
        let first = MapView::default();
        let second = MapView::from_selection(Some(&Place::new("A", 38.0, 68.0)));
        for commands in [reconcile(Some(&first), &second), reconcile(Some(&second), &first)] {
            assert!(removed(&commands)
                .iter()
                .all(|id| *id == MarkerId::Selection));
        }
    }

    #[test]
    fn reselecting_the_same_place_recenters() {
        let place = Place::new("Hisor", 38.5263, 68.5514);
        let first = MapView::from_selection(Some(&place)).focused(1);
        let again = MapView::from_selection(Some(&place)).focused(2);

        let commands = reconcile(Some(&first), &again);
        assert_eq!(removed(&commands), [MarkerId::Selection]);
        assert_eq!(placed(&commands), [MarkerId::Selection]);
        assert_eq!(
            commands.last(),
            Some(&MarkerCommand::Recenter {
                center: LatLon::new(38.5263, 68.5514).unwrap(),
                zoom: SELECTION_ZOOM
            })
        );
        assert!(reconcile(Some(&again), &again).is_empty());
    }

    #[test]
    fn map_sync_diffs_against_last_scene() {
        let mut sync = MapSync::new();
        let initial = MapView::default();
        assert_eq!(placed(&sync.commands(&initial)).len(), 4);
        assert!(sync.commands(&initial).is_empty());

        let selected = MapView::from_selection(Some(&Place::new("Hisor", 38.5263, 68.5514))).focused(1);
        let commands = sync.commands(&selected);
        assert_eq!(placed(&commands), [MarkerId::Selection]);
        assert!(matches!(commands.last(), Some(MarkerCommand::Recenter { zoom: 13, .. })));
    }

    #[test]
    fn marker_ids_parse() {
        assert_eq!("selection".parse::<MarkerId>(), Ok(MarkerId::Selection));
        assert_eq!("poi-2".parse::<MarkerId>(), Ok(MarkerId::PointOfInterest(2)));
        assert!("poi-9".parse::<MarkerId>().is_err());
        assert!("marker".parse::<MarkerId>().is_err());
        assert_eq!(MarkerId::PointOfInterest(1).to_string(), "poi-1");
    }

    #[test]
    fn geojson_export_uses_lon_lat_order() {
        let view = MapView::from_selection(Some(&Place::new("Hisor", 38.5263, 68.5514)));
        let collection = view.to_geojson();
        assert_eq!(collection.features.len(), 5);

        let json = serde_json::to_value(&collection).unwrap();
        let selection = json["features"]
            .as_array()
            .unwrap()
            .iter()
            .find(|f| f["id"] == "selection")
            .unwrap();
        assert_eq!(
            selection["geometry"]["coordinates"],
            serde_json::json!([68.5514, 38.5263])
        );
        assert_eq!(selection["properties"]["name"], "Hisor");
        assert_eq!(selection["properties"]["kind"], "selection");
    }

    #[test]
    fn tile_layer_matches_osm() {
        assert_eq!(OSM_TILES.max_zoom, 19);
        assert!(OSM_TILES.url_template.contains("{z}/{x}/{y}"));
    }
}
