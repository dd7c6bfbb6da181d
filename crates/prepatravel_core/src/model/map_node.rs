//! Map node domain model.
//!
//! # Responsibility
//! - Define the canonical record for one annotated geographic point.
//! - Define create/patch input shapes used by repository write paths.
//! - Enforce coordinate and timestamp invariants at construction and decode.
//!
//! # Invariants
//! - `id` is assigned by storage and never reused after deletion.
//! - `lat` is finite and within `[-90, 90]`; `lng` is finite and within
//!   `[-180, 180]`.
//! - `created_at <= updated_at`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage-assigned identifier of a map node.
pub type MapNodeId = i64;

/// Coordinate field name used in validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateField {
    Lat,
    Lng,
}

impl CoordinateField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lat => "lat",
            Self::Lng => "lng",
        }
    }
}

/// Validation failures for map node writes and decoded rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapNodeValidationError {
    NonFiniteCoordinate { field: CoordinateField },
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
    InvalidTimestamps { created_at: i64, updated_at: i64 },
}

impl Display for MapNodeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFiniteCoordinate { field } => {
                write!(f, "{} must be a finite number", field.as_str())
            }
            Self::LatitudeOutOfRange(value) => {
                write!(f, "lat ({value}) must be within [-90, 90]")
            }
            Self::LongitudeOutOfRange(value) => {
                write!(f, "lng ({value}) must be within [-180, 180]")
            }
            Self::InvalidTimestamps {
                created_at,
                updated_at,
            } => write!(
                f,
                "updated_at ({updated_at}) must be >= created_at ({created_at})"
            ),
        }
    }
}

impl Error for MapNodeValidationError {}

/// Persisted map node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MapNodeWire")]
pub struct MapNode {
    pub id: MapNodeId,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub description: String,
    /// Unix epoch milliseconds. Immutable after insert.
    pub created_at: i64,
    /// Unix epoch milliseconds. Refreshed by every update.
    pub updated_at: i64,
}

impl MapNode {
    /// Checks coordinate and timestamp invariants.
    pub fn validate(&self) -> Result<(), MapNodeValidationError> {
        validate_coordinates(self.lat, self.lng)?;
        if self.created_at > self.updated_at {
            return Err(MapNodeValidationError::InvalidTimestamps {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        Ok(())
    }

    /// Returns the writable fields of this record as a create input.
    pub fn to_new(&self) -> NewMapNode {
        NewMapNode {
            name: self.name.clone(),
            lat: self.lat,
            lng: self.lng,
            description: self.description.clone(),
        }
    }

    /// Merges `Some` fields of `patch` into this record.
    ///
    /// Does not touch timestamps; the repository owns `updated_at`.
    pub fn apply_patch(&mut self, patch: &MapNodePatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(lat) = patch.lat {
            self.lat = lat;
        }
        if let Some(lng) = patch.lng {
            self.lng = lng;
        }
        if let Some(description) = &patch.description {
            self.description.clone_from(description);
        }
    }
}

/// Create input: a map node without storage-assigned fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMapNode {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub description: String,
}

impl NewMapNode {
    pub fn new(
        name: impl Into<String>,
        lat: f64,
        lng: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            lat,
            lng,
            description: description.into(),
        }
    }

    pub fn validate(&self) -> Result<(), MapNodeValidationError> {
        validate_coordinates(self.lat, self.lng)
    }
}

/// Partial update input. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapNodePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl MapNodePatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn position(mut self, lat: f64, lng: f64) -> Self {
        self.lat = Some(lat);
        self.lng = Some(lng);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.lat.is_none() && self.lng.is_none() && self.description.is_none()
    }
}

fn validate_coordinates(lat: f64, lng: f64) -> Result<(), MapNodeValidationError> {
    if !lat.is_finite() {
        return Err(MapNodeValidationError::NonFiniteCoordinate {
            field: CoordinateField::Lat,
        });
    }
    if !lng.is_finite() {
        return Err(MapNodeValidationError::NonFiniteCoordinate {
            field: CoordinateField::Lng,
        });
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(MapNodeValidationError::LatitudeOutOfRange(lat));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(MapNodeValidationError::LongitudeOutOfRange(lng));
    }
    Ok(())
}

#[derive(Deserialize)]
struct MapNodeWire {
    id: MapNodeId,
    name: String,
    lat: f64,
    lng: f64,
    description: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<MapNodeWire> for MapNode {
    type Error = MapNodeValidationError;

    fn try_from(wire: MapNodeWire) -> Result<Self, Self::Error> {
        let node = Self {
            id: wire.id,
            name: wire.name,
            lat: wire.lat,
            lng: wire.lng,
            description: wire.description,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
        };
        node.validate()?;
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::{MapNode, MapNodePatch, MapNodeValidationError, NewMapNode};

    fn sample() -> MapNode {
        MapNode {
            id: 1,
            name: "Eiffel Tower".to_string(),
            lat: 48.8584,
            lng: 2.2945,
            description: "Landmark".to_string(),
            created_at: 1_000,
            updated_at: 1_000,
        }
    }

    #[test]
    fn apply_patch_only_touches_present_fields() {
        let mut node = sample();
        node.apply_patch(&MapNodePatch::default().description("Famous landmark"));

        assert_eq!(node.description, "Famous landmark");
        assert_eq!(node.name, "Eiffel Tower");
        assert_eq!(node.lat, 48.8584);
        assert_eq!(node.updated_at, 1_000);
    }

    #[test]
    fn boundary_coordinates_are_accepted() {
        NewMapNode::new("north pole", 90.0, 180.0, "").validate().unwrap();
        NewMapNode::new("south pole", -90.0, -180.0, "").validate().unwrap();
    }

    #[test]
    fn nan_latitude_is_rejected_before_range_check() {
        let err = NewMapNode::new("x", f64::NAN, 0.0, "").validate().unwrap_err();
        assert!(matches!(
            err,
            MapNodeValidationError::NonFiniteCoordinate { .. }
        ));
    }

    #[test]
    fn empty_patch_reports_empty() {
        assert!(MapNodePatch::default().is_empty());
        assert!(!MapNodePatch::default().name("x").is_empty());
    }
}
