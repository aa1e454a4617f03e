use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Full ship dataset for one version, keyed by ship id.
///
/// `IndexMap` keeps the generator's insertion order, which the search
/// results are required to preserve.
pub type ShipMap = IndexMap<String, ShipConfig>;

/// Full team dataset for one version, keyed by team id.
pub type TeamMap = IndexMap<String, TeamConfig>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipConfig {
    pub team: String,
    pub boat_info: ShipInfo,
    pub boat_spec: ShipSpec,
    pub boat_rating: ShipRating,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipInfo {
    pub source: String,
    pub name: String,
    #[serde(rename = "class")]
    pub class_: String,
    pub age: String,
    pub builder: String,
    pub designer: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipSpec {
    pub source: String,
    pub dimension: ShipDimension,
    pub sail_area: ShipSailArea,
    pub misc: ShipMisc,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipDimension {
    pub length_over_all: f64,
    pub draft: f64,
    pub beam: f64,
    // Spelling is part of the wire format.
    pub forestray_height: f64,
    pub wetted_surface_area: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipSailArea {
    pub main: f64,
    pub jib: f64,
    pub asymmetric_spinnaker: f64,
    pub symmetric_spinnaker: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipMisc {
    pub stability_index: f64,
    pub sailing_displacement: f64,
    pub measured_displacement: f64,
    pub max_crew_weight: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipRating {
    pub version: String,
    pub tcc: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamConfig {
    pub name: String,
    pub members: Vec<TeamMember>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub name: String,
    pub roles: Vec<String>,
}

/// Singleton per-version config describing the dataset build.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub engine_version: String,
    /// Unix seconds at which the dataset was generated.
    pub timestamp: i64,
}

impl Manifest {
    pub fn generated_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp, 0).single()
    }
}
