//! Raw branch records as supplied by the snapshot loader.
//!
//! RULE: records are never mutated once loaded. Everything downstream
//! (keys, snapshots, change sets) is derived from them.

use crate::types::{InstitutionId, Year};
use serde::{Deserialize, Serialize};

/// One physical location, for one institution, in one reporting year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub institution_id:   InstitutionId,
    pub year:             Year,
    #[serde(default)]
    pub unique_branch_id: Option<String>,
    #[serde(default)]
    pub latitude:         Option<f64>,
    #[serde(default)]
    pub longitude:        Option<f64>,
    #[serde(default)]
    pub address:          Option<String>,
    #[serde(default)]
    pub city:             Option<String>,
    #[serde(default)]
    pub county:           Option<String>,
    #[serde(default)]
    pub state:            Option<String>,
    #[serde(default)]
    pub zip:              Option<String>,
    /// CBSA / metro area name, when the upstream source carries one.
    #[serde(default)]
    pub metro_area:       Option<String>,
    // Descriptive only. Never part of identity.
    #[serde(default)]
    pub deposit_amount:   Option<f64>,
    #[serde(default)]
    pub service_type:     Option<String>,
    #[serde(default)]
    pub branch_name:      Option<String>,
}

impl BranchRecord {
    pub fn new(institution_id: impl Into<InstitutionId>, year: Year) -> Self {
        Self {
            institution_id:   institution_id.into(),
            year,
            unique_branch_id: None,
            latitude:         None,
            longitude:        None,
            address:          None,
            city:             None,
            county:           None,
            state:            None,
            zip:              None,
            metro_area:       None,
            deposit_amount:   None,
            service_type:     None,
            branch_name:      None,
        }
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_address(mut self, address: &str, city: &str, state: &str, zip: &str) -> Self {
        self.address = Some(address.to_string());
        self.city = Some(city.to_string());
        self.state = Some(state.to_string());
        self.zip = Some(zip.to_string());
        self
    }

    pub fn with_county(mut self, county: &str) -> Self {
        self.county = Some(county.to_string());
        self
    }

    pub fn with_metro_area(mut self, metro_area: &str) -> Self {
        self.metro_area = Some(metro_area.to_string());
        self
    }

    pub fn with_name(mut self, branch_name: &str) -> Self {
        self.branch_name = Some(branch_name.to_string());
        self
    }

    pub fn with_branch_id(mut self, unique_branch_id: &str) -> Self {
        self.unique_branch_id = Some(unique_branch_id.to_string());
        self
    }

    pub fn with_service_type(mut self, service_type: &str) -> Self {
        self.service_type = Some(service_type.to_string());
        self
    }

    /// Human-readable handle for logs and error messages.
    pub fn label(&self) -> String {
        if let Some(id) = &self.unique_branch_id {
            return id.clone();
        }
        match (&self.branch_name, &self.address) {
            (Some(name), Some(addr)) => format!("{name} @ {addr}"),
            (Some(name), None) => name.clone(),
            (None, Some(addr)) => addr.clone(),
            (None, None) => "<unnamed branch>".to_string(),
        }
    }

    /// Stable ordering key used to make grouping independent of the
    /// loader's row order.
    pub(crate) fn sort_key(&self) -> (String, String, String, String) {
        (
            self.unique_branch_id.clone().unwrap_or_default(),
            self.service_type.clone().unwrap_or_default(),
            self.branch_name.clone().unwrap_or_default(),
            self.address.clone().unwrap_or_default(),
        )
    }
}
