use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static::lazy_static! {
    static ref DOORPLATE_RE: Regex = Regex::new(r"(\d+)号").unwrap();
}

/// Source table cells in column order, carried through to the export
pub type SourceRow = Vec<(String, String)>;

/// Geocoded point of interest from the reference catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiRecord {
    #[serde(rename = "poi_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub house_number: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "poi_type", default)]
    pub category: Option<String>,
    /// Space-joined token string, filled once when the catalog is loaded
    #[serde(default)]
    pub normalized: Option<String>,
}

impl PoiRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            province: String::new(),
            city: String::new(),
            district: String::new(),
            street: String::new(),
            house_number: String::new(),
            latitude,
            longitude,
            category: None,
            normalized: None,
        }
    }

    pub fn with_house_number(mut self, house_number: impl Into<String>) -> Self {
        self.house_number = house_number.into();
        self
    }

    /// Text fed to the normalizer: admin fields, name and house number concatenated
    ///
    /// The house number is left out when the street or name already ends a
    /// doorplate with it (`中关村大街1号` + `1`), so POI and address text
    /// normalize the same way.
    pub fn full_text(&self) -> String {
        let house = self.house_number.as_str();
        let house = if carries_doorplate(&self.street, house) || carries_doorplate(&self.name, house) {
            ""
        } else {
            house
        };

        [
            self.province.as_str(),
            self.city.as_str(),
            self.district.as_str(),
            self.street.as_str(),
            self.name.as_str(),
            house,
        ]
        .concat()
    }

    /// Normalized text, falling back to the display name before normalization
    pub fn normalized_text(&self) -> &str {
        self.normalized.as_deref().unwrap_or(&self.name)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.normalized_text().split_whitespace()
    }

    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Whether `text` has `<house>号` with exactly that number
fn carries_doorplate(text: &str, house: &str) -> bool {
    !house.is_empty() && DOORPLATE_RE.captures_iter(text).any(|caps| &caps[1] == house)
}

/// One input row to be matched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub order_id: String,
    pub raw_address: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub house_number: String,
    #[serde(default)]
    pub normalized: Option<String>,
    /// Every cell of the source row, for the export
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub original_row: SourceRow,
}

impl AddressRecord {
    pub fn new(order_id: impl Into<String>, raw_address: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            raw_address: raw_address.into(),
            ..Default::default()
        }
    }

    /// Resolve the row identifier, falling back to `ROW_<position>` (1-based)
    pub fn ensure_order_id(raw: Option<&str>, position: usize) -> String {
        match raw.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("ROW_{}", position),
        }
    }

    /// Text fed to the normalizer: caller-supplied admin fields then the raw text
    pub fn full_text(&self) -> String {
        [
            self.province.as_str(),
            self.city.as_str(),
            self.district.as_str(),
            self.street.as_str(),
            self.raw_address.as_str(),
        ]
        .concat()
    }
}

/// Output of the normalization collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAddress {
    pub text: String,
    pub tokens: Vec<String>,
    pub house_number: Option<String>,
}

impl NormalizedAddress {
    pub fn from_tokens(tokens: Vec<String>, house_number: Option<String>) -> Self {
        Self {
            text: tokens.join(" "),
            tokens,
            house_number,
        }
    }
}

/// Scoring weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub coverage: f64,
    pub edit_distance: f64,
    pub doorplate: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            coverage: 0.5,
            edit_distance: 0.3,
            doorplate: 0.2,
        }
    }
}
