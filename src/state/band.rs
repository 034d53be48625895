// src/state/band.rs
//
// Brainwave band classification.

use serde::{Deserialize, Serialize};

/// One named frequency range. Matches beat frequencies strictly below `max_hz`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Band {
    pub max_hz: f64,
    pub label: String,
}

impl Band {
    pub fn new(max_hz: f64, label: impl Into<String>) -> Self {
        Self {
            max_hz,
            label: label.into(),
        }
    }
}

/// Ordered band table, evaluated top-down.
///
/// The first band whose `max_hz` exceeds the frequency wins. Frequencies
/// above every band fall into `fallback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandTable {
    bands: Vec<Band>,
    fallback: String,
}

impl Default for BandTable {
    fn default() -> Self {
        Self {
            bands: vec![
                Band::new(4.0, "Delta"),
                Band::new(8.0, "Theta"),
                Band::new(13.0, "Alpha"),
                Band::new(30.0, "Beta"),
            ],
            fallback: "Gamma".to_string(),
        }
    }
}

impl BandTable {
    pub fn new(bands: Vec<Band>, fallback: impl Into<String>) -> Self {
        Self {
            bands,
            fallback: fallback.into(),
        }
    }

    pub fn classify(&self, beat_hz: f64) -> &str {
        self.bands
            .iter()
            .find(|band| beat_hz < band.max_hz)
            .map(|band| band.label.as_str())
            .unwrap_or(&self.fallback)
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }
}
