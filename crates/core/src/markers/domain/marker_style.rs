use crate::detection::domain::detected_face::DetectedFace;

/// Border colour of a face marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerColor {
    /// Geometry only, no face information.
    White,
    /// Face known to the service but not matched to a person.
    Yellow,
    /// Face matched to a person.
    Red,
}

impl MarkerColor {
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            MarkerColor::White => [255, 255, 255],
            MarkerColor::Yellow => [255, 204, 0],
            MarkerColor::Red => [255, 59, 48],
        }
    }
}

/// Colour and label text a marker shows for a face.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerStyle {
    pub color: MarkerColor,
    pub label: Option<String>,
    /// `"NN%"` confidence, shown only for weak matches.
    pub secondary_label: Option<String>,
}

/// `face = None` means the caller had no face record at all.
pub fn style_for(face: Option<&DetectedFace>, secondary_label_threshold: f64) -> MarkerStyle {
    let Some(face) = face else {
        return MarkerStyle {
            color: MarkerColor::White,
            label: None,
            secondary_label: None,
        };
    };
    match &face.identity {
        None => MarkerStyle {
            color: MarkerColor::Yellow,
            label: None,
            secondary_label: None,
        },
        Some(identity) => MarkerStyle {
            color: MarkerColor::Red,
            label: Some(identity.label().to_string()),
            secondary_label: (identity.confidence < secondary_label_threshold)
                .then(|| format!("{}%", confidence_percent(identity.confidence))),
        },
    }
}

/// Whole percent shown for a match confidence. Fractions are cut off, so a
/// face never reads as more certain than the service said.
pub fn confidence_percent(confidence: f64) -> u32 {
    (confidence * 100.0).trunc().clamp(0.0, 100.0) as u32
}
