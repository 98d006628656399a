//! Chart hierarchy model: teeth and their surfaces.
//!
//! # Responsibility
//! - Validate FDI tooth codes and the closed surface enumeration.
//! - Define the persisted `Tooth`/`Surface` records.
//!
//! # Invariants
//! - A tooth is unique per `(patient, code)` and is never physically deleted.
//! - `is_absent` only ever transitions `false -> true`.
//! - A surface is unique per `(tooth, name)`.

use crate::model::validation::ValidationError;
use crate::model::PatientId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Quadrant digit followed by position digit.
static FDI_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([1-8])([1-8])$").expect("valid FDI regex"));

pub type ToothId = Uuid;
pub type SurfaceId = Uuid;

/// Validated FDI (ISO 3950) tooth code, e.g. `16` or `85`.
///
/// Quadrants 1-4 are permanent teeth with positions 1-8; quadrants 5-8 are
/// temporary teeth with positions 1-5.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToothCode(String);

impl ToothCode {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let trimmed = value.trim();
        let captures = FDI_CODE_RE
            .captures(trimmed)
            .ok_or_else(|| ValidationError::InvalidToothCode(value.to_string()))?;

        let quadrant: u8 = captures[1]
            .parse()
            .map_err(|_| ValidationError::InvalidToothCode(value.to_string()))?;
        let position: u8 = captures[2]
            .parse()
            .map_err(|_| ValidationError::InvalidToothCode(value.to_string()))?;

        if quadrant >= 5 && position > 5 {
            return Err(ValidationError::InvalidToothCode(value.to_string()));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn quadrant(&self) -> u8 {
        self.0.as_bytes()[0] - b'0'
    }

    pub fn position(&self) -> u8 {
        self.0.as_bytes()[1] - b'0'
    }

    /// Returns whether this code names a primary (deciduous) tooth.
    pub fn is_temporary(&self) -> bool {
        self.quadrant() >= 5
    }
}

impl Display for ToothCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ToothCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ToothCode> for String {
    fn from(value: ToothCode) -> Self {
        value.0
    }
}

/// Closed set of tooth surfaces that can anchor a diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SurfaceName {
    Oclusal,
    Mesial,
    Distal,
    Vestibular,
    Lingual,
    Palatino,
    RaizMesial,
    RaizDistal,
    RaizPalatal,
    RaizPrincipal,
    /// Whole-tooth findings not tied to one face.
    General,
}

impl SurfaceName {
    pub const ALL: [SurfaceName; 11] = [
        Self::Oclusal,
        Self::Mesial,
        Self::Distal,
        Self::Vestibular,
        Self::Lingual,
        Self::Palatino,
        Self::RaizMesial,
        Self::RaizDistal,
        Self::RaizPalatal,
        Self::RaizPrincipal,
        Self::General,
    ];

    /// Parses canonical names plus the `cara_` prefixed and compact root
    /// spellings still sent by older chart editors.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let normalized = value.trim().to_ascii_lowercase();
        let name = normalized.strip_prefix("cara_").unwrap_or(&normalized);
        match name {
            "oclusal" => Ok(Self::Oclusal),
            "mesial" => Ok(Self::Mesial),
            "distal" => Ok(Self::Distal),
            "vestibular" => Ok(Self::Vestibular),
            "lingual" => Ok(Self::Lingual),
            "palatino" => Ok(Self::Palatino),
            "raiz_mesial" | "raizmesial" => Ok(Self::RaizMesial),
            "raiz_distal" | "raizdistal" => Ok(Self::RaizDistal),
            "raiz_palatal" | "raizpalatal" => Ok(Self::RaizPalatal),
            "raiz_principal" | "raizprincipal" => Ok(Self::RaizPrincipal),
            "general" => Ok(Self::General),
            _ => Err(ValidationError::UnknownSurface(value.to_string())),
        }
    }

    /// Canonical storage and wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Oclusal => "oclusal",
            Self::Mesial => "mesial",
            Self::Distal => "distal",
            Self::Vestibular => "vestibular",
            Self::Lingual => "lingual",
            Self::Palatino => "palatino",
            Self::RaizMesial => "raiz_mesial",
            Self::RaizDistal => "raiz_distal",
            Self::RaizPalatal => "raiz_palatal",
            Self::RaizPrincipal => "raiz_principal",
            Self::General => "general",
        }
    }

    /// Human-readable label used in history descriptions.
    pub fn label(self) -> &'static str {
        match self {
            Self::Oclusal => "occlusal surface",
            Self::Mesial => "mesial surface",
            Self::Distal => "distal surface",
            Self::Vestibular => "vestibular surface",
            Self::Lingual => "lingual surface",
            Self::Palatino => "palatal surface",
            Self::RaizMesial => "mesial root",
            Self::RaizDistal => "distal root",
            Self::RaizPalatal => "palatal root",
            Self::RaizPrincipal => "main root",
            Self::General => "whole tooth",
        }
    }

}

impl Display for SurfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for SurfaceName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SurfaceName> for String {
    fn from(value: SurfaceName) -> Self {
        value.as_str().to_string()
    }
}

/// One tooth of one patient, created lazily on first reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tooth {
    pub id: ToothId,
    pub patient_id: PatientId,
    pub code: ToothCode,
    pub is_absent: bool,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}

/// One named surface of a tooth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub id: SurfaceId,
    pub tooth_id: ToothId,
    pub name: SurfaceName,
}
