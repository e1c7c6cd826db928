use dispense_types::{Reagent, Well};
use thiserror::Error;

/// Smallest volume the dispenser accepts
pub const DEFAULT_MIN_VOLUME: f64 = 0.1;

/// Checks a requested dispense before it is accepted into a plan
#[derive(Debug, Clone)]
pub struct PlanValidator {
    min_volume: f64,
}

impl Default for PlanValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_VOLUME)
    }
}

/// Well and reagent a request resolved to
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTarget {
    pub well: Well,
    pub reagent: Reagent,
    pub volume: f64,
}

impl PlanValidator {
    pub fn new(min_volume: f64) -> Self {
        Self { min_volume }
    }

    pub fn min_volume(&self) -> f64 {
        self.min_volume
    }

    /// Validate a request against the cached wells and reagents.
    ///
    /// Checks run in the order an operator fills the form: reagent, well,
    /// then volume.
    pub fn validate(
        &self,
        wells: &[Well],
        reagents: &[Reagent],
        well_position: &str,
        reagent_id: Option<i64>,
        volume: f64,
    ) -> Result<ValidatedTarget, ValidationError> {
        let reagent_id = reagent_id.ok_or(ValidationError::MissingReagent)?;
        let reagent = reagents
            .iter()
            .find(|r| r.id == Some(reagent_id))
            .cloned()
            .ok_or(ValidationError::UnknownReagent { reagent_id })?;

        let well = wells
            .iter()
            .find(|w| w.position == well_position)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownWell {
                position: well_position.to_string(),
            })?;

        self.validate_volume(&well, volume)?;

        Ok(ValidatedTarget {
            well,
            reagent,
            volume,
        })
    }

    /// Volume must be finite, at least the minimum, and fit the well's remaining capacity
    pub fn validate_volume(&self, well: &Well, volume: f64) -> Result<(), ValidationError> {
        if !volume.is_finite() {
            return Err(ValidationError::InvalidVolume { volume });
        }

        if volume < self.min_volume {
            return Err(ValidationError::VolumeTooSmall {
                volume,
                minimum: self.min_volume,
            });
        }

        let available = well.available_volume();
        if volume > available {
            return Err(ValidationError::ExceedsCapacity {
                position: well.position.clone(),
                volume,
                available,
            });
        }

        Ok(())
    }
}

/// Validation errors with detailed reasons
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("no reagent selected")]
    MissingReagent,

    #[error("unknown reagent {reagent_id}")]
    UnknownReagent { reagent_id: i64 },

    #[error("no well at position {position} on this plate")]
    UnknownWell { position: String },

    #[error("volume {volume} is not a number")]
    InvalidVolume { volume: f64 },

    #[error("volume {volume} below minimum {minimum}")]
    VolumeTooSmall { volume: f64, minimum: f64 },

    #[error("volume {volume} exceeds remaining capacity {available} of well {position}")]
    ExceedsCapacity {
        position: String,
        volume: f64,
        available: f64,
    },
}

impl ValidationError {
    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::MissingReagent => "missing_reagent",
            ValidationError::UnknownReagent { .. } => "unknown_reagent",
            ValidationError::UnknownWell { .. } => "unknown_well",
            ValidationError::InvalidVolume { .. } => "invalid_volume",
            ValidationError::VolumeTooSmall { .. } => "volume_too_small",
            ValidationError::ExceedsCapacity { .. } => "exceeds_capacity",
        }
    }
}
