//! Process data captured when a stage finishes its work.
//!
//! Roasting closes with a [`RoastingReport`] (equipment, weights, roast and
//! grain quality). Production closes with a [`ProductionReport`] (process
//! type, packaging and quality checks, output). Both travel on the
//! transition that completes the stage.

use serde::{Deserialize, Serialize};

use maquila_core::{DomainError, ValueObject};

use crate::order::Kilograms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoastingEquipment {
    #[serde(rename = "industrial_200kg")]
    Industrial200Kg,
    #[serde(rename = "industrial_500kg")]
    Industrial500Kg,
    #[serde(rename = "artisanal_50kg")]
    Artisanal50Kg,
    #[serde(rename = "experimental_10kg")]
    Experimental10Kg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoastLevel {
    Light,
    Medium,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrainQuality {
    Excellent,
    Good,
    Regular,
    Poor,
}

/// Ratio in hundredths of a percent (`9_250` is 92.50%).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(u64);

impl ValueObject for Percentage {}

impl Percentage {
    pub fn from_basis_points(basis_points: u64) -> Self {
        Self(basis_points)
    }

    /// `part / whole`, truncated to two decimals. `None` when `whole` is zero.
    pub fn ratio(part: Kilograms, whole: Kilograms) -> Option<Self> {
        if whole.is_zero() {
            return None;
        }
        let scaled = u128::from(part.hundredths()) * 10_000 / u128::from(whole.hundredths());
        Some(Self(u64::try_from(scaled).unwrap_or(u64::MAX)))
    }

    pub fn basis_points(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for Percentage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoastingReport {
    pub equipment: RoastingEquipment,
    pub roast_level: RoastLevel,
    pub received: Kilograms,
    pub processed: Kilograms,
    /// Weight left after hulling parchment coffee; only for CPS orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hulled: Option<Kilograms>,
    pub final_quality: GrainQuality,
    #[serde(default)]
    pub notes: String,
}

impl RoastingReport {
    /// Processed over received weight.
    pub fn yield_percent(&self) -> Option<Percentage> {
        Percentage::ratio(self.processed, self.received)
    }

    /// Weight lost to hulling, relative to the registered `quantity`.
    pub fn hulling_reduction(&self, quantity: Kilograms) -> Option<Percentage> {
        let hulled = self.hulled?;
        let lost = quantity.hundredths().saturating_sub(hulled.hundredths());
        Percentage::ratio(Kilograms::from_hundredths(lost), quantity)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.received.is_zero() {
            return Err(DomainError::validation("received weight must be positive"));
        }
        if self.processed.is_zero() {
            return Err(DomainError::validation("processed weight must be positive"));
        }
        if self.processed > self.received {
            return Err(DomainError::validation(format!(
                "processed weight {} exceeds received weight {}",
                self.processed, self.received
            )));
        }
        if self.hulled.is_some_and(|kg| kg.is_zero()) {
            return Err(DomainError::validation("hulled weight must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionType {
    Grinding,
    Packaging,
    Bulk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrindSize {
    Fine,
    Medium,
    Coarse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionReport {
    pub process_type: ProductionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grind: Option<GrindSize>,
    pub packaging_details: String,
    pub weight_check: bool,
    pub packaging_check: bool,
    pub labeling_check: bool,
    pub final_weight: Kilograms,
    pub units_produced: u32,
    #[serde(default)]
    pub notes: String,
}

impl ProductionReport {
    /// All three quality checks were signed off. Informational only.
    pub fn is_quality_complete(&self) -> bool {
        self.weight_check && self.packaging_check && self.labeling_check
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.process_type == ProductionType::Grinding && self.grind.is_none() {
            return Err(DomainError::validation("grind size is required for grinding"));
        }
        if self.packaging_details.trim().is_empty() {
            return Err(DomainError::validation("packaging_details is required"));
        }
        if self.final_weight.is_zero() {
            return Err(DomainError::validation("final weight must be positive"));
        }
        if self.units_produced == 0 {
            return Err(DomainError::validation("units_produced must be positive"));
        }
        Ok(())
    }
}

/// Process data attached to a stage-completing transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageReport {
    Roasting(RoastingReport),
    Production(ProductionReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roasting_report() -> RoastingReport {
        RoastingReport {
            equipment: RoastingEquipment::Industrial200Kg,
            roast_level: RoastLevel::Medium,
            received: Kilograms::from_whole(200),
            processed: Kilograms::from_whole(170),
            hulled: None,
            final_quality: GrainQuality::Good,
            notes: String::new(),
        }
    }

    fn production_report() -> ProductionReport {
        ProductionReport {
            process_type: ProductionType::Grinding,
            grind: Some(GrindSize::Medium),
            packaging_details: "340g valve bags".to_string(),
            weight_check: true,
            packaging_check: true,
            labeling_check: false,
            final_weight: Kilograms::from_whole(168),
            units_produced: 494,
            notes: String::new(),
        }
    }

    #[test]
    fn yield_is_processed_over_received() {
        let report = roasting_report();
        assert_eq!(report.yield_percent(), Some(Percentage::from_basis_points(8_500)));
        assert_eq!(report.yield_percent().unwrap().to_string(), "85.00%");
        assert_eq!(Percentage::ratio(Kilograms::from_whole(1), Kilograms::from_whole(3)).unwrap().to_string(), "33.33%");
        assert_eq!(Percentage::ratio(Kilograms::from_whole(1), Kilograms::from_hundredths(0)), None);
    }

    #[test]
    fn roasting_weights_are_checked() {
        assert!(roasting_report().validate().is_ok());

        let mut over = roasting_report();
        over.processed = Kilograms::from_whole(201);
        assert!(matches!(over.validate(), Err(DomainError::Validation(msg)) if msg.contains("exceeds")));

        let mut empty = roasting_report();
        empty.received = Kilograms::from_hundredths(0);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn grinding_needs_a_grind_size() {
        let mut report = production_report();
        assert!(report.validate().is_ok());
        assert!(!report.is_quality_complete());

        report.grind = None;
        assert!(matches!(report.validate(), Err(DomainError::Validation(msg)) if msg.contains("grind")));

        report.process_type = ProductionType::Bulk;
        assert!(report.validate().is_ok());
    }

    #[test]
    fn equipment_uses_stable_wire_names() {
        let json = serde_json::to_value(StageReport::Roasting(roasting_report())).unwrap();
        assert_eq!(json["kind"], "roasting");
        assert_eq!(json["equipment"], "industrial_200kg");
        assert!(json.get("hulled").is_none());
    }
}
