//! Core logic for lab order translation: composite identifier encoding,
//! supporting-info aggregation and order status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod facility;
mod order_number;
mod regimen;
mod repository;
mod status;
mod supporting;
mod timeline;
mod translate;

pub use facility::{encode, FacilityShape, FacilityTag};
pub use order_number::{compose, LabOrderIdentifier, IDENTIFIER_WIDTH};
pub use regimen::{deduplicate, label_regimens, CURRENT_REGIMEN};
pub use repository::{
    ConceptCatalog, InMemoryConceptCatalog, InMemoryObservationStore, ObservationRepository,
};
pub use status::{Lineage, OrderFacts, OrderStatus};
pub use supporting::{SupportingInfo, SupportingInfoAssembler, SupportingInfoEntry, TestCategory};
pub use timeline::{chronological, first, last, Position};
pub use translate::{OrderTranslation, OrderTranslator, Specimen, UNKNOWN_SPECIMEN_TYPE};

/// Concept names looked up while translating an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    /// Concept under which composite identifiers are persisted as text facts.
    pub identifier_concept: String,
    pub art_regimen_concept: String,
    pub art_start_concept: String,
    pub pregnancy_status_concept: String,
    pub breastfeeding_status_concept: String,
    pub cd4_concept: String,
    pub vl_monitoring_type_concept: String,
    pub vl_result_concept: String,
    /// Numeric viral load, consulted when the coded result is above threshold.
    pub vl_data_concept: String,
    /// Display of the coded VL result that defers to the numeric value.
    pub vl_high_result_display: String,
    pub tb_genexpert_concept: String,
    pub specimen_collection_concept: String,
    /// Concept set whose members are specimen types, each a set of tests.
    pub specimen_set_concept: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            identifier_concept: "eRegister Lab Order Number".to_string(),
            art_regimen_concept: "HIVTC, ART Regimen".to_string(),
            art_start_concept: "HIVTC, ART start date".to_string(),
            pregnancy_status_concept: "HIVTC, VL Pregnancy Status".to_string(),
            breastfeeding_status_concept: "HIVTC, VL Breastfeeding Status".to_string(),
            cd4_concept: "HIVTC, CD4".to_string(),
            vl_monitoring_type_concept: "HIVTC, Viral Load Monitoring Type".to_string(),
            vl_result_concept: "HIVTC, Viral Load Result".to_string(),
            vl_data_concept: "HIVTC, Viral Load".to_string(),
            vl_high_result_display: "Greater or equals to 20".to_string(),
            tb_genexpert_concept: "TB, Genexpert test type".to_string(),
            specimen_collection_concept: "Specimen collection date & time".to_string(),
            specimen_set_concept: "Lab Samples".to_string(),
        }
    }
}

impl TranslationConfig {
    /// Every concept name the translator may look up.
    pub fn concept_names(&self) -> Vec<&str> {
        vec![
            self.identifier_concept.as_str(),
            self.art_regimen_concept.as_str(),
            self.art_start_concept.as_str(),
            self.pregnancy_status_concept.as_str(),
            self.breastfeeding_status_concept.as_str(),
            self.cd4_concept.as_str(),
            self.vl_monitoring_type_concept.as_str(),
            self.vl_result_concept.as_str(),
            self.vl_data_concept.as_str(),
            self.tb_genexpert_concept.as_str(),
            self.specimen_collection_concept.as_str(),
            self.specimen_set_concept.as_str(),
        ]
    }
}

/// Patient the observations are about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coded clinical term (lab test, regimen, answer...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    pub name: String,
}

impl Concept {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ConceptId(id.into()),
            name: name.into(),
        }
    }
}

/// Value carried by an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObservationValue {
    Coded { concept: Concept },
    Text { text: String },
    Numeric { value: f64, unit: Option<String> },
    DateTime { at: DateTime<Utc> },
    Boolean { flag: bool },
}

impl ObservationValue {
    pub fn coded(&self) -> Option<&Concept> {
        match self {
            Self::Coded { concept } => Some(concept),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime { at } => Some(*at),
            _ => None,
        }
    }
}

/// Timestamped clinical fact linking a subject, a concept and a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub subject: SubjectId,
    pub concept: Concept,
    pub recorded_at: DateTime<Utc>,
    pub value: ObservationValue,
    /// Order the fact was recorded for, if any.
    #[serde(default)]
    pub order: Option<OrderId>,
}

/// Observation not yet stored; the repository assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewObservation {
    pub subject: SubjectId,
    pub concept: Concept,
    pub recorded_at: DateTime<Utc>,
    pub value: ObservationValue,
    pub order: Option<OrderId>,
}

impl NewObservation {
    pub fn into_observation(self, id: impl Into<String>) -> Observation {
        Observation {
            id: id.into(),
            subject: self.subject,
            concept: self.concept,
            recorded_at: self.recorded_at,
            value: self.value,
            order: self.order,
        }
    }
}

/// Action that produced an order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    #[default]
    New,
    Revise,
    Discontinue,
    Renew,
}

/// A laboratory test order as handed over by the order entry system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabOrder {
    pub id: OrderId,
    /// Human readable number, e.g. `ORD-1234`.
    pub order_number: String,
    pub patient: SubjectId,
    /// Ordered test.
    pub concept: Concept,
    /// Code of the facility owning the ordering location, e.g. `C1022`.
    pub facility_code: String,
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub date_activated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_stopped: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_expire_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub action: OrderAction,
    #[serde(default)]
    pub previous_order: Option<OrderId>,
}

/// Errors raised while translating an order.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("facility code {0:?} contains no digits")]
    InvalidFacilityCode(String),
    #[error("order number {0:?} contains no digits")]
    InvalidOrderNumber(String),
    #[error("concept not found: {0}")]
    ConceptNotFound(String),
    #[error("identifier for order {order} was persisted concurrently")]
    IdentifierPersistenceConflict { order: String },
    #[error("observation repository failure: {0}")]
    Repository(String),
    #[error("could not read input: {0}")]
    Parse(String),
    #[error("input is missing required data")]
    MissingData,
}

pub type OrderResult<T> = Result<T, OrderError>;

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;

    pub fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    pub fn coded(id: &str, subject: &str, concept: &Concept, seconds: i64, answer: &str) -> Observation {
        Observation {
            id: id.to_string(),
            subject: SubjectId(subject.to_string()),
            concept: concept.clone(),
            recorded_at: at(seconds),
            value: ObservationValue::Coded {
                concept: Concept::new(answer, answer),
            },
            order: None,
        }
    }

    pub fn text(id: &str, subject: &str, concept: &Concept, seconds: i64, text: &str) -> Observation {
        Observation {
            id: id.to_string(),
            subject: SubjectId(subject.to_string()),
            concept: concept.clone(),
            recorded_at: at(seconds),
            value: ObservationValue::Text {
                text: text.to_string(),
            },
            order: None,
        }
    }
}
