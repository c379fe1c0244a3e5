//! Per-order translation: identifier, status, lineage, specimen and
//! supporting info.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::supporting::{SupportingInfo, SupportingInfoAssembler, TestCategory};
use crate::timeline::{last, Position};
use crate::{
    compose, encode, Concept, ConceptCatalog, LabOrder, LabOrderIdentifier, Lineage,
    NewObservation, Observation, ObservationRepository, ObservationValue, OrderError, OrderFacts,
    OrderId, OrderResult, OrderStatus, TranslationConfig,
};

pub const UNKNOWN_SPECIMEN_TYPE: &str = "Cannot determine specimen type";

/// Sample to collect for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specimen {
    pub specimen_type: String,
    pub collected_at: Option<DateTime<Utc>>,
}

/// Everything computed for one order.
///
/// Specimen and supporting info carry their own result so a missing concept
/// there leaves the identifier and status intact. A failed section serializes
/// as `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderTranslation {
    pub order: OrderId,
    pub category: TestCategory,
    pub identifier: LabOrderIdentifier,
    pub status: OrderStatus,
    pub lineage: Lineage,
    #[serde(serialize_with = "section")]
    pub specimen: OrderResult<Specimen>,
    #[serde(serialize_with = "section")]
    pub supporting_info: OrderResult<SupportingInfo>,
}

fn section<T, S>(result: &OrderResult<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    #[derive(Serialize)]
    struct Failed {
        error: String,
    }

    match result {
        Ok(value) => value.serialize(serializer),
        Err(err) => Failed {
            error: err.to_string(),
        }
        .serialize(serializer),
    }
}

/// Translates lab orders against borrowed collaborators.
pub struct OrderTranslator<'a, R, C> {
    repository: &'a R,
    catalog: &'a C,
    config: &'a TranslationConfig,
}

impl<'a, R, C> OrderTranslator<'a, R, C>
where
    R: ObservationRepository,
    C: ConceptCatalog,
{
    pub fn new(repository: &'a R, catalog: &'a C, config: &'a TranslationConfig) -> Self {
        Self {
            repository,
            catalog,
            config,
        }
    }

    /// Translate one order as seen at `now`.
    pub fn translate(&self, order: &LabOrder, now: DateTime<Utc>) -> OrderResult<OrderTranslation> {
        let identifier = self.assign_identifier(order)?;
        let category = TestCategory::classify(&order.concept.name);

        let specimen = self.specimen(order);
        if let Err(err) = &specimen {
            warn!(order = %order.id, error = %err, "specimen could not be determined");
        }

        let supporting_info = self.assembler().assemble(category, &order.patient);
        if let Err(err) = &supporting_info {
            warn!(order = %order.id, ?category, error = %err, "supporting info aborted");
        }

        Ok(OrderTranslation {
            order: order.id.clone(),
            category,
            identifier,
            status: OrderFacts::at(order, now).resolve(),
            lineage: Lineage::of(order),
            specimen,
            supporting_info,
        })
    }

    /// Translate every order; a failing order does not affect the others.
    pub fn translate_batch(
        &self,
        orders: &[LabOrder],
        now: DateTime<Utc>,
    ) -> Vec<OrderResult<OrderTranslation>> {
        orders
            .iter()
            .map(|order| {
                self.translate(order, now).inspect_err(|err| {
                    warn!(order = %order.id, error = %err, "order translation failed");
                })
            })
            .collect()
    }

    /// Return the identifier persisted for `order`, creating and persisting
    /// it on first use.
    ///
    /// A patient fact with no order link that already holds the generated
    /// value counts as persisted. When another writer persists first, the
    /// stored value is adopted.
    pub fn assign_identifier(&self, order: &LabOrder) -> OrderResult<LabOrderIdentifier> {
        let concept = self.catalog.find_by_name(&self.config.identifier_concept)?;
        let stored = self
            .repository
            .find_by_concept_and_subject(&concept.id, &order.patient)?;
        if let Some(existing) = linked_identifier(&stored, order) {
            debug!(order = %order.id, identifier = %existing, "reusing lab order identifier");
            return Ok(existing);
        }

        let tag = encode(&order.facility_code)?;
        let identifier = compose(tag.as_str(), &order.order_number)?;

        let unlinked_match = stored
            .iter()
            .any(|obs| obs.order.is_none() && obs.value.as_text() == Some(identifier.as_str()));
        if unlinked_match {
            debug!(
                order = %order.id,
                identifier = %identifier,
                "identifier already stored for patient, not persisting"
            );
            return Ok(identifier);
        }

        let fact = NewObservation {
            subject: order.patient.clone(),
            concept: concept.clone(),
            recorded_at: order.date_created,
            value: ObservationValue::Text {
                text: identifier.to_string(),
            },
            order: Some(order.id.clone()),
        };

        match self.repository.persist(fact) {
            Ok(_) => {
                info!(order = %order.id, identifier = %identifier, "persisted lab order identifier");
                Ok(identifier)
            }
            Err(conflict @ OrderError::IdentifierPersistenceConflict { .. }) => {
                let stored = self
                    .repository
                    .find_by_concept_and_subject(&concept.id, &order.patient)?;
                let adopted = linked_identifier(&stored, order).ok_or(conflict)?;
                warn!(
                    order = %order.id,
                    generated = %identifier,
                    adopted = %adopted,
                    "identifier persisted concurrently, adopting stored value"
                );
                Ok(adopted)
            }
            Err(err) => Err(err),
        }
    }

    /// Specimen type from the lab samples concept set, collection time from
    /// the latest collection observation.
    pub fn specimen(&self, order: &LabOrder) -> OrderResult<Specimen> {
        let samples = self.catalog.find_by_name(&self.config.specimen_set_concept)?;

        let mut specimen_type = None;
        for sample in self.catalog.set_members(&samples.id)? {
            if self.contains(&sample, &order.concept)? {
                specimen_type = Some(sample.name);
                break;
            }
        }

        let collected_at = self
            .assembler()
            .select(
                &self.config.specimen_collection_concept,
                &order.patient,
                Position::Last,
            )?
            .and_then(|obs| obs.value.as_datetime());

        Ok(Specimen {
            specimen_type: specimen_type.unwrap_or_else(|| UNKNOWN_SPECIMEN_TYPE.to_string()),
            collected_at,
        })
    }

    fn contains(&self, set: &Concept, member: &Concept) -> OrderResult<bool> {
        Ok(self
            .catalog
            .set_members(&set.id)?
            .iter()
            .any(|candidate| candidate.id == member.id))
    }

    fn assembler(&self) -> SupportingInfoAssembler<'a, R, C> {
        SupportingInfoAssembler::new(self.repository, self.catalog, self.config)
    }
}

/// Latest identifier stored against this very order.
fn linked_identifier(stored: &[Observation], order: &LabOrder) -> Option<LabOrderIdentifier> {
    let linked: Vec<Observation> = stored
        .iter()
        .filter(|obs| obs.order.as_ref() == Some(&order.id))
        .cloned()
        .collect();
    last(&linked)
        .and_then(|obs| obs.value.as_text())
        .map(LabOrderIdentifier::from_stored)
}
