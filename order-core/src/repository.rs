//! Collaborator contracts and their in-memory implementations.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{Concept, ConceptId, NewObservation, Observation, OrderError, OrderResult, SubjectId};

/// Store of patient observations.
pub trait ObservationRepository {
    /// Every observation of `concept` about `subject`, in no particular order.
    fn find_by_concept_and_subject(
        &self,
        concept: &ConceptId,
        subject: &SubjectId,
    ) -> OrderResult<Vec<Observation>>;

    /// Store a new observation. Stores that enforce uniqueness of identifier
    /// facts report a lost race as [`OrderError::IdentifierPersistenceConflict`].
    fn persist(&self, observation: NewObservation) -> OrderResult<Observation>;
}

/// Dictionary of clinical concepts.
pub trait ConceptCatalog {
    /// Fails with [`OrderError::ConceptNotFound`] for unknown names.
    fn find_by_name(&self, name: &str) -> OrderResult<Concept>;

    /// Members of a concept set; empty for concepts that are not sets.
    fn set_members(&self, set: &ConceptId) -> OrderResult<Vec<Concept>>;
}

/// Thread-safe observation store kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryObservationStore {
    observations: RwLock<Vec<Observation>>,
    unique_concepts: HashSet<ConceptId>,
}

impl InMemoryObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow at most one fact per subject and order for `concept`.
    pub fn with_unique_concept(mut self, concept: ConceptId) -> Self {
        self.unique_concepts.insert(concept);
        self
    }

    /// Add an already identified observation, e.g. loaded from an export.
    pub fn insert(&self, observation: Observation) -> OrderResult<()> {
        self.write()?.push(observation);
        Ok(())
    }

    pub fn len(&self) -> OrderResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> OrderResult<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> OrderResult<RwLockReadGuard<'_, Vec<Observation>>> {
        self.observations
            .read()
            .map_err(|_| OrderError::Repository("observation store lock poisoned".to_string()))
    }

    fn write(&self) -> OrderResult<RwLockWriteGuard<'_, Vec<Observation>>> {
        self.observations
            .write()
            .map_err(|_| OrderError::Repository("observation store lock poisoned".to_string()))
    }
}

impl ObservationRepository for InMemoryObservationStore {
    fn find_by_concept_and_subject(
        &self,
        concept: &ConceptId,
        subject: &SubjectId,
    ) -> OrderResult<Vec<Observation>> {
        Ok(self
            .read()?
            .iter()
            .filter(|obs| &obs.concept.id == concept && &obs.subject == subject)
            .cloned()
            .collect())
    }

    fn persist(&self, observation: NewObservation) -> OrderResult<Observation> {
        let mut observations = self.write()?;

        if self.unique_concepts.contains(&observation.concept.id) {
            let taken = observations.iter().any(|existing| {
                existing.concept.id == observation.concept.id
                    && existing.subject == observation.subject
                    && existing.order == observation.order
            });
            if taken {
                return Err(OrderError::IdentifierPersistenceConflict {
                    order: observation
                        .order
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                });
            }
        }

        let stored = observation.into_observation(format!("obs-{}", observations.len() + 1));
        observations.push(stored.clone());
        Ok(stored)
    }
}

/// Concept dictionary kept in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryConceptCatalog {
    concepts: HashMap<ConceptId, Concept>,
    names: HashMap<String, ConceptId>,
    sets: HashMap<ConceptId, Vec<ConceptId>>,
}

impl InMemoryConceptCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concept. The first concept registered under a name keeps it.
    pub fn register(&mut self, concept: Concept) -> Concept {
        if let Some(id) = self.names.get(&concept.name) {
            if let Some(known) = self.concepts.get(id) {
                return known.clone();
            }
        }
        self.names.insert(concept.name.clone(), concept.id.clone());
        self.concepts
            .entry(concept.id.clone())
            .or_insert_with(|| concept.clone());
        concept
    }

    /// Register `name` with an id derived from the name, unless known.
    pub fn ensure(&mut self, name: &str) -> Concept {
        self.register(Concept::new(name, name))
    }

    pub fn add_set_member(&mut self, set: &Concept, member: Concept) {
        let set = self.register(set.clone());
        let member = self.register(member);
        let members = self.sets.entry(set.id).or_default();
        if !members.contains(&member.id) {
            members.push(member.id);
        }
    }
}

impl ConceptCatalog for InMemoryConceptCatalog {
    fn find_by_name(&self, name: &str) -> OrderResult<Concept> {
        self.names
            .get(name)
            .and_then(|id| self.concepts.get(id))
            .cloned()
            .ok_or_else(|| OrderError::ConceptNotFound(name.to_string()))
    }

    fn set_members(&self, set: &ConceptId) -> OrderResult<Vec<Concept>> {
        Ok(self
            .sets
            .get(set)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| self.concepts.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}
