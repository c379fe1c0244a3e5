//! Labelled supporting facts attached to a lab order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::regimen::{deduplicate, label_regimens, CURRENT_REGIMEN};
use crate::timeline::{chronological, first, last, Position};
use crate::{
    ConceptCatalog, Observation, ObservationRepository, OrderResult, SubjectId, TranslationConfig,
};

/// Test families with their own supporting-info recipe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    ViralLoad,
    TbGeneXpert,
    Unclassified,
}

impl TestCategory {
    /// Classify by the ordered test's concept name.
    pub fn classify(concept_name: &str) -> Self {
        if concept_name.contains("Viral") {
            Self::ViralLoad
        } else if concept_name.contains("TB") && concept_name.contains("Gene") {
            Self::TbGeneXpert
        } else {
            Self::Unclassified
        }
    }
}

/// One labelled slot. `observation` is `None` when the patient has no data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportingInfoEntry {
    pub label: String,
    pub observation: Option<Observation>,
}

/// Entries in display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupportingInfo {
    entries: Vec<SupportingInfoEntry>,
}

impl SupportingInfo {
    fn push(&mut self, label: impl Into<String>, observation: Option<Observation>) {
        self.entries.push(SupportingInfoEntry {
            label: label.into(),
            observation,
        });
    }

    pub fn entries(&self) -> &[SupportingInfoEntry] {
        &self.entries
    }

    pub fn get(&self, label: &str) -> Option<&SupportingInfoEntry> {
        self.entries.iter().find(|entry| entry.label == label)
    }

    /// Only the slots that hold an observation.
    pub fn present(&self) -> impl Iterator<Item = (&str, &Observation)> {
        self.entries.iter().filter_map(|entry| {
            entry
                .observation
                .as_ref()
                .map(|obs| (entry.label.as_str(), obs))
        })
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.label.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds supporting info from a patient's observation history.
pub struct SupportingInfoAssembler<'a, R, C> {
    repository: &'a R,
    catalog: &'a C,
    config: &'a TranslationConfig,
}

impl<'a, R, C> SupportingInfoAssembler<'a, R, C>
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

    /// Assemble the entries for `category`. Unclassified tests get none.
    pub fn assemble(&self, category: TestCategory, subject: &SubjectId) -> OrderResult<SupportingInfo> {
        debug!(?category, %subject, "assembling supporting info");
        match category {
            TestCategory::ViralLoad => self.viral_load(subject),
            TestCategory::TbGeneXpert => self.tb_gene_xpert(subject),
            TestCategory::Unclassified => Ok(SupportingInfo::default()),
        }
    }

    fn viral_load(&self, subject: &SubjectId) -> OrderResult<SupportingInfo> {
        let cfg = self.config;
        let mut info = SupportingInfo::default();

        let regimens = self.history(&cfg.art_regimen_concept, subject)?;
        let distinct = deduplicate(chronological(&regimens));
        if distinct.is_empty() {
            info.push(CURRENT_REGIMEN, None);
        }
        for (label, obs) in label_regimens(&distinct) {
            info.push(label, Some(obs.clone()));
        }

        info.push("Prev VL Results", self.previous_viral_load(subject)?);
        info.push(
            "Pregnancy status",
            self.select(&cfg.pregnancy_status_concept, subject, Position::Last)?,
        );
        info.push(
            "Breastfeeding status",
            self.select(&cfg.breastfeeding_status_concept, subject, Position::Last)?,
        );
        info.push(
            "Current Regimen startdate",
            self.select(&cfg.art_start_concept, subject, Position::First)?,
        );

        let cd4 = self.history(&cfg.cd4_concept, subject)?;
        info.push("First CD4", first(&cd4).cloned());
        info.push("Last CD4", last(&cd4).cloned());
        info.push(
            "VL Reason",
            self.select(&cfg.vl_monitoring_type_concept, subject, Position::Last)?,
        );

        Ok(info)
    }

    fn tb_gene_xpert(&self, subject: &SubjectId) -> OrderResult<SupportingInfo> {
        let mut info = SupportingInfo::default();
        let concept = &self.config.tb_genexpert_concept;
        info.push(concept.as_str(), self.select(concept, subject, Position::Last)?);
        Ok(info)
    }

    /// Latest coded VL result, or the latest numeric load when the coded
    /// result only says it is above the detection threshold.
    fn previous_viral_load(&self, subject: &SubjectId) -> OrderResult<Option<Observation>> {
        let cfg = self.config;
        let Some(result) = self.select(&cfg.vl_result_concept, subject, Position::Last)? else {
            return Ok(None);
        };

        let above_threshold = result
            .value
            .coded()
            .is_some_and(|answer| answer.name == cfg.vl_high_result_display);
        if above_threshold {
            self.select(&cfg.vl_data_concept, subject, Position::Last)
        } else {
            Ok(Some(result))
        }
    }

    pub(crate) fn select(
        &self,
        concept_name: &str,
        subject: &SubjectId,
        position: Position,
    ) -> OrderResult<Option<Observation>> {
        let history = self.history(concept_name, subject)?;
        Ok(position.select(&history).cloned())
    }

    fn history(&self, concept_name: &str, subject: &SubjectId) -> OrderResult<Vec<Observation>> {
        let concept = self.catalog.find_by_name(concept_name)?;
        self.repository.find_by_concept_and_subject(&concept.id, subject)
    }
}
