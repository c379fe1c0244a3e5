//! FHIR JSON bundle to in-memory collaborators for the order translator.
//!
//! Reads `Observation` resources into an observation store and `ValueSet`
//! resources into concept sets. Nothing is written back as FHIR.

use chrono::{DateTime, Utc};
use order_core::{
    Concept, ConceptId, InMemoryConceptCatalog, InMemoryObservationStore, Observation,
    ObservationValue, OrderError, OrderId, OrderResult, SubjectId, TranslationConfig,
};
use serde_json::Value;
use tracing::debug;

/// Observations and concepts read from one bundle.
#[derive(Debug, Default)]
pub struct ClinicalRecord {
    pub observations: InMemoryObservationStore,
    pub catalog: InMemoryConceptCatalog,
}

/// Load a bundle from a JSON string.
pub fn load_bundle_str(bundle_json: &str, config: &TranslationConfig) -> OrderResult<ClinicalRecord> {
    let value: Value =
        serde_json::from_str(bundle_json).map_err(|err| OrderError::Parse(err.to_string()))?;
    load_bundle_value(&value, config)
}

/// Load a bundle from a `serde_json::Value`.
///
/// Concept names from `config` missing from the bundle are registered with
/// ids equal to their names, so lookups for data the patient never had
/// resolve to empty histories.
pub fn load_bundle_value(bundle: &Value, config: &TranslationConfig) -> OrderResult<ClinicalRecord> {
    let bundle_type = bundle
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or(OrderError::MissingData)?;

    if bundle_type != "Bundle" {
        return Err(OrderError::Parse(format!(
            "Expected resourceType Bundle, received {bundle_type}"
        )));
    }

    let entries = bundle
        .get("entry")
        .and_then(Value::as_array)
        .ok_or(OrderError::MissingData)?;

    let mut loader = BundleLoader::default();
    for entry in entries {
        let Some(resource) = entry.get("resource") else {
            continue;
        };

        match resource
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or_default()
        {
            "Observation" => loader.handle_observation(resource),
            "ValueSet" => loader.handle_value_set(resource),
            _ => {}
        }
    }

    loader.finalize(config)
}

#[derive(Default)]
struct BundleLoader {
    catalog: InMemoryConceptCatalog,
    observations: Vec<Observation>,
}

impl BundleLoader {
    fn handle_observation(&mut self, resource: &Value) {
        let id = resource_id(resource, "observation");

        let Some(subject) = resource
            .get("subject")
            .and_then(|subject| subject.get("reference"))
            .and_then(Value::as_str)
            .map(reference_id)
        else {
            debug!(%id, "observation without subject skipped");
            return;
        };

        let Some(concept) = resource.get("code").and_then(extract_concept) else {
            debug!(%id, "observation without code skipped");
            return;
        };

        let Some(recorded_at) = extract_observation_timestamp(resource) else {
            debug!(%id, "observation without timestamp skipped");
            return;
        };

        let Some(value) = self.observation_value(resource) else {
            debug!(%id, "observation without supported value skipped");
            return;
        };

        let order = resource
            .get("basedOn")
            .and_then(Value::as_array)
            .and_then(|refs| refs.first())
            .and_then(|reference| reference.get("reference"))
            .and_then(Value::as_str)
            .map(|reference| OrderId(reference_id(reference)));

        let concept = self.catalog.register(concept);
        self.observations.push(Observation {
            id,
            subject: SubjectId(subject),
            concept,
            recorded_at,
            value,
            order,
        });
    }

    fn handle_value_set(&mut self, resource: &Value) {
        let Some(name) = ["name", "title"]
            .iter()
            .filter_map(|field| resource.get(*field).and_then(Value::as_str))
            .map(str::trim)
            .find(|name| !name.is_empty())
        else {
            return;
        };

        let set_id = resource
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(name);
        let set = self.catalog.register(Concept::new(set_id, name));

        let included = resource
            .get("compose")
            .and_then(|compose| compose.get("include"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|include| include.get("concept").and_then(Value::as_array))
            .flatten();
        let expanded = resource
            .get("expansion")
            .and_then(|expansion| expansion.get("contains"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten();

        for member in included.chain(expanded).filter_map(extract_coding) {
            self.catalog.add_set_member(&set, member);
        }
    }

    fn observation_value(&mut self, resource: &Value) -> Option<ObservationValue> {
        if let Some(answer) = resource.get("valueCodeableConcept").and_then(extract_concept) {
            return Some(ObservationValue::Coded {
                concept: self.catalog.register(answer),
            });
        }

        if let Some(quantity) = resource.get("valueQuantity") {
            let value = quantity.get("value").and_then(Value::as_f64)?;
            let unit = ["unit", "code"]
                .iter()
                .find_map(|field| quantity.get(*field).and_then(Value::as_str))
                .map(str::to_string);
            return Some(ObservationValue::Numeric { value, unit });
        }

        if let Some(value) = resource.get("valueInteger").and_then(Value::as_f64) {
            return Some(ObservationValue::Numeric { value, unit: None });
        }

        if let Some(text) = resource.get("valueString").and_then(Value::as_str) {
            return Some(ObservationValue::Text {
                text: text.to_string(),
            });
        }

        if let Some(at) = resource
            .get("valueDateTime")
            .and_then(Value::as_str)
            .and_then(parse_datetime)
        {
            return Some(ObservationValue::DateTime { at });
        }

        resource
            .get("valueBoolean")
            .and_then(Value::as_bool)
            .map(|flag| ObservationValue::Boolean { flag })
    }

    fn finalize(mut self, config: &TranslationConfig) -> OrderResult<ClinicalRecord> {
        for name in config.concept_names() {
            self.catalog.ensure(name);
        }

        let identifier = self.catalog.ensure(&config.identifier_concept);
        let observations = InMemoryObservationStore::new().with_unique_concept(identifier.id);
        for observation in self.observations {
            observations.insert(observation)?;
        }

        Ok(ClinicalRecord {
            observations,
            catalog: self.catalog,
        })
    }
}

/// Concept named by the codeable text, identified by its first code.
fn extract_concept(value: &Value) -> Option<Concept> {
    let name = extract_codeable_text(value)?;
    let id = value
        .get("coding")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find_map(|coding| coding.get("code").and_then(Value::as_str))
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .unwrap_or(&name)
        .to_string();
    Some(Concept {
        id: ConceptId(id),
        name,
    })
}

fn extract_coding(coding: &Value) -> Option<Concept> {
    let code = coding.get("code").and_then(Value::as_str).map(str::trim);
    let display = coding.get("display").and_then(Value::as_str).map(str::trim);
    match (code, display) {
        (Some(code), Some(display)) if !display.is_empty() => Some(Concept::new(code, display)),
        (Some(code), _) if !code.is_empty() => Some(Concept::new(code, code)),
        (None, Some(display)) if !display.is_empty() => Some(Concept::new(display, display)),
        _ => None,
    }
}

fn extract_codeable_text(value: &Value) -> Option<String> {
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return Some(text.trim().to_string());
        }
    }

    if let Some(codings) = value.get("coding").and_then(Value::as_array) {
        for coding in codings {
            if let Some(display) = coding.get("display").and_then(Value::as_str) {
                if !display.trim().is_empty() {
                    return Some(display.trim().to_string());
                }
            }
            if let Some(code) = coding.get("code").and_then(Value::as_str) {
                if !code.trim().is_empty() {
                    return Some(code.trim().to_string());
                }
            }
        }
    }

    None
}

/// `Patient/p1` → `p1`.
fn reference_id(reference: &str) -> String {
    reference
        .rsplit('/')
        .next()
        .unwrap_or(reference)
        .to_string()
}

fn resource_id(resource: &Value, fallback: &str) -> String {
    resource
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{fallback}-unknown"))
}

fn extract_observation_timestamp(resource: &Value) -> Option<DateTime<Utc>> {
    extract_datetime(
        resource,
        &[
            "effectiveDateTime",
            "effectiveInstant",
            "effectivePeriod",
            "issued",
        ],
    )
}

fn extract_datetime(resource: &Value, fields: &[&str]) -> Option<DateTime<Utc>> {
    for field in fields {
        let Some(value) = resource.get(*field) else {
            continue;
        };

        if let Some(text) = value.as_str() {
            if let Some(dt) = parse_datetime(text) {
                return Some(dt);
            }
        }

        if let Some(obj) = value.as_object() {
            if let Some(start) = obj.get("start").and_then(Value::as_str) {
                if let Some(dt) = parse_datetime(start) {
                    return Some(dt);
                }
            }
        }
    }
    None
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
