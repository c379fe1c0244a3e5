//! Regimen history reduced to distinct regimens, labelled for display.

use std::collections::HashSet;

use crate::Observation;

pub const CURRENT_REGIMEN: &str = "Current Regimen";

/// Keep each coded value the first time it appears.
///
/// `chronological` must already be ordered by timestamp; the output keeps
/// that order. Observations without a coded value share one key.
pub fn deduplicate<'a, I>(chronological: I) -> Vec<&'a Observation>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut seen = HashSet::new();
    chronological
        .into_iter()
        .filter(|&obs| seen.insert(obs.value.coded().map(|concept| &concept.id)))
        .collect()
}

/// Label a deduplicated history: the newest is the current regimen, older
/// ones are numbered backwards from 1.
pub fn label_regimens<'a>(deduplicated: &[&'a Observation]) -> Vec<(String, &'a Observation)> {
    deduplicated
        .iter()
        .rev()
        .enumerate()
        .map(|(age, obs)| {
            let label = match age {
                0 => CURRENT_REGIMEN.to_string(),
                n => format!("Previous Regimen {n}"),
            };
            (label, *obs)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{coded, text};
    use crate::timeline::chronological;
    use crate::Concept;

    fn regimen() -> Concept {
        Concept::new("regimen", "HIVTC, ART Regimen")
    }

    #[test]
    fn keeps_first_occurrence_of_each_regimen() {
        let history = vec![
            coded("1", "p1", &regimen(), 1, "A"),
            coded("2", "p1", &regimen(), 2, "B"),
            coded("3", "p1", &regimen(), 3, "A"),
            coded("4", "p1", &regimen(), 4, "C"),
        ];
        let distinct = deduplicate(chronological(&history));
        let ids: Vec<&str> = distinct.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "4"]);

        let labelled: Vec<(String, &str)> = label_regimens(&distinct)
            .into_iter()
            .map(|(label, obs)| (label, obs.value.coded().unwrap().name.as_str()))
            .collect();
        assert_eq!(
            labelled,
            [
                ("Current Regimen".to_string(), "C"),
                ("Previous Regimen 1".to_string(), "B"),
                ("Previous Regimen 2".to_string(), "A"),
            ]
        );
    }

    #[test]
    fn unordered_input_is_sorted_before_deduplication() {
        let history = vec![
            coded("late", "p1", &regimen(), 9, "A"),
            coded("early", "p1", &regimen(), 1, "A"),
        ];
        let distinct = deduplicate(chronological(&history));
        assert_eq!(distinct.len(), 1);
        assert_eq!(distinct[0].id, "early");
    }

    #[test]
    fn uncoded_values_collapse_together() {
        let history = vec![
            text("1", "p1", &regimen(), 1, "free text"),
            text("2", "p1", &regimen(), 2, "other text"),
            coded("3", "p1", &regimen(), 3, "A"),
        ];
        assert_eq!(deduplicate(chronological(&history)).len(), 2);
    }

    #[test]
    fn empty_history_has_no_labels() {
        let distinct = deduplicate(Vec::<&Observation>::new());
        assert!(distinct.is_empty());
        assert!(label_regimens(&distinct).is_empty());
    }
}
