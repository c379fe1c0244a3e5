//! First/last selection over an observation history.
//!
//! Ties on the timestamp resolve by arrival order: `first` keeps the earliest
//! received, `last` the latest received.

use crate::Observation;

/// Which end of the timeline to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    First,
    Last,
}

impl Position {
    pub fn select(self, observations: &[Observation]) -> Option<&Observation> {
        match self {
            Self::First => first(observations),
            Self::Last => last(observations),
        }
    }
}

/// Oldest observation, `None` for an empty history.
pub fn first(observations: &[Observation]) -> Option<&Observation> {
    observations.iter().min_by_key(|obs| obs.recorded_at)
}

/// Most recent observation, `None` for an empty history.
pub fn last(observations: &[Observation]) -> Option<&Observation> {
    observations.iter().max_by_key(|obs| obs.recorded_at)
}

/// New sequence ordered by timestamp ascending; the input is left untouched.
pub fn chronological(observations: &[Observation]) -> Vec<&Observation> {
    let mut ordered: Vec<&Observation> = observations.iter().collect();
    ordered.sort_by_key(|obs| obs.recorded_at);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::text;
    use crate::Concept;

    fn cd4() -> Concept {
        Concept::new("cd4", "HIVTC, CD4")
    }

    #[test]
    fn selects_by_timestamp_not_arrival() {
        let history = vec![
            text("a", "p1", &cd4(), 10, "ten"),
            text("b", "p1", &cd4(), 5, "five"),
            text("c", "p1", &cd4(), 20, "twenty"),
        ];
        assert_eq!(first(&history).map(|o| o.id.as_str()), Some("b"));
        assert_eq!(last(&history).map(|o| o.id.as_str()), Some("c"));
        assert_eq!(Position::Last.select(&history).map(|o| o.id.as_str()), Some("c"));
    }

    #[test]
    fn empty_history_is_absent() {
        assert!(first(&[]).is_none());
        assert!(last(&[]).is_none());
        assert!(chronological(&[]).is_empty());
    }

    #[test]
    fn ties_resolve_by_arrival_order() {
        let history = vec![
            text("a", "p1", &cd4(), 7, "x"),
            text("b", "p1", &cd4(), 7, "y"),
            text("c", "p1", &cd4(), 7, "z"),
        ];
        for _ in 0..3 {
            assert_eq!(first(&history).map(|o| o.id.as_str()), Some("a"));
            assert_eq!(last(&history).map(|o| o.id.as_str()), Some("c"));
        }
    }

    #[test]
    fn chronological_is_stable_and_does_not_mutate() {
        let history = vec![
            text("a", "p1", &cd4(), 3, "x"),
            text("b", "p1", &cd4(), 1, "y"),
            text("c", "p1", &cd4(), 3, "z"),
        ];
        let ids: Vec<&str> = chronological(&history).iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "c"]);
        assert_eq!(history[0].id, "a");
    }
}
