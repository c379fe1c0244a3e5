//! Facility code to four letter tag.
//!
//! The tag is a deterministic, non reversible digest of the facility code
//! short enough to prefix a fixed-width lab order identifier. Three code
//! shapes are recognised, tried in order:
//!
//! * one uppercase letter and four digits (`C1022`): the letter is kept and
//!   followed by the base-26 triplet of the zero based number. Distinct for
//!   up to 17,576 codes per letter.
//! * one uppercase letter and five digits (`C10223`): marker `Y` followed by
//!   the triplet. Digits above the triplet range are discarded, so codes that
//!   differ only there share a tag.
//! * anything else (`POST-10`): every digit is kept, marker `Z` followed by
//!   the triplet.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::order_number::reduce_digits;
use crate::{OrderError, OrderResult};

const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const TRIPLET_SPACE: u64 = 26 * 26 * 26;
const FIVE_DIGIT_MARKER: char = 'Y';
const FALLBACK_MARKER: char = 'Z';

/// Shape class of a facility code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilityShape {
    LetterFourDigits,
    LetterFiveDigits,
    Other,
}

impl FacilityShape {
    pub fn classify(facility_code: &str) -> Self {
        let Some((lead, rest)) = facility_code.as_bytes().split_first() else {
            return Self::Other;
        };
        if !lead.is_ascii_uppercase() || !rest.iter().all(u8::is_ascii_digit) {
            return Self::Other;
        }
        match rest.len() {
            4 => Self::LetterFourDigits,
            5 => Self::LetterFiveDigits,
            _ => Self::Other,
        }
    }
}

/// Four uppercase letters derived from a facility code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityTag(String);

impl FacilityTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FacilityTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FacilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode a facility code into its tag.
pub fn encode(facility_code: &str) -> OrderResult<FacilityTag> {
    let residue = reduce_digits(facility_code, TRIPLET_SPACE)
        .ok_or_else(|| OrderError::InvalidFacilityCode(facility_code.to_string()))?;
    // Codes are numbered from 1; a literal zero wraps to the last triplet.
    let index = (residue + TRIPLET_SPACE - 1) % TRIPLET_SPACE;

    let prefix = match FacilityShape::classify(facility_code) {
        FacilityShape::LetterFourDigits => facility_code
            .chars()
            .next()
            .ok_or_else(|| OrderError::InvalidFacilityCode(facility_code.to_string()))?,
        FacilityShape::LetterFiveDigits => FIVE_DIGIT_MARKER,
        FacilityShape::Other => FALLBACK_MARKER,
    };

    let mut tag = String::with_capacity(4);
    tag.push(prefix);
    tag.extend(triplet(index));
    Ok(FacilityTag(tag))
}

fn triplet(index: u64) -> [char; 3] {
    let letter = |n: u64| char::from(ALPHABET[(n % 26) as usize]);
    [letter(index / 26 / 26), letter(index / 26), letter(index)]
}
