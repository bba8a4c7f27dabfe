//! Info types: the named categories of sensitive data a detector reports.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Label prefix for caller-supplied dictionary detectors.
pub const CUSTOM_DICTIONARY_PREFIX: &str = "CUSTOM_DICTIONARY_";

/// Label prefix for caller-supplied regex detectors.
pub const CUSTOM_REGEX_PREFIX: &str = "CUSTOM_REGEX_";

/// Name of a detector, e.g. `EMAIL_ADDRESS` or `CUSTOM_REGEX_0`.
///
/// Names are `UPPER_SNAKE`: ASCII uppercase letters, digits and underscores,
/// starting with a letter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InfoType(String);

impl InfoType {
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_start = chars.next().is_some_and(|c| c.is_ascii_uppercase());
        let valid_rest = chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
        if !(valid_start && valid_rest) {
            return Err(DomainError::invalid_info_type(name));
        }
        Ok(Self(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Label assigned to the dictionary at `index` in submission order.
    pub fn custom_dictionary(index: usize) -> Self {
        Self(format!("{CUSTOM_DICTIONARY_PREFIX}{index}"))
    }

    /// Label assigned to the regex at `index` in submission order.
    pub fn custom_regex(index: usize) -> Self {
        Self(format!("{CUSTOM_REGEX_PREFIX}{index}"))
    }

    pub fn is_custom(&self) -> bool {
        self.0.starts_with(CUSTOM_DICTIONARY_PREFIX) || self.0.starts_with(CUSTOM_REGEX_PREFIX)
    }

    /// Parse a list of names, failing on the first malformed one.
    pub fn parse_all<I, S>(names: I) -> DomainResult<Vec<Self>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().map(Self::new).collect()
    }
}

impl core::fmt::Display for InfoType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InfoType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InfoType> for String {
    fn from(value: InfoType) -> Self {
        value.0
    }
}

/// How confident the detector is that a match is real.
///
/// Ordered from least to most likely so `min_likelihood` filters can compare.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Likelihood {
    VeryUnlikely,
    #[default]
    Unlikely,
    Possible,
    Likely,
    VeryLikely,
}

impl Likelihood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Likelihood::VeryUnlikely => "VERY_UNLIKELY",
            Likelihood::Unlikely => "UNLIKELY",
            Likelihood::Possible => "POSSIBLE",
            Likelihood::Likely => "LIKELY",
            Likelihood::VeryLikely => "VERY_LIKELY",
        }
    }
}

impl core::fmt::Display for Likelihood {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A literal term list matched verbatim by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDictionary {
    words: Vec<String>,
}

impl CustomDictionary {
    pub fn new<I, S>(words: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words
            .into_iter()
            .map(Into::into)
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return Err(DomainError::validation("custom dictionary has no words"));
        }
        Ok(Self { words })
    }

    /// Build from a comma-separated list (`"Gary Smith,gary@example.com"`).
    pub fn from_csv(list: &str) -> DomainResult<Self> {
        Self::new(list.split(','))
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}

/// Detector definition for a caller-supplied info type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomDetector {
    Dictionary(CustomDictionary),
    Regex { pattern: String },
}

/// A caller-supplied detector together with its synthetic label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomInfoType {
    pub info_type: InfoType,
    pub detector: CustomDetector,
    pub likelihood: Likelihood,
}

/// Assign synthetic labels to custom detectors.
///
/// Dictionaries become `CUSTOM_DICTIONARY_<i>` and regexes `CUSTOM_REGEX_<i>`,
/// counted separately from 0 in the order the caller supplied them. Dictionaries
/// are listed before regexes in the returned vector.
pub fn custom_info_types(
    dictionaries: &[CustomDictionary],
    regexes: &[String],
) -> Vec<CustomInfoType> {
    let mut out = Vec::with_capacity(dictionaries.len() + regexes.len());

    let mut index = 0usize;
    for dictionary in dictionaries {
        out.push(CustomInfoType {
            info_type: InfoType::custom_dictionary(index),
            detector: CustomDetector::Dictionary(dictionary.clone()),
            likelihood: Likelihood::VeryLikely,
        });
        index += 1;
    }

    index = 0;
    for pattern in regexes {
        out.push(CustomInfoType {
            info_type: InfoType::custom_regex(index),
            detector: CustomDetector::Regex {
                pattern: pattern.clone(),
            },
            likelihood: Likelihood::VeryLikely,
        });
        index += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn info_type_names_must_be_upper_snake() {
        assert!(InfoType::new("EMAIL_ADDRESS").is_ok());
        assert!(InfoType::new("US_SOCIAL_SECURITY_NUMBER").is_ok());
        assert!(InfoType::new("email").is_err());
        assert!(InfoType::new("_EMAIL").is_err());
        assert!(InfoType::new("").is_err());
    }

    #[test]
    fn custom_labels_count_dictionaries_and_regexes_separately() {
        let dictionaries = vec![CustomDictionary::from_csv("Gary Smith").unwrap()];
        let regexes = vec![r"\w+@\w+.com".to_string(), r"\d{3}".to_string()];

        let labeled = custom_info_types(&dictionaries, &regexes);
        let names: Vec<&str> = labeled.iter().map(|c| c.info_type.name()).collect();

        assert_eq!(names, ["CUSTOM_DICTIONARY_0", "CUSTOM_REGEX_0", "CUSTOM_REGEX_1"]);
        assert!(labeled.iter().all(|c| c.info_type.is_custom()));
    }

    #[test]
    fn dictionary_from_csv_trims_and_drops_blanks() {
        let dict = CustomDictionary::from_csv(" a , ,b").unwrap();
        assert_eq!(dict.words(), ["a", "b"]);
        assert!(CustomDictionary::from_csv(" , ").is_err());
    }

    #[test]
    fn likelihood_orders_from_least_to_most_likely() {
        assert!(Likelihood::VeryUnlikely < Likelihood::Unlikely);
        assert!(Likelihood::Possible < Likelihood::Likely);
        assert!(Likelihood::Likely < Likelihood::VeryLikely);
        assert_eq!(Likelihood::default(), Likelihood::Unlikely);
    }

    #[test]
    fn info_type_deserialization_validates() {
        let ok: Result<InfoType, _> = serde_json::from_str("\"PHONE_NUMBER\"");
        assert!(ok.is_ok());
        let bad: Result<InfoType, _> = serde_json::from_str("\"phone\"");
        assert!(bad.is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// The N-th dictionary and the N-th regex are labeled with index N-1,
        /// whatever their contents.
        #[test]
        fn labels_follow_submission_order(
            dict_words in prop::collection::vec("[a-z]{1,8}", 0..12),
            patterns in prop::collection::vec("[a-z0-9]{1,6}", 0..12),
        ) {
            let dictionaries: Vec<CustomDictionary> = dict_words
                .iter()
                .map(|w| CustomDictionary::new([w.as_str()]).unwrap())
                .collect();

            let labeled = custom_info_types(&dictionaries, &patterns);
            prop_assert_eq!(labeled.len(), dictionaries.len() + patterns.len());

            for (n, dictionary) in dictionaries.iter().enumerate() {
                let entry = &labeled[n];
                prop_assert_eq!(entry.info_type.name(), format!("CUSTOM_DICTIONARY_{n}"));
                prop_assert_eq!(&entry.detector, &CustomDetector::Dictionary(dictionary.clone()));
            }
            for (n, pattern) in patterns.iter().enumerate() {
                let entry = &labeled[dictionaries.len() + n];
                prop_assert_eq!(entry.info_type.name(), format!("CUSTOM_REGEX_{n}"));
                prop_assert_eq!(
                    &entry.detector,
                    &CustomDetector::Regex { pattern: pattern.clone() }
                );
            }
        }
    }
}
