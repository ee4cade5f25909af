use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Loose field mapping as it arrives in a request body. Keys that are absent
/// are distinguished from keys that are present with a `null` value.
pub type IdentityFields = BTreeMap<String, Option<String>>;

const INVALID_CHARACTERS: [char; 6] = [',', '=', '$', '"', '\'', '\\'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatRule {
    NotUppercase,
    SurroundingWhitespace,
    InvalidCharacters,
    NullCharacter,
}

impl fmt::Display for FormatRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FormatRule::NotUppercase => "First character is not uppercase",
            FormatRule::SurroundingWhitespace => "Has leading or trailing whitespace",
            FormatRule::InvalidCharacters => "Contains invalid characters",
            FormatRule::NullCharacter => "Contains null character",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum X500Error {
    #[error("Malformed X500 name segment: '{0}'")]
    MalformedIdentity(String),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Missing: {0}")]
    MissingRequiredValue(&'static str),
    #[error("Wrong length: {field} (min: {min}, max: {max})")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
    },
    #[error("{rule}: {field}")]
    InvalidFormat {
        field: &'static str,
        rule: FormatRule,
    },
}

/// Plain field view of an X500 name. All six keys are always present; unset
/// optionals serialize as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct X500Fields {
    pub organisation: String,
    pub locality: String,
    pub country: String,
    pub state: Option<String>,
    pub organisational_unit: Option<String>,
    pub common_name: Option<String>,
}

/// A distinguished name identifying an owner, lender, conveyancer or
/// consenting party.
///
/// The canonical form is `O=..,L=..,C=..[,ST=..][,OU=..][,CN=..]`. Two names
/// are the same party exactly when their canonical strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct X500Name {
    pub organisation: String,
    pub locality: String,
    pub country: String,
    pub state: Option<String>,
    pub organisational_unit: Option<String>,
    pub common_name: Option<String>,
}

impl X500Name {
    pub fn new(
        organisation: impl Into<String>,
        locality: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            organisation: organisation.into(),
            locality: locality.into(),
            country: country.into(),
            state: None,
            organisational_unit: None,
            common_name: None,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = non_empty(Some(state.into()));
        self
    }

    pub fn with_organisational_unit(mut self, organisational_unit: impl Into<String>) -> Self {
        self.organisational_unit = non_empty(Some(organisational_unit.into()));
        self
    }

    pub fn with_common_name(mut self, common_name: impl Into<String>) -> Self {
        self.common_name = non_empty(Some(common_name.into()));
        self
    }

    /// Parse a serialized name. Segment order is irrelevant, unknown keys are
    /// ignored and leading spaces before a key are dropped. Values are kept
    /// verbatim and must pass [`X500Name::validate`].
    pub fn parse(text: &str) -> Result<Self, X500Error> {
        let mut items: BTreeMap<&str, &str> = BTreeMap::new();
        for segment in text.split(',') {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| X500Error::MalformedIdentity(segment.to_string()))?;
            items.insert(key.trim_start_matches(' '), value);
        }

        let name = Self {
            organisation: items.get("O").copied().unwrap_or_default().to_string(),
            locality: items.get("L").copied().unwrap_or_default().to_string(),
            country: items.get("C").copied().unwrap_or_default().to_string(),
            state: non_empty(items.get("ST").map(|v| v.to_string())),
            organisational_unit: non_empty(items.get("OU").map(|v| v.to_string())),
            common_name: non_empty(items.get("CN").map(|v| v.to_string())),
        };

        name.validate()?;
        Ok(name)
    }

    /// Build from an explicit field mapping. The three required keys must be
    /// present in the mapping at all (`MissingField`); a present but empty
    /// value is then reported by validation (`MissingRequiredValue`).
    pub fn from_fields(fields: &IdentityFields) -> Result<Self, X500Error> {
        let required = |key: &'static str| -> Result<String, X500Error> {
            fields
                .get(key)
                .map(|value| value.clone().unwrap_or_default())
                .ok_or(X500Error::MissingField(key))
        };
        let optional = |key: &str| non_empty(fields.get(key).cloned().flatten());

        let name = Self {
            organisation: required("organisation")?,
            locality: required("locality")?,
            country: required("country")?,
            state: optional("state"),
            organisational_unit: optional("organisational_unit"),
            common_name: optional("common_name"),
        };

        name.validate()?;
        Ok(name)
    }

    pub fn validate(&self) -> Result<(), X500Error> {
        if self.organisation.is_empty() {
            return Err(X500Error::MissingRequiredValue("organisation"));
        }
        if self.locality.is_empty() {
            return Err(X500Error::MissingRequiredValue("locality"));
        }
        if self.country.is_empty() {
            return Err(X500Error::MissingRequiredValue("country"));
        }

        check_length("organisation", &self.organisation, 2, 128)?;
        check_length("locality", &self.locality, 2, 64)?;
        check_length("country", &self.country, 2, 2)?;
        if let Some(state) = &self.state {
            check_length("state", state, 2, 64)?;
        }
        if let Some(unit) = &self.organisational_unit {
            check_length("organisational_unit", unit, 2, 64)?;
        }
        if let Some(common_name) = &self.common_name {
            check_length("common_name", common_name, 2, 64)?;
        }

        for (field, value) in self.present_fields() {
            check_format(field, value)?;
        }

        Ok(())
    }

    /// Validate and render the canonical string.
    pub fn serialize(&self) -> Result<String, X500Error> {
        self.validate()?;
        Ok(self.to_string())
    }

    pub fn to_fields(&self) -> X500Fields {
        X500Fields {
            organisation: self.organisation.clone(),
            locality: self.locality.clone(),
            country: self.country.clone(),
            state: self.state.clone(),
            organisational_unit: self.organisational_unit.clone(),
            common_name: self.common_name.clone(),
        }
    }

    fn present_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![
            ("organisation", self.organisation.as_str()),
            ("locality", self.locality.as_str()),
            ("country", self.country.as_str()),
        ];
        if let Some(state) = &self.state {
            fields.push(("state", state));
        }
        if let Some(unit) = &self.organisational_unit {
            fields.push(("organisational_unit", unit));
        }
        if let Some(common_name) = &self.common_name {
            fields.push(("common_name", common_name));
        }
        fields
    }
}

impl fmt::Display for X500Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments = [
            Some(("O", &self.organisation)),
            Some(("L", &self.locality)),
            Some(("C", &self.country)),
            self.state.as_ref().map(|v| ("ST", v)),
            self.organisational_unit.as_ref().map(|v| ("OU", v)),
            self.common_name.as_ref().map(|v| ("CN", v)),
        ];

        let joined = segments
            .into_iter()
            .flatten()
            .map(|(key, value)| format!("{}={}", key, value))
            .join(",");
        f.write_str(&joined)
    }
}

impl FromStr for X500Name {
    type Err = X500Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Resolve a party given either as a serialized string or as a field
/// mapping to its canonical string. The string form wins when both are set.
pub fn canonical_party(
    fields: Option<&IdentityFields>,
    serialized: Option<&str>,
    field_name: &'static str,
) -> Result<String, X500Error> {
    let name = match (serialized, fields) {
        (Some(text), _) => X500Name::parse(text)?,
        (None, Some(fields)) => X500Name::from_fields(fields)?,
        (None, None) => return Err(X500Error::MissingField(field_name)),
    };
    name.serialize()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn check_length(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), X500Error> {
    let length = value.chars().count();
    if length < min || length > max {
        return Err(X500Error::InvalidLength { field, min, max });
    }
    Ok(())
}

fn check_format(field: &'static str, value: &str) -> Result<(), X500Error> {
    let fail = |rule| Err(X500Error::InvalidFormat { field, rule });

    if !value.chars().next().is_some_and(char::is_uppercase) {
        return fail(FormatRule::NotUppercase);
    }
    if value.trim() != value {
        return fail(FormatRule::SurroundingWhitespace);
    }
    if value.contains(INVALID_CHARACTERS) {
        return fail(FormatRule::InvalidCharacters);
    }
    if value.contains('\0') {
        return fail(FormatRule::NullCharacter);
    }
    Ok(())
}
