use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::path::Path;

use crate::error::ServiceError;

const BUNDLED_OPENAPI: &str = include_str!("../../schema/openapi.json");

/// Name of the request body schema for title updates.
pub const TITLE_REQUEST_SCHEMA: &str = "TitleRequest";

/// Validates request bodies against one named schema of an OpenAPI
/// document. References between component schemas are resolved against
/// the document itself.
pub struct RequestValidator {
    schema_name: String,
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for RequestValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestValidator")
            .field("schema_name", &self.schema_name)
            .finish_non_exhaustive()
    }
}

impl RequestValidator {
    pub fn from_openapi(document: &Value, schema_name: &str) -> Result<Self> {
        let components = document
            .get("components")
            .ok_or_else(|| anyhow!("OpenAPI document has no components section"))?;
        if components
            .get("schemas")
            .and_then(|schemas| schemas.get(schema_name))
            .is_none()
        {
            return Err(anyhow!("Schema '{}' not found in OpenAPI document", schema_name));
        }

        let root = json!({
            "$ref": format!("#/components/schemas/{}", schema_name),
            "components": components,
        });
        let validator = jsonschema::validator_for(&root)
            .map_err(|e| anyhow!("Invalid request schema '{}': {}", schema_name, e))?;

        Ok(Self {
            schema_name: schema_name.to_string(),
            validator,
        })
    }

    pub fn from_file(path: impl AsRef<Path>, schema_name: &str) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read OpenAPI document {}", path.display()))?;
        let document: Value = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse OpenAPI document {}", path.display()))?;
        Self::from_openapi(&document, schema_name)
    }

    /// Validator for title update bodies using the document shipped with
    /// the crate.
    pub fn bundled() -> Result<Self> {
        let document: Value =
            serde_json::from_str(BUNDLED_OPENAPI).context("Failed to parse bundled OpenAPI document")?;
        Self::from_openapi(&document, TITLE_REQUEST_SCHEMA)
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// Reports the first violation only.
    pub fn validate(&self, payload: &Value) -> Result<(), ServiceError> {
        match self.validator.iter_errors(payload).next() {
            None => Ok(()),
            Some(error) => {
                let path = error.instance_path.to_string();
                let message = if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{}: {}", path, error)
                };
                Err(ServiceError::ValidationFailed(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Value {
        json!({
            "identity": "1",
            "first_name": "Lisa",
            "last_name": "White",
            "email_address": "lisa.seller@example.com",
            "phone_number": "07123456780",
            "type": "individual",
            "address": {
                "house_name_number": "1",
                "street": "Digital Street",
                "town_city": "Bristol",
                "county": "Avon",
                "country": "England",
                "postcode": "BS2 8EN"
            }
        })
    }

    #[test]
    fn test_bundled_schema_accepts_owner_only() {
        let validator = RequestValidator::bundled().unwrap();
        assert_eq!(validator.schema_name(), TITLE_REQUEST_SCHEMA);
        assert!(validator.validate(&json!({ "owner": owner() })).is_ok());
    }

    #[test]
    fn test_missing_owner_is_rejected() {
        let validator = RequestValidator::bundled().unwrap();
        let err = validator.validate(&json!({ "restrictions": [] })).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationFailed(ref m) if m.contains("owner")));
    }

    #[test]
    fn test_nested_reference_is_checked() {
        let validator = RequestValidator::bundled().unwrap();
        let mut body = json!({ "owner": owner() });
        body["owner"]["address"]
            .as_object_mut()
            .unwrap()
            .remove("postcode");
        assert!(validator.validate(&body).is_err());
    }

    #[test]
    fn test_charge_needs_a_lender() {
        let validator = RequestValidator::bundled().unwrap();
        let body = json!({
            "owner": owner(),
            "charges": [{ "date": "2019-01-01", "amount": 100.0, "amount_currency_code": "GBP" }]
        });
        assert!(validator.validate(&body).is_err());
    }

    #[test]
    fn test_unknown_schema_name() {
        let document: Value = serde_json::from_str(BUNDLED_OPENAPI).unwrap();
        assert!(RequestValidator::from_openapi(&document, "Nope").is_err());
    }
}
