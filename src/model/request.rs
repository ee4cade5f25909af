use serde::{Deserialize, Serialize};

use crate::model::IdentityFields;

/// Body of `PUT /titles/{title_number}`, deserialized after the payload
/// has passed schema validation.
///
/// `restrictions` and `charges` describe the complete desired state of their
/// collection when present. When absent the collection is left as it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleRequest {
    pub owner: OwnerRequest,
    #[serde(default)]
    pub restrictions: Option<Vec<RestrictionRequest>>,
    #[serde(default)]
    pub charges: Option<Vec<ChargeRequest>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerRequest {
    pub identity: String,
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
    pub phone_number: String,
    #[serde(rename = "type")]
    pub owner_type: String,
    pub address: AddressRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRequest {
    pub house_name_number: String,
    pub street: String,
    pub town_city: String,
    pub county: String,
    pub country: String,
    pub postcode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestrictionRequest {
    /// The restriction code, e.g. `RX001`.
    pub restriction_id: String,
    pub restriction_type: String,
    pub restriction_text: String,
    pub date: String,
    #[serde(default)]
    pub consenting_party: Option<IdentityFields>,
    #[serde(default)]
    pub consenting_party_string: Option<String>,
    #[serde(default)]
    pub charge: Option<ChargeRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub date: String,
    #[serde(default)]
    pub lender: Option<IdentityFields>,
    #[serde(default)]
    pub lender_string: Option<String>,
    pub amount: f64,
    pub amount_currency_code: String,
}
