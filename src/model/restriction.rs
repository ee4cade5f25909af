use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::timestamp::{iso_format, parse_timestamp};
use crate::model::{canonical_party, ChargeRequest, RestrictionRequest, X500Error, X500Fields, X500Name};

/// Charge row. `charge_lender` holds the canonical X500 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub charge_id: i64,
    pub charge_date: NaiveDateTime,
    pub charge_lender: String,
    pub charge_amount: f64,
    pub charge_currency_type: String,
    pub title_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCharge {
    pub charge_date: NaiveDateTime,
    pub charge_lender: String,
    pub charge_amount: f64,
    pub charge_currency_type: String,
    pub title_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeView {
    pub date: String,
    pub lender: X500Fields,
    pub lender_string: String,
    pub amount: f64,
    pub amount_currency_code: String,
}

fn charge_view(
    date: &NaiveDateTime,
    lender: &str,
    amount: f64,
    currency: &str,
) -> Result<ChargeView, X500Error> {
    let lender = X500Name::parse(lender)?;
    Ok(ChargeView {
        date: iso_format(date),
        lender: lender.to_fields(),
        lender_string: lender.serialize()?,
        amount,
        amount_currency_code: currency.to_string(),
    })
}

impl Charge {
    pub fn view(&self) -> Result<ChargeView, X500Error> {
        charge_view(
            &self.charge_date,
            &self.charge_lender,
            self.charge_amount,
            &self.charge_currency_type,
        )
    }
}

impl NewCharge {
    pub fn new(
        charge_date: NaiveDateTime,
        lender: &X500Name,
        charge_amount: f64,
        currency: &str,
        title_number: &str,
    ) -> Self {
        Self {
            charge_date,
            charge_lender: lender.to_string(),
            charge_amount,
            charge_currency_type: currency.to_uppercase(),
            title_number: title_number.to_string(),
        }
    }

    pub fn from_request(request: &ChargeRequest, title_number: &str) -> Result<Self, ServiceError> {
        let charge_date = parse_timestamp(&request.date).map_err(ServiceError::ValidationFailed)?;
        let charge_lender = canonical_party(
            request.lender.as_ref(),
            request.lender_string.as_deref(),
            "lender",
        )?;

        Ok(Self {
            charge_date,
            charge_lender,
            charge_amount: request.amount,
            charge_currency_type: request.amount_currency_code.to_uppercase(),
            title_number: title_number.to_string(),
        })
    }

    pub fn view(&self) -> Result<ChargeView, X500Error> {
        charge_view(
            &self.charge_date,
            &self.charge_lender,
            self.charge_amount,
            &self.charge_currency_type,
        )
    }

    pub fn with_id(self, charge_id: i64) -> Charge {
        Charge {
            charge_id,
            charge_date: self.charge_date,
            charge_lender: self.charge_lender,
            charge_amount: self.charge_amount,
            charge_currency_type: self.charge_currency_type,
            title_number: self.title_number,
        }
    }
}

/// Restriction row. Code and type are stored upper-cased and the consenting
/// party as a canonical X500 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restriction {
    pub restriction_id: i64,
    pub restriction_code: String,
    pub restriction_type: String,
    pub restriction_text: String,
    pub consenting_party: String,
    pub restriction_date: NaiveDateTime,
    pub title_number: String,
    pub charge_id: Option<i64>,
}

/// Restriction with the charge it owns, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictionRecord {
    pub restriction: Restriction,
    pub charge: Option<Charge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRestriction {
    pub restriction_code: String,
    pub restriction_type: String,
    pub restriction_text: String,
    pub consenting_party: String,
    pub restriction_date: NaiveDateTime,
    pub title_number: String,
    /// Inserted before the restriction so the restriction can reference it.
    pub charge: Option<NewCharge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestrictionView {
    pub restriction_id: String,
    pub restriction_type: String,
    pub restriction_text: String,
    pub consenting_party: X500Fields,
    pub consenting_party_string: String,
    pub date: String,
    pub charge: Option<ChargeView>,
}

fn restriction_view(
    code: &str,
    restriction_type: &str,
    text: &str,
    consenting_party: &str,
    date: &NaiveDateTime,
    charge: Option<ChargeView>,
) -> Result<RestrictionView, X500Error> {
    let party = X500Name::parse(consenting_party)?;
    Ok(RestrictionView {
        restriction_id: code.to_string(),
        restriction_type: restriction_type.to_string(),
        restriction_text: text.to_string(),
        consenting_party: party.to_fields(),
        consenting_party_string: party.serialize()?,
        date: iso_format(date),
        charge,
    })
}

impl RestrictionRecord {
    pub fn view(&self) -> Result<RestrictionView, X500Error> {
        let r = &self.restriction;
        restriction_view(
            &r.restriction_code,
            &r.restriction_type,
            &r.restriction_text,
            &r.consenting_party,
            &r.restriction_date,
            self.charge.as_ref().map(Charge::view).transpose()?,
        )
    }

    pub fn consenting_party(&self) -> Result<X500Fields, X500Error> {
        Ok(X500Name::parse(&self.restriction.consenting_party)?.to_fields())
    }
}

impl NewRestriction {
    pub fn from_request(request: &RestrictionRequest, title_number: &str) -> Result<Self, ServiceError> {
        let restriction_date = parse_timestamp(&request.date).map_err(ServiceError::ValidationFailed)?;
        let consenting_party = canonical_party(
            request.consenting_party.as_ref(),
            request.consenting_party_string.as_deref(),
            "consenting_party",
        )?;
        let charge = request
            .charge
            .as_ref()
            .map(|charge| NewCharge::from_request(charge, title_number))
            .transpose()?;

        Ok(Self {
            restriction_code: request.restriction_id.to_uppercase(),
            restriction_type: request.restriction_type.to_uppercase(),
            restriction_text: request.restriction_text.clone(),
            consenting_party,
            restriction_date,
            title_number: title_number.to_string(),
            charge,
        })
    }

    pub fn view(&self) -> Result<RestrictionView, X500Error> {
        restriction_view(
            &self.restriction_code,
            &self.restriction_type,
            &self.restriction_text,
            &self.consenting_party,
            &self.restriction_date,
            self.charge.as_ref().map(NewCharge::view).transpose()?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charge_request() -> ChargeRequest {
        ChargeRequest {
            date: "2019-01-02T00:00:00".to_string(),
            lender: None,
            lender_string: Some("O=Bank, L=London, C=GB".to_string()),
            amount: 150000.0,
            amount_currency_code: "gbp".to_string(),
        }
    }

    #[test]
    fn test_new_charge_normalises_fields() {
        let charge = NewCharge::from_request(&charge_request(), "RTV237250").unwrap();
        assert_eq!(charge.charge_currency_type, "GBP");
        assert_eq!(charge.charge_lender, "O=Bank,L=London,C=GB");

        let view = charge.view().unwrap();
        assert_eq!(view.date, "2019-01-02T00:00:00");
        assert_eq!(view.lender.organisation, "Bank");
        assert_eq!(view.lender_string, "O=Bank,L=London,C=GB");
    }

    #[test]
    fn test_new_restriction_uppercases_codes() {
        let request = RestrictionRequest {
            restriction_id: "rx001".to_string(),
            restriction_type: "cbcr".to_string(),
            restriction_text: "No disposition without consent".to_string(),
            date: "2019-01-02".to_string(),
            consenting_party: Some(
                [
                    ("organisation".to_string(), Some("Bank".to_string())),
                    ("locality".to_string(), Some("London".to_string())),
                    ("country".to_string(), Some("GB".to_string())),
                ]
                .into_iter()
                .collect(),
            ),
            consenting_party_string: None,
            charge: Some(charge_request()),
        };

        let restriction = NewRestriction::from_request(&request, "RTV237250").unwrap();
        assert_eq!(restriction.restriction_code, "RX001");
        assert_eq!(restriction.restriction_type, "CBCR");
        assert_eq!(restriction.consenting_party, "O=Bank,L=London,C=GB");

        let view = restriction.view().unwrap();
        assert_eq!(view.restriction_id, "RX001");
        assert!(view.charge.is_some());
    }

    #[test]
    fn test_invalid_lender_is_rejected() {
        let mut request = charge_request();
        request.lender_string = Some("O=bank,L=London,C=GB".to_string());
        let err = NewCharge::from_request(&request, "RTV237250").unwrap_err();
        assert!(matches!(err, ServiceError::ValidationFailed(_)));
    }

    #[test]
    fn test_invalid_date_is_rejected() {
        let mut request = charge_request();
        request.date = "last tuesday".to_string();
        assert!(NewCharge::from_request(&request, "RTV237250").is_err());
    }
}
