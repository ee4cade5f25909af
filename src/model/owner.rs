use serde::{Deserialize, Serialize};

use crate::model::{AddressRequest, OwnerRequest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub address_id: i64,
    pub house_name_or_number: String,
    pub street_name: String,
    pub city: String,
    pub county: String,
    pub country: String,
    pub postcode: String,
}

/// Address that has not been persisted yet (no generated id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAddress {
    pub house_name_or_number: String,
    pub street_name: String,
    pub city: String,
    pub county: String,
    pub country: String,
    pub postcode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressView {
    pub house_name_number: String,
    pub street: String,
    pub town_city: String,
    pub county: String,
    pub country: String,
    pub postcode: String,
}

impl Address {
    pub fn view(&self) -> AddressView {
        AddressView {
            house_name_number: self.house_name_or_number.clone(),
            street: self.street_name.clone(),
            town_city: self.city.clone(),
            county: self.county.clone(),
            country: self.country.clone(),
            postcode: self.postcode.clone(),
        }
    }

    /// Overwrite every field from a request, keeping the id.
    pub fn apply(&mut self, request: &AddressRequest) {
        self.house_name_or_number = request.house_name_number.clone();
        self.street_name = request.street.clone();
        self.city = request.town_city.clone();
        self.county = request.county.clone();
        self.country = request.country.clone();
        self.postcode = request.postcode.clone();
    }
}

impl NewAddress {
    pub fn with_id(self, address_id: i64) -> Address {
        Address {
            address_id,
            house_name_or_number: self.house_name_or_number,
            street_name: self.street_name,
            city: self.city,
            county: self.county,
            country: self.country,
            postcode: self.postcode,
        }
    }
}

impl From<&AddressRequest> for NewAddress {
    fn from(request: &AddressRequest) -> Self {
        Self {
            house_name_or_number: request.house_name_number.clone(),
            street_name: request.street.clone(),
            city: request.town_city.clone(),
            county: request.county.clone(),
            country: request.country.clone(),
            postcode: request.postcode.clone(),
        }
    }
}

/// Owner row. The email is stored lower-cased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub identity: String,
    pub forename: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    pub owner_type: String,
    pub address_id: i64,
}

impl Owner {
    /// Overwrite the mutable fields from a request. The identity is fixed
    /// once set and is not touched here.
    pub fn apply(&mut self, request: &OwnerRequest) {
        self.forename = request.first_name.clone();
        self.surname = request.last_name.clone();
        self.email = request.email_address.to_lowercase();
        self.phone = request.phone_number.clone();
        self.owner_type = request.owner_type.clone();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOwner {
    pub identity: String,
    pub forename: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    pub owner_type: String,
}

impl NewOwner {
    pub fn new(
        identity: impl Into<String>,
        forename: impl Into<String>,
        surname: impl Into<String>,
        email: &str,
        phone: impl Into<String>,
        owner_type: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            forename: forename.into(),
            surname: surname.into(),
            email: email.to_lowercase(),
            phone: phone.into(),
            owner_type: owner_type.into(),
        }
    }

    pub fn with_address_id(self, address_id: i64) -> Owner {
        Owner {
            identity: self.identity,
            forename: self.forename,
            surname: self.surname,
            email: self.email,
            phone: self.phone,
            owner_type: self.owner_type,
            address_id,
        }
    }
}

impl From<&OwnerRequest> for NewOwner {
    fn from(request: &OwnerRequest) -> Self {
        Self::new(
            request.identity.clone(),
            request.first_name.clone(),
            request.last_name.clone(),
            &request.email_address,
            request.phone_number.clone(),
            request.owner_type.clone(),
        )
    }
}

/// Owner together with its address, as loaded from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerRecord {
    pub owner: Owner,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerView {
    pub identity: String,
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
    pub phone_number: String,
    #[serde(rename = "type")]
    pub owner_type: String,
    pub address: AddressView,
}

impl OwnerRecord {
    pub fn view(&self) -> OwnerView {
        OwnerView {
            identity: self.owner.identity.clone(),
            first_name: self.owner.forename.clone(),
            last_name: self.owner.surname.clone(),
            email_address: self.owner.email.clone(),
            phone_number: self.owner.phone.clone(),
            owner_type: self.owner.owner_type.clone(),
            address: self.address.view(),
        }
    }
}
