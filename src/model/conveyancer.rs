use serde::{Deserialize, Serialize};

use crate::model::{X500Error, X500Fields, X500Name};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conveyancer {
    pub conveyancer_id: i64,
    /// Canonical X500 string, unique across conveyancers.
    pub x500_name: String,
    pub company_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConveyancer {
    pub x500_name: String,
    pub company_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConveyancerView {
    pub conveyancer_id: i64,
    pub x500: X500Fields,
    pub x500_string: String,
    pub company_name: String,
}

impl NewConveyancer {
    /// The name is normalised to its canonical form before it is stored.
    pub fn new(x500_name: &str, company_name: impl Into<String>) -> Result<Self, X500Error> {
        Ok(Self {
            x500_name: X500Name::parse(x500_name)?.serialize()?,
            company_name: company_name.into(),
        })
    }

    pub fn with_id(self, conveyancer_id: i64) -> Conveyancer {
        Conveyancer {
            conveyancer_id,
            x500_name: self.x500_name,
            company_name: self.company_name,
        }
    }
}

impl Conveyancer {
    pub fn view(&self) -> Result<ConveyancerView, X500Error> {
        let name = X500Name::parse(&self.x500_name)?;
        Ok(ConveyancerView {
            conveyancer_id: self.conveyancer_id,
            x500: name.to_fields(),
            x500_string: name.serialize()?,
            company_name: self.company_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conveyancer_name_is_canonical() {
        let conveyancer = NewConveyancer::new("L=Plymouth, O=Conveyancer1, C=GB", "ConveyIt")
            .unwrap()
            .with_id(1);
        assert_eq!(conveyancer.x500_name, "O=Conveyancer1,L=Plymouth,C=GB");

        let view = conveyancer.view().unwrap();
        assert_eq!(view.x500.organisation, "Conveyancer1");
        assert_eq!(view.x500.state, None);
        assert_eq!(view.company_name, "ConveyIt");
    }
}
