use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub address: String,
    pub city: String,
    pub region: String,
    pub postal_code: Option<String>,
}

impl Place {
    pub fn is_complete(&self) -> bool {
        !(self.address.trim().is_empty()
            || self.city.trim().is_empty()
            || self.region.trim().is_empty())
    }
}
