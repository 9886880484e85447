use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use devisio_core::{ClientId, EngineError, EngineResult};

/// Postal billing address, printed on every document issued to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAddress {
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// A client: identity plus billing address.
///
/// Identity fields are not locked by the engine; downstream documents react
/// to changes (PDF regeneration is an external collaborator's concern).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: BillingAddress,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> EngineResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EngineError::validation("client name must not be empty"));
        }
        Ok(Self {
            id: ClientId::new(),
            name,
            email: None,
            phone: None,
            address: BillingAddress::default(),
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_rejects_blank_name() {
        assert!(Client::new("  ", Utc::now()).is_err());
        assert!(Client::new("Dupont SARL", Utc::now()).is_ok());
    }
}
