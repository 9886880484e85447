//! Strongly-typed identifiers used across the engine.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

macro_rules! impl_uuid_newtype {
    ($(#[$doc:meta])* $t:ident) => {
        $(#[$doc])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s).map_err(|e| {
                    EngineError::validation(format!(
                        concat!("invalid ", stringify!($t), ": {}"),
                        e
                    ))
                })?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(
    /// Identifier of a client (billed party).
    ClientId
);
impl_uuid_newtype!(
    /// Identifier of a quote (devis).
    QuoteId
);
impl_uuid_newtype!(
    /// Identifier of a line on a quote.
    QuoteLineId
);
impl_uuid_newtype!(
    /// Identifier of an amendment (avenant / quote rider).
    AmendmentId
);
impl_uuid_newtype!(
    /// Identifier of a line on an amendment.
    AmendmentLineId
);
impl_uuid_newtype!(
    /// Identifier of an invoice (facture).
    InvoiceId
);
impl_uuid_newtype!(
    /// Identifier of a line on an invoice.
    InvoiceLineId
);
impl_uuid_newtype!(
    /// Identifier of a credit note (avoir).
    CreditNoteId
);
impl_uuid_newtype!(
    /// Identifier of a line on a credit note.
    CreditNoteLineId
);
impl_uuid_newtype!(
    /// Identifier of a deposit (acompte) requested against a quote.
    DepositId
);
impl_uuid_newtype!(
    /// Identifier of a payment recorded against an invoice.
    PaymentId
);
