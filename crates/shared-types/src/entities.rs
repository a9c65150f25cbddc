//! # Core Domain Entities
//!
//! Value types shared by the ledger, the event bus and the runtime.
//!
//! ## Clusters
//!
//! - **Identity**: `AccountId`, `CampaignId`, `SubmissionId`, `TransactionId`
//! - **Money**: `Amount`, `Currency`
//! - **Time**: `Timestamp`

use crate::errors::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Monetary amount. Signed so that debits can be recorded as negatives.
pub type Amount = rust_decimal::Decimal;

/// Wall-clock instant in UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

// =============================================================================
// IDENTITY
// =============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|_| TypeError::InvalidId {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }
    };
}

define_id!(
    /// An account that can hold balances: an advertiser or a clipper.
    AccountId,
    "account"
);

define_id!(
    /// A campaign funded by one advertiser.
    CampaignId,
    "campaign"
);

define_id!(
    /// A clipper's submission against a campaign.
    SubmissionId,
    "submission"
);

define_id!(
    /// An immutable ledger transaction record.
    TransactionId,
    "transaction"
);

// =============================================================================
// MONEY
// =============================================================================

/// ISO 4217 alphabetic currency code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    /// US dollar.
    pub const USD: Currency = Currency(*b"USD");
    /// Euro.
    pub const EUR: Currency = Currency(*b"EUR");

    /// Parse a currency code. Must be exactly three uppercase ASCII letters.
    pub fn new(code: &str) -> Result<Self, TypeError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(TypeError::InvalidCurrency(code.to_string()));
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    /// The three-letter code.
    #[must_use]
    pub fn code(&self) -> &str {
        // Construction only admits ASCII uppercase.
        std::str::from_utf8(&self.0).unwrap_or("XXX")
    }

    /// Number of decimal places the currency's minor unit allows.
    #[must_use]
    pub fn minor_units(&self) -> u32 {
        match &self.0 {
            b"JPY" | b"KRW" | b"VND" | b"CLP" | b"ISK" => 0,
            b"BHD" | b"KWD" | b"JOD" | b"OMR" | b"TND" => 3,
            _ => 2,
        }
    }

    /// Whether `amount` is expressible in this currency's minor units.
    #[must_use]
    pub fn admits(&self, amount: Amount) -> bool {
        amount.normalize().scale() <= self.minor_units()
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::USD
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.code())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.code().to_string()
    }
}
