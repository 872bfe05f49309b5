//! Row types for the tracked collections.
//!
//! Every collection follows one shape: a text id assigned by the store, an
//! owner column that scopes reads and change events, nullable business
//! fields, and millisecond `created_at` / `updated_at` stamps.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::validation::{schemas, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Homes,
    Vendors,
    Paints,
    Appliances,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Homes,
        Collection::Vendors,
        Collection::Paints,
        Collection::Appliances,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Homes => "homes",
            Collection::Vendors => "vendors",
            Collection::Paints => "paints",
            Collection::Appliances => "appliances",
        }
    }

    /// Table name; collections map one-to-one onto tables.
    pub fn table(&self) -> &'static str {
        self.as_str()
    }

    pub fn owner_column(&self) -> &'static str {
        match self {
            Collection::Homes => "user_id",
            Collection::Vendors | Collection::Paints | Collection::Appliances => "home_id",
        }
    }

    /// Business columns a caller may write. Identity, owner and timestamps are store-managed.
    pub fn writable_columns(&self) -> &'static [&'static str] {
        match self {
            Collection::Homes => &[
                "name",
                "address",
                "city",
                "region",
                "postal_code",
                "year_built",
                "square_feet",
                "notes",
            ],
            Collection::Vendors => &[
                "name",
                "category",
                "contact_name",
                "phone",
                "email",
                "website",
                "notes",
            ],
            Collection::Paints => &["room", "brand", "color_name", "hex", "finish", "notes"],
            Collection::Appliances => &[
                "name",
                "brand",
                "model_number",
                "serial_number",
                "purchased_on",
                "warranty_expires_on",
                "notes",
            ],
        }
    }

    pub fn schema(&self) -> &'static Schema {
        match self {
            Collection::Homes => schemas::home(),
            Collection::Vendors => schemas::vendor(),
            Collection::Paints => schemas::paint(),
            Collection::Appliances => schemas::appliance(),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown collection: {s}"))
    }
}

/// A row of one tracked collection.
pub trait Record:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const COLLECTION: Collection;

    fn id(&self) -> &str;
    fn owner_id(&self) -> &str;
    fn created_at(&self) -> i64;
    fn updated_at(&self) -> i64;
}

macro_rules! impl_record {
    ($ty:ty, $collection:expr, $owner:ident) => {
        impl Record for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> &str {
                &self.id
            }

            fn owner_id(&self) -> &str {
                &self.$owner
            }

            fn created_at(&self) -> i64 {
                self.created_at
            }

            fn updated_at(&self) -> i64 {
                self.updated_at
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Home {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub year_built: Option<i64>,
    #[serde(default)]
    pub square_feet: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: String,
    pub home_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paint {
    pub id: String,
    pub home_id: String,
    pub room: String,
    #[serde(default)]
    pub brand: Option<String>,
    pub color_name: String,
    pub hex: String,
    #[serde(default)]
    pub finish: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appliance {
    pub id: String,
    pub home_id: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model_number: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub purchased_on: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub warranty_expires_on: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Appliance {
    /// True when a warranty date is recorded and falls before `today`.
    pub fn warranty_expired(&self, today: chrono::NaiveDate) -> bool {
        self.warranty_expires_on
            .as_deref()
            .and_then(crate::time::parse_date)
            .map(|expires| expires < today)
            .unwrap_or(false)
    }
}

impl_record!(Home, Collection::Homes, user_id);
impl_record!(Vendor, Collection::Vendors, home_id);
impl_record!(Paint, Collection::Paints, home_id);
impl_record!(Appliance, Collection::Appliances, home_id);
