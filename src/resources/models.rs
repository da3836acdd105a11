//! Backend entities and the per-resource list settings.
//!
//! Every entity decodes leniently: absent fields take their default and
//! unknown enum values become `Unknown`, so one odd row never fails a page.

#![allow(missing_docs)]

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::query::selection::{EntityId, Identified};
use crate::query::sort::{SortDirection, SortPolicy};

/// A list endpoint and the entity it returns.
pub trait Resource:
    Identified + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Singular name used in messages (`asset`, `room`, ...).
    const NAME: &'static str;
    /// Collection path; items live at `{PATH}/{id}`.
    const PATH: &'static str;
    /// Filter parameter names the endpoint understands.
    const FILTERS: &'static [&'static str];
    const SORT: SortPolicy;
    /// `false` for audit-style lists that only support reads.
    const WRITABLE: bool = true;

    /// Column headers for table output.
    fn columns() -> &'static [&'static str];

    /// One cell per column.
    fn cells(&self) -> Vec<String>;
}

fn opt<T: fmt::Display>(value: Option<&T>) -> String {
    value.map_or_else(String::new, ToString::to_string)
}

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant,)+
            #[default]
            #[serde(rename = "UNKNOWN", other)]
            Unknown,
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Unknown => "UNKNOWN",
                }
            }

            #[must_use]
            pub fn parse(raw: &str) -> Option<Self> {
                let raw = raw.trim();
                Self::ALL.iter().copied().find(|s| s.as_str().eq_ignore_ascii_case(raw))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_enum!(AssetStatus {
    Available => "AVAILABLE",
    InUse => "IN_USE",
    Borrowed => "BORROWED",
    Maintenance => "MAINTENANCE",
    Broken => "BROKEN",
    Retired => "RETIRED",
});

status_enum!(RoomStatus {
    Available => "AVAILABLE",
    InUse => "IN_USE",
    Maintenance => "MAINTENANCE",
    Closed => "CLOSED",
});

status_enum!(MaintenanceStatus {
    Pending => "PENDING",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

status_enum!(BorrowingStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    Borrowed => "BORROWED",
    Returned => "RETURNED",
    Overdue => "OVERDUE",
    Rejected => "REJECTED",
});

status_enum!(Role {
    Admin => "ADMIN",
    Teacher => "TEACHER",
    Student => "STUDENT",
    Technician => "TECHNICIAN",
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Asset {
    pub id: EntityId,
    pub name: String,
    pub serial_number: Option<String>,
    pub status: AssetStatus,
    pub category_id: Option<EntityId>,
    pub category_name: Option<String>,
    pub location_id: Option<EntityId>,
    pub location_name: Option<String>,
    pub room_id: Option<EntityId>,
    pub room_name: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub price: Option<f64>,
    pub image: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Category {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Location {
    pub id: EntityId,
    pub name: String,
    pub address: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Room {
    pub id: EntityId,
    pub name: String,
    pub status: RoomStatus,
    pub capacity: Option<u32>,
    pub location_id: Option<EntityId>,
    pub location_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Software {
    pub id: EntityId,
    pub name: String,
    pub version: Option<String>,
    pub vendor: Option<String>,
    pub license_key: Option<String>,
    pub license_expiry: Option<NaiveDate>,
    pub room_id: Option<EntityId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Maintenance {
    pub id: EntityId,
    pub asset_id: Option<EntityId>,
    pub asset_name: Option<String>,
    pub description: Option<String>,
    pub status: MaintenanceStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Borrowing {
    pub id: EntityId,
    pub user_id: Option<EntityId>,
    pub user_name: Option<String>,
    pub asset_id: Option<EntityId>,
    pub asset_name: Option<String>,
    pub status: BorrowingStatus,
    pub borrow_date: Option<NaiveDate>,
    pub expected_return_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryEntry {
    pub id: EntityId,
    pub asset_id: Option<EntityId>,
    pub asset_name: Option<String>,
    pub action: String,
    pub performed_by: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: EntityId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub enabled: bool,
    pub mfa_enabled: bool,
    pub phone_number: Option<String>,
}

impl User {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

macro_rules! identified {
    ($($ty:ty),+) => {
        $(impl Identified for $ty {
            fn id(&self) -> EntityId {
                self.id
            }
        })+
    };
}

identified!(Asset, Category, Location, Room, Software, Maintenance, Borrowing, HistoryEntry, User);

impl Resource for Asset {
    const NAME: &'static str = "asset";
    const PATH: &'static str = "/admin/assets";
    const FILTERS: &'static [&'static str] = &["status", "categoryId", "locationId", "roomId"];
    const SORT: SortPolicy = SortPolicy::new(
        &["id", "name", "serialNumber", "status", "purchaseDate", "price"],
        "id",
        SortDirection::Desc,
    );

    fn columns() -> &'static [&'static str] {
        &["ID", "NAME", "SERIAL", "STATUS", "CATEGORY", "ROOM"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            opt(self.serial_number.as_ref()),
            self.status.to_string(),
            opt(self.category_name.as_ref()),
            opt(self.room_name.as_ref()),
        ]
    }
}

impl Resource for Category {
    const NAME: &'static str = "category";
    const PATH: &'static str = "/admin/categories";
    const FILTERS: &'static [&'static str] = &[];
    const SORT: SortPolicy = SortPolicy::new(&["id", "name"], "name", SortDirection::Asc);

    fn columns() -> &'static [&'static str] {
        &["ID", "NAME", "DESCRIPTION"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            opt(self.description.as_ref()),
        ]
    }
}

impl Resource for Location {
    const NAME: &'static str = "location";
    const PATH: &'static str = "/admin/locations";
    const FILTERS: &'static [&'static str] = &[];
    const SORT: SortPolicy = SortPolicy::new(&["id", "name"], "name", SortDirection::Asc);

    fn columns() -> &'static [&'static str] {
        &["ID", "NAME", "ADDRESS"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            opt(self.address.as_ref()),
        ]
    }
}

impl Resource for Room {
    const NAME: &'static str = "room";
    const PATH: &'static str = "/admin/rooms";
    const FILTERS: &'static [&'static str] = &["status", "locationId"];
    const SORT: SortPolicy = SortPolicy::new(
        &["id", "name", "capacity", "status"],
        "name",
        SortDirection::Asc,
    );

    fn columns() -> &'static [&'static str] {
        &["ID", "NAME", "STATUS", "CAPACITY", "LOCATION"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.status.to_string(),
            opt(self.capacity.as_ref()),
            opt(self.location_name.as_ref()),
        ]
    }
}

impl Resource for Software {
    const NAME: &'static str = "software";
    const PATH: &'static str = "/admin/softwares";
    const FILTERS: &'static [&'static str] = &["roomId"];
    const SORT: SortPolicy = SortPolicy::new(
        &["id", "name", "version", "licenseExpiry"],
        "name",
        SortDirection::Asc,
    );

    fn columns() -> &'static [&'static str] {
        &["ID", "NAME", "VERSION", "VENDOR", "LICENSE EXPIRY"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            opt(self.version.as_ref()),
            opt(self.vendor.as_ref()),
            opt(self.license_expiry.as_ref()),
        ]
    }
}

impl Resource for Maintenance {
    const NAME: &'static str = "maintenance";
    const PATH: &'static str = "/admin/maintenances";
    const FILTERS: &'static [&'static str] = &["status", "assetId"];
    const SORT: SortPolicy = SortPolicy::new(
        &["id", "startDate", "endDate", "status", "cost"],
        "startDate",
        SortDirection::Desc,
    );

    fn columns() -> &'static [&'static str] {
        &["ID", "ASSET", "STATUS", "START", "END"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            opt(self.asset_name.as_ref()),
            self.status.to_string(),
            opt(self.start_date.as_ref()),
            opt(self.end_date.as_ref()),
        ]
    }
}

impl Resource for Borrowing {
    const NAME: &'static str = "borrowing";
    const PATH: &'static str = "/borrowings";
    const FILTERS: &'static [&'static str] = &["status", "userId", "assetId"];
    const SORT: SortPolicy = SortPolicy::new(
        &["id", "borrowDate", "expectedReturnDate", "returnDate", "status"],
        "borrowDate",
        SortDirection::Desc,
    );

    fn columns() -> &'static [&'static str] {
        &["ID", "USER", "ASSET", "STATUS", "BORROWED", "DUE"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            opt(self.user_name.as_ref()),
            opt(self.asset_name.as_ref()),
            self.status.to_string(),
            opt(self.borrow_date.as_ref()),
            opt(self.expected_return_date.as_ref()),
        ]
    }
}

impl Resource for HistoryEntry {
    const NAME: &'static str = "history";
    const PATH: &'static str = "/history";
    const FILTERS: &'static [&'static str] = &["assetId", "action"];
    const SORT: SortPolicy = SortPolicy::new(&["id", "timestamp"], "timestamp", SortDirection::Desc);
    const WRITABLE: bool = false;

    fn columns() -> &'static [&'static str] {
        &["ID", "TIME", "ASSET", "ACTION", "BY"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.timestamp
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            opt(self.asset_name.as_ref()),
            self.action.clone(),
            opt(self.performed_by.as_ref()),
        ]
    }
}

impl Resource for User {
    const NAME: &'static str = "user";
    const PATH: &'static str = "/admin/users";
    const FILTERS: &'static [&'static str] = &["role", "enabled"];
    const SORT: SortPolicy = SortPolicy::new(
        &["id", "firstName", "lastName", "email", "role"],
        "id",
        SortDirection::Desc,
    );

    fn columns() -> &'static [&'static str] {
        &["ID", "NAME", "EMAIL", "ROLE", "ENABLED"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.full_name(),
            self.email.clone(),
            self.role.to_string(),
            if self.enabled { "yes" } else { "no" }.to_string(),
        ]
    }
}

/// Resource names accepted on the command line, singular or plural.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Asset,
    Category,
    Location,
    Room,
    Software,
    Maintenance,
    Borrowing,
    History,
    User,
}

impl ResourceKind {
    pub const ALL: [Self; 9] = [
        Self::Asset,
        Self::Category,
        Self::Location,
        Self::Room,
        Self::Software,
        Self::Maintenance,
        Self::Borrowing,
        Self::History,
        Self::User,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Asset => Asset::NAME,
            Self::Category => Category::NAME,
            Self::Location => Location::NAME,
            Self::Room => Room::NAME,
            Self::Software => Software::NAME,
            Self::Maintenance => Maintenance::NAME,
            Self::Borrowing => Borrowing::NAME,
            Self::History => HistoryEntry::NAME,
            Self::User => User::NAME,
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        let singular = match raw.as_str() {
            "categories" => "category",
            "histories" => "history",
            "softwares" => "software",
            other => other.strip_suffix('s').unwrap_or(other),
        };
        Self::ALL.into_iter().find(|kind| kind.name() == singular)
    }
}
