use rocket_db_pools::sqlx::postgres::PgRow;
use rocket_db_pools::sqlx::{self, FromRow, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ===== Identity =====

/// The authenticated user a migration runs for.
///
/// The legacy store keys accounts by lowercase username, so the name is
/// lowercased once here and every later lookup uses the same form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserContext {
    username: String,
}

impl UserContext {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_lowercase(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Display for UserContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// Destination identifier of an imported contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(pub i64);

/// Destination identifier of a contact group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== Legacy Rows =====

/// Street address columns shared by the home and work blocks of a legacy row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub zip: String,
}

/// One row of an `abook_*` shard table, already coerced to a fixed shape.
///
/// Every column is loaded as text with NULL mapped to `""`, so the rest of
/// the pipeline never has to deal with missing values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyContactRow {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub emails: [String; 5],
    pub home: LegacyAddress,
    pub home_phone: String,
    pub home_mobile: String,
    pub home_fax: String,
    pub work_company: String,
    pub work_department: String,
    pub work_title: String,
    pub work: LegacyAddress,
    pub work_phone: String,
    pub work_mobile: String,
    pub work_fax: String,
    pub notes: String,
    pub date_of_birth: String,
}

impl<'r> FromRow<'r, PgRow> for LegacyContactRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            first_name: row.try_get("first_name")?,
            middle_name: row.try_get("middle_name")?,
            last_name: row.try_get("last_name")?,
            emails: [
                row.try_get("email1")?,
                row.try_get("email2")?,
                row.try_get("email3")?,
                row.try_get("email4")?,
                row.try_get("email5")?,
            ],
            home: LegacyAddress {
                street: row.try_get("home_street")?,
                city: row.try_get("home_city")?,
                state: row.try_get("home_state")?,
                country: row.try_get("home_country")?,
                zip: row.try_get("home_zip")?,
            },
            home_phone: row.try_get("home_phone")?,
            home_mobile: row.try_get("home_mobile")?,
            home_fax: row.try_get("home_fax")?,
            work_company: row.try_get("work_company")?,
            work_department: row.try_get("work_department")?,
            work_title: row.try_get("work_title")?,
            work: LegacyAddress {
                street: row.try_get("work_street")?,
                city: row.try_get("work_city")?,
                state: row.try_get("work_state")?,
                country: row.try_get("work_country")?,
                zip: row.try_get("work_zip")?,
            },
            work_phone: row.try_get("work_phone")?,
            work_mobile: row.try_get("work_mobile")?,
            work_fax: row.try_get("work_fax")?,
            notes: row.try_get("notes")?,
            date_of_birth: row.try_get("date_of_birth")?,
        })
    }
}

/// One row of an `abookgroup_*` shard table: a group name and a member address.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct LegacyGroupRow {
    pub group_name: String,
    pub email: String,
}

impl LegacyGroupRow {
    pub fn new(group_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            email: email.into(),
        }
    }
}

// ===== Normalized Contact =====

/// Structured postal address in the shape the address book stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub locality: String,
    pub region: String,
    pub country: String,
    pub zipcode: String,
}

impl From<&LegacyAddress> for Address {
    fn from(legacy: &LegacyAddress) -> Self {
        Self {
            street: legacy.street.clone(),
            locality: legacy.city.clone(),
            region: legacy.state.clone(),
            country: legacy.country.clone(),
            zipcode: legacy.zip.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressContext {
    Home,
    Work,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhoneRole {
    Home,
    Mobile,
    HomeFax,
    Work,
    Work2,
    WorkFax,
}

/// Contact record handed to the destination address book.
///
/// `emails` always holds five entries (the canonical address first, then the
/// remaining legacy slots verbatim, empties included). The destination is
/// expected to ignore empty entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedContact {
    pub name: String,
    pub firstname: String,
    pub middlename: String,
    pub surname: String,
    pub emails: Vec<String>,
    pub addresses: BTreeMap<AddressContext, Address>,
    pub phones: BTreeMap<PhoneRole, Vec<String>>,
    pub organization: String,
    pub department: String,
    pub jobtitle: String,
    pub birthday: String,
    pub notes: String,
}

impl NormalizedContact {
    /// The canonical (trimmed, lowercased) primary address.
    pub fn primary_email(&self) -> &str {
        self.emails.first().map(String::as_str).unwrap_or_default()
    }

    /// Work emails with empty slots dropped.
    pub fn non_empty_emails(&self) -> impl Iterator<Item = &str> {
        self.emails
            .iter()
            .map(|email| email.trim())
            .filter(|email| !email.is_empty())
    }
}
