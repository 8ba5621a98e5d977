//! Legacy row → address-book record mapping.

use crate::config::DisplayNamePolicy;
use crate::contacts::email::is_valid_email;
use crate::models::{
    Address, AddressContext, LegacyContactRow, NormalizedContact, PhoneRole,
};
use std::collections::BTreeMap;

/// Why a legacy row was not turned into a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The primary email field has no `@` at all.
    MissingAt(String),
    /// The primary email, once trimmed and lowercased, is not a valid address.
    InvalidEmail(String),
}

/// Trimmed, lowercased form of an address used as the lookup key.
pub fn canonical_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Display name from first name and surname.
///
/// The verbatim policy keeps the plain single-space join, so an empty first
/// name produces a leading space.
pub fn display_name(firstname: &str, surname: &str, policy: DisplayNamePolicy) -> String {
    let joined = format!("{} {}", firstname, surname);
    match policy {
        DisplayNamePolicy::Verbatim => joined,
        DisplayNamePolicy::Trimmed => joined.trim().to_string(),
    }
}

/// Map one legacy row to a contact, or reject it on a bad primary email.
///
/// Only the primary address is validated. The other four email slots and all
/// phone, address, and note fields are passed through untouched.
pub fn normalize_contact(
    row: &LegacyContactRow,
    policy: DisplayNamePolicy,
) -> Result<NormalizedContact, Rejection> {
    let raw_primary = &row.emails[0];
    if !raw_primary.contains('@') {
        return Err(Rejection::MissingAt(raw_primary.clone()));
    }

    let primary = canonical_email(raw_primary);
    if !is_valid_email(&primary) {
        return Err(Rejection::InvalidEmail(primary));
    }

    let mut emails = Vec::with_capacity(row.emails.len());
    emails.push(primary);
    emails.extend(row.emails[1..].iter().cloned());

    let addresses = BTreeMap::from([
        (AddressContext::Home, Address::from(&row.home)),
        (AddressContext::Work, Address::from(&row.work)),
    ]);

    let phones = BTreeMap::from([
        (PhoneRole::Home, vec![row.home_phone.clone()]),
        (PhoneRole::Mobile, vec![row.home_mobile.clone()]),
        (PhoneRole::HomeFax, vec![row.home_fax.clone()]),
        (PhoneRole::Work, vec![row.work_phone.clone()]),
        (PhoneRole::Work2, vec![row.work_mobile.clone()]),
        (PhoneRole::WorkFax, vec![row.work_fax.clone()]),
    ]);

    Ok(NormalizedContact {
        name: display_name(&row.first_name, &row.last_name, policy),
        firstname: row.first_name.clone(),
        middlename: row.middle_name.clone(),
        surname: row.last_name.clone(),
        emails,
        addresses,
        phones,
        organization: row.work_company.clone(),
        department: row.work_department.clone(),
        jobtitle: row.work_title.clone(),
        birthday: row.date_of_birth.clone(),
        notes: row.notes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LegacyAddress;

    fn row(primary: &str) -> LegacyContactRow {
        LegacyContactRow {
            first_name: "Ada".into(),
            middle_name: "King".into(),
            last_name: "Lovelace".into(),
            emails: [
                primary.into(),
                String::new(),
                "Second@Example.org ".into(),
                String::new(),
                String::new(),
            ],
            home: LegacyAddress {
                street: "12 St James's Square".into(),
                city: "London".into(),
                state: String::new(),
                country: "UK".into(),
                zip: "SW1Y".into(),
            },
            home_phone: "+44 20 0000".into(),
            work_company: "Analytical Engines".into(),
            work_title: "Programmer".into(),
            work_mobile: "07700 900000".into(),
            notes: "first programmer".into(),
            date_of_birth: "1815-12-10".into(),
            ..Default::default()
        }
    }

    #[test]
    fn primary_email_is_trimmed_and_lowercased() {
        let contact = normalize_contact(&row("  A@X.com "), DisplayNamePolicy::Verbatim)
            .expect("valid row");
        assert_eq!(contact.primary_email(), "a@x.com");
    }

    #[test]
    fn secondary_slots_pass_through_verbatim() {
        let contact = normalize_contact(&row("a@x.com"), DisplayNamePolicy::Verbatim)
            .expect("valid row");
        assert_eq!(
            contact.emails,
            vec!["a@x.com", "", "Second@Example.org ", "", ""]
        );
        let non_empty: Vec<&str> = contact.non_empty_emails().collect();
        assert_eq!(non_empty, vec!["a@x.com", "Second@Example.org"]);
    }

    #[test]
    fn rows_without_at_are_rejected() {
        let result = normalize_contact(&row("nobody"), DisplayNamePolicy::Verbatim);
        assert_eq!(result, Err(Rejection::MissingAt("nobody".into())));

        let result = normalize_contact(&row(""), DisplayNamePolicy::Verbatim);
        assert_eq!(result, Err(Rejection::MissingAt(String::new())));
    }

    #[test]
    fn rows_with_invalid_primary_are_rejected() {
        let result = normalize_contact(&row("Broken@@Example"), DisplayNamePolicy::Verbatim);
        assert_eq!(
            result,
            Err(Rejection::InvalidEmail("broken@@example".into()))
        );
    }

    #[test]
    fn both_address_slots_always_exist() {
        let mut legacy = row("a@x.com");
        legacy.work = LegacyAddress::default();
        let contact =
            normalize_contact(&legacy, DisplayNamePolicy::Verbatim).expect("valid row");

        assert_eq!(contact.addresses.len(), 2);
        assert_eq!(contact.addresses[&AddressContext::Work], Address::default());
        let home = &contact.addresses[&AddressContext::Home];
        assert_eq!(home.locality, "London");
        assert_eq!(home.zipcode, "SW1Y");
    }

    #[test]
    fn every_phone_role_holds_one_raw_value() {
        let contact = normalize_contact(&row("a@x.com"), DisplayNamePolicy::Verbatim)
            .expect("valid row");
        assert_eq!(contact.phones.len(), 6);
        assert!(contact.phones.values().all(|values| values.len() == 1));
        assert_eq!(contact.phones[&PhoneRole::Home], vec!["+44 20 0000"]);
        assert_eq!(contact.phones[&PhoneRole::Work2], vec!["07700 900000"]);
        assert_eq!(contact.phones[&PhoneRole::WorkFax], vec![""]);
    }

    #[test]
    fn work_and_personal_fields_are_mapped() {
        let contact = normalize_contact(&row("a@x.com"), DisplayNamePolicy::Verbatim)
            .expect("valid row");
        assert_eq!(contact.firstname, "Ada");
        assert_eq!(contact.middlename, "King");
        assert_eq!(contact.surname, "Lovelace");
        assert_eq!(contact.organization, "Analytical Engines");
        assert_eq!(contact.jobtitle, "Programmer");
        assert_eq!(contact.birthday, "1815-12-10");
        assert_eq!(contact.notes, "first programmer");
    }

    #[test]
    fn verbatim_name_keeps_leading_space() {
        assert_eq!(display_name("Ada", "Lovelace", DisplayNamePolicy::Verbatim), "Ada Lovelace");
        assert_eq!(display_name("", "Lovelace", DisplayNamePolicy::Verbatim), " Lovelace");
        assert_eq!(display_name("", "Lovelace", DisplayNamePolicy::Trimmed), "Lovelace");
        assert_eq!(display_name("Ada", "", DisplayNamePolicy::Trimmed), "Ada");
    }
}
