//! Syntactic email address checks.
//!
//! No DNS lookups; the check only decides whether an address is well formed
//! enough to serve as a contact's primary key in the address book.

use regex::Regex;
use std::net::{IpAddr, Ipv6Addr};
use std::sync::OnceLock;

static LOCAL_PART_REGEX: OnceLock<Regex> = OnceLock::new();
static DOMAIN_LABEL_REGEX: OnceLock<Regex> = OnceLock::new();

const MAX_LOCAL_PART_LEN: usize = 64;
const MAX_DOMAIN_LEN: usize = 255;
const MAX_LABEL_LEN: usize = 63;

fn local_part_regex() -> &'static Regex {
    LOCAL_PART_REGEX.get_or_init(|| {
        // dot-atom (ASCII atext plus any non-ASCII character) or a quoted string
        Regex::new(
            r#"^(?:[A-Za-z0-9!#$%&'*+/=?^_`{|}~\-\x{80}-\x{10FFFF}]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~\-\x{80}-\x{10FFFF}]+)*|"(?:[^"\\]|\\.)*")$"#,
        )
        .expect("local part regex is valid")
    })
}

fn domain_label_regex() -> &'static Regex {
    DOMAIN_LABEL_REGEX.get_or_init(|| {
        Regex::new(r"^[\p{L}\p{N}](?:[\p{L}\p{N}\-]*[\p{L}\p{N}])?$")
            .expect("domain label regex is valid")
    })
}

/// Returns true when `email` is a syntactically valid address.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }

    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };

    if local.is_empty() || local.len() > MAX_LOCAL_PART_LEN {
        return false;
    }
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return false;
    }
    if !local_part_regex().is_match(local) {
        return false;
    }

    if let Some(literal) = domain.strip_prefix('[').and_then(|d| d.strip_suffix(']')) {
        return is_address_literal(literal);
    }

    is_valid_domain(domain)
}

fn is_address_literal(literal: &str) -> bool {
    match literal.strip_prefix("IPv6:") {
        Some(v6) => v6.parse::<Ipv6Addr>().is_ok(),
        None => literal.parse::<IpAddr>().is_ok(),
    }
}

fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let labels_ok = labels.iter().all(|label| {
        !label.is_empty() && label.len() <= MAX_LABEL_LEN && domain_label_regex().is_match(label)
    });

    // a purely numeric top-level label is an unbracketed IP, not a hostname
    let tld_ok = labels
        .last()
        .map(|tld| !tld.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false);

    labels_ok && tld_ok
}
