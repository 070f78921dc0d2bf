//! Backend template names as mixin terms
//!
//! A template named `name` becomes the term `tpl_<slug>__<digest>`:
//! `slug` is the lower-cased name with every run of characters outside
//! `[a-z0-9-]` collapsed to `_`, and `digest` is the first 40 hex
//! characters of SHA-256(`name`). The slug keeps terms readable, the digest
//! keeps them unique and lets a term be mapped back to its name.

use crate::category::{CategoryId, Mixin};
use crate::schema::infrastructure;
use sha2::{Digest, Sha256};

const PREFIX: &str = "tpl_";
const SEPARATOR: &str = "__";
const DIGEST_LEN: usize = 40;

/// Lower-cased name with foreign character runs collapsed to `_`
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Truncated hex SHA-256 of `name`
pub fn digest(name: &str) -> String {
    let hash = Sha256::digest(name.as_bytes());
    let mut hex = hex::encode(hash);
    hex.truncate(DIGEST_LEN);
    hex
}

/// Mixin term for the template `name`
pub fn encode(name: &str) -> String {
    format!("{}{}{}{}", PREFIX, slug(name), SEPARATOR, digest(name))
}

/// Digest part of an encoded term
pub fn digest_of(term: &str) -> Option<&str> {
    let rest = term.strip_prefix(PREFIX)?;
    let (_, digest) = rest.rsplit_once(SEPARATOR)?;
    (digest.len() == DIGEST_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit())).then_some(digest)
}

/// Find the candidate name that `term` encodes
pub fn decode<'a, I>(term: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let wanted = digest_of(term)?;
    candidates.into_iter().find(|name| digest(name) == wanted)
}

fn template_mixin(scheme: &str, parent: CategoryId, location_root: &str, name: &str) -> Mixin {
    let term = encode(name);
    let location = format!("{}{}/", location_root, term);
    Mixin::new(CategoryId::known(scheme, &term))
        .with_title(name)
        .with_related(parent)
        .with_location(location)
}

/// `os_tpl` mixin for a backend operating system template
pub fn os_template(name: &str) -> Mixin {
    template_mixin(
        infrastructure::OS_TPL_SCHEME,
        infrastructure::os_tpl(),
        "/mixins/os_tpl/",
        name,
    )
}

/// `resource_tpl` mixin for a backend sizing template
pub fn resource_template(name: &str) -> Mixin {
    template_mixin(
        infrastructure::RESOURCE_TPL_SCHEME,
        infrastructure::resource_tpl(),
        "/mixins/resource_tpl/",
        name,
    )
}
