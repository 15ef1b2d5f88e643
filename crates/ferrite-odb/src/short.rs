//! Abbreviated-id resolution across every storage tier.

use ferrite_hash::{Oid, ShortId};

use crate::{ObjectStore, OdbError};

/// Resolve `short` to the one id it abbreviates.
///
/// Candidates are collected from every pack index (fan-out narrowed) and
/// the loose tier, then deduplicated: the same object loose *and* packed
/// is one candidate, not two.
pub(crate) fn resolve(store: &ObjectStore, short: &ShortId) -> Result<Oid, OdbError> {
    let mut matches: Vec<Oid> = Vec::new();

    for pack in store.ordered_packs() {
        for oid in pack.index().matches_of(short) {
            if !matches.contains(&oid) {
                matches.push(oid);
            }
        }
    }

    for oid in store.loose().iter()? {
        if short.matches(&oid) && !matches.contains(&oid) {
            matches.push(oid);
        }
    }

    match matches.len() {
        0 => Err(OdbError::Missing(zero_filled(short))),
        1 => Ok(matches[0]),
        n => Err(OdbError::Ambiguous {
            prefix: short.to_hex(),
            matches: n,
        }),
    }
}

/// A placeholder id for "nothing matched <prefix>" errors.
fn zero_filled(short: &ShortId) -> Oid {
    let mut hex = short.to_hex();
    while hex.len() < 40 {
        hex.push('0');
    }
    Oid::from_hex(&hex).unwrap_or(Oid::ZERO_SHA1)
}
