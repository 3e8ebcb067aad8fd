//! Reconciliation differ.
//!
//! Pure set computations over upload rows and stored campaign records. The
//! differ never performs IO; the reconcile service feeds it freshly loaded
//! store rows and dispatches the resulting change sets.
//!
//! Re-running the differ with the same upload against a store that already
//! reflects the previous run yields empty change sets, which is what makes
//! reconciliation idempotent.

use std::collections::{HashMap, HashSet};

use crate::models::{CampaignMapping, MappingStatus, StoredRecord, UploadRecord};

/// Change set for campaign entity records.
#[derive(Debug)]
pub struct EntityDiff<'a, U, S> {
    /// Upload rows with no stored counterpart, to be created active.
    pub new_active: Vec<&'a U>,
    /// Upload rows marked inactive with no stored counterpart, created
    /// inactive so the withdrawal is still on record.
    pub new_inactive: Vec<&'a U>,
    /// Stored inactive records whose row re-appeared active.
    pub reactivate: Vec<&'a S>,
    /// Stored active records whose row is now marked inactive.
    pub deactivate: Vec<&'a S>,
}

impl<U, S> EntityDiff<'_, U, S> {
    pub fn is_empty(&self) -> bool {
        self.new_active.is_empty()
            && self.new_inactive.is_empty()
            && self.reactivate.is_empty()
            && self.deactivate.is_empty()
    }
}

/// Change set for campaign mapping rows.
#[derive(Debug)]
pub struct MappingDiff<'a> {
    /// (identifier, boundary) pairs needing a fresh `toBeMapped` row.
    pub to_create: Vec<(String, String)>,
    /// Existing `detached`/`toBeDetached` rows whose pair re-appeared
    /// active; flipped back to `toBeMapped`.
    pub to_reopen: Vec<&'a CampaignMapping>,
    /// Existing `toBeMapped`/`mapped` rows whose pair is no longer
    /// desired; flipped to `toBeDetached`.
    pub to_detach: Vec<&'a CampaignMapping>,
}

impl MappingDiff<'_> {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_reopen.is_empty() && self.to_detach.is_empty()
    }
}

/// Collapses duplicate natural keys within one upload, keeping the last
/// occurrence of each key at the position of the first.
pub fn dedupe_last_wins<U: UploadRecord>(rows: &[U]) -> Vec<&U> {
    let mut out: Vec<&U> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        match index.get(row.natural_key()) {
            Some(&i) => out[i] = row,
            None => {
                index.insert(row.natural_key(), out.len());
                out.push(row);
            }
        }
    }
    out
}

/// Diff upload rows against the stored records of the same campaign.
///
/// Rows whose usage already matches the stored record produce no entry.
pub fn diff_entities<'a, U, S>(rows: &'a [U], stored: &'a [S]) -> EntityDiff<'a, U, S>
where
    U: UploadRecord,
    S: StoredRecord,
{
    let stored_by_key: HashMap<&str, &S> =
        stored.iter().map(|s| (s.natural_key(), s)).collect();

    let mut diff = EntityDiff {
        new_active: Vec::new(),
        new_inactive: Vec::new(),
        reactivate: Vec::new(),
        deactivate: Vec::new(),
    };

    for row in dedupe_last_wins(rows) {
        match stored_by_key.get(row.natural_key()) {
            None => {
                if row.usage().is_active() {
                    diff.new_active.push(row);
                } else {
                    diff.new_inactive.push(row);
                }
            }
            Some(&existing) => {
                if row.usage().is_active() && !existing.is_active() {
                    diff.reactivate.push(existing);
                } else if !row.usage().is_active() && existing.is_active() {
                    diff.deactivate.push(existing);
                }
            }
        }
    }

    diff
}

/// Diff the desired (identifier, boundary) pairs of an upload against the
/// stored mapping rows of the same type.
///
/// The desired set is the cross-product of each active row's identifier and
/// its boundary list. `identifier_of` supplies the mapping identifier for a
/// row (e.g. the composite facility key).
pub fn diff_mappings<'a, U, F>(
    rows: &[U],
    stored: &'a [CampaignMapping],
    identifier_of: F,
) -> MappingDiff<'a>
where
    U: UploadRecord,
    F: Fn(&U) -> String,
{
    let mut desired: HashSet<(String, String)> = HashSet::new();
    let mut desired_order: Vec<(String, String)> = Vec::new();
    for row in dedupe_last_wins(rows) {
        if !row.usage().is_active() {
            continue;
        }
        let identifier = identifier_of(row);
        for boundary in row.boundaries() {
            let pair = (identifier.clone(), boundary.clone());
            if desired.insert(pair.clone()) {
                desired_order.push(pair);
            }
        }
    }

    let stored_pairs: HashSet<(&str, &str)> = stored.iter().map(|m| m.pair()).collect();

    let to_create = desired_order
        .into_iter()
        .filter(|(id, boundary)| !stored_pairs.contains(&(id.as_str(), boundary.as_str())))
        .collect();

    let mut to_reopen = Vec::new();
    let mut to_detach = Vec::new();
    for mapping in stored {
        let (id, boundary) = mapping.pair();
        let wanted = desired.contains(&(id.to_string(), boundary.to_string()));
        match mapping.status {
            MappingStatus::Detached | MappingStatus::ToBeDetached if wanted => {
                to_reopen.push(mapping);
            }
            MappingStatus::ToBeMapped | MappingStatus::Mapped if !wanted => {
                to_detach.push(mapping);
            }
            _ => {}
        }
    }

    MappingDiff {
        to_create,
        to_reopen,
        to_detach,
    }
}

/// Pairs to seed for resource mappings: the cross-product of product
/// variant ids and campaign boundaries, minus pairs already present.
pub fn seed_resource_pairs(
    product_variant_ids: &[String],
    boundaries: &[String],
    stored: &[CampaignMapping],
) -> Vec<(String, String)> {
    let stored_pairs: HashSet<(&str, &str)> = stored.iter().map(|m| m.pair()).collect();
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for pvar in product_variant_ids {
        for boundary in boundaries {
            if stored_pairs.contains(&(pvar.as_str(), boundary.as_str())) {
                continue;
            }
            if seen.insert((pvar.as_str(), boundary.as_str())) {
                out.push((pvar.clone(), boundary.clone()));
            }
        }
    }
    out
}
