use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::cache::TtlCache;
use super::domain::{PersonId, SlotKey, Weekday};
use super::repository::{RepositoryError, ScheduleReader};

/// Weekday × time-slot grid minus personal and cohort blackouts, cached per person.
pub struct AvailabilityIndex<R> {
    reader: Arc<R>,
    cache: TtlCache<PersonId, Arc<BTreeSet<SlotKey>>>,
}

impl<R> AvailabilityIndex<R>
where
    R: ScheduleReader,
{
    pub fn new(reader: Arc<R>, ttl: Duration) -> Self {
        Self {
            reader,
            cache: TtlCache::new(ttl),
        }
    }

    /// Unknown people yield an empty set; "nowhere to go" is a valid answer.
    pub fn available_slots(
        &self,
        person: &PersonId,
    ) -> Result<Arc<BTreeSet<SlotKey>>, RepositoryError> {
        if let Some(cached) = self.cache.get(person) {
            return Ok(cached);
        }

        let slots = Arc::new(compute_available_slots(self.reader.as_ref(), person)?);
        debug!(person = %person, slots = slots.len(), "availability computed");
        self.cache.insert(person.clone(), slots.clone());
        Ok(slots)
    }

    /// Uncached single-pair check for validation paths.
    pub fn is_available(&self, person: &PersonId, key: SlotKey) -> Result<bool, RepositoryError> {
        is_available(self.reader.as_ref(), person, key)
    }

    pub fn invalidate(&self, person: &PersonId) {
        self.cache.invalidate(person);
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }
}

pub(crate) fn compute_available_slots<R>(
    reader: &R,
    person_id: &PersonId,
) -> Result<BTreeSet<SlotKey>, RepositoryError>
where
    R: ScheduleReader + ?Sized,
{
    let Some(person) = reader.person(person_id)? else {
        return Ok(BTreeSet::new());
    };

    let blocked: BTreeSet<SlotKey> = reader
        .blackouts_for(&person.id, person.blackout_group.as_ref())?
        .iter()
        .filter(|blackout| blackout.blocks(&person))
        .map(|blackout| blackout.key())
        .collect();

    let slots = reader.time_slots()?;
    Ok(Weekday::WORKING_DAYS
        .iter()
        .flat_map(|day| slots.iter().map(move |slot| SlotKey::new(*day, slot.id)))
        .filter(|key| !blocked.contains(key))
        .collect())
}

pub(crate) fn is_available<R>(
    reader: &R,
    person_id: &PersonId,
    key: SlotKey,
) -> Result<bool, RepositoryError>
where
    R: ScheduleReader + ?Sized,
{
    let Some(person) = reader.person(person_id)? else {
        return Ok(false);
    };
    if !Weekday::WORKING_DAYS.contains(&key.day) {
        return Ok(false);
    }
    if !reader.time_slots()?.iter().any(|slot| slot.id == key.slot) {
        return Ok(false);
    }

    let blocked = reader
        .blackouts_for(&person.id, person.blackout_group.as_ref())?
        .iter()
        .any(|blackout| blackout.key() == key && blackout.blocks(&person));
    Ok(!blocked)
}
