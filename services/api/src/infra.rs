use metrics_exporter_prometheus::PrometheusHandle;
use slot_allocator::allocation::{FixtureError, InMemoryScheduleStore};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Schedule the service and demo fall back to when no fixture is given.
pub(crate) const STUDIO_FIXTURE: &str = include_str!("../fixtures/studio.json");

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn load_store(
    fixture: Option<&Path>,
) -> Result<Arc<InMemoryScheduleStore>, FixtureError> {
    let store = match fixture {
        Some(path) => InMemoryScheduleStore::from_json_path(path)?,
        None => InMemoryScheduleStore::from_json_str(STUDIO_FIXTURE)?,
    };
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use slot_allocator::allocation::{ScheduleReader, TermId};

    #[test]
    fn bundled_studio_parses() {
        let store = load_store(None).expect("studio fixture parses");
        assert_eq!(
            store.active_term().expect("read succeeds"),
            Some(TermId::new("2026-autumn"))
        );
        assert_eq!(store.time_slots().expect("read succeeds").len(), 3);
    }

    #[test]
    fn missing_fixture_is_an_io_error() {
        let result = load_store(Some(Path::new("does/not/exist.json")));
        assert!(matches!(result, Err(FixtureError::Io(_))));
    }
}
