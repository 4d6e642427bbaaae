use crate::domain::models::RepeatInstanceState;

/// Completion overrides for single occurrences of recurring events.
///
/// The collection stays small (tens to a few hundred records), so lookups are
/// linear scans over the backing vector, which is also the persisted shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceStateStore {
    states: Vec<RepeatInstanceState>,
}

impl InstanceStateStore {
    /// Builds a store from persisted records. Later duplicates of a key win.
    pub fn from_records(records: Vec<RepeatInstanceState>) -> Self {
        let mut store = Self::default();
        for record in records {
            store.set(&record.event_id, &record.instance_date, record.completed);
        }
        store
    }

    pub fn get(&self, event_id: &str, instance_date: &str) -> Option<bool> {
        self.states
            .iter()
            .find(|state| state.event_id == event_id && state.instance_date == instance_date)
            .map(|state| state.completed)
    }

    pub fn set(&mut self, event_id: &str, instance_date: &str, completed: bool) {
        match self
            .states
            .iter_mut()
            .find(|state| state.event_id == event_id && state.instance_date == instance_date)
        {
            Some(existing) => existing.completed = completed,
            None => self.states.push(RepeatInstanceState {
                event_id: event_id.to_string(),
                instance_date: instance_date.to_string(),
                completed,
            }),
        }
    }

    /// Removes every override owned by `event_id` and returns how many went.
    pub fn delete_all_for_event(&mut self, event_id: &str) -> usize {
        let before = self.states.len();
        self.states.retain(|state| state.event_id != event_id);
        before - self.states.len()
    }

    /// Drops the overrides of `event_id` whose date fails `keep`.
    pub fn retain_for_event(&mut self, event_id: &str, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.states.len();
        self.states
            .retain(|state| state.event_id != event_id || keep(&state.instance_date));
        before - self.states.len()
    }

    pub fn records(&self) -> &[RepeatInstanceState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn retain_for_event_leaves_other_events_alone() {
        let mut store = InstanceStateStore::default();
        store.set("a", "2024-01-02", true);
        store.set("a", "2024-01-03", true);
        store.set("b", "2024-01-02", true);

        let removed = store.retain_for_event("a", |date| date == "2024-01-03");

        assert_eq!(removed, 1);
        assert_eq!(store.get("a", "2024-01-02"), None);
        assert_eq!(store.get("a", "2024-01-03"), Some(true));
        assert_eq!(store.get("b", "2024-01-02"), Some(true));
    }

    #[test]
    fn set_upserts_by_composite_key() {
        let mut store = InstanceStateStore::default();
        store.set("a", "2024-01-15", true);
        store.set("a", "2024-01-15", false);
        store.set("a", "2024-01-22", true);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a", "2024-01-15"), Some(false));
        assert_eq!(store.get("a", "2024-01-22"), Some(true));
        assert_eq!(store.get("b", "2024-01-15"), None);
    }

    #[test]
    fn delete_all_for_event_only_touches_that_event() {
        let mut store = InstanceStateStore::default();
        store.set("a", "2024-01-15", true);
        store.set("a", "2024-01-22", true);
        store.set("b", "2024-01-15", true);

        assert_eq!(store.delete_all_for_event("a"), 2);
        assert_eq!(store.get("a", "2024-01-15"), None);
        assert_eq!(store.get("b", "2024-01-15"), Some(true));
        assert_eq!(store.delete_all_for_event("a"), 0);
    }

    #[test]
    fn from_records_collapses_duplicate_keys() {
        let store = InstanceStateStore::from_records(vec![
            RepeatInstanceState {
                event_id: "a".to_string(),
                instance_date: "2024-01-15".to_string(),
                completed: true,
            },
            RepeatInstanceState {
                event_id: "a".to_string(),
                instance_date: "2024-01-15".to_string(),
                completed: false,
            },
        ]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a", "2024-01-15"), Some(false));
    }

    proptest! {
        #[test]
        fn toggling_one_date_leaves_other_dates_alone(
            first_day in 1u32..28,
            second_day in 1u32..28,
            completed in any::<bool>(),
        ) {
            prop_assume!(first_day != second_day);
            let first = format!("2024-01-{first_day:02}");
            let second = format!("2024-01-{second_day:02}");
            let mut store = InstanceStateStore::default();
            store.set("a", &second, !completed);

            store.set("a", &first, completed);

            prop_assert_eq!(store.get("a", &first), Some(completed));
            prop_assert_eq!(store.get("a", &second), Some(!completed));
        }
    }
}
