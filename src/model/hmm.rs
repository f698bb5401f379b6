//! HMM topology and the HMM registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::model::senone::SenoneSequence;
use crate::model::unit::{HmmPosition, Unit};

/// A senone-backed HMM: a unit, its emitting-state senone sequence, a tied
/// transition matrix, and a word position.
#[derive(Debug, Clone)]
pub struct SenoneHmm {
    unit: Arc<Unit>,
    senone_sequence: Arc<SenoneSequence>,
    /// Index of the tied transition matrix in the transition pool.
    transition_matrix_id: u32,
    position: HmmPosition,
}

impl SenoneHmm {
    /// Assemble an HMM.
    pub fn new(
        unit: Arc<Unit>,
        senone_sequence: Arc<SenoneSequence>,
        transition_matrix_id: u32,
        position: HmmPosition,
    ) -> Self {
        Self {
            unit,
            senone_sequence,
            transition_matrix_id,
            position,
        }
    }

    /// The unit this HMM models.
    pub fn unit(&self) -> &Arc<Unit> {
        &self.unit
    }

    /// The senone sequence of the emitting states.
    pub fn senone_sequence(&self) -> &Arc<SenoneSequence> {
        &self.senone_sequence
    }

    /// Index of the tied transition matrix in the transition pool.
    pub fn transition_matrix_id(&self) -> u32 {
        self.transition_matrix_id
    }

    /// Word position of this HMM.
    pub fn position(&self) -> HmmPosition {
        self.position
    }
}

/// Registry of HMMs keyed by `(position, unit)`.
#[derive(Debug, Default)]
pub struct HmmManager {
    hmms: HashMap<(HmmPosition, Unit), Arc<SenoneHmm>>,
}

impl HmmManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an HMM under its own position and unit.
    pub fn put(&mut self, hmm: Arc<SenoneHmm>) {
        let key = (hmm.position(), hmm.unit().as_ref().clone());
        self.hmms.insert(key, hmm);
    }

    /// Look up the HMM for a position and unit.
    pub fn get(&self, position: HmmPosition, unit: &Unit) -> Option<&Arc<SenoneHmm>> {
        self.hmms.get(&(position, unit.clone()))
    }

    /// Number of registered HMMs.
    pub fn len(&self) -> usize {
        self.hmms.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.hmms.is_empty()
    }

    /// Iterate over all registered HMMs.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SenoneHmm>> {
        self.hmms.values()
    }

    /// Log the registry size at info level.
    pub fn log_info(&self) {
        info!("HMM Manager: {} hmms", self.hmms.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get_by_position_and_unit() {
        let mut manager = HmmManager::new();
        let unit = Arc::new(Unit::new("AX", false));
        let ss = SenoneSequence::new(vec![0, 1, 2]);
        manager.put(Arc::new(SenoneHmm::new(
            unit.clone(),
            ss,
            0,
            HmmPosition::Undefined,
        )));

        assert_eq!(manager.len(), 1);
        let found = manager.get(HmmPosition::Undefined, &unit).unwrap();
        assert_eq!(found.unit().name(), "AX");
        assert!(manager.get(HmmPosition::Begin, &unit).is_none());
    }

    #[test]
    fn test_silence_lookup() {
        let mut manager = HmmManager::new();
        let sil = Arc::new(Unit::silence());
        let ss = SenoneSequence::new(vec![0, 1, 2]);
        manager.put(Arc::new(SenoneHmm::new(
            sil,
            ss,
            0,
            HmmPosition::Undefined,
        )));
        assert!(manager
            .get(HmmPosition::Undefined, &Unit::silence())
            .is_some());
    }
}
