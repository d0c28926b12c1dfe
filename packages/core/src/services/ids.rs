//! Random threshold identifiers.

use uuid::Uuid;

use crate::thresholds::{IdGenerator, ThresholdId};

/// Hands out UUID v4 ids in their hyphenated form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> ThresholdId {
        ThresholdId::from_uuid(Uuid::new_v4())
    }
}
