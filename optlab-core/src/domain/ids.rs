use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a holding horizon (its maximum holding duration is configured separately).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HorizonId(pub u32);

impl fmt::Display for HorizonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

impl From<u32> for HorizonId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_id_display() {
        assert_eq!(HorizonId(10).to_string(), "h10");
    }

    #[test]
    fn horizon_id_serializes_as_plain_integer() {
        let json = serde_json::to_string(&HorizonId(5)).unwrap();
        assert_eq!(json, "5");
    }

    #[test]
    fn horizon_ids_order_numerically() {
        let mut ids = vec![HorizonId(30), HorizonId(5), HorizonId(10)];
        ids.sort();
        assert_eq!(ids, vec![HorizonId(5), HorizonId(10), HorizonId(30)]);
    }
}
