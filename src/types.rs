use std::fmt;

pub type Key = u64;
pub type Value = i64;
pub type TxnId = u64;

/// Concurrency-control discipline, selected once at engine startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CcMode {
    /// Serial transaction execution (no concurrency).
    Serial,
    /// Two-phase-style locking with exclusive locks only.
    LockingExclusiveOnly,
    /// Two-phase-style locking with shared and exclusive locks.
    Locking,
    /// Optimistic concurrency control with serial validation.
    Occ,
    /// Optimistic concurrency control with parallel validation.
    POcc,
    /// Multi-version timestamp ordering.
    Mvcc,
}

impl CcMode {
    pub const ALL: [CcMode; 6] = [
        CcMode::Serial,
        CcMode::LockingExclusiveOnly,
        CcMode::Locking,
        CcMode::Occ,
        CcMode::POcc,
        CcMode::Mvcc,
    ];
}

impl fmt::Display for CcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CcMode::Serial => "Serial",
            CcMode::LockingExclusiveOnly => "Locking A",
            CcMode::Locking => "Locking B",
            CcMode::Occ => "OCC",
            CcMode::POcc => "OCC-P",
            CcMode::Mvcc => "MVCC",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names() {
        assert_eq!(CcMode::LockingExclusiveOnly.to_string(), "Locking A");
        assert_eq!(CcMode::POcc.to_string(), "OCC-P");
        assert_eq!(CcMode::ALL.len(), 6);
    }
}
