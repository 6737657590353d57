/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A single row as exchanged with the persistence engine
pub type Row = Map<String, Value>;

/// Engine actions routed through the interceptor
/// Used by the hook registry keys, the interceptor and the query builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,
    FindMany,
    FindFirst,
    FindUnique,
    Count,
}

impl Operation {
    /// Action name as understood by the engine
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::CreateMany => "createMany",
            Operation::Update => "update",
            Operation::UpdateMany => "updateMany",
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
            Operation::DeleteMany => "deleteMany",
            Operation::FindMany => "findMany",
            Operation::FindFirst => "findFirst",
            Operation::FindUnique => "findUnique",
            Operation::Count => "count",
        }
    }

    /// Mutating operations go through the full hook pipeline
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::Create
                | Operation::CreateMany
                | Operation::Update
                | Operation::UpdateMany
                | Operation::Upsert
                | Operation::Delete
                | Operation::DeleteMany
        )
    }

    /// Update-class operations are the only ones that get column diffing
    pub fn is_update(&self) -> bool {
        matches!(self, Operation::Update | Operation::UpdateMany | Operation::Upsert)
    }

    /// Bulk operations return a count rather than the affected row
    pub fn is_bulk(&self) -> bool {
        matches!(
            self,
            Operation::CreateMany | Operation::UpdateMany | Operation::DeleteMany
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a hook runs relative to the engine call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    Before,
    After,
}

/// Interceptor phases in execution order - synchronous (caller waits) and detached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    /// Load rows relevant to column hooks
    PreImage = 0,
    /// Veto / validation gate
    Before = 1,
    /// The real engine call
    Execute = 2,
    /// Post-image correlation and column hooks (detached)
    ColumnDiff = 3,
    /// Observational hooks (detached)
    After = 4,
}

impl Phase {
    /// Check if the caller waits on this phase
    pub fn is_synchronous(&self) -> bool {
        (*self as u8) <= 2
    }

    /// Check if this phase runs detached from the caller
    pub fn is_detached(&self) -> bool {
        (*self as u8) >= 3
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::PreImage => "pre_image",
            Phase::Before => "before",
            Phase::Execute => "execute",
            Phase::ColumnDiff => "column_diff",
            Phase::After => "after",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_classes() {
        assert!(Operation::UpdateMany.is_update());
        assert!(Operation::Upsert.is_update());
        assert!(!Operation::Create.is_update());
        assert!(Operation::DeleteMany.is_bulk());
        assert!(!Operation::FindMany.is_mutating());
        assert_eq!(Operation::CreateMany.to_string(), "createMany");
    }

    #[test]
    fn test_phase_sync_split() {
        assert!(Phase::Before.is_synchronous());
        assert!(Phase::Execute.is_synchronous());
        assert!(Phase::After.is_detached());
        assert!(Phase::ColumnDiff.is_detached());
    }
}
