//! In-memory structured data: store kinds (entities of named properties) and
//! warehouse tables.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use dlpkit_core::{DomainResult, ProjectId, Table};

/// One stored entity: property name → string value.
pub type Entity = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KindKey {
    project: ProjectId,
    namespace: Option<String>,
    kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TableKey {
    project: ProjectId,
    dataset: String,
    table: String,
}

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    kinds: RwLock<HashMap<KindKey, Vec<Entity>>>,
    tables: RwLock<HashMap<TableKey, Table>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entity to a kind, creating the kind on first use.
    pub fn put_entity(
        &self,
        project: &ProjectId,
        namespace: Option<&str>,
        kind: &str,
        entity: Entity,
    ) {
        let key = KindKey {
            project: project.clone(),
            namespace: namespace.map(str::to_string),
            kind: kind.to_string(),
        };
        self.kinds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push(entity);
    }

    /// Entities of a kind in insertion order, or `None` if the kind was never written.
    pub fn entities(
        &self,
        project: &ProjectId,
        namespace: Option<&str>,
        kind: &str,
    ) -> Option<Vec<Entity>> {
        let key = KindKey {
            project: project.clone(),
            namespace: namespace.map(str::to_string),
            kind: kind.to_string(),
        };
        self.kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Entities of a kind flattened into a table: headers are the union of
    /// property names (sorted); missing properties become empty cells.
    pub fn kind_as_table(
        &self,
        project: &ProjectId,
        namespace: Option<&str>,
        kind: &str,
    ) -> Option<DomainResult<Table>> {
        let entities = self.entities(project, namespace, kind)?;

        let mut headers: Vec<String> = entities
            .iter()
            .flat_map(|e| e.keys().cloned())
            .collect();
        headers.sort();
        headers.dedup();

        let rows = entities
            .iter()
            .map(|entity| {
                headers
                    .iter()
                    .map(|h| entity.get(h).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        Some(Table::new(headers, rows))
    }

    pub fn put_table(&self, project: &ProjectId, dataset: &str, table_name: &str, table: Table) {
        let key = TableKey {
            project: project.clone(),
            dataset: dataset.to_string(),
            table: table_name.to_string(),
        };
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, table);
    }

    pub fn table(&self, project: &ProjectId, dataset: &str, table_name: &str) -> Option<Table> {
        let key = TableKey {
            project: project.clone(),
            dataset: dataset.to_string(),
            table: table_name.to_string(),
        };
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }
}
