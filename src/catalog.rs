//! The CATALOG system table: the one bootstrap structure every other
//! table is discovered through.
//!
//! `CATALOG(name TEXT PRIMARY KEY, sql TEXT, engine_tag INT)` lives at a
//! fixed root page (the first page ever allocated, so it is always page 1)
//! and is replayed into an in-memory table directory on every open. Writes
//! to it go through `Catalog::create_table`/`drop_table` only; direct SQL
//! writes are rejected by the execution layer (`ExecError::CatalogProtected`)
//! even though nothing at the storage layer stops an internal caller doing
//! so -- that admin bypass is deliberately not reachable from SQL.

use crate::btree::BTree;
use crate::error::{DbError, ExecError, Result};
use crate::hashmap::OpenHashMap;
use crate::pager::Pager;
use crate::row::Row;
use crate::types::{key_type_for, PageId, Value, ValueKind};
use tracing::info;

pub const CATALOG_NAME: &str = "CATALOG";
const CATALOG_ROOT: PageId = PageId::new(1);

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ValueKind,
    pub not_null: bool,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: usize,
    pub root: PageId,
    pub sql: String,
}

impl TableSchema {
    pub fn key_kind(&self) -> ValueKind {
        self.columns[self.primary_key].kind
    }

    /// Kinds of every column *except* the primary key, in declaration
    /// order, matching the row codec used for this table's leaf values.
    pub fn value_kinds(&self) -> Vec<ValueKind> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.primary_key)
            .map(|(_, c)| c.kind)
            .collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Reassemble a full, schema-ordered row from a leaf cell's raw key and
    /// value bytes, splicing the primary key back into its declared position.
    pub fn decode_row(&self, key: &[u8], value: &[u8]) -> Vec<Value> {
        let mut key_pos = 0;
        let key_val = Value::decode(self.key_kind(), key, &mut key_pos);
        let value_row = Row::decode(&self.value_kinds(), value);
        let mut out = Vec::with_capacity(self.columns.len());
        let mut vi = 0;
        for i in 0..self.columns.len() {
            if i == self.primary_key {
                out.push(key_val.clone());
            } else {
                out.push(value_row.0[vi].clone());
                vi += 1;
            }
        }
        out
    }

    /// Split a full, schema-ordered row back into its on-disk key and
    /// value byte encodings.
    pub fn encode_row(&self, values: &[Value]) -> (Vec<u8>, Vec<u8>) {
        let key_type = key_type_for(self.key_kind());
        let mut key = Vec::new();
        key_type.serialize(&values[self.primary_key], &mut key);
        let value_row = Row(values
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.primary_key)
            .map(|(_, v)| v.clone())
            .collect());
        (key, value_row.encode())
    }
}

/// The in-memory table directory, replayed from the on-disk CATALOG tree
/// at open time and kept in sync with every `CREATE`/`DROP TABLE`.
pub struct Catalog {
    pager: Pager,
    catalog_tree: BTree,
    tables: OpenHashMap<String, TableSchema>,
}

impl Catalog {
    /// Open (or bootstrap, on a fresh database) the catalog.
    pub fn open(pager: Pager) -> Result<Self> {
        let is_fresh = pager.page_count() <= 1;
        let catalog_tree = if is_fresh {
            info!("bootstrapping a fresh CATALOG table");
            let tree = BTree::create(pager.clone(), ValueKind::Text)?;
            debug_assert_eq!(tree.root(), CATALOG_ROOT, "CATALOG must always be page 1");
            tree
        } else {
            BTree::load(pager.clone(), ValueKind::Text, CATALOG_ROOT)
        };

        let mut catalog = Self {
            pager,
            catalog_tree,
            tables: OpenHashMap::new(),
        };
        catalog.replay()?;
        Ok(catalog)
    }

    fn replay(&mut self) -> Result<()> {
        for (key, value) in self.catalog_tree.scan(None, None)? {
            let len = u32::from_le_bytes(key[0..4].try_into().unwrap()) as usize;
            let name = String::from_utf8_lossy(&key[4..4 + len]).into_owned();
            let row = Row::decode(&[ValueKind::Text, ValueKind::Int], &value);
            let (Value::Text(sql), Value::Int(engine_tag)) = (&row.0[0], &row.0[1]) else {
                return Err(DbError::corruption("malformed CATALOG row"));
            };
            let schema = crate::sql::parse_create_table(sql)
                .map_err(|e| DbError::corruption(format!("cannot replay catalog entry `{name}`: {e}")))?;
            let schema = TableSchema {
                root: PageId::new(*engine_tag as u32),
                sql: sql.clone(),
                ..schema
            };
            self.tables.insert(name, schema);
        }
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(&name.to_ascii_uppercase())
    }

    pub fn table_tree(&self, schema: &TableSchema) -> BTree {
        BTree::load(self.pager.clone(), schema.key_kind(), schema.root)
    }

    /// Create a table: allocate its tree, then record it in CATALOG. Used
    /// only by `CREATE TABLE`'s execution path, never reachable from a
    /// plain `INSERT`/`UPDATE` against CATALOG itself.
    pub fn create_table(&mut self, mut schema: TableSchema, sql: String) -> Result<()> {
        let key = schema.name.to_ascii_uppercase();
        if self.tables.contains_key(&key) {
            return Err(ExecError::TableExists(schema.name).into());
        }
        let tree = BTree::create(self.pager.clone(), schema.key_kind())?;
        schema.root = tree.root();
        schema.sql = sql;
        self.insert_system(&key, &schema)?;
        self.tables.insert(key, schema);
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> Result<bool> {
        let key = name.to_ascii_uppercase();
        let Some(schema) = self.tables.get(&key) else {
            return Ok(false);
        };
        let tree = self.table_tree(schema);
        tree.drop_all()?;
        self.remove_system(&key)?;
        self.tables.remove(&key);
        Ok(true)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Internal-only write path into CATALOG's own storage. Bypasses the
    /// `CatalogProtected` guard the SQL layer enforces for user statements.
    fn insert_system(&mut self, name: &str, schema: &TableSchema) -> Result<()> {
        let key_type = crate::types::key_type_for(ValueKind::Text);
        let mut key = Vec::new();
        key_type.serialize(&Value::Text(name.to_string()), &mut key);
        let row = Row(vec![
            Value::Text(schema.sql.clone()),
            Value::Int(schema.root.value() as i64),
        ]);
        self.catalog_tree.put(&key, &row.encode())
    }

    fn remove_system(&mut self, name: &str) -> Result<()> {
        let key_type = crate::types::key_type_for(ValueKind::Text);
        let mut key = Vec::new();
        key_type.serialize(&Value::Text(name.to_string()), &mut key);
        self.catalog_tree.delete(&key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_round_trips_through_replay() {
        let pager = Pager::open_mem(64).unwrap();
        let mut catalog = Catalog::open(pager.clone()).unwrap();
        let sql = "CREATE TABLE widgets (id INT PRIMARY KEY, name TEXT)".to_string();
        let schema = crate::sql::parse_create_table(&sql).unwrap();
        catalog.create_table(schema, sql).unwrap();
        assert!(catalog.table("widgets").is_some());

        let mut reopened = Catalog::open(pager).unwrap();
        let schema = reopened.table("WIDGETS").unwrap();
        assert_eq!(schema.columns.len(), 2);
    }

    #[test]
    fn drop_table_removes_it_from_the_directory() {
        let pager = Pager::open_mem(64).unwrap();
        let mut catalog = Catalog::open(pager).unwrap();
        let sql = "CREATE TABLE widgets (id INT PRIMARY KEY)".to_string();
        let schema = crate::sql::parse_create_table(&sql).unwrap();
        catalog.create_table(schema, sql).unwrap();
        assert!(catalog.drop_table("widgets").unwrap());
        assert!(catalog.table("widgets").is_none());
    }
}
