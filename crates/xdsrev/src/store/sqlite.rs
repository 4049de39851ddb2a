//! SQLite-backed [`RecordStore`].
//!
//! Every record lives in a single `records` table keyed by
//! `(kind, namespace, name)` with its JSON body. The node id, version,
//! controlling owner uid and published flag are copied into indexed columns
//! for lookups.
//! All access is serialized through a `Mutex<Connection>`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::api::{DesiredConfig, ObjectKey, Revision};

use super::error::{Result, StoreError};
use super::{migrations, Change, Record, RecordStore, StoreEvent};

const EVENT_CAPACITY: usize = 1024;

enum Filter<'a> {
    All,
    Node(&'a str),
    NodeVersion(&'a str, &'a str),
    Owner(&'a str),
    Published,
}

#[derive(Clone, Copy)]
enum WriteMode {
    /// Spec and metadata from the caller, status from the stored record.
    Spec,
    /// Status from the caller, everything else from the stored record.
    Status,
}

/// Thread-safe store handle. Cloning is cheap and clones share the
/// connection and the event channel.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    events: broadcast::Sender<StoreEvent>,
}

impl SqliteStore {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        migrations::run_all(&mut conn)?;

        log::info!("Record store opened at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// Opens an in-memory database. Runs all migrations.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrations::run_all(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            conn: Arc::new(Mutex::new(conn)),
            events,
        }
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    fn publish<T: Record>(&self, old: Option<T>, new: Option<T>) {
        // No subscribers is fine
        let _ = self.events.send(T::event(Change { old, new }));
    }

    fn get_record<T: Record>(&self, key: &ObjectKey) -> Result<Option<T>> {
        self.with_conn(|conn| read_one::<T>(conn, key))
    }

    fn list_records<T: Record>(&self, filter: Filter<'_>) -> Result<Vec<T>> {
        let kind = T::KIND.to_string();
        let (sql, args): (&str, Vec<&str>) = match filter {
            Filter::All => (
                "SELECT body FROM records WHERE kind = ?1 ORDER BY namespace, name",
                vec![],
            ),
            Filter::Node(node_id) => (
                "SELECT body FROM records WHERE kind = ?1 AND node_id = ?2
                 ORDER BY namespace, name",
                vec![node_id],
            ),
            Filter::NodeVersion(node_id, version) => (
                "SELECT body FROM records WHERE kind = ?1 AND node_id = ?2 AND version = ?3
                 ORDER BY namespace, name",
                vec![node_id, version],
            ),
            Filter::Owner(uid) => (
                "SELECT body FROM records WHERE kind = ?1 AND owner_uid = ?2
                 ORDER BY namespace, name",
                vec![uid],
            ),
            Filter::Published => (
                "SELECT body FROM records WHERE kind = ?1 AND published = 1
                 ORDER BY namespace, name",
                vec![],
            ),
        };

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(
                params_from_iter(std::iter::once(kind.as_str()).chain(args)),
                |r| r.get::<_, String>(0),
            )?;
            let mut records = Vec::new();
            for body in rows {
                records.push(serde_json::from_str(&body?)?);
            }
            Ok(records)
        })
    }

    fn create_record<T: Record>(&self, mut record: T) -> Result<T> {
        let key = record.meta().key();
        let created = self.with_conn(|conn| {
            if read_one::<T>(conn, &key)?.is_some() {
                return Err(StoreError::AlreadyExists {
                    kind: T::KIND,
                    key: key.clone(),
                });
            }
            let meta = record.meta_mut();
            meta.uid = Uuid::new_v4().to_string();
            meta.generation = 1;
            meta.resource_version = 1;
            meta.creation_timestamp = Some(Utc::now());
            meta.deletion_timestamp = None;
            store_row(conn, &record)?;
            Ok(record)
        })?;

        log::debug!("Created {} {}", T::KIND, key);
        self.publish::<T>(None, Some(created.clone()));
        Ok(created)
    }

    fn write_record<T: Record>(&self, record: &T, mode: WriteMode) -> Result<T> {
        let key = record.meta().key();
        let (old, new, removed) = self.with_conn(|conn| {
            let current: T = read_one(conn, &key)?.ok_or_else(|| StoreError::NotFound {
                kind: T::KIND,
                key: key.clone(),
            })?;

            let expected = record.meta().resource_version;
            let actual = current.meta().resource_version;
            if expected != actual {
                return Err(StoreError::Conflict {
                    kind: T::KIND,
                    key: key.clone(),
                    expected,
                    actual,
                });
            }

            let mut next = match mode {
                WriteMode::Spec => {
                    let mut next = record.clone();
                    next.take_status_from(&current);
                    let spec_changed = next.spec_json()? != current.spec_json()?;
                    let stored = current.meta();
                    let meta = next.meta_mut();
                    meta.uid = stored.uid.clone();
                    meta.creation_timestamp = stored.creation_timestamp;
                    meta.deletion_timestamp = stored.deletion_timestamp;
                    meta.generation = if spec_changed {
                        stored.generation + 1
                    } else {
                        stored.generation
                    };
                    next
                }
                WriteMode::Status => {
                    let mut next = current.clone();
                    next.take_status_from(record);
                    next
                }
            };
            next.meta_mut().resource_version = actual + 1;

            let removed = next.meta().is_deleting() && next.meta().finalizers.is_empty();
            if removed {
                delete_row::<T>(conn, &key)?;
            } else {
                store_row(conn, &next)?;
            }
            Ok((current, next, removed))
        })?;

        if removed {
            log::debug!("Removed {} {} after its last finalizer", T::KIND, key);
            self.publish(Some(old), None);
        } else {
            self.publish(Some(old), Some(new.clone()));
        }
        Ok(new)
    }

    fn delete_record<T: Record>(&self, key: &ObjectKey) -> Result<()> {
        let change: Option<(T, Option<T>)> = self.with_conn(|conn| {
            let current: T = read_one(conn, key)?.ok_or_else(|| StoreError::NotFound {
                kind: T::KIND,
                key: key.clone(),
            })?;

            if current.meta().finalizers.is_empty() {
                delete_row::<T>(conn, key)?;
                return Ok(Some((current, None)));
            }
            if current.meta().is_deleting() {
                return Ok(None);
            }

            let mut next = current.clone();
            let meta = next.meta_mut();
            meta.deletion_timestamp = Some(Utc::now());
            meta.resource_version += 1;
            store_row(conn, &next)?;
            Ok(Some((current, Some(next))))
        })?;

        if let Some((old, new)) = change {
            match &new {
                Some(_) => log::debug!("Marked {} {} for deletion", T::KIND, key),
                None => log::debug!("Deleted {} {}", T::KIND, key),
            }
            self.publish(Some(old), new);
        }
        Ok(())
    }
}

fn read_one<T: Record>(conn: &Connection, key: &ObjectKey) -> Result<Option<T>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM records WHERE kind = ?1 AND namespace = ?2 AND name = ?3",
            params![T::KIND.to_string(), key.namespace, key.name],
            |r| r.get(0),
        )
        .optional()?;
    Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
}

fn store_row<T: Record>(conn: &Connection, record: &T) -> Result<()> {
    let meta = record.meta();
    let body = serde_json::to_string(record)?;
    conn.execute(
        "INSERT OR REPLACE INTO records
         (kind, namespace, name, uid, node_id, version, owner_uid, published,
          resource_version, body, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            T::KIND.to_string(),
            meta.namespace,
            meta.name,
            meta.uid,
            record.index_node_id(),
            record.index_version(),
            meta.controller_owner().map(|o| o.uid.as_str()),
            record.index_published(),
            meta.resource_version as i64,
            body,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn delete_row<T: Record>(conn: &Connection, key: &ObjectKey) -> Result<()> {
    conn.execute(
        "DELETE FROM records WHERE kind = ?1 AND namespace = ?2 AND name = ?3",
        params![T::KIND.to_string(), key.namespace, key.name],
    )?;
    Ok(())
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get_config(&self, key: &ObjectKey) -> Result<Option<DesiredConfig>> {
        self.get_record(key)
    }

    async fn list_configs(&self) -> Result<Vec<DesiredConfig>> {
        self.list_records(Filter::All)
    }

    async fn list_configs_for_node(&self, node_id: &str) -> Result<Vec<DesiredConfig>> {
        self.list_records(Filter::Node(node_id))
    }

    async fn create_config(&self, config: DesiredConfig) -> Result<DesiredConfig> {
        self.create_record(config)
    }

    async fn update_config(&self, config: DesiredConfig) -> Result<DesiredConfig> {
        self.write_record(&config, WriteMode::Spec)
    }

    async fn update_config_status(&self, config: &DesiredConfig) -> Result<DesiredConfig> {
        self.write_record(config, WriteMode::Status)
    }

    async fn delete_config(&self, key: &ObjectKey) -> Result<()> {
        self.delete_record::<DesiredConfig>(key)
    }

    async fn get_revision(&self, key: &ObjectKey) -> Result<Option<Revision>> {
        self.get_record(key)
    }

    async fn list_revisions(&self) -> Result<Vec<Revision>> {
        self.list_records(Filter::All)
    }

    async fn list_revisions_for_node(&self, node_id: &str) -> Result<Vec<Revision>> {
        self.list_records(Filter::Node(node_id))
    }

    async fn find_revisions(&self, node_id: &str, version: &str) -> Result<Vec<Revision>> {
        self.list_records(Filter::NodeVersion(node_id, version))
    }

    async fn list_owned_revisions(&self, owner_uid: &str) -> Result<Vec<Revision>> {
        self.list_records(Filter::Owner(owner_uid))
    }

    async fn list_published_revisions(&self) -> Result<Vec<Revision>> {
        self.list_records(Filter::Published)
    }

    async fn create_revision(&self, revision: Revision) -> Result<Revision> {
        self.create_record(revision)
    }

    async fn update_revision_status(&self, revision: &Revision) -> Result<Revision> {
        self.write_record(revision, WriteMode::Status)
    }

    async fn delete_revision(&self, key: &ObjectKey) -> Result<()> {
        self.delete_record::<Revision>(key)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        CacheState, DesiredConfigSpec, EnvoyResource, EnvoyResources, SNAPSHOT_FINALIZER,
    };

    fn config(name: &str, node_id: &str) -> DesiredConfig {
        DesiredConfig::desired(
            "default",
            name,
            DesiredConfigSpec {
                node_id: node_id.into(),
                resources: EnvoyResources {
                    endpoints: vec![EnvoyResource::new("e1", r#"{"cluster_name":"e1"}"#)],
                    ..Default::default()
                },
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_create_assigns_identity() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store.create_config(config("c1", "node1")).await.unwrap();

        assert!(!created.metadata.uid.is_empty());
        assert_eq!(created.metadata.generation, 1);
        assert_eq!(created.metadata.resource_version, 1);
        assert!(created.metadata.creation_timestamp.is_some());

        let fetched = store.get_config(&created.key()).await.unwrap().unwrap();
        assert_eq!(fetched, created);

        let err = store.create_config(config("c1", "node1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store.create_config(config("c1", "node1")).await.unwrap();

        let mut first = created.clone();
        first.status.cache_state = Some(CacheState::InSync);
        store.update_config_status(&first).await.unwrap();

        let mut stale = created;
        stale.status.cache_state = Some(CacheState::Rollback);
        let err = store.update_config_status(&stale).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_generation_moves_only_on_spec_change() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store.create_config(config("c1", "node1")).await.unwrap();

        let mut with_finalizer = created.clone();
        with_finalizer.metadata.add_finalizer(SNAPSHOT_FINALIZER);
        let updated = store.update_config(with_finalizer).await.unwrap();
        assert_eq!(updated.metadata.generation, 1);
        assert_eq!(updated.metadata.resource_version, 2);

        let mut status_only = updated.clone();
        status_only.status.desired_version = Some("abc".into());
        let updated = store.update_config_status(&status_only).await.unwrap();
        assert_eq!(updated.metadata.generation, 1);

        let mut spec_change = updated.clone();
        spec_change.spec.resources.clusters = vec![EnvoyResource::new("c1", r#"{"name":"c1"}"#)];
        let updated = store.update_config(spec_change).await.unwrap();
        assert_eq!(updated.metadata.generation, 2);
        // Spec writes keep the stored status
        assert_eq!(updated.status.desired_version.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_status_write_ignores_spec() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store.create_config(config("c1", "node1")).await.unwrap();

        let mut edited = created.clone();
        edited.spec.node_id = "node2".into();
        edited.status.published_version = Some("v1".into());
        let updated = store.update_config_status(&edited).await.unwrap();

        assert_eq!(updated.spec.node_id, "node1");
        assert_eq!(updated.status.published_version.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_delete_honours_finalizers() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut created = store.create_config(config("c1", "node1")).await.unwrap();
        created.metadata.add_finalizer(SNAPSHOT_FINALIZER);
        let created = store.update_config(created).await.unwrap();
        let key = created.key();

        store.delete_config(&key).await.unwrap();
        let deleting = store.get_config(&key).await.unwrap().unwrap();
        assert!(deleting.metadata.is_deleting());

        // A second delete is a no-op while finalizers remain
        store.delete_config(&key).await.unwrap();

        let mut finalized = deleting;
        finalized.metadata.remove_finalizer(SNAPSHOT_FINALIZER);
        store.update_config(finalized).await.unwrap();
        assert!(store.get_config(&key).await.unwrap().is_none());

        let err = store.delete_config(&key).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_revision_lookups() {
        let store = SqliteStore::open_in_memory().unwrap();
        let owner = store.create_config(config("c1", "node1")).await.unwrap();
        let other = store.create_config(config("c2", "node2")).await.unwrap();

        store
            .create_revision(Revision::for_config(&owner, "v1"))
            .await
            .unwrap();
        store
            .create_revision(Revision::for_config(&owner, "v2"))
            .await
            .unwrap();
        store
            .create_revision(Revision::for_config(&other, "v1"))
            .await
            .unwrap();

        assert_eq!(store.list_revisions().await.unwrap().len(), 3);
        assert_eq!(
            store.list_revisions_for_node("node1").await.unwrap().len(),
            2
        );
        let found = store.find_revisions("node1", "v2").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "c1-v2");
        assert_eq!(
            store
                .list_owned_revisions(&owner.metadata.uid)
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(store.list_configs_for_node("node2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_published_index_follows_status() {
        use crate::api::conditions::{set_condition, Condition, ConditionStatus, REVISION_PUBLISHED};

        let store = SqliteStore::open_in_memory().unwrap();
        let owner = store.create_config(config("c1", "node1")).await.unwrap();
        let v1 = store
            .create_revision(Revision::for_config(&owner, "v1"))
            .await
            .unwrap();
        store
            .create_revision(Revision::for_config(&owner, "v2"))
            .await
            .unwrap();
        assert!(store.list_published_revisions().await.unwrap().is_empty());

        let mut next = v1.clone();
        set_condition(
            &mut next.status.conditions,
            Condition::new(REVISION_PUBLISHED, ConditionStatus::True, "Published", ""),
        );
        let published = store.update_revision_status(&next).await.unwrap();
        let listed = store.list_published_revisions().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name(), "c1-v1");

        let mut next = published.clone();
        set_condition(
            &mut next.status.conditions,
            Condition::new(REVISION_PUBLISHED, ConditionStatus::False, "Superseded", ""),
        );
        store.update_revision_status(&next).await.unwrap();
        assert!(store.list_published_revisions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut rx = store.subscribe();

        let created = store.create_config(config("c1", "node1")).await.unwrap();
        store.delete_config(&created.key()).await.unwrap();

        match rx.try_recv().unwrap() {
            StoreEvent::DesiredConfig(change) => {
                assert!(change.old.is_none());
                assert_eq!(change.key(), Some(created.key()));
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.try_recv().unwrap() {
            StoreEvent::DesiredConfig(change) => {
                assert!(change.old.is_some());
                assert!(change.new.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_open_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("xdsrev.db");
        let store = SqliteStore::open(&path).unwrap();
        store
            .with_conn(|conn| {
                let count: u32 =
                    conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?;
                assert!(count > 0);
                Ok(())
            })
            .unwrap();
        assert!(path.exists());
    }
}
