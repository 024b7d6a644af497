#![forbid(unsafe_code)]

//! Connection-owning facade.
//!
//! [`TagStore`] runs every mutating call in its own `BEGIN IMMEDIATE`
//! transaction. The write lock is taken at `BEGIN`, which serializes slot
//! allocation across connections to the same file; any error drops the
//! transaction and rolls back every row the call touched.
//!
//! Definition changes bump the context epoch again after commit, so a session
//! on another connection that rebuilt its index from pre-commit rows while the
//! write was in flight does not keep it.

use std::path::Path;

use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

use crate::cache::Session;
use crate::catalog::{self, TagUsage};
use crate::codec::{self, DecodedTags};
use crate::context::TagContext;
use crate::error::Result;
use crate::options::TagOptions;
use crate::predicate::{self, HostTable, TagFilter, TagPredicate};
use crate::types::{BitmapRecord, TagDefinition, TagId, TargetId};
use crate::{allocator, mutation, record};

/// A SQLite connection bound to the tag tables.
pub struct TagStore {
    conn: Connection,
    ctx: TagContext,
}

impl TagStore {
    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>, opts: TagOptions) -> Result<Self> {
        let ctx = TagContext::new(&opts)?;
        let conn = Connection::open(path.as_ref())?;
        let mode: String = conn.pragma_update_and_check(
            None,
            "journal_mode",
            opts.journal_mode.pragma_value(),
            |row| row.get(0),
        )?;
        debug!(path = %path.as_ref().display(), journal_mode = %mode, "tags.store.open");
        Self::with_context(conn, &opts, ctx)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(opts: TagOptions) -> Result<Self> {
        let ctx = TagContext::new(&opts)?;
        Self::with_context(Connection::open_in_memory()?, &opts, ctx)
    }

    /// Adopts an existing connection, creating the tables if missing.
    pub fn from_connection(conn: Connection, opts: TagOptions) -> Result<Self> {
        let ctx = TagContext::new(&opts)?;
        Self::with_context(conn, &opts, ctx)
    }

    /// Adopts a connection with a shared context, so caches of every store
    /// built from `ctx` see each other's definition changes.
    pub fn with_context(conn: Connection, opts: &TagOptions, ctx: TagContext) -> Result<Self> {
        conn.busy_timeout(opts.busy_timeout())?;
        ctx.schema().create(&conn)?;
        Ok(Self { conn, ctx })
    }

    /// Shared context.
    pub fn context(&self) -> &TagContext {
        &self.ctx
    }

    /// Underlying connection, for host-table queries that embed a
    /// [`TagPredicate`].
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Starts a new access session with an empty cache.
    pub fn session(&self) -> Session {
        Session::new()
    }

    fn write<T>(&mut self, op: impl FnOnce(&Connection, &TagContext) -> Result<T>) -> Result<T> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = op(&tx, &self.ctx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Registers a tag in the first free slot.
    pub fn register_tag(&mut self, target_type: &str, name: &str) -> Result<TagDefinition> {
        let def = self.write(|conn, ctx| allocator::register_tag(conn, ctx, target_type, name))?;
        self.ctx.definitions_changed(target_type);
        Ok(def)
    }

    /// Clears a tag from every record and removes its definition.
    pub fn delete_tag(&mut self, target_type: &str, name: &str) -> Result<TagDefinition> {
        let def = self.write(|conn, ctx| allocator::delete_tag(conn, ctx, target_type, name))?;
        self.ctx.definitions_changed(target_type);
        Ok(def)
    }

    /// Renames a tag, keeping its slot.
    pub fn rename_tag(
        &mut self,
        target_type: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<TagDefinition> {
        let def = self.write(|conn, ctx| {
            allocator::rename_tag(conn, ctx, target_type, old_name, new_name)
        })?;
        self.ctx.definitions_changed(target_type);
        Ok(def)
    }

    /// Looks up one definition.
    pub fn find_tag(&self, target_type: &str, name: &str) -> Result<Option<TagDefinition>> {
        allocator::find_definition(&self.conn, &self.ctx, target_type, name)
    }

    /// Tags of a target type with usage counts.
    pub fn list_tags(&self, target_type: &str) -> Result<Vec<TagUsage>> {
        catalog::list_tags(&self.conn, &self.ctx, target_type)
    }

    /// Ids of the registered names among `names`.
    pub fn tag_ids_by_names<S: AsRef<str>>(
        &self,
        target_type: &str,
        names: &[S],
    ) -> Result<Vec<TagId>> {
        catalog::tag_ids_by_names(&self.conn, &self.ctx, target_type, names)
    }

    /// Names of the registered ids among `ids`.
    pub fn tag_names_by_ids(&self, target_type: &str, ids: &[TagId]) -> Result<Vec<String>> {
        catalog::tag_names_by_ids(&self.conn, &self.ctx, target_type, ids)
    }

    /// Loads a record, `NotFound` if the target was never tagged.
    pub fn get_record(&self, target_type: &str, target_id: TargetId) -> Result<BitmapRecord> {
        record::get_record(&self.conn, &self.ctx, target_type, target_id)
    }

    /// Creates an empty record unless one exists.
    pub fn create_record(&mut self, target_type: &str, target_id: TargetId) -> Result<BitmapRecord> {
        self.write(|conn, ctx| record::create_record(conn, ctx, target_type, target_id))
    }

    /// Removes a record entirely.
    pub fn purge_record(&mut self, target_type: &str, target_id: TargetId) -> Result<bool> {
        self.write(|conn, ctx| record::purge_record(conn, ctx, target_type, target_id))
    }

    /// Sets tags on one target.
    pub fn add_tags<S: AsRef<str>>(
        &mut self,
        target_type: &str,
        target_id: TargetId,
        names: &[S],
    ) -> Result<()> {
        self.write(|conn, ctx| mutation::add_tags(conn, ctx, target_type, target_id, names))
    }

    /// Clears tags on one target.
    pub fn remove_tags<S: AsRef<str>>(
        &mut self,
        target_type: &str,
        target_id: TargetId,
        names: &[S],
    ) -> Result<()> {
        self.write(|conn, ctx| mutation::remove_tags(conn, ctx, target_type, target_id, names))
    }

    /// Replaces the tag set of every listed target, atomically.
    pub fn set_tags_for_targets<S: AsRef<str>>(
        &mut self,
        target_type: &str,
        target_ids: &[TargetId],
        names: &[S],
    ) -> Result<usize> {
        self.write(|conn, ctx| {
            mutation::set_tags_for_targets(conn, ctx, target_type, target_ids, names)
        })
    }

    /// Zeroes the bitmaps of every listed target, atomically.
    pub fn clear_tags_for_targets(
        &mut self,
        target_type: &str,
        target_ids: &[TargetId],
    ) -> Result<usize> {
        self.write(|conn, ctx| mutation::clear_tags_for_targets(conn, ctx, target_type, target_ids))
    }

    /// Decodes the tags of one target through the session cache. A target
    /// without a record has no tags.
    pub fn tags_of(
        &self,
        session: &mut Session,
        target_type: &str,
        target_id: TargetId,
    ) -> Result<DecodedTags> {
        let Some(record) = record::find_record(&self.conn, &self.ctx, target_type, target_id)?
        else {
            return Ok(DecodedTags::default());
        };
        let index = session.resolve(&self.conn, &self.ctx, target_type)?;
        Ok(codec::decode(&record, &index))
    }

    /// Decodes several targets with one index resolution.
    pub fn tags_of_many(
        &self,
        session: &mut Session,
        target_type: &str,
        target_ids: &[TargetId],
    ) -> Result<Vec<(TargetId, DecodedTags)>> {
        let records = record::find_records(&self.conn, &self.ctx, target_type, target_ids)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let index = session.resolve(&self.conn, &self.ctx, target_type)?;
        Ok(records
            .iter()
            .map(|rec| (rec.target_id, codec::decode(rec, &index)))
            .collect())
    }

    /// Compiles a filter against a host table.
    pub fn build_filter(
        &self,
        target_type: &str,
        filter: &TagFilter,
        host: &HostTable,
    ) -> Result<TagPredicate> {
        predicate::build_filter(&self.conn, &self.ctx, target_type, filter, host)
    }

    /// Targets matching a filter.
    pub fn tagged_targets(&self, target_type: &str, filter: &TagFilter) -> Result<Vec<TargetId>> {
        catalog::tagged_targets(&self.conn, &self.ctx, target_type, filter)
    }
}
