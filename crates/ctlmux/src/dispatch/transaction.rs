//! Object mappings held for the duration of one call.
//!
//! A [`Transaction`] collects the references taken while a request is being
//! prepared. It ends either with [`Transaction::abort`], which puts the table
//! back as it was, or with [`Transaction::commit`], which runs the
//! post-processing every completed call needs.

use std::sync::Arc;

use crate::error::DispatchError;
use crate::request::OpenArgument;
use crate::session::Session;
use crate::table::{ObjectRef, ObjectTable};
use crate::wire::ObjectId;

#[must_use = "a transaction must be committed or aborted"]
pub(crate) struct Transaction<'a> {
    table: &'a ObjectTable,
    session: &'a Arc<Session>,
    references: Vec<ObjectRef>,
    created: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) const fn begin(table: &'a ObjectTable, session: &'a Arc<Session>) -> Self {
        Self {
            table,
            session,
            references: Vec::new(),
            created: false,
        }
    }

    pub(crate) fn map(&mut self, ids: &[ObjectId], exclusive_first: bool) -> Result<(), DispatchError> {
        self.references = self.table.acquire_all(self.session, ids, exclusive_first)?;
        Ok(())
    }

    pub(crate) fn open(&mut self, open: OpenArgument) -> Result<(), DispatchError> {
        let created = self
            .table
            .create(self.session, open.type_tag, open.app_context)?;
        self.references.push(created);
        self.created = true;
        Ok(())
    }

    pub(crate) fn references(&self) -> &[ObjectRef] {
        &self.references
    }

    pub(crate) const fn created(&self) -> bool {
        self.created
    }

    /// Releases every mapping and destroys an object created for the call.
    pub(crate) fn abort(self) {
        let mut references = self.references;
        if self.created
            && let Some(created) = references.pop()
        {
            drop(self.table.destroy(created));
        }
        self.table.release_all(references);
    }

    /// Ends a call whose handler has run, returning the ids to reflect.
    ///
    /// For a destroying operation the single mapped object is removed.
    /// Otherwise every mapping is released and a created object survives.
    pub(crate) fn commit(self, destroys: bool) -> Vec<ObjectId> {
        let ids = self
            .references
            .iter()
            .map(ObjectRef::object_id)
            .collect();
        if destroys {
            for reference in self.references {
                drop(self.table.destroy(reference));
            }
        } else {
            self.table.release_all(self.references);
        }
        ids
    }
}
