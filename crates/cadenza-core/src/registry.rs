//! Caller-owned collection of editors.
//!
//! A host that edits several scores at once keeps one [`EngineRegistry`]
//! and addresses editors by [`EditorId`]. There is no global instance.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::editor::ScoreEditor;
use crate::{CoreError, CoreResult};

/// Unique identifier for an editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditorId(Uuid);

impl EditorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EditorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EditorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Editors by ID, in creation order, with one of them active.
#[derive(Debug, Default)]
pub struct EngineRegistry {
    editors: HashMap<EditorId, ScoreEditor>,
    order: Vec<EditorId>,
    active: Option<EditorId>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an editor and makes it active.
    pub fn create(&mut self, editor: ScoreEditor) -> EditorId {
        let id = EditorId::new();
        self.editors.insert(id, editor);
        self.order.push(id);
        self.active = Some(id);
        tracing::info!("Registered editor {}", id);
        id
    }

    /// Removes an editor and hands it back.
    pub fn destroy(&mut self, id: EditorId) -> CoreResult<ScoreEditor> {
        let editor = self
            .editors
            .remove(&id)
            .ok_or(CoreError::EditorNotFound(id))?;
        self.order.retain(|&i| i != id);
        if self.active == Some(id) {
            self.active = self.order.last().copied();
        }
        tracing::info!("Destroyed editor {}", id);
        Ok(editor)
    }

    pub fn get(&self, id: EditorId) -> Option<&ScoreEditor> {
        self.editors.get(&id)
    }

    pub fn get_mut(&mut self, id: EditorId) -> Option<&mut ScoreEditor> {
        self.editors.get_mut(&id)
    }

    pub fn active_id(&self) -> Option<EditorId> {
        self.active
    }

    pub fn active(&self) -> Option<&ScoreEditor> {
        self.active.and_then(|id| self.editors.get(&id))
    }

    pub fn active_mut(&mut self) -> Option<&mut ScoreEditor> {
        self.active.and_then(|id| self.editors.get_mut(&id))
    }

    pub fn set_active(&mut self, id: EditorId) -> CoreResult<()> {
        if !self.editors.contains_key(&id) {
            return Err(CoreError::EditorNotFound(id));
        }
        self.active = Some(id);
        Ok(())
    }

    /// Editor IDs in creation order.
    pub fn ids(&self) -> &[EditorId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.editors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.editors.is_empty()
    }
}
