// Dispatch results: what a handler produced, before rendering

use crate::error::Result;
use crate::view::View;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Model attributes exposed to a view.
pub type Model = BTreeMap<String, Value>;

/// A view, either by logical name or already resolved.
#[derive(Clone)]
pub enum ViewRef {
    /// Logical name, resolved through the view resolver chain at render time.
    Named(String),
    /// Concrete view; resolution is skipped.
    Resolved(Arc<dyn View>),
}

impl fmt::Debug for ViewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewRef::Named(name) => f.debug_tuple("Named").field(name).finish(),
            ViewRef::Resolved(view) => f.debug_tuple("Resolved").field(&view.name()).finish(),
        }
    }
}

/// Outcome of handling a request, prior to rendering.
///
/// Holding a [`ViewRef`] makes the "name or view" choice exclusive: setting
/// one replaces the other.
///
/// ```rust
/// use switchyard_core::DispatchResult;
///
/// let result = DispatchResult::view_name("users/show")
///     .with_attribute("id", 42)
///     .unwrap()
///     .with_status(201);
///
/// assert_eq!(result.view_name_str(), Some("users/show"));
/// assert_eq!(result.model()["id"], 42);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DispatchResult {
    view: Option<ViewRef>,
    model: Model,
    status: Option<u16>,
    cleared: bool,
}

impl DispatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// A result with no view and no model. Returned from an exception
    /// resolver, it means "handled, render nothing".
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn view_name(name: impl Into<String>) -> Self {
        Self {
            view: Some(ViewRef::Named(name.into())),
            ..Default::default()
        }
    }

    pub fn view(view: Arc<dyn View>) -> Self {
        Self {
            view: Some(ViewRef::Resolved(view)),
            ..Default::default()
        }
    }

    pub fn set_view_name(&mut self, name: impl Into<String>) {
        self.view = Some(ViewRef::Named(name.into()));
    }

    pub fn set_view(&mut self, view: Arc<dyn View>) {
        self.view = Some(ViewRef::Resolved(view));
    }

    /// Add a model attribute.
    pub fn with_attribute<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Result<Self> {
        self.add_attribute(key, value)?;
        Ok(self)
    }

    pub fn add_attribute<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        self.model.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.model.extend(model);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }

    /// Drop view and model and mark the result as needing no rendering.
    pub fn clear(&mut self) {
        self.view = None;
        self.model.clear();
        self.cleared = true;
    }

    pub fn view_ref(&self) -> Option<&ViewRef> {
        self.view.as_ref()
    }

    pub fn take_view(&mut self) -> Option<ViewRef> {
        self.view.take()
    }

    pub fn view_name_str(&self) -> Option<&str> {
        match &self.view {
            Some(ViewRef::Named(name)) => Some(name),
            _ => None,
        }
    }

    pub fn has_view(&self) -> bool {
        self.view.is_some()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// No view and no model.
    pub fn is_empty(&self) -> bool {
        self.view.is_none() && self.model.is_empty()
    }

    /// Cleared results are skipped by rendering.
    pub fn was_cleared(&self) -> bool {
        self.cleared && self.is_empty()
    }
}
