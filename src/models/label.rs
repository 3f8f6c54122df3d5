use std::sync::OnceLock;

use jiff::Timestamp;
use regex::Regex;
use serde::Serialize;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::EntityKind;
use crate::models::tracking::{Aggregate, Tracking, content_etag};
use crate::models::{LabelId, Owned, Owner};

fn color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^#[0-9A-F]{6}$").expect("color pattern is valid"))
}

/// Uppercases a `#rrggbb` color. Anything else is returned trimmed and left
/// for validation to reject.
pub fn normalize_color(color: &str) -> String {
    color.trim().to_ascii_uppercase()
}

/// A tag attached to subscriptions and providers.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct Label {
    pub(crate) id: LabelId,
    pub(crate) owner: Owner,
    #[validate(length(min = 1, max = 100, message = "Label name must be between 1 and 100 characters"))]
    pub(crate) name: String,
    pub(crate) color: String,
    pub(crate) key: Option<String>,
    pub(crate) created_at: Timestamp,
    pub(crate) updated_at: Timestamp,
    #[serde(skip)]
    pub(crate) tracking: Tracking,
}

impl Label {
    pub fn create(owner: Owner, name: impl Into<String>, color: &str) -> Self {
        let now = Timestamp::now();
        let mut label = Self {
            id: LabelId::new(),
            owner,
            name: name.into(),
            color: normalize_color(color),
            key: None,
            created_at: now,
            updated_at: now,
            tracking: Tracking::new_entity(),
        };
        label.refresh_etag();
        label
    }

    /// Built-in label identified by a stable key.
    pub fn system(key: impl Into<String>, name: impl Into<String>, color: &str) -> Self {
        let mut label = Self::create(Owner::System, name, color);
        label.key = Some(key.into());
        label.refresh_etag();
        label
    }

    pub fn with_id(mut self, id: LabelId) -> Self {
        self.id = id;
        self.refresh_etag();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.name != name {
            self.name = name;
            self.touch();
        }
    }

    pub fn recolor(&mut self, color: &str) {
        let color = normalize_color(color);
        if self.color != color {
            self.color = color;
            self.touch();
        }
    }

    pub fn validation_errors(&self) -> Option<ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);
        if !color_pattern().is_match(&self.color) {
            errors.add(
                "color",
                ValidationError::new("color").with_message("Color must be a #RRGGBB hex value".into()),
            );
        }
        (!errors.is_empty()).then_some(errors)
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
        self.refresh_etag();
    }

    fn refresh_etag(&mut self) {
        let etag = content_etag(self);
        self.tracking.mark_changed(etag);
    }
}

impl Owned for Label {
    fn owner(&self) -> &Owner {
        &self.owner
    }

    fn entity_kind(&self) -> EntityKind {
        EntityKind::Label
    }
}

impl Aggregate for Label {
    type Id = LabelId;

    fn id(&self) -> LabelId {
        self.id
    }

    fn tracking(&self) -> &Tracking {
        &self.tracking
    }

    fn clean(&mut self) {
        self.tracking.mark_clean();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackingState;

    #[test]
    fn test_color_is_normalized_to_uppercase() {
        let label = Label::create(Owner::personal("u1"), "Music", "#a1b2c3");
        assert_eq!(label.color(), "#A1B2C3");
        assert!(label.validation_errors().is_none());
    }

    #[test]
    fn test_invalid_fields_are_reported() {
        let label = Label::create(Owner::personal("u1"), "", "blue");
        let errors = label.validation_errors().unwrap();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("color"));
    }

    #[test]
    fn test_noop_mutation_keeps_label_clean() {
        let mut label = Label::create(Owner::personal("u1"), "Music", "#FFFFFF");
        label.clean();
        let etag = label.etag().to_string();

        label.rename("Music");
        label.recolor("#ffffff");
        assert_eq!(label.tracking_state(), TrackingState::Clean);
        assert_eq!(label.etag(), etag);

        label.recolor("#000000");
        assert_eq!(label.tracking_state(), TrackingState::Dirty);
        assert_ne!(label.etag(), etag);
    }

    #[test]
    fn test_system_label_carries_key() {
        let label = Label::system("video", "Video", "#112233");
        assert!(label.owner().is_system());
        assert_eq!(label.key(), Some("video"));
    }
}
