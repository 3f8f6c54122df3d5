use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::error::EntityKind;
use crate::models::tracking::{Aggregate, TrackedSet, Tracking, content_etag};
use crate::models::{LabelId, Owned, Owner, ProviderId};

/// Optional descriptive attributes of a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ProviderDetails {
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
    #[validate(url(message = "Icon URL must be a valid URL"))]
    pub icon_url: Option<String>,
    #[validate(url(message = "URL must be a valid URL"))]
    pub url: Option<String>,
    #[validate(url(message = "Pricing page URL must be a valid URL"))]
    pub pricing_page_url: Option<String>,
}

/// A service subscriptions are attached to.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct Provider {
    pub(crate) id: ProviderId,
    pub(crate) owner: Owner,
    #[validate(length(min = 1, max = 100, message = "Provider name must be between 1 and 100 characters"))]
    pub(crate) name: String,
    #[serde(flatten)]
    #[validate(nested)]
    pub(crate) details: ProviderDetails,
    pub(crate) labels: TrackedSet<LabelId>,
    pub(crate) created_at: Timestamp,
    pub(crate) updated_at: Timestamp,
    #[serde(skip)]
    pub(crate) tracking: Tracking,
}

impl Provider {
    pub fn create(owner: Owner, name: impl Into<String>, details: ProviderDetails) -> Self {
        let now = Timestamp::now();
        let mut provider = Self {
            id: ProviderId::new(),
            owner,
            name: name.into(),
            details,
            labels: TrackedSet::new(),
            created_at: now,
            updated_at: now,
            tracking: Tracking::new_entity(),
        };
        provider.refresh_etag();
        provider
    }

    pub fn with_id(mut self, id: ProviderId) -> Self {
        self.id = id;
        self.refresh_etag();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn details(&self) -> &ProviderDetails {
        &self.details
    }

    pub fn labels(&self) -> &TrackedSet<LabelId> {
        &self.labels
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

    pub fn set_details(&mut self, details: ProviderDetails) {
        if self.details != details {
            self.details = details;
            self.touch();
        }
    }

    /// Labels must already be checked for visibility by the caller.
    pub fn set_labels(&mut self, labels: impl IntoIterator<Item = LabelId>) {
        if self.labels.replace_all(labels) {
            self.touch();
        }
    }

    pub fn validation_errors(&self) -> Option<ValidationErrors> {
        self.validate().err()
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

impl Owned for Provider {
    fn owner(&self) -> &Owner {
        &self.owner
    }

    fn entity_kind(&self) -> EntityKind {
        EntityKind::Provider
    }
}

impl Aggregate for Provider {
    type Id = ProviderId;

    fn id(&self) -> ProviderId {
        self.id
    }

    fn tracking(&self) -> &Tracking {
        &self.tracking
    }

    fn pending_child_writes(&self) -> usize {
        self.labels.pending_writes()
    }

    fn clean(&mut self) {
        self.labels.clear_changes();
        self.tracking.mark_clean();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackingState;

    #[test]
    fn test_invalid_url_is_reported() {
        let provider = Provider::create(
            Owner::personal("u1"),
            "Netflix",
            ProviderDetails {
                url: Some("not a url".to_string()),
                ..ProviderDetails::default()
            },
        );
        assert!(provider.validation_errors().is_some());
    }

    #[test]
    fn test_details_change_dirties_provider() {
        let mut provider = Provider::create(Owner::personal("u1"), "Netflix", ProviderDetails::default());
        provider.clean();
        provider.set_details(ProviderDetails::default());
        assert_eq!(provider.tracking_state(), TrackingState::Clean);

        provider.set_details(ProviderDetails {
            url: Some("https://netflix.com".to_string()),
            ..ProviderDetails::default()
        });
        assert_eq!(provider.tracking_state(), TrackingState::Dirty);
        assert!(provider.validation_errors().is_none());
    }
}
