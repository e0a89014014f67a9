use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use uuid::Uuid;

use crate::{Platform, PlatformIdentifiers, comma_separated, some_if_present};

/// Separator placed between appended customer notes.
pub const NOTE_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, TS)]
pub struct Customer {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    #[sqlx(json)]
    pub platform_identifiers: PlatformIdentifiers,
    pub metadata: Value,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub sentiment_score: Option<f64>,
    pub satisfaction_rating: Option<i32>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Appends a note to the log, separating entries with [`NOTE_SEPARATOR`].
    pub fn appended_notes(&self, note: &str) -> String {
        match self.notes.as_deref() {
            Some(existing) if !existing.is_empty() => format!("{existing}{NOTE_SEPARATOR}{note}"),
            _ => note.to_string(),
        }
    }

    /// Union of the existing and given tags, first occurrence wins.
    pub fn merged_tags(&self, tags: &[String]) -> Vec<String> {
        let mut merged: Vec<String> = Vec::with_capacity(self.tags.len() + tags.len());
        for tag in self.tags.iter().chain(tags) {
            if !merged.contains(tag) {
                merged.push(tag.clone());
            }
        }
        merged
    }

    pub fn without_tags(&self, tags: &[String]) -> Vec<String> {
        self.tags
            .iter()
            .filter(|tag| !tags.contains(tag))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct CreateCustomerRequest {
    #[serde(default)]
    #[ts(optional)]
    pub name: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub email: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub phone: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub platform_identifiers: Option<PlatformIdentifiers>,
    #[serde(default)]
    #[ts(optional)]
    pub metadata: Option<Value>,
    #[serde(default)]
    #[ts(optional)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    #[ts(optional)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateCustomerRequest {
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub phone: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_url: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub platform_identifiers: Option<PlatformIdentifiers>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<Value>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub tags: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub sentiment_score: Option<Option<f64>>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub satisfaction_rating: Option<Option<i32>>,
}

/// Find-or-create payload keyed by an external platform identifier.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CustomerLookupRequest {
    pub platform: Platform,
    pub platform_id: String,
    #[serde(default)]
    #[ts(optional)]
    pub customer: Option<CreateCustomerRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AddCustomerNoteRequest {
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CustomerTagsRequest {
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCustomersQuery {
    pub business_id: Uuid,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "comma_separated")]
    pub tags: Option<Vec<String>>,
}

impl ListCustomersQuery {
    pub fn filters(&self) -> CustomerFilters {
        CustomerFilters {
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|term| !term.is_empty())
                .map(str::to_string),
            tags: self.tags.clone().filter(|tags| !tags.is_empty()),
        }
    }
}

/// Customer list filters. `search` is matched case-insensitively against
/// name, email and phone; every listed tag must be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerFilters {
    pub search: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl CustomerFilters {
    pub fn matches(&self, customer: &Customer) -> bool {
        let search_hit = self.search.as_deref().is_none_or(|term| {
            let term = term.to_lowercase();
            [&customer.name, &customer.email, &customer.phone]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&term))
        });
        let tags_hit = self
            .tags
            .as_ref()
            .is_none_or(|tags| tags.iter().all(|tag| customer.tags.contains(tag)));
        search_hit && tags_hit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ListCustomersResponse {
    pub customers: Vec<Customer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(tags: &[&str], notes: Option<&str>) -> Customer {
        let now = Utc::now();
        Customer {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            name: None,
            email: None,
            phone: None,
            avatar_url: None,
            platform_identifiers: PlatformIdentifiers::default(),
            metadata: Value::Object(Default::default()),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            notes: notes.map(str::to_string),
            sentiment_score: None,
            satisfaction_rating: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn merged_tags_are_deduplicated_in_order() {
        let existing = customer(&["vip", "returning"], None);
        let merged = existing.merged_tags(&["vip".into(), "wholesale".into(), "vip".into()]);
        assert_eq!(merged, vec!["vip", "returning", "wholesale"]);
    }

    #[test]
    fn removing_absent_tag_is_noop() {
        let existing = customer(&["vip"], None);
        assert_eq!(existing.without_tags(&["missing".into()]), vec!["vip"]);
        assert!(existing.without_tags(&["vip".into()]).is_empty());
    }

    #[test]
    fn notes_are_appended_with_separator() {
        assert_eq!(customer(&[], None).appended_notes("first"), "first");
        assert_eq!(
            customer(&[], Some("first")).appended_notes("second"),
            "first\n\n---\n\nsecond"
        );
    }

    #[test]
    fn list_query_splits_tags() {
        let query: ListCustomersQuery = serde_json::from_value(serde_json::json!({
            "businessId": Uuid::nil(),
            "tags": "vip, ,returning"
        }))
        .unwrap();
        assert_eq!(
            query.tags,
            Some(vec!["vip".to_string(), "returning".to_string()])
        );
        assert!(query.search.is_none());
    }

    #[test]
    fn filters_match_search_and_all_tags() {
        let mut existing = customer(&["vip", "returning"], None);
        existing.name = Some("Ada Lovelace".into());

        let by_name = CustomerFilters {
            search: Some("LOVE".into()),
            tags: None,
        };
        assert!(by_name.matches(&existing));

        let needs_both = CustomerFilters {
            search: None,
            tags: Some(vec!["vip".into(), "wholesale".into()]),
        };
        assert!(!needs_both.matches(&existing));
    }
}
