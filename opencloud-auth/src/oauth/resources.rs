//! Resources granted to an access token.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{oauth_error, Error, OAuthErrorKind};
use crate::json::parse_id;

/// A user or group that granted access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Account {
    User(u64),
    Group(u64),
}

/// An experience (universe) the token may act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperienceRef {
    pub id: u64,
    pub owner: Option<Account>,
}

/// Experiences and accounts granted to a token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
    pub experiences: Vec<ExperienceRef>,
    pub accounts: Vec<Account>,
}

#[derive(Deserialize)]
struct ResourcesBody {
    #[serde(default)]
    resource_infos: Vec<ResourceInfo>,
}

#[derive(Deserialize)]
struct ResourceInfo {
    owner: Owner,
    #[serde(default)]
    resources: ResourceSet,
}

#[derive(Deserialize)]
struct Owner {
    id: Value,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Default, Deserialize)]
struct ResourceSet {
    #[serde(default)]
    universe: Option<IdList>,
    #[serde(default)]
    creator: Option<IdList>,
}

#[derive(Deserialize)]
struct IdList {
    #[serde(default)]
    ids: Vec<String>,
}

impl Owner {
    fn account(&self) -> Option<Account> {
        let id = parse_id(&self.id)?;
        match self.kind.as_str() {
            "User" => Some(Account::User(id)),
            "Group" => Some(Account::Group(id)),
            _ => None,
        }
    }
}

/// Map a creator descriptor. `U` alone is the resource owner; `U<id>` and
/// `G<id>` name a user or group.
///
/// Descriptors without a recognised prefix, or with an unparsable id, are
/// skipped rather than failing the whole response.
fn creator_account(descriptor: &str, owner: &Owner) -> Option<Account> {
    if descriptor == "U" {
        return parse_id(&owner.id).map(Account::User);
    }
    if let Some(id) = descriptor.strip_prefix('U') {
        return id.parse().ok().map(Account::User);
    }
    if let Some(id) = descriptor.strip_prefix('G') {
        return id.parse().ok().map(Account::Group);
    }
    None
}

impl Resources {
    pub(crate) fn from_body(body: Value) -> Result<Self, Error> {
        let body: ResourcesBody = serde_json::from_value(body).map_err(|e| {
            oauth_error(
                OAuthErrorKind::InvalidResponse,
                &format!("unexpected resources response: {}", e),
            )
        })?;

        let mut resources = Resources::default();
        for info in &body.resource_infos {
            if let Some(universe) = &info.resources.universe {
                let owner = info.owner.account();
                resources.experiences.extend(
                    universe
                        .ids
                        .iter()
                        .filter_map(|id| id.parse().ok())
                        .map(|id| ExperienceRef { id, owner }),
                );
            }

            if let Some(creator) = &info.resources.creator {
                for descriptor in &creator.ids {
                    match creator_account(descriptor, &info.owner) {
                        Some(account) => resources.accounts.push(account),
                        None => debug!("Skipping creator descriptor {:?}", descriptor),
                    }
                }
            }
        }

        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resources_from_body() {
        let resources = Resources::from_body(json!({
            "resource_infos": [
                {
                    "owner": { "id": "1234", "type": "User" },
                    "resources": {
                        "universe": { "ids": ["100", "200"] },
                        "creator": { "ids": ["U"] }
                    }
                },
                {
                    "owner": { "id": "77", "type": "Group" },
                    "resources": {
                        "universe": { "ids": ["300"] },
                        "creator": { "ids": ["G77", "U55"] }
                    }
                }
            ]
        }))
        .unwrap();

        assert_eq!(
            resources.experiences,
            vec![
                ExperienceRef { id: 100, owner: Some(Account::User(1234)) },
                ExperienceRef { id: 200, owner: Some(Account::User(1234)) },
                ExperienceRef { id: 300, owner: Some(Account::Group(77)) },
            ]
        );
        assert_eq!(
            resources.accounts,
            vec![Account::User(1234), Account::Group(77), Account::User(55)]
        );
    }

    #[test]
    fn test_unrecognised_descriptors_are_skipped() {
        let resources = Resources::from_body(json!({
            "resource_infos": [{
                "owner": { "id": 9, "type": "Robot" },
                "resources": {
                    "universe": { "ids": ["1", "not-a-number"] },
                    "creator": { "ids": ["X12", "Gabc", "", "U8"] }
                }
            }]
        }))
        .unwrap();

        assert_eq!(
            resources.experiences,
            vec![ExperienceRef { id: 1, owner: None }]
        );
        assert_eq!(resources.accounts, vec![Account::User(8)]);
    }

    #[test]
    fn test_empty_and_invalid_bodies() {
        assert_eq!(
            Resources::from_body(json!({})).unwrap(),
            Resources::default()
        );

        let err = Resources::from_body(json!({ "resource_infos": "nope" })).unwrap_err();
        assert_eq!(err.oauth_kind(), Some(&OAuthErrorKind::InvalidResponse));
    }
}
