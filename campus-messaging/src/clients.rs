use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::collab::{GroupRoster, UserDirectory};
use crate::models::{GroupRole, UserIdentity};

/// Group roster backed by the group service's internal API.
pub struct HttpGroupRoster {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MemberDto {
    user_id: Uuid,
    role: GroupRole,
}

impl HttpGroupRoster {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn fetch_members(&self, group_id: Uuid) -> anyhow::Result<Vec<MemberDto>> {
        let url = format!("{}/internal/groups/{group_id}/members", self.base_url);
        let resp = self.http.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        Ok(resp.error_for_status()?.json().await?)
    }
}

#[async_trait]
impl GroupRoster for HttpGroupRoster {
    async fn members_of(&self, group_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        Ok(self
            .fetch_members(group_id)
            .await?
            .into_iter()
            .map(|m| m.user_id)
            .collect())
    }

    async fn role_of(&self, group_id: Uuid, user_id: Uuid) -> anyhow::Result<Option<GroupRole>> {
        Ok(self
            .fetch_members(group_id)
            .await?
            .into_iter()
            .find(|m| m.user_id == user_id)
            .map(|m| m.role))
    }
}

/// User directory backed by the user service's internal API.
pub struct HttpUserDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn resolve(&self, user_id: Uuid) -> anyhow::Result<Option<UserIdentity>> {
        let url = format!("{}/internal/users/{user_id}", self.base_url);
        let resp = self.http.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.error_for_status()?.json().await?))
    }
}
