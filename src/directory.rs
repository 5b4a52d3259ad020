use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::provider::ensure_success;
use crate::service::ServiceCredential;

/// Query parameters for one page of a group listing.
#[derive(Debug, Clone)]
pub struct ListGroupsParams {
    /// Workspace domain to list within.
    pub domain: String,
    /// Restrict to groups this user belongs to (typically an email).
    pub user_key: Option<String>,
    /// Continuation cursor from the previous page; omitted on the first.
    pub page_token: Option<String>,
}

/// One page of the upstream listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct GroupPage {
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct Group {
    pub email: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// The directory collaborator consumed by [`GroupsAuthorization`].
///
/// [`GroupsAuthorization`]: crate::authz::GroupsAuthorization
pub trait DirectoryClient {
    fn list_groups(&mut self, params: &ListGroupsParams) -> Result<GroupPage, Error>;
}

/// Blocking Admin SDK Directory client, authenticated with a
/// [`ServiceCredential`].
pub struct GoogleDirectory {
    credential: ServiceCredential,
    http: reqwest::blocking::Client,
    base_url: Url,
}

impl GoogleDirectory {
    #[must_use]
    pub fn new(credential: ServiceCredential) -> Self {
        Self {
            credential,
            http: reqwest::blocking::Client::new(),
            base_url: "https://admin.googleapis.com/admin/directory/v1/"
                .parse()
                .expect("valid default URL"),
        }
    }

    /// Override the API base URL (must end with a trailing slash).
    #[must_use]
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = url;
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::blocking::Client) -> Self {
        self.http = client;
        self
    }
}

impl DirectoryClient for GoogleDirectory {
    fn list_groups(&mut self, params: &ListGroupsParams) -> Result<GroupPage, Error> {
        let bearer = self.credential.bearer_token()?;

        let mut url = self.base_url.join("groups")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("domain", &params.domain);
            if let Some(user_key) = &params.user_key {
                query.append_pair("userKey", user_key);
            }
            if let Some(page_token) = &params.page_token {
                query.append_pair("pageToken", page_token);
            }
        }

        tracing::debug!(
            domain = %params.domain,
            user_key = params.user_key.as_deref().unwrap_or("<none>"),
            continued = params.page_token.is_some(),
            "fetching directory group page"
        );

        let response = self.http.get(url).bearer_auth(bearer).send()?;
        let page: GroupPage = ensure_success(response, "group listing")?.json()?;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_parses_with_cursor() {
        let page: GroupPage = serde_json::from_str(
            r#"{
                "kind": "admin#directory#groups",
                "groups": [
                    {"email": "a@x.com", "id": "1", "name": "A"},
                    {"email": "b@x.com"}
                ],
                "nextPageToken": "p1"
            }"#,
        )
        .unwrap();

        assert_eq!(page.groups.len(), 2);
        assert_eq!(page.groups[0].email, "a@x.com");
        assert_eq!(page.groups[1].name, None);
        assert_eq!(page.next_page_token.as_deref(), Some("p1"));
    }

    #[test]
    fn last_page_parses_without_groups_or_cursor() {
        let page: GroupPage = serde_json::from_str(r#"{"kind": "admin#directory#groups"}"#).unwrap();
        assert!(page.groups.is_empty());
        assert_eq!(page.next_page_token, None);
    }
}
