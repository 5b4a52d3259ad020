use std::collections::HashSet;

use crate::authn::Authentication;
use crate::directory::{DirectoryClient, GoogleDirectory, ListGroupsParams};
use crate::error::Error;
use crate::identity::Identity;
use crate::provider::IdentityProvider;
use crate::session::SessionStore;

/// Group-membership authorization against the directory.
///
/// Nothing here is cached: every predicate re-queries the directory, so a
/// revoked membership takes effect on the next request.
pub struct GroupsAuthorization<D> {
    directory: D,
    domain: String,
    group_email_addresses: Vec<String>,
}

impl GroupsAuthorization<GoogleDirectory> {
    /// Builds the authorizer from an authentication session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceAccountMissing`] unless
    /// [`set_service_account`](Authentication::set_service_account) was
    /// called first. In a correct deployment this is fatal at startup.
    pub fn new<S, P>(auth: &Authentication<S, P>, domain: impl Into<String>) -> Result<Self, Error>
    where
        S: SessionStore,
        P: IdentityProvider,
    {
        let credential = auth
            .service_credential()
            .cloned()
            .ok_or(Error::ServiceAccountMissing)?;
        Ok(Self::with_directory(GoogleDirectory::new(credential), domain))
    }
}

impl<D: DirectoryClient> GroupsAuthorization<D> {
    /// Builds the authorizer over any directory client (tests substitute
    /// their own).
    pub fn with_directory(directory: D, domain: impl Into<String>) -> Self {
        Self {
            directory,
            domain: domain.into(),
            group_email_addresses: Vec::new(),
        }
    }

    /// Sets the policy group list consulted by
    /// [`is_user_authorized`](Self::is_user_authorized).
    #[must_use]
    pub fn with_policy_groups(mut self, groups: Vec<String>) -> Self {
        self.group_email_addresses = groups;
        self
    }

    pub fn set_group_email_addresses(&mut self, groups: Vec<String>) {
        self.group_email_addresses = groups;
    }

    #[must_use]
    pub fn group_email_addresses(&self) -> &[String] {
        &self.group_email_addresses
    }

    /// All group emails the user belongs to, in upstream order, merged across
    /// every page. Duplicates are kept as delivered.
    ///
    /// `user_key` is the user identifier the directory expects, typically the
    /// email address.
    pub fn groups_for_user(&mut self, user_key: &str) -> Result<Vec<String>, Error> {
        self.collect_groups(Some(user_key))
    }

    /// All group emails in the domain, in upstream order.
    pub fn groups_for_domain(&mut self) -> Result<Vec<String>, Error> {
        self.collect_groups(None)
    }

    /// Sequential cursor walk: each request carries the previous response's
    /// cursor, and an absent or empty cursor ends the listing. Pages must not
    /// be fetched concurrently.
    fn collect_groups(&mut self, user_key: Option<&str>) -> Result<Vec<String>, Error> {
        let mut emails = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let params = ListGroupsParams {
                domain: self.domain.clone(),
                user_key: user_key.map(str::to_string),
                page_token: page_token.take(),
            };
            let page = self.directory.list_groups(&params)?;
            emails.extend(page.groups.into_iter().map(|g| g.email));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(
            domain = %self.domain,
            count = emails.len(),
            "directory group listing complete"
        );
        Ok(emails)
    }

    pub fn is_user_in_group(&mut self, user: &Identity, group: &str) -> Result<bool, Error> {
        let memberships = self.memberships(user)?;
        Ok(memberships.contains(group))
    }

    /// True iff the user's memberships intersect `groups`. Empty `groups` is
    /// always false.
    pub fn is_user_in_any_group(
        &mut self,
        user: &Identity,
        groups: &[String],
    ) -> Result<bool, Error> {
        let memberships = self.memberships(user)?;
        Ok(groups.iter().any(|g| memberships.contains(g.as_str())))
    }

    /// True iff every distinct group in `groups` is among the user's
    /// memberships. Empty `groups` is vacuously true; callers gating access
    /// on a configurable list should treat an empty list as a policy
    /// decision, not a pass.
    pub fn is_user_in_all_groups(
        &mut self,
        user: &Identity,
        groups: &[String],
    ) -> Result<bool, Error> {
        let memberships = self.memberships(user)?;
        Ok(groups.iter().all(|g| memberships.contains(g.as_str())))
    }

    /// Whether the user is in any of the configured policy groups.
    pub fn is_user_authorized(&mut self, user: &Identity) -> Result<bool, Error> {
        let groups = self.group_email_addresses.clone();
        self.is_user_in_any_group(user, &groups)
    }

    fn memberships(&mut self, user: &Identity) -> Result<HashSet<String>, Error> {
        let user_key = user.email().ok_or(Error::MissingEmail)?.to_string();
        Ok(self.groups_for_user(&user_key)?.into_iter().collect())
    }
}
