use std::collections::BTreeMap;

use tracing::debug;

use super::*;

impl AuthorizationService {
    /// Returns the roles an identity may assume.
    ///
    /// Roles flagged `console_only` are returned only when `console_only` is
    /// requested. Results are cached per `(user, console_only)`.
    pub async fn eligible_roles(
        &self,
        identity: &PrincipalIdentity,
        console_only: bool,
    ) -> AppResult<Vec<RoleMapping>> {
        match self
            .cache
            .get_eligible_roles(identity.user(), console_only)
            .await
        {
            Ok(Some(roles)) => {
                debug!(user = identity.user(), cache_tier = "fast", "eligible roles cache hit");
                return Ok(roles);
            }
            Ok(None) => {}
            Err(error) => {
                warn!(
                    user = identity.user(),
                    error = %error,
                    cache_tier = "fast",
                    "failed to read authorization cache"
                );
            }
        }

        let roles = self.compute_eligible_roles(identity, console_only);

        if let Err(error) = self
            .cache
            .put_eligible_roles(
                identity.user(),
                console_only,
                &roles,
                self.settings.authorization_cache_ttl_seconds,
            )
            .await
        {
            warn!(
                user = identity.user(),
                error = %error,
                cache_tier = "fast",
                "failed to write authorization cache"
            );
        }

        Ok(roles)
    }

    fn compute_eligible_roles(
        &self,
        identity: &PrincipalIdentity,
        console_only: bool,
    ) -> Vec<RoleMapping> {
        let document = self.dynamic_config.current().document;
        let mut by_arn: BTreeMap<String, RoleMapping> = BTreeMap::new();

        let principals = std::iter::once(identity.user())
            .chain(identity.groups().iter().map(String::as_str));
        for principal in principals {
            for mapping in document.role_mappings_for_group(principal) {
                if mapping.console_only && !console_only {
                    continue;
                }
                by_arn
                    .entry(mapping.arn.clone())
                    .and_modify(|existing| existing.console_only &= mapping.console_only)
                    .or_insert(mapping);
            }
        }

        by_arn.into_values().collect()
    }
}
