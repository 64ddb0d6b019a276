//! IAM-backed role source and policy writer.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_config::sts::AssumeRoleProvider;
use aws_sdk_iam::Client;
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use percent_encoding::percent_decode_str;
use rolegate_application::{CloudRoleSource, RolePolicyWriter};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::{ManagedPolicyAttachment, RoleDocument, RoleKey};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

const SESSION_NAME: &str = "rolegate";
const DEFAULT_PARTITION: &str = "aws";

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "ServiceFailure",
    "ServiceUnavailable",
];

/// Cloud role source reading and writing roles through the IAM API.
///
/// Every read needed to describe a role is merged into one [`RoleDocument`].
/// IAM answers for the account of the calling credentials, so with an
/// assume-role name configured each account gets its own client holding
/// credentials for that role in the account. Without one every call uses the
/// default credential chain, and roles returned from a different account are
/// rejected instead of cached.
#[derive(Clone)]
pub struct AwsIamRoleSource {
    sdk_config: SdkConfig,
    default_client: Client,
    assume_role_name: Option<String>,
    account_clients: Arc<RwLock<HashMap<String, Client>>>,
}

impl AwsIamRoleSource {
    /// Creates a source over a loaded SDK configuration.
    #[must_use]
    pub fn new(sdk_config: SdkConfig, assume_role_name: Option<String>) -> Self {
        Self {
            default_client: Client::new(&sdk_config),
            sdk_config,
            assume_role_name,
            account_clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a source from the default credential chain.
    pub async fn from_env(assume_role_name: Option<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(config, assume_role_name)
    }

    /// Returns the IAM client acting in `account_id`.
    async fn client_for(&self, account_id: &str, partition: &str) -> Client {
        let Some(role_name) = self.assume_role_name.as_deref() else {
            return self.default_client.clone();
        };

        let cached = self.account_clients.read().await.get(account_id).cloned();
        if let Some(client) = cached {
            return client;
        }

        let role_arn = assume_role_arn(partition, account_id, role_name);
        let provider = AssumeRoleProvider::builder(role_arn.as_str())
            .session_name(SESSION_NAME)
            .configure(&self.sdk_config)
            .build()
            .await;
        let config = aws_sdk_iam::config::Builder::from(&self.sdk_config)
            .credentials_provider(provider)
            .build();
        info!(account_id = account_id, role_arn = %role_arn, "iam client created for account");

        self.account_clients
            .write()
            .await
            .entry(account_id.to_owned())
            .or_insert_with(|| Client::from_conf(config))
            .clone()
    }

    async fn client_for_key(&self, key: &RoleKey) -> Client {
        self.client_for(
            key.account_id(),
            arn_partition(key.arn()).unwrap_or(DEFAULT_PARTITION),
        )
        .await
    }
}

async fn inline_policies(client: &Client, role_name: &str) -> AppResult<BTreeMap<String, Value>> {
    let mut names = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let page = client
            .list_role_policies()
            .role_name(role_name)
            .set_marker(marker.take())
            .send()
            .await
            .map_err(|error| map_sdk_error("list_role_policies", error))?;

        names.extend(page.policy_names().iter().cloned());
        match page.marker() {
            Some(next) if page.is_truncated() => marker = Some(next.to_owned()),
            _ => break,
        }
    }

    let mut policies = BTreeMap::new();
    for policy_name in names {
        let output = client
            .get_role_policy()
            .role_name(role_name)
            .policy_name(policy_name.as_str())
            .send()
            .await
            .map_err(|error| map_sdk_error("get_role_policy", error))?;

        let document = decode_policy_document(output.policy_document())?;
        policies.insert(policy_name, document);
    }

    Ok(policies)
}

async fn managed_policies(
    client: &Client,
    role_name: &str,
) -> AppResult<Vec<ManagedPolicyAttachment>> {
    let mut attachments = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let page = client
            .list_attached_role_policies()
            .role_name(role_name)
            .set_marker(marker.take())
            .send()
            .await
            .map_err(|error| map_sdk_error("list_attached_role_policies", error))?;

        attachments.extend(page.attached_policies().iter().filter_map(|policy| {
            Some(ManagedPolicyAttachment {
                policy_name: policy.policy_name()?.to_owned(),
                policy_arn: policy.policy_arn()?.to_owned(),
            })
        }));
        match page.marker() {
            Some(next) if page.is_truncated() => marker = Some(next.to_owned()),
            _ => break,
        }
    }

    Ok(attachments)
}

async fn tags(client: &Client, role_name: &str) -> AppResult<BTreeMap<String, String>> {
    let mut tags = BTreeMap::new();
    let mut marker: Option<String> = None;
    loop {
        let page = client
            .list_role_tags()
            .role_name(role_name)
            .set_marker(marker.take())
            .send()
            .await
            .map_err(|error| map_sdk_error("list_role_tags", error))?;

        tags.extend(
            page.tags()
                .iter()
                .map(|tag| (tag.key().to_owned(), tag.value().to_owned())),
        );
        match page.marker() {
            Some(next) if page.is_truncated() => marker = Some(next.to_owned()),
            _ => break,
        }
    }

    Ok(tags)
}

/// Decodes a URL-encoded IAM policy document.
fn decode_policy_document(encoded: &str) -> AppResult<Value> {
    let decoded = percent_decode_str(encoded).decode_utf8().map_err(|error| {
        AppError::Internal(format!("policy document is not valid UTF-8: {error}"))
    })?;

    serde_json::from_str(decoded.as_ref())
        .map_err(|error| AppError::Internal(format!("policy document is not valid JSON: {error}")))
}

fn is_no_such_entity<E: ProvideErrorMetadata>(error: &SdkError<E>) -> bool {
    error.code() == Some("NoSuchEntity")
}

fn map_sdk_error<E>(operation: &str, error: SdkError<E>) -> AppError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let transient = match &error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => true,
        _ => error
            .code()
            .is_some_and(|code| THROTTLING_CODES.contains(&code)),
    };
    let message = format!("iam {operation} failed: {}", DisplayErrorContext(&error));

    if transient {
        AppError::Transient(message)
    } else if is_no_such_entity(&error) {
        AppError::NotFound(message)
    } else {
        AppError::Internal(message)
    }
}

fn arn_account(arn: &str) -> Option<&str> {
    arn.split(':').nth(4)
}

fn arn_partition(arn: &str) -> Option<&str> {
    arn.split(':').nth(1).filter(|partition| !partition.is_empty())
}

fn assume_role_arn(partition: &str, account_id: &str, role_name: &str) -> String {
    format!("arn:{partition}:iam::{account_id}:role/{role_name}")
}

#[async_trait]
impl CloudRoleSource for AwsIamRoleSource {
    async fn fetch_role(&self, key: &RoleKey) -> AppResult<Option<RoleDocument>> {
        let client = self.client_for_key(key).await;
        let role_name = key.role_name();
        let output = match client.get_role().role_name(role_name).send().await {
            Ok(output) => output,
            Err(error) if is_no_such_entity(&error) => {
                debug!(arn = %key.arn(), "iam reports role does not exist");
                return Ok(None);
            }
            Err(error) => return Err(map_sdk_error("get_role", error)),
        };

        let Some(role) = output.role() else {
            return Ok(None);
        };

        let mut document = RoleDocument {
            arn: role.arn().to_owned(),
            account_id: arn_account(role.arn()).unwrap_or_default().to_owned(),
            role_name: role.role_name().to_owned(),
            role_id: role.role_id().to_owned(),
            assume_role_policy_document: role
                .assume_role_policy_document()
                .map(decode_policy_document)
                .transpose()?
                .unwrap_or(Value::Null),
            inline_policies: BTreeMap::new(),
            managed_policies: Vec::new(),
            tags: BTreeMap::new(),
            templated: None,
            fetched_at: 0,
        };
        document.ensure_describes(key)?;

        // A role deleted between the reads surfaces as NotFound here.
        let lookups = async {
            Ok::<_, AppError>((
                inline_policies(&client, role_name).await?,
                managed_policies(&client, role_name).await?,
                tags(&client, role_name).await?,
            ))
        };
        match lookups.await {
            Ok((inline, managed, role_tags)) => {
                document.inline_policies = inline;
                document.managed_policies = managed;
                document.tags = role_tags;
            }
            Err(AppError::NotFound(_)) => return Ok(None),
            Err(error) => return Err(error),
        }

        Ok(Some(document))
    }

    async fn list_role_arns(&self, account_id: &str) -> AppResult<Vec<String>> {
        let client = self.client_for(account_id, DEFAULT_PARTITION).await;
        let mut arns = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = client
                .list_roles()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|error| map_sdk_error("list_roles", error))?;

            arns.extend(
                page.roles()
                    .iter()
                    .map(|role| role.arn())
                    .filter(|arn| arn_account(arn) == Some(account_id))
                    .map(str::to_owned),
            );
            match page.marker() {
                Some(next) if page.is_truncated() => marker = Some(next.to_owned()),
                _ => break,
            }
        }

        Ok(arns)
    }
}

#[async_trait]
impl RolePolicyWriter for AwsIamRoleSource {
    async fn put_inline_policy(
        &self,
        key: &RoleKey,
        policy_name: &str,
        document: &Value,
    ) -> AppResult<()> {
        let document = serde_json::to_string(document).map_err(|error| {
            AppError::Internal(format!("failed to encode policy '{policy_name}': {error}"))
        })?;

        self.client_for_key(key)
            .await
            .put_role_policy()
            .role_name(key.role_name())
            .policy_name(policy_name)
            .policy_document(document)
            .send()
            .await
            .map_err(|error| map_sdk_error("put_role_policy", error))?;

        Ok(())
    }

    async fn attach_managed_policy(&self, key: &RoleKey, policy_arn: &str) -> AppResult<()> {
        self.client_for_key(key)
            .await
            .attach_role_policy()
            .role_name(key.role_name())
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|error| map_sdk_error("attach_role_policy", error))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{arn_account, arn_partition, assume_role_arn, decode_policy_document};

    #[test]
    fn policy_documents_are_url_decoded() {
        let encoded = "%7B%22Version%22%3A%222012-10-17%22%2C%22Statement%22%3A%5B%5D%7D";
        let decoded = decode_policy_document(encoded);
        assert_eq!(
            decoded.ok(),
            Some(json!({"Version": "2012-10-17", "Statement": []}))
        );
    }

    #[test]
    fn plain_documents_decode_unchanged() {
        let decoded = decode_policy_document(r#"{"Statement":[]}"#);
        assert_eq!(decoded.ok(), Some(json!({"Statement": []})));
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(decode_policy_document("%7Bnot-json").is_err());
    }

    #[test]
    fn account_is_read_from_role_arns() {
        assert_eq!(
            arn_account("arn:aws:iam::123456789012:role/deploy"),
            Some("123456789012")
        );
        assert_eq!(arn_account("not-an-arn"), None);
    }

    #[test]
    fn assumed_role_targets_the_requested_account_and_partition() {
        let partition = arn_partition("arn:aws-us-gov:iam::123456789012:role/deploy");
        assert_eq!(partition, Some("aws-us-gov"));
        assert_eq!(
            assume_role_arn(partition.unwrap_or("aws"), "210987654321", "rolegate-reader"),
            "arn:aws-us-gov:iam::210987654321:role/rolegate-reader"
        );
        assert_eq!(arn_partition("not-an-arn"), None);
    }
}
