//! Asynchronous client for the firewall filter endpoints.

use crate::models::{FirewallRule, RuleFilter, RuleListing, RuleSpec, RuleUpdate};
use crate::Result;
use opnsense_core::normalize::normalize_into;
use opnsense_core::query::SearchQuery;
use opnsense_core::uuid::RuleUuid;
use opnsense_core::{ApplianceClient, Error};
use opnsense_interfaces::InterfaceResolver;
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

/// Base path of the filter controller.
pub const FILTER_BASE_PATH: &str = "/api/firewall/filter";

const RULE_COLLECTION_KEYS: &[&str] = &["rows", "data"];

/// Savepoint token for a pending configuration change.
///
/// Not `Clone`: applying or cancelling consumes the token. A token rebuilt
/// with [`from_token`](Self::from_token) after it was applied or cancelled is
/// refused by the pipeline that used it.
#[derive(Debug, PartialEq, Eq)]
pub struct ChangeRevision(String);

impl ChangeRevision {
    /// Wrap a revision previously issued by the appliance, e.g. one returned
    /// to a caller in an earlier [`ChangeOutcome`](crate::ChangeOutcome).
    #[must_use]
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Revision identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client for `/api/firewall/filter`.
#[derive(Clone)]
pub struct FilterClient {
    client: ApplianceClient,
}

impl FilterClient {
    /// Wrap an appliance transport.
    #[must_use]
    pub const fn new(client: ApplianceClient) -> Self {
        Self { client }
    }

    /// Access the underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &ApplianceClient {
        &self.client
    }

    /// Search rules in the candidate configuration.
    ///
    /// Rows that cannot be decoded are skipped.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn search_rules(&self, query: &SearchQuery) -> Result<Vec<FirewallRule>> {
        let body = self
            .client
            .post(&endpoint("searchRule"), Some(query))
            .await?;
        let rules: Vec<FirewallRule> = normalize_into(body, RULE_COLLECTION_KEYS);
        debug!(count = rules.len(), "Fetched filter rules");
        Ok(rules)
    }

    /// Fetch one rule by UUID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no rule has this UUID.
    pub async fn get_rule(&self, uuid: RuleUuid) -> Result<FirewallRule> {
        self.search_rules(&SearchQuery::all())
            .await?
            .into_iter()
            .find(|rule| rule.uuid == uuid)
            .ok_or_else(|| Error::NotFound(format!("Firewall rule {uuid}")))
    }

    /// List rules passing `filter`.
    ///
    /// The interface filter is resolved through `resolver` when one is given,
    /// so `"wifi"` matches rules bound to the VLAN the name resolves to. A
    /// description filter is also sent as the search phrase, so `total_all`
    /// then counts the appliance's matches rather than every rule.
    ///
    /// # Errors
    ///
    /// Propagates transport failures. Resolution itself never fails.
    pub async fn list_rules(
        &self,
        filter: &RuleFilter,
        resolver: Option<&InterfaceResolver>,
    ) -> Result<RuleListing> {
        let mut query = SearchQuery::all();
        if let Some(text) = filter.description.as_deref() {
            query = query.with_phrase(text.trim());
        }
        let all = self.search_rules(&query).await?;
        let total_all = all.len();

        let resolution = match (filter.interface.as_deref(), resolver) {
            (Some(interface), Some(resolver)) => Some(resolver.resolve(interface).await),
            _ => None,
        };

        let rules: Vec<FirewallRule> = all
            .into_iter()
            .filter(|rule| filter.matches(rule, resolution.as_ref()))
            .collect();

        Ok(RuleListing {
            total: rules.len(),
            rules,
            total_all,
            filters_applied: filter.clone(),
            resolution,
        })
    }

    /// Create a rule in the candidate configuration.
    ///
    /// The rule is not live until a savepoint is applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] before any request for an invalid
    /// spec, [`Error::ApplicationFailure`] when the appliance rejects it, and
    /// [`Error::ResponseParseFailure`] when no UUID comes back.
    pub async fn add_rule(&self, spec: &RuleSpec) -> Result<RuleUuid> {
        spec.ensure_valid()?;
        let body = self
            .client
            .post(&endpoint("addRule"), Some(&spec.to_payload()))
            .await?;
        expect_result(&body, &["saved"], "addRule")?;

        let uuid = body
            .get("uuid")
            .and_then(Value::as_str)
            .filter(|uuid| !uuid.trim().is_empty())
            .ok_or_else(|| {
                Error::ResponseParseFailure("addRule response carried no uuid".to_string())
            })?;
        let uuid = RuleUuid::parse_str(uuid)?;
        info!(%uuid, description = %spec.description, "Created filter rule");
        Ok(uuid)
    }

    /// Update fields of an existing rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for an empty update and
    /// [`Error::ApplicationFailure`] when the appliance rejects it.
    pub async fn set_rule(&self, uuid: RuleUuid, update: &RuleUpdate) -> Result<()> {
        let payload = update.to_payload()?;
        let body = self
            .client
            .post(&endpoint(&format!("setRule/{uuid}")), Some(&payload))
            .await?;
        expect_result(&body, &["saved"], "setRule")?;
        info!(%uuid, "Updated filter rule");
        Ok(())
    }

    /// Delete a rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the appliance reports the rule missing.
    pub async fn del_rule(&self, uuid: RuleUuid) -> Result<()> {
        let body = self
            .client
            .post::<()>(&endpoint(&format!("delRule/{uuid}")), None)
            .await?;
        if result_of(&body) == "not found" {
            return Err(Error::NotFound(format!("Firewall rule {uuid}")));
        }
        expect_result(&body, &["deleted"], "delRule")?;
        info!(%uuid, "Deleted filter rule");
        Ok(())
    }

    /// Set the enabled state of a rule and return the state reported back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ApplicationFailure`] for an unexpected result.
    pub async fn toggle_rule(&self, uuid: RuleUuid, enabled: bool) -> Result<bool> {
        let path = endpoint(&format!(
            "toggleRule/{uuid}/{}",
            opnsense_core::wire::flag(enabled)
        ));
        let body = self.client.post::<()>(&path, None).await?;
        let state = match result_of(&body).as_str() {
            "enabled" => true,
            "disabled" => false,
            "ok" => enabled,
            _ => {
                return Err(Error::ApplicationFailure(format!(
                    "toggleRule returned unexpected result: {body}"
                )))
            }
        };
        info!(%uuid, enabled = state, "Toggled filter rule");
        Ok(state)
    }

    /// Take a savepoint of the candidate configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResponseParseFailure`] when no revision comes back.
    pub async fn savepoint(&self) -> Result<ChangeRevision> {
        let body = self.client.post::<()>(&endpoint("savepoint"), None).await?;
        let revision = match body.get("revision") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(Error::ResponseParseFailure(
                    "savepoint response carried no revision".to_string(),
                ))
            }
        };
        debug!(%revision, "Created savepoint");
        Ok(ChangeRevision(revision))
    }

    /// Activate the pending configuration under `revision`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ApplicationFailure`] when the appliance does not report
    /// success. The revision is consumed either way.
    pub async fn apply(&self, revision: ChangeRevision) -> Result<()> {
        let body = self
            .client
            .post::<()>(&endpoint(&format!("apply/{revision}")), None)
            .await?;
        match status_of(&body).as_str() {
            "ok" | "success" => {
                info!(%revision, "Applied filter configuration");
                Ok(())
            }
            other => {
                warn!(%revision, status = other, "Apply did not report success");
                Err(Error::ApplicationFailure(format!(
                    "apply returned status `{other}`"
                )))
            }
        }
    }

    /// Abandon `revision` so the appliance does not roll back to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ApplicationFailure`] when the appliance does not report
    /// `ok`. The revision is consumed either way.
    pub async fn cancel_rollback(&self, revision: ChangeRevision) -> Result<()> {
        let body = self
            .client
            .post::<()>(&endpoint(&format!("cancelRollback/{revision}")), None)
            .await?;
        match status_of(&body).as_str() {
            "ok" => {
                info!(%revision, "Cancelled rollback");
                Ok(())
            }
            other => Err(Error::ApplicationFailure(format!(
                "cancelRollback returned status `{other}`"
            ))),
        }
    }
}

fn endpoint(action: &str) -> String {
    format!("{FILTER_BASE_PATH}/{action}")
}

fn normalized_field(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn result_of(body: &Value) -> String {
    normalized_field(body, "result")
}

fn status_of(body: &Value) -> String {
    normalized_field(body, "status")
}

fn expect_result(body: &Value, accepted: &[&str], action: &str) -> Result<()> {
    let result = result_of(body);
    if accepted.contains(&result.as_str()) {
        Ok(())
    } else {
        Err(Error::ApplicationFailure(format!(
            "{action} returned unexpected result: {body}"
        )))
    }
}
