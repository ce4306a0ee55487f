//! Routing policy.
//!
//! Turns a [`RoutingRequest`] into a provider/model choice and drives the
//! dispatch, falling back across providers only in auto mode. Registry and
//! discovery snapshots are captured once per request; a refresh that lands
//! mid-request is picked up by the next one.
//!
//! Request lifecycle:
//!
//! ```text
//! Idle -> Resolving -> Selected -> Dispatching -> Completed
//!                         ^            |  \-> Retrying -> Completed
//!                         |            v
//!                         +-- (auto) Failed attempt --> ... -> Failed
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Instrument, Span};

use super::discovery::{DiscoverySnapshot, DiscoveryStatus, ModelDiscovery};
use super::dispatch::RequestDispatcher;
use super::logging;
use super::models::{DecisionReason, DispatchResult, RoutingDecision, RoutingRequest};
use super::provider::ProviderId;
use super::registry::{ProviderConfig, ProviderRegistry, ProviderStatus, RegistrySnapshot};
use super::resolver;
use crate::error::{RemoteErrorKind, Result, RouteError};
use crate::providers::catalog;

// =============================================================================
// States and Attempts
// =============================================================================

/// Lifecycle state of one routed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteState {
    Idle,
    Resolving,
    Selected,
    Dispatching,
    Retrying,
    Completed,
    Failed,
}

impl RouteState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Record of a single dispatch attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAttempt {
    pub provider: ProviderId,
    pub model: String,
    pub reason: DecisionReason,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Result of routing one request.
#[derive(Debug)]
pub struct RouteOutcome {
    /// The decision that produced `result`, or the last one tried.
    pub decision: Option<RoutingDecision>,
    pub result: Result<DispatchResult>,
    pub attempts: Vec<RouteAttempt>,
    pub states: Vec<RouteState>,
}

impl RouteOutcome {
    #[must_use]
    pub fn success(
        decision: RoutingDecision,
        result: DispatchResult,
        attempts: Vec<RouteAttempt>,
        mut states: Vec<RouteState>,
    ) -> Self {
        states.push(RouteState::Completed);
        Self {
            decision: Some(decision),
            result: Ok(result),
            attempts,
            states,
        }
    }

    #[must_use]
    pub fn failure(
        decision: Option<RoutingDecision>,
        error: RouteError,
        attempts: Vec<RouteAttempt>,
        mut states: Vec<RouteState>,
    ) -> Self {
        states.push(RouteState::Failed);
        Self {
            decision,
            result: Err(error),
            attempts,
            states,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    #[must_use]
    pub fn final_state(&self) -> RouteState {
        self.states.last().copied().unwrap_or(RouteState::Idle)
    }

    /// Split into the decision and the dispatch result.
    ///
    /// # Errors
    ///
    /// Returns the routing or dispatch error.
    pub fn into_result(self) -> Result<(RoutingDecision, DispatchResult)> {
        let result = self.result?;
        let decision = self
            .decision
            .ok_or_else(|| RouteError::Other(anyhow::anyhow!("completed route without a decision")))?;
        Ok((decision, result))
    }
}

// =============================================================================
// Planning
// =============================================================================

/// Knobs the policy reads from configuration.
#[derive(Debug, Clone)]
pub struct PolicySettings {
    /// Deadline for each dispatch.
    pub timeout: Duration,
    /// Configured "balanced" local model.
    pub local_default_model: Option<String>,
    /// Let an unresolvable explicit model fall through to auto mode.
    pub fallback_on_unknown_model: bool,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            local_default_model: None,
            fallback_on_unknown_model: false,
        }
    }
}

/// One provider the policy is prepared to dispatch to.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: ProviderConfig,
    pub decision: RoutingDecision,
}

impl Candidate {
    fn new(provider: &ProviderConfig, model: impl Into<String>, reason: DecisionReason) -> Self {
        Self {
            decision: RoutingDecision {
                provider: provider.name,
                model: model.into(),
                reason,
            },
            provider: provider.clone(),
        }
    }
}

/// What the policy decided before any dispatch.
#[derive(Debug, Clone)]
pub enum RoutePlan {
    /// The caller named a provider or model: exactly one attempt.
    Explicit(Candidate),
    /// Auto mode: try each candidate in priority order.
    Auto(Vec<Candidate>),
}

/// Decide where a request goes, without dispatching it.
///
/// # Errors
///
/// Explicit requests fail with [`RouteError::ProviderUnavailable`] or
/// [`RouteError::ModelNotFound`]; auto requests with no usable provider
/// fail with [`RouteError::NoProviderConfigured`].
pub fn plan(
    request: &RoutingRequest,
    registry: &RegistrySnapshot,
    discovery: &DiscoverySnapshot,
    settings: &PolicySettings,
    now: DateTime<Utc>,
) -> Result<RoutePlan> {
    let model = request.model();

    match (request.explicit_provider_hint, model) {
        (Some(hint), requested) if hint.is_local() => {
            explicit_local(requested, &request.prompt_text, registry, discovery, settings)
                .map(RoutePlan::Explicit)
        }
        (Some(hint), requested) => {
            let model = requested.map(|m| {
                catalog::lookup(m)
                    .filter(|found| found.provider == hint)
                    .map_or_else(|| m.to_string(), |found| found.model)
            });
            explicit_remote(hint, model, registry, now).map(RoutePlan::Explicit)
        }
        (None, Some(requested)) => {
            let local_enabled = registry.get(ProviderId::Ollama).is_some_and(|p| p.enabled);
            let local_err = match resolver::resolve(requested, discovery) {
                Ok(found) if local_enabled => {
                    let local = local_entry(registry)?;
                    return Ok(RoutePlan::Explicit(Candidate::new(
                        local,
                        &found.canonical_name,
                        DecisionReason::ExplicitLocalMatch,
                    )));
                }
                Ok(_) => RouteError::unavailable(ProviderId::Ollama, "disabled in configuration"),
                Err(err) => err,
            };
            if resolver::is_local_pinned(requested) {
                return Err(local_err);
            }

            if let Some(found) = catalog::lookup(requested) {
                return explicit_remote(found.provider, Some(found.model), registry, now)
                    .map(RoutePlan::Explicit);
            }

            if settings.fallback_on_unknown_model {
                tracing::info!(model = requested, "unknown model, falling back to auto mode");
                return auto_candidates(&request.prompt_text, registry, discovery, settings, now)
                    .map(RoutePlan::Auto);
            }

            Err(RouteError::ModelNotFound {
                model: requested.to_string(),
                provider: None,
            })
        }
        (None, None) => auto_candidates(&request.prompt_text, registry, discovery, settings, now)
            .map(RoutePlan::Auto),
    }
}

fn local_entry(registry: &RegistrySnapshot) -> Result<&ProviderConfig> {
    registry
        .get(ProviderId::Ollama)
        .ok_or_else(|| RouteError::unavailable(ProviderId::Ollama, "not registered"))
}

fn explicit_local(
    requested: Option<&str>,
    prompt: &str,
    registry: &RegistrySnapshot,
    discovery: &DiscoverySnapshot,
    settings: &PolicySettings,
) -> Result<Candidate> {
    let local = local_entry(registry)?;
    if !local.enabled {
        return Err(RouteError::unavailable(local.name, "disabled in configuration"));
    }

    let model = match requested {
        Some(name) => resolver::resolve(name, discovery)?,
        None => resolver::select_default(prompt, discovery, settings.local_default_model.as_deref())
            .ok_or_else(|| {
                RouteError::unavailable(
                    local.name,
                    format!("no usable models (discovery {})", discovery.status.label()),
                )
            })?,
    };
    Ok(Candidate::new(
        local,
        &model.canonical_name,
        DecisionReason::ExplicitLocalMatch,
    ))
}

fn explicit_remote(
    provider: ProviderId,
    model: Option<String>,
    registry: &RegistrySnapshot,
    now: DateTime<Utc>,
) -> Result<Candidate> {
    let entry = registry
        .get(provider)
        .ok_or_else(|| RouteError::unavailable(provider, "not registered"))?;

    if !entry.enabled {
        return Err(RouteError::unavailable(provider, "disabled in configuration"));
    }
    if !entry.credential_present {
        return Err(RouteError::unavailable(
            provider,
            format!("{} not set", provider.credential_env_vars().join(" or ")),
        ));
    }
    if let ProviderStatus::RateLimited { until } = entry.status
        && until > now
    {
        return Err(RouteError::unavailable(
            provider,
            format!("rate limited until {}", until.to_rfc3339()),
        ));
    }

    let model = model
        .or_else(|| entry.default_model.clone())
        .ok_or_else(|| RouteError::unavailable(provider, "no default model configured"))?;
    Ok(Candidate::new(entry, model, DecisionReason::ExplicitRemoteMatch))
}

/// Whether auto mode may use the local engine.
///
/// Needs a fresh discovery result and no contrary health probe.
fn local_auto_eligible(local: &ProviderConfig, discovery: &DiscoverySnapshot) -> bool {
    local.enabled
        && discovery.status == DiscoveryStatus::Ready
        && !discovery.models.is_empty()
        && !matches!(
            local.status,
            ProviderStatus::Unreachable | ProviderStatus::NeedsModelPull | ProviderStatus::Disabled
        )
}

fn auto_candidates(
    prompt: &str,
    registry: &RegistrySnapshot,
    discovery: &DiscoverySnapshot,
    settings: &PolicySettings,
    now: DateTime<Utc>,
) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();

    for provider in &registry.providers {
        if provider.name.is_local() {
            if !local_auto_eligible(provider, discovery) {
                tracing::debug!(
                    status = provider.status.label(),
                    discovery = discovery.status.label(),
                    "local engine not eligible for auto mode"
                );
                continue;
            }
            match resolver::select_default(prompt, discovery, settings.local_default_model.as_deref()) {
                Some(model) => candidates.push(Candidate::new(
                    provider,
                    &model.canonical_name,
                    DecisionReason::AutoLocalDefault,
                )),
                None => tracing::debug!("no chat-capable local model for auto mode"),
            }
        } else if provider.is_usable_at(now) {
            match &provider.default_model {
                Some(model) => candidates.push(Candidate::new(
                    provider,
                    model,
                    DecisionReason::AutoFallbackRemote,
                )),
                None => tracing::debug!(provider = %provider.name, "no default model, skipping"),
            }
        }
    }

    if candidates.is_empty() {
        return Err(RouteError::NoProviderConfigured);
    }
    Ok(candidates)
}

// =============================================================================
// Policy
// =============================================================================

/// Decides and dispatches requests.
#[derive(Debug)]
pub struct RoutingPolicy {
    registry: Arc<ProviderRegistry>,
    discovery: Arc<ModelDiscovery>,
    dispatcher: Arc<RequestDispatcher>,
    settings: PolicySettings,
}

impl RoutingPolicy {
    #[must_use]
    pub const fn new(
        registry: Arc<ProviderRegistry>,
        discovery: Arc<ModelDiscovery>,
        dispatcher: Arc<RequestDispatcher>,
        settings: PolicySettings,
    ) -> Self {
        Self {
            registry,
            discovery,
            dispatcher,
            settings,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &PolicySettings {
        &self.settings
    }

    /// Decide without dispatching, against the current snapshots.
    ///
    /// # Errors
    ///
    /// See [`plan`].
    pub fn decide(&self, request: &RoutingRequest) -> Result<RoutingDecision> {
        let registry = self.registry.snapshot();
        let discovery = self.discovery.current();
        match plan(request, &registry, &discovery, &self.settings, Utc::now())? {
            RoutePlan::Explicit(candidate) => Ok(candidate.decision),
            RoutePlan::Auto(candidates) => candidates
                .into_iter()
                .next()
                .map(|c| c.decision)
                .ok_or(RouteError::NoProviderConfigured),
        }
    }

    /// Route one request and dispatch it, inside its own `route` span.
    pub async fn route(&self, request: &RoutingRequest) -> RouteOutcome {
        let span = logging::route_span(request);
        self.route_in(request, &span).instrument(span.clone()).await
    }

    async fn route_in(&self, request: &RoutingRequest, span: &Span) -> RouteOutcome {
        let mut states = vec![RouteState::Idle, RouteState::Resolving];
        let registry = self.registry.snapshot();
        let discovery = self.discovery.current();

        let plan = match plan(request, &registry, &discovery, &self.settings, Utc::now()) {
            Ok(plan) => plan,
            Err(err) => {
                tracing::warn!(error = %err, "routing failed before dispatch");
                return RouteOutcome::failure(None, err, Vec::new(), states);
            }
        };

        let (candidates, auto) = match plan {
            RoutePlan::Explicit(candidate) => (vec![candidate], false),
            RoutePlan::Auto(candidates) => (candidates, true),
        };

        let mut attempts = Vec::with_capacity(candidates.len());
        let mut last_decision = None;

        for candidate in candidates {
            let decision = candidate.decision.clone();
            states.push(RouteState::Selected);
            states.push(RouteState::Dispatching);
            logging::record_attempt(span, decision.provider, &decision.model, attempts.len() + 1);
            tracing::info!(reason = %decision.reason, "dispatching");

            let started_at = Utc::now();
            let deadline = tokio::time::Instant::now() + self.settings.timeout;
            let result = self
                .dispatcher
                .dispatch(&candidate.provider, &decision.model, &request.prompt_text, deadline)
                .await;
            let duration_ms = u64::try_from((Utc::now() - started_at).num_milliseconds()).unwrap_or(0);

            attempts.push(RouteAttempt {
                provider: decision.provider,
                model: decision.model.clone(),
                reason: decision.reason,
                started_at,
                duration_ms,
                success: result.is_ok(),
                error: result.as_ref().err().map(ToString::to_string),
            });

            match result {
                Ok(dispatched) => {
                    if dispatched.retried {
                        states.push(RouteState::Retrying);
                    }
                    return RouteOutcome::success(decision, dispatched, attempts, states);
                }
                Err(err) => {
                    self.note_rate_limit(&err, decision.provider);
                    if !auto || !err.is_recoverable_in_auto() {
                        return RouteOutcome::failure(Some(decision), err, attempts, states);
                    }
                    tracing::info!(
                        provider = %decision.provider,
                        error = %err,
                        "falling back to next provider"
                    );
                    last_decision = Some(decision);
                }
            }
        }

        let messages = attempts
            .iter()
            .map(|a| format!("{}: {}", a.provider, a.error.as_deref().unwrap_or("failed")))
            .collect();
        RouteOutcome::failure(
            last_decision,
            RouteError::FallbackExhausted { attempts: messages },
            attempts,
            states,
        )
    }

    fn note_rate_limit(&self, err: &RouteError, provider: ProviderId) {
        if let RouteError::RemoteApi {
            kind: RemoteErrorKind::RateLimit,
            retry_after,
            ..
        } = err
        {
            self.registry.mark_rate_limited(provider, *retry_after);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::discovery::DiscoverySnapshot;
    use crate::core::registry::Credentials;
    use crate::storage::config::ProviderSettings;
    use crate::test_utils::make_descriptor;

    fn registry(creds: &Credentials, local: ProviderStatus) -> RegistrySnapshot {
        let providers = ProviderId::ALL
            .iter()
            .map(|&id| {
                let mut entry = ProviderConfig::from_settings(&ProviderSettings::defaults_for(id), creds);
                if id.is_local() {
                    entry.status = local;
                    entry.available = local == ProviderStatus::Available;
                }
                entry
            })
            .collect();
        RegistrySnapshot::from_providers(providers)
    }

    fn three_models() -> DiscoverySnapshot {
        DiscoverySnapshot::ready(vec![
            make_descriptor("llama-small", 2),
            make_descriptor("llama-code", 4),
            make_descriptor("llama-large", 40),
        ])
    }

    fn explicit(plan: RoutePlan) -> RoutingDecision {
        match plan {
            RoutePlan::Explicit(c) => c.decision,
            RoutePlan::Auto(_) => panic!("expected an explicit plan"),
        }
    }

    fn first_auto(plan: RoutePlan) -> RoutingDecision {
        match plan {
            RoutePlan::Auto(c) => c[0].decision.clone(),
            RoutePlan::Explicit(_) => panic!("expected an auto plan"),
        }
    }

    #[test]
    fn auto_prefers_local_when_models_exist() {
        let creds = Credentials::default().with(ProviderId::OpenAI, "k");
        let reg = registry(&creds, ProviderStatus::Available);
        let request = RoutingRequest::auto("write a function to reverse a string");
        let plan = plan(&request, &reg, &three_models(), &PolicySettings::default(), Utc::now()).unwrap();
        let RoutePlan::Auto(candidates) = plan else {
            panic!("expected auto plan");
        };
        assert_eq!(candidates[0].decision.provider, ProviderId::Ollama);
        assert_eq!(candidates[0].decision.model, "llama-code");
        assert_eq!(candidates[0].decision.reason, DecisionReason::AutoLocalDefault);
        assert_eq!(candidates[1].decision.provider, ProviderId::OpenAI);
        assert_eq!(candidates[1].decision.reason, DecisionReason::AutoFallbackRemote);
    }

    #[test]
    fn nothing_usable_is_no_provider_configured() {
        let reg = registry(&Credentials::default(), ProviderStatus::NeedsModelPull);
        let empty = DiscoverySnapshot::ready(vec![]);
        let err = plan(&RoutingRequest::auto("hi"), &reg, &empty, &PolicySettings::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, RouteError::NoProviderConfigured));
        assert!(err.fix_suggestions()[0].context.contains("Ollama"));
    }

    #[test]
    fn explicit_local_model_resolves_by_prefix() {
        let reg = registry(&Credentials::default(), ProviderStatus::Available);
        let request = RoutingRequest::auto("hi").with_model("local/llama-c");
        let decision = explicit(
            plan(&request, &reg, &three_models(), &PolicySettings::default(), Utc::now()).unwrap(),
        );
        assert_eq!(decision.provider, ProviderId::Ollama);
        assert_eq!(decision.model, "llama-code");
        assert_eq!(decision.reason, DecisionReason::ExplicitLocalMatch);
    }

    #[test]
    fn explicit_remote_without_credentials_is_unavailable() {
        let reg = registry(&Credentials::default(), ProviderStatus::Available);
        let request = RoutingRequest::auto("hi").with_model("gpt-4o");
        let err = plan(&request, &reg, &three_models(), &PolicySettings::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, RouteError::ProviderUnavailable { ref provider, .. } if provider == "openai"));
    }

    #[test]
    fn explicit_remote_with_credentials() {
        let creds = Credentials::default().with(ProviderId::Anthropic, "k");
        let reg = registry(&creds, ProviderStatus::Available);
        let request = RoutingRequest::auto("hi").with_model("claude-3-opus");
        let decision = explicit(
            plan(&request, &reg, &three_models(), &PolicySettings::default(), Utc::now()).unwrap(),
        );
        assert_eq!(decision.provider, ProviderId::Anthropic);
        assert_eq!(decision.model, "claude-opus-4-1-20250805");
        assert_eq!(decision.reason, DecisionReason::ExplicitRemoteMatch);
    }

    #[test]
    fn unknown_model_is_not_found_unless_fallback_enabled() {
        let reg = registry(&Credentials::default(), ProviderStatus::Available);
        let request = RoutingRequest::auto("What is 2+2?").with_model("mystery-model");
        let err = plan(&request, &reg, &three_models(), &PolicySettings::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, RouteError::ModelNotFound { .. }));

        let lenient = PolicySettings {
            fallback_on_unknown_model: true,
            ..PolicySettings::default()
        };
        let decision = first_auto(plan(&request, &reg, &three_models(), &lenient, Utc::now()).unwrap());
        assert_eq!(decision.model, "llama-small");
    }

    #[test]
    fn local_pinned_name_never_goes_remote() {
        let creds = Credentials::default().with(ProviderId::OpenAI, "k");
        let reg = registry(&creds, ProviderStatus::Available);
        let request = RoutingRequest::auto("hi").with_model("ollama/gpt-4o");
        let err = plan(&request, &reg, &three_models(), &PolicySettings::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, RouteError::ModelNotFound { provider: Some(_), .. }));
    }

    #[test]
    fn remote_hint_uses_default_model() {
        let creds = Credentials::default().with(ProviderId::Google, "k");
        let reg = registry(&creds, ProviderStatus::Available);
        let request = RoutingRequest::auto("hi").with_provider(ProviderId::Google);
        let decision = explicit(
            plan(&request, &reg, &three_models(), &PolicySettings::default(), Utc::now()).unwrap(),
        );
        assert_eq!(decision.provider, ProviderId::Google);
        assert_eq!(decision.model, "gemini-2.5-flash");
    }

    #[test]
    fn rate_limited_remote_is_skipped_in_auto() {
        let creds = Credentials::default()
            .with(ProviderId::Anthropic, "k")
            .with(ProviderId::OpenAI, "k");
        let mut reg = registry(&creds, ProviderStatus::Unreachable);
        let now = Utc::now();
        for p in &mut reg.providers {
            if p.name == ProviderId::Anthropic {
                p.status = ProviderStatus::RateLimited {
                    until: now + chrono::Duration::minutes(5),
                };
            }
        }
        let decision = first_auto(
            plan(&RoutingRequest::auto("hi"), &reg, &three_models(), &PolicySettings::default(), now)
                .unwrap(),
        );
        assert_eq!(decision.provider, ProviderId::OpenAI);
    }

    #[test]
    fn stale_snapshot_is_not_used_in_auto() {
        let creds = Credentials::default().with(ProviderId::Xai, "k");
        let reg = registry(&creds, ProviderStatus::Available);
        let mut stale = three_models();
        stale.status = DiscoveryStatus::Stale { missed_cycles: 1 };
        let decision = first_auto(
            plan(&RoutingRequest::auto("hi"), &reg, &stale, &PolicySettings::default(), Utc::now())
                .unwrap(),
        );
        assert_eq!(decision.provider, ProviderId::Xai);
    }

    #[test]
    fn outcome_states_end_terminal() {
        let outcome = RouteOutcome::failure(
            None,
            RouteError::NoProviderConfigured,
            Vec::new(),
            vec![RouteState::Idle, RouteState::Resolving],
        );
        assert!(!outcome.is_success());
        assert!(outcome.final_state().is_terminal());
        assert_eq!(outcome.final_state(), RouteState::Failed);
    }
}
