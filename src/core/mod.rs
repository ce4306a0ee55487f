//! Routing core: providers, discovery, resolution, policy and accounting.

pub mod accountant;
pub mod discovery;
pub mod dispatch;
pub mod health;
pub mod http;
pub mod logging;
pub mod models;
pub mod policy;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod status;

pub use accountant::{ProviderUsage, UsageAccountant, UsageSnapshot};
pub use discovery::{DiscoverySettings, DiscoverySnapshot, DiscoveryStatus, ModelDiscovery};
pub use dispatch::RequestDispatcher;
pub use health::{CredentialHealthCheck, HealthResult, LocalEngineHealthCheck, PollableHealthCheck};
pub use models::{
    Capability, Completion, DecisionReason, DispatchResult, EngineModel, ModelDescriptor,
    RoutingDecision, RoutingRequest, UsageRecord,
};
pub use policy::{RouteAttempt, RouteOutcome, RouteState, RoutingPolicy};
pub use provider::{ProviderId, ProviderKind};
pub use registry::{Credentials, ProviderConfig, ProviderRegistry, ProviderStatus, RegistrySnapshot};
pub use router::{BackgroundTasks, Router};
pub use status::{StatusReport, StatusReporter};
