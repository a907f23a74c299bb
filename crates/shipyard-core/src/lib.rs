//! Shipyard Core Library
//!
//! Domain types and orchestration for branch-driven container deployments:
//! branch → environment resolution, image build/push, GitOps manifest
//! updates, production mirroring and run notifications.
//!
//! External tools are reached only through the traits in [`capabilities`];
//! process-backed implementations live in `shipyard-exec`.

pub mod capabilities;
pub mod config;
pub mod environment;
pub mod error;
pub mod fakes;
pub mod image;
pub mod manifest;
pub mod mirror;
pub mod notify;
pub mod obs;
pub mod pipeline;
pub mod plan;
pub mod project;
pub mod publish;
pub mod report;
pub mod telemetry;
pub mod template;

pub use capabilities::{
    ImageBuilder, ManifestEditor, NotificationSink, RegistryAdmin, RepositoryMirror,
    VersionControl,
};
pub use config::{
    DeployConfig, ExecutionConfig, ManifestConfig, MirrorConfig, NotifyConfig, RegistryConfig,
    RegistryProvider, DEFAULT_CONFIG_FILE,
};
pub use environment::{normalize_reference, BranchMapping, Environment};
pub use error::{
    CapabilityError, CapabilityResult, ConfigError, DeployError, MirrorError, NotificationError,
    Result,
};
pub use image::{ImageReference, ImageTag};
pub use manifest::ManifestUpdater;
pub use mirror::MirrorTrigger;
pub use notify::{Notification, Notifier};
pub use pipeline::{Capabilities, DeployOrchestrator};
pub use plan::{DeployPlan, PlannedImage};
pub use project::{BuildDefinition, ProjectSpec};
pub use publish::ImagePublisher;
pub use report::{
    DeployReport, ErrorSummary, ManifestOutcome, MirrorOutcome, NotificationOutcome,
    ProjectOutcome, RunStatus, Trigger,
};
