// Wiring of registries, exporter and reconciler from one `ServiceConfig`.
//
// Cheap to clone; the binary hands one to every command and to the panel.

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::error::CoreError;
use crate::export::EndpointExporter;
use crate::reconcile::Reconciler;
use crate::store::{CredentialRegistry, RuleRegistry, StructuredStore};

#[derive(Debug, Clone)]
pub struct Backend {
    config: Arc<ServiceConfig>,
    credentials: CredentialRegistry,
    rules: Option<RuleRegistry>,
    exporter: EndpointExporter,
    reconciler: Reconciler,
}

impl Backend {
    pub fn new(config: ServiceConfig) -> Result<Self, CoreError> {
        let reconciler = Reconciler::new(&config.reconcile)?;
        Ok(Self::with_reconciler(config, reconciler))
    }

    pub fn with_reconciler(config: ServiceConfig, reconciler: Reconciler) -> Self {
        let credentials = CredentialRegistry::new(
            StructuredStore::new(config.stores.credentials.clone()),
            reconciler.clone(),
        );
        let rules = config
            .stores
            .rules
            .clone()
            .map(|path| RuleRegistry::new(StructuredStore::new(path), reconciler.clone()));
        let exporter = EndpointExporter::new(
            config.endpoint.clone(),
            config.command_timeout,
            credentials.clone(),
        );

        Self {
            config: Arc::new(config),
            credentials,
            rules,
            exporter,
            reconciler,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialRegistry {
        &self.credentials
    }

    /// The rule registry, or a config error when no rules file is set.
    pub fn rules(&self) -> Result<&RuleRegistry, CoreError> {
        self.rules.as_ref().ok_or_else(|| CoreError::Config {
            message: "rule management is disabled: rules_file is not set".into(),
        })
    }

    pub fn rules_enabled(&self) -> bool {
        self.rules.is_some()
    }

    pub fn exporter(&self) -> &EndpointExporter {
        &self.exporter
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}
