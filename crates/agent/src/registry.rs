use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use waypoint_core::domain::intent::{CapabilityDescriptor, HandlerId, HandlerMetadata};
use waypoint_core::errors::DomainError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RegistrationMode {
    /// Last write wins; replacing an existing handler is logged.
    #[default]
    Overwrite,
    /// Registering an id twice is an error.
    Strict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Inserted,
    Replaced,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandlerEntry {
    pub metadata: HandlerMetadata,
    pub descriptors: Vec<CapabilityDescriptor>,
    pub enabled: bool,
    pub registered_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HandlerSummary {
    pub id: HandlerId,
    pub name: String,
    pub version: String,
    pub enabled: bool,
    pub capabilities: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryExport {
    pub exported_at: DateTime<Utc>,
    pub handlers: Vec<HandlerEntry>,
}

/// Point-in-time copy of the enabled descriptors. Classification works on
/// this so no lock is held while a request is in flight.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegistrySnapshot {
    descriptors: Vec<CapabilityDescriptor>,
}

impl RegistrySnapshot {
    pub fn from_descriptors(descriptors: Vec<CapabilityDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn descriptors(&self) -> &[CapabilityDescriptor] {
        &self.descriptors
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Handler id → capabilities and metadata. Reads run concurrently, writes are
/// serialized behind one `RwLock`.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    entries: RwLock<BTreeMap<HandlerId, HandlerEntry>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite-mode registration with metadata derived from the id.
    pub fn register(
        &self,
        handler_id: HandlerId,
        descriptors: Vec<CapabilityDescriptor>,
    ) -> RegistrationOutcome {
        let metadata = HandlerMetadata {
            name: handler_id.as_str().replace('_', " "),
            description: String::new(),
            version: "1.0.0".to_string(),
            id: handler_id,
        };
        match self.register_with(metadata, descriptors, RegistrationMode::Overwrite) {
            Ok(outcome) => outcome,
            Err(_) => RegistrationOutcome::Replaced,
        }
    }

    pub fn register_with(
        &self,
        metadata: HandlerMetadata,
        descriptors: Vec<CapabilityDescriptor>,
        mode: RegistrationMode,
    ) -> Result<RegistrationOutcome, DomainError> {
        let handler_id = metadata.id.clone();
        let descriptors = descriptors
            .into_iter()
            .map(|mut descriptor| {
                descriptor.handler_id = handler_id.clone();
                descriptor
            })
            .collect::<Vec<_>>();

        let mut entries = self.write();
        let previous = entries.get(&handler_id);
        if previous.is_some() && mode == RegistrationMode::Strict {
            return Err(DomainError::DuplicateHandler(handler_id));
        }
        let enabled = previous.map(|entry| entry.enabled).unwrap_or(true);
        let capability_count = descriptors.len();
        let replaced = entries
            .insert(
                handler_id.clone(),
                HandlerEntry { metadata, descriptors, enabled, registered_at: Utc::now() },
            )
            .is_some();
        drop(entries);

        if replaced {
            info!(
                event_name = "registry.handler.replaced",
                handler = %handler_id,
                capabilities = capability_count,
                "handler registration replaced an existing entry"
            );
            Ok(RegistrationOutcome::Replaced)
        } else {
            info!(
                event_name = "registry.handler.registered",
                handler = %handler_id,
                capabilities = capability_count,
                "handler registered"
            );
            Ok(RegistrationOutcome::Inserted)
        }
    }

    pub fn all(&self) -> Vec<(HandlerId, CapabilityDescriptor)> {
        self.read()
            .iter()
            .flat_map(|(id, entry)| {
                entry.descriptors.iter().cloned().map(move |descriptor| (id.clone(), descriptor))
            })
            .collect()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let descriptors = self
            .read()
            .values()
            .filter(|entry| entry.enabled)
            .flat_map(|entry| entry.descriptors.iter().cloned())
            .collect();
        RegistrySnapshot { descriptors }
    }

    pub fn enable(&self, handler_id: &HandlerId) -> Result<(), DomainError> {
        self.set_enabled(handler_id, true)
    }

    pub fn disable(&self, handler_id: &HandlerId) -> Result<(), DomainError> {
        self.set_enabled(handler_id, false)
    }

    fn set_enabled(&self, handler_id: &HandlerId, enabled: bool) -> Result<(), DomainError> {
        let mut entries = self.write();
        let entry = entries
            .get_mut(handler_id)
            .ok_or_else(|| DomainError::UnknownHandler(handler_id.clone()))?;
        entry.enabled = enabled;
        drop(entries);

        warn!(
            event_name = "registry.handler.toggled",
            handler = %handler_id,
            enabled,
            "handler availability changed"
        );
        Ok(())
    }

    pub fn is_enabled(&self, handler_id: &HandlerId) -> bool {
        self.read().get(handler_id).is_some_and(|entry| entry.enabled)
    }

    pub fn contains(&self, handler_id: &HandlerId) -> bool {
        self.read().contains_key(handler_id)
    }

    pub fn entry(&self, handler_id: &HandlerId) -> Option<HandlerEntry> {
        self.read().get(handler_id).cloned()
    }

    pub fn handlers(&self) -> Vec<HandlerSummary> {
        self.read()
            .values()
            .map(|entry| HandlerSummary {
                id: entry.metadata.id.clone(),
                name: entry.metadata.name.clone(),
                version: entry.metadata.version.clone(),
                enabled: entry.enabled,
                capabilities: entry.descriptors.iter().map(|d| d.name.clone()).collect(),
            })
            .collect()
    }

    pub fn export(&self) -> RegistryExport {
        let handlers = self.read().values().cloned().collect();
        RegistryExport { exported_at: Utc::now(), handlers }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<HandlerId, HandlerEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<HandlerId, HandlerEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use waypoint_core::domain::intent::{CapabilityDescriptor, HandlerId, HandlerMetadata};
    use waypoint_core::errors::DomainError;

    use super::{CapabilityRegistry, RegistrationMode, RegistrationOutcome};

    fn descriptor(name: &str) -> CapabilityDescriptor {
        CapabilityDescriptor::new(HandlerId::General, name).keywords(["alpha"])
    }

    fn metadata(id: HandlerId) -> HandlerMetadata {
        HandlerMetadata {
            id,
            name: "Cost analysis".to_string(),
            description: "prices things".to_string(),
            version: "2.0.0".to_string(),
        }
    }

    #[test]
    fn register_is_last_write_wins_by_default() {
        let registry = CapabilityRegistry::new();
        let first = registry.register(HandlerId::CostAnalysis, vec![descriptor("a")]);
        let second =
            registry.register(HandlerId::CostAnalysis, vec![descriptor("b"), descriptor("c")]);

        assert_eq!(first, RegistrationOutcome::Inserted);
        assert_eq!(second, RegistrationOutcome::Replaced);

        let all = registry.all();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|(id, d)| *id == HandlerId::CostAnalysis && d.handler_id == *id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn strict_mode_rejects_duplicates() {
        let registry = CapabilityRegistry::new();
        registry
            .register_with(
                metadata(HandlerId::CostAnalysis),
                vec![descriptor("a")],
                RegistrationMode::Strict,
            )
            .expect("first registration succeeds");

        let error = registry
            .register_with(
                metadata(HandlerId::CostAnalysis),
                vec![descriptor("b")],
                RegistrationMode::Strict,
            )
            .expect_err("duplicate must fail in strict mode");
        assert_eq!(error, DomainError::DuplicateHandler(HandlerId::CostAnalysis));
        assert_eq!(registry.all()[0].1.name, "a");
    }

    #[test]
    fn disabled_handlers_drop_out_of_snapshot() {
        let registry = CapabilityRegistry::new();
        registry.register(HandlerId::CostAnalysis, vec![descriptor("a")]);
        registry.register(HandlerId::Custom("security".into()), vec![descriptor("b")]);
        assert_eq!(registry.snapshot().descriptors().len(), 2);

        registry.disable(&HandlerId::CostAnalysis).expect("known handler");
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.descriptors().len(), 1);
        assert_eq!(snapshot.descriptors()[0].handler_id, HandlerId::Custom("security".into()));
        assert!(!registry.is_enabled(&HandlerId::CostAnalysis));

        registry.enable(&HandlerId::CostAnalysis).expect("known handler");
        assert!(registry.is_enabled(&HandlerId::CostAnalysis));
    }

    #[test]
    fn re_registration_keeps_enabled_flag() {
        let registry = CapabilityRegistry::new();
        registry.register(HandlerId::CostAnalysis, vec![descriptor("a")]);
        registry.disable(&HandlerId::CostAnalysis).expect("known handler");
        registry.register(HandlerId::CostAnalysis, vec![descriptor("b")]);
        assert!(!registry.is_enabled(&HandlerId::CostAnalysis));
    }

    #[test]
    fn toggling_unknown_handler_fails() {
        let registry = CapabilityRegistry::new();
        let error = registry.disable(&HandlerId::General).expect_err("nothing registered");
        assert_eq!(error, DomainError::UnknownHandler(HandlerId::General));
    }

    #[test]
    fn export_serializes_every_handler() {
        let registry = CapabilityRegistry::new();
        registry
            .register_with(
                metadata(HandlerId::CostAnalysis),
                vec![descriptor("a")],
                RegistrationMode::Overwrite,
            )
            .expect("registration succeeds");
        registry.register(HandlerId::General, Vec::new());

        let export = registry.export();
        let encoded = serde_json::to_value(&export).expect("serialize");
        let handlers = encoded["handlers"].as_array().expect("handlers array");
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[0]["metadata"]["id"], "cost_analysis");
        assert_eq!(handlers[0]["metadata"]["version"], "2.0.0");
        assert_eq!(handlers[0]["enabled"], true);

        let summaries = registry.handlers();
        assert_eq!(summaries[0].capabilities, vec!["a".to_string()]);
    }
}
