//! Telemetry-context transfer.
//!
//! A host pipeline carries an ambient context (tags plus public properties)
//! on every telemetry item. The engine never inspects it; it only needs to
//! copy one context into another when stamping emitted aggregates. Tag
//! structures are not publicly settable in every host, so the tag copy goes
//! through a [`ContextBridge`] installed process-wide; the property copy is
//! plain map transfer that never overwrites existing target values.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::error::MetricError;

/// Reserved dimension names understood by the aggregator.
///
/// A dimension whose name carries the `TelemetryContext.` prefix is not an
/// aggregation dimension: its value is routed into the emitted record's
/// context tags instead.
pub mod dimension_names {
    /// Prefix marking a dimension as a context pass-through.
    pub const CONTEXT_PREFIX: &str = "TelemetryContext.";

    pub const INSTRUMENTATION_KEY: &str = "TelemetryContext.InstrumentationKey";
    pub const CLOUD_ROLE_NAME: &str = "TelemetryContext.Cloud.RoleName";
    pub const CLOUD_ROLE_INSTANCE: &str = "TelemetryContext.Cloud.RoleInstance";
    pub const OPERATION_ID: &str = "TelemetryContext.Operation.Id";
    pub const OPERATION_NAME: &str = "TelemetryContext.Operation.Name";
    pub const OPERATION_SYNTHETIC_SOURCE: &str = "TelemetryContext.Operation.SyntheticSource";
    pub const SESSION_ID: &str = "TelemetryContext.Session.Id";
    pub const USER_ID: &str = "TelemetryContext.User.Id";
    pub const USER_ACCOUNT_ID: &str = "TelemetryContext.User.AccountId";
    pub const USER_AUTHENTICATED_ID: &str = "TelemetryContext.User.AuthenticatedUserId";
    pub const DEVICE_ID: &str = "TelemetryContext.Device.Id";
    pub const DEVICE_TYPE: &str = "TelemetryContext.Device.Type";
    pub const COMPONENT_VERSION: &str = "TelemetryContext.Component.Version";

    /// Whether `name` is a context pass-through rather than an aggregation
    /// dimension.
    pub fn is_context_dimension(name: &str) -> bool {
        name.starts_with(CONTEXT_PREFIX)
    }
}

/// An opaque host context: internal tags plus public string properties.
#[derive(Debug, Clone, Default)]
pub struct TelemetryContext {
    tags: HashMap<String, String>,
    properties: HashMap<String, String>,
}

impl TelemetryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }
}

/// Transfers a source context's tags into a target.
///
/// One implementation exists per host integration; hosts whose tag structure
/// is not publicly settable hide that access behind this seam.
pub trait ContextBridge: Send + Sync {
    fn copy_tags(
        &self,
        source: &TelemetryContext,
        target: &mut TelemetryContext,
    ) -> Result<(), MetricError>;
}

/// Bridge for contexts whose tags are directly accessible: copies source
/// tags into the target for keys the target does not already carry.
pub struct DirectContextBridge;

impl ContextBridge for DirectContextBridge {
    fn copy_tags(
        &self,
        source: &TelemetryContext,
        target: &mut TelemetryContext,
    ) -> Result<(), MetricError> {
        for (key, value) in &source.tags {
            if key.trim().is_empty() {
                continue;
            }
            target
                .tags
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        Ok(())
    }
}

// The copy primitive lives in process-wide state, installed lazily under
// compare-exchange so concurrent first uses agree on one bridge.
static BRIDGE: ArcSwapOption<Box<dyn ContextBridge>> = ArcSwapOption::const_empty();

/// Replaces the process-wide context bridge.
pub fn set_context_bridge(bridge: Box<dyn ContextBridge>) {
    BRIDGE.store(Some(Arc::new(bridge)));
}

fn installed_bridge() -> Arc<Box<dyn ContextBridge>> {
    if let Some(bridge) = BRIDGE.load_full() {
        return bridge;
    }
    BRIDGE.rcu(|current| match current {
        Some(bridge) => Some(Arc::clone(bridge)),
        None => Some(Arc::new(
            Box::new(DirectContextBridge) as Box<dyn ContextBridge>
        )),
    });
    BRIDGE.load_full().expect("bridge just installed")
}

/// Copies `source` into `target`: tags through the installed bridge, then
/// properties for keys not already present. Blank source keys are skipped;
/// existing target values are never overwritten.
pub fn copy_context(
    source: &TelemetryContext,
    target: &mut TelemetryContext,
) -> Result<(), MetricError> {
    installed_bridge().copy_tags(source, target)?;

    for (key, value) in &source.properties {
        if key.trim().is_empty() {
            continue;
        }
        target
            .properties
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial(context_bridge)]
    fn test_existing_target_values_are_preserved() {
        let mut source = TelemetryContext::new();
        source.set_property("region", "eu");
        source.set_property("zone", "b");

        let mut target = TelemetryContext::new();
        target.set_property("region", "us");

        copy_context(&source, &mut target).expect("copy");

        assert_eq!(target.property("region"), Some("us"));
        assert_eq!(target.property("zone"), Some("b"));
    }

    #[test]
    #[serial(context_bridge)]
    fn test_blank_source_keys_are_skipped() {
        let mut source = TelemetryContext::new();
        source.set_property("", "dropped");
        source.set_property("   ", "dropped");
        source.set_property("kept", "v");

        let mut target = TelemetryContext::new();
        copy_context(&source, &mut target).expect("copy");

        assert_eq!(target.properties().len(), 1);
        assert_eq!(target.property("kept"), Some("v"));
    }

    #[test]
    #[serial(context_bridge)]
    fn test_tags_copy_through_bridge() {
        let mut source = TelemetryContext::new();
        source.set_tag("ai.cloud.role", "frontend");

        let mut target = TelemetryContext::new();
        target.set_tag("ai.session.id", "s1");

        copy_context(&source, &mut target).expect("copy");

        assert_eq!(target.tag("ai.cloud.role"), Some("frontend"));
        assert_eq!(target.tag("ai.session.id"), Some("s1"));
    }

    #[test]
    #[serial(context_bridge)]
    fn test_custom_bridge_replaces_default() {
        struct FailingBridge;

        impl ContextBridge for FailingBridge {
            fn copy_tags(
                &self,
                _source: &TelemetryContext,
                _target: &mut TelemetryContext,
            ) -> Result<(), MetricError> {
                Err(MetricError::ContextBridge {
                    reason: "host context type unavailable".into(),
                })
            }
        }

        set_context_bridge(Box::new(FailingBridge));
        let source = TelemetryContext::new();
        let mut target = TelemetryContext::new();
        let result = copy_context(&source, &mut target);
        assert!(matches!(result, Err(MetricError::ContextBridge { .. })));

        // Restore the default for other tests.
        set_context_bridge(Box::new(DirectContextBridge));
    }

    #[test]
    fn test_reserved_dimension_prefix() {
        use super::dimension_names::*;

        assert!(is_context_dimension(CLOUD_ROLE_NAME));
        assert!(is_context_dimension(OPERATION_ID));
        assert!(!is_context_dimension("color"));
        assert!(!is_context_dimension("telemetrycontext.lowercase"));
    }
}
