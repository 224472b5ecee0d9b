//! Service registry (§4.6): tracks the set of connected services and what
//! each one declares it can do.

use std::collections::{HashMap, HashSet};

use vargos_protocol::{error_codes, ErrorShape, ServiceRegistration};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("service '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl From<RegistryError> for ErrorShape {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyRegistered(service) => {
                ErrorShape::new(error_codes::ALREADY_REGISTERED, service)
            },
        }
    }
}

#[derive(Debug, Clone)]
struct RegisteredService {
    registration: ServiceRegistration,
    connection_id: String,
}

/// Tracks connected services keyed by service name. A connection id
/// (normally the WebSocket connection's identity) is stored alongside each
/// registration so deregistration can be driven by connection close.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, RegisteredService>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `registration` as owned by `connection_id`. Fails if the
    /// service name is already taken.
    pub fn register(
        &mut self,
        registration: ServiceRegistration,
        connection_id: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let name = registration.service.clone();
        if self.services.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.services.insert(
            name,
            RegisteredService {
                registration,
                connection_id: connection_id.into(),
            },
        );
        Ok(())
    }

    /// Remove every service owned by `connection_id` (connection close).
    /// Returns the names removed, for cancelling in-flight requests that
    /// targeted them.
    pub fn deregister_connection(&mut self, connection_id: &str) -> Vec<String> {
        let removed: Vec<String> = self
            .services
            .iter()
            .filter(|(_, svc)| svc.connection_id == connection_id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &removed {
            self.services.remove(name);
        }
        removed
    }

    /// Connection id that owns `service`, if it is currently registered and
    /// declares `method`.
    #[must_use]
    pub fn resolve_method(&self, service: &str, method: &str) -> Option<&str> {
        let svc = self.services.get(service)?;
        svc.registration
            .methods
            .iter()
            .any(|m| m == method)
            .then_some(svc.connection_id.as_str())
    }

    #[must_use]
    pub fn is_registered(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    /// Connection ids subscribed to `(source, event)`.
    #[must_use]
    pub fn subscribers_of(&self, source: &str, event: &str) -> HashSet<&str> {
        let topic = format!("{source}.{event}");
        self.services
            .values()
            .filter(|svc| svc.registration.subscriptions.iter().any(|s| s == &topic))
            .map(|svc| svc.connection_id.as_str())
            .collect()
    }
}
