//! Connected client registry

use std::collections::HashMap;

/// Unique identifier for a connected client
pub type ClientId = u64;

/// Registry entry for one connected client
#[derive(Debug, Clone)]
pub struct ClientEntry {
    pub client_id: ClientId,
    pub name: String,
    pub version: String,
    pub connected_at_ms: u64,
}

/// Registry of connected clients
pub struct ClientRegistry {
    clients: HashMap<ClientId, ClientEntry>,
    next_id: ClientId,
    max_clients: usize,
}

impl ClientRegistry {
    /// Create a new registry with the given capacity
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_id: 1,
            max_clients,
        }
    }

    /// Register a client that completed the hello
    pub fn register(&mut self, name: &str, version: &str) -> Result<ClientId, RegistryError> {
        if self.clients.len() >= self.max_clients {
            return Err(RegistryError::CapacityExceeded);
        }

        let client_id = self.next_id;
        self.next_id += 1;

        self.clients.insert(
            client_id,
            ClientEntry {
                client_id,
                name: name.to_string(),
                version: version.to_string(),
                connected_at_ms: devbridge_core::log::current_millis(),
            },
        );
        Ok(client_id)
    }

    /// Remove a client on disconnect
    pub fn deregister(&mut self, client_id: ClientId) -> Result<(), RegistryError> {
        self.clients
            .remove(&client_id)
            .map(|_| ())
            .ok_or(RegistryError::NotFound(client_id))
    }

    /// Get a client entry
    pub fn get(&self, client_id: ClientId) -> Option<&ClientEntry> {
        self.clients.get(&client_id)
    }

    /// List all connected clients
    pub fn list(&self) -> Vec<&ClientEntry> {
        self.clients.values().collect()
    }

    /// Number of connected clients
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Available slots
    pub fn available_slots(&self) -> usize {
        self.max_clients - self.clients.len()
    }
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Client not found: {0}")]
    NotFound(ClientId),
    #[error("Maximum client capacity exceeded")]
    CapacityExceeded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_deregister() {
        let mut registry = ClientRegistry::new(2);
        let a = registry.register("tool-a", "1.0").unwrap();
        let b = registry.register("tool-b", "1.0").unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.available_slots(), 0);

        registry.deregister(a).unwrap();
        assert_eq!(registry.count(), 1);
        assert!(registry.get(a).is_none());
        assert_eq!(registry.get(b).unwrap().name, "tool-b");
    }

    #[test]
    fn test_capacity_cap() {
        let mut registry = ClientRegistry::new(1);
        registry.register("tool-a", "1.0").unwrap();
        let err = registry.register("tool-b", "1.0").unwrap_err();
        assert!(matches!(err, RegistryError::CapacityExceeded));
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut registry = ClientRegistry::new(4);
        let a = registry.register("tool", "1.0").unwrap();
        registry.deregister(a).unwrap();
        let b = registry.register("tool", "1.0").unwrap();
        assert_ne!(a, b);
    }
}
