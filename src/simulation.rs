//! Simulation context.
//!
//! A [`Simulation`] bundles everything one simulated system shares: the
//! engine, the id generator, the frequency registry and a name index of the
//! components, ports and connections that make up the topology. The
//! simulation owns its connections; ports only link to them weakly. Nothing here is global,
//! so several simulations can coexist in one process.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::component::Component;
use crate::connection::Connection;
use crate::engine::Engine;
use crate::error::SimResult;
use crate::freq::{FreqDomain, FreqResult, FrequencyRegistry};
use crate::id::IdGenerator;
use crate::msg::RemotePort;
use crate::port::Port;
use crate::types::Freq;

/// A simulated system and its shared services.
pub struct Simulation {
    engine: Arc<dyn Engine>,
    ids: IdGenerator,
    frequencies: FrequencyRegistry,
    domains: RwLock<HashMap<String, Arc<FreqDomain>>>,
    components: RwLock<Vec<Arc<dyn Component>>>,
    component_index: RwLock<HashMap<String, usize>>,
    ports: RwLock<HashMap<RemotePort, Arc<Port>>>,
    connections: RwLock<HashMap<String, Arc<dyn Connection>>>,
}

impl Simulation {
    /// Creates an empty simulation driven by `engine`.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            ids: IdGenerator::new(),
            frequencies: FrequencyRegistry::new(),
            domains: RwLock::new(HashMap::new()),
            components: RwLock::new(Vec::new()),
            component_index: RwLock::new(HashMap::new()),
            ports: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn id_generator(&self) -> &IdGenerator {
        &self.ids
    }

    pub fn frequency_registry(&self) -> &FrequencyRegistry {
        &self.frequencies
    }

    /// Registers a clock domain under `name`.
    ///
    /// Several names may share a frequency; they then share a domain.
    pub fn register_domain(&self, name: impl Into<String>, hz: Freq) -> FreqResult<Arc<FreqDomain>> {
        let domain = self.frequencies.register_frequency(hz)?;
        self.domains.write().insert(name.into(), Arc::clone(&domain));
        Ok(domain)
    }

    /// Looks up a named clock domain.
    pub fn domain(&self, name: &str) -> Option<Arc<FreqDomain>> {
        self.domains.read().get(name).cloned()
    }

    /// Adds a component to the topology.
    ///
    /// # Panics
    ///
    /// Panics if a component with the same name is already registered.
    pub fn register_component(&self, component: Arc<dyn Component>) {
        let name = component.name().to_string();
        let mut index = self.component_index.write();
        if index.contains_key(&name) {
            tracing::error!(component = %name, "duplicate component name");
            panic!("component {name} is already registered");
        }

        let mut components = self.components.write();
        index.insert(name.clone(), components.len());
        components.push(component);
        tracing::debug!(component = %name, "registered component");
    }

    pub fn component(&self, name: &str) -> Option<Arc<dyn Component>> {
        let index = *self.component_index.read().get(name)?;
        self.components.read().get(index).cloned()
    }

    /// Components in registration order.
    pub fn components(&self) -> Vec<Arc<dyn Component>> {
        self.components.read().clone()
    }

    /// Adds a port to the name index.
    ///
    /// # Panics
    ///
    /// Panics if a port with the same name is already registered.
    pub fn register_port(&self, port: Arc<Port>) {
        let remote = port.as_remote();
        let mut ports = self.ports.write();
        if ports.contains_key(&remote) {
            tracing::error!(port = %remote, "duplicate port name");
            panic!("port {remote} is already registered");
        }
        ports.insert(remote, port);
    }

    pub fn port(&self, name: &str) -> Option<Arc<Port>> {
        self.ports.read().get(&RemotePort::new(name)).cloned()
    }

    /// Takes ownership of a connection for the lifetime of the simulation.
    ///
    /// # Panics
    ///
    /// Panics if a connection with the same name is already registered.
    pub fn register_connection(&self, connection: Arc<dyn Connection>) {
        let name = connection.name().to_string();
        let mut connections = self.connections.write();
        if connections.contains_key(&name) {
            tracing::error!(connection = %name, "duplicate connection name");
            panic!("connection {name} is already registered");
        }
        connections.insert(name.clone(), connection);
        tracing::debug!(connection = %name, "registered connection");
    }

    pub fn connection(&self, name: &str) -> Option<Arc<dyn Connection>> {
        self.connections.read().get(name).cloned()
    }

    /// Runs the engine until no event remains.
    pub fn run(&self) -> SimResult<()> {
        tracing::info!(
            components = self.components.read().len(),
            ports = self.ports.read().len(),
            connections = self.connections.read().len(),
            "simulation starting"
        );
        let result = self.engine.run();
        tracing::info!(now = self.engine.current_time(), "simulation finished");
        result
    }
}
