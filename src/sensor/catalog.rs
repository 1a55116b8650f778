//! Sensor Catalog & Factory.
//!
//! The catalog is an explicit registration table, filled once through a
//! [`CatalogBuilder`] and read-only afterwards. The factory resolves type names
//! against it and assigns fleet-unique identifiers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::error::CatalogError;
use crate::sensor::simulated;
use crate::sensor::{Sensor, SensorConfig, SensorId};

/// Pure constructor for one sensor type.
pub type SensorConstructor = fn(SensorId, &SensorConfig) -> Arc<dyn Sensor>;

fn normalize(type_name: &str) -> Result<String, CatalogError> {
    let normalized = type_name.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(CatalogError::EmptyTypeName);
    }
    Ok(normalized)
}

#[derive(Default)]
pub struct CatalogBuilder {
    constructors: BTreeMap<String, SensorConstructor>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        type_name: &str,
        constructor: SensorConstructor,
    ) -> Result<Self, CatalogError> {
        let name = normalize(type_name)?;
        if self.constructors.contains_key(&name) {
            return Err(CatalogError::DuplicateType { name });
        }
        self.constructors.insert(name, constructor);
        Ok(self)
    }

    pub fn build(self) -> SensorCatalog {
        SensorCatalog {
            constructors: self.constructors,
        }
    }
}

/// Read-only map from sensor type name to constructor.
pub struct SensorCatalog {
    constructors: BTreeMap<String, SensorConstructor>,
}

impl SensorCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// Catalog with the three built-in simulated sensor types.
    pub fn builtin() -> Result<Self, CatalogError> {
        Ok(Self::builder()
            .register("temperature", simulated::temperature)?
            .register("pressure", simulated::pressure)?
            .register("vibration", simulated::vibration)?
            .build())
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    fn lookup(&self, type_name: &str) -> Result<(String, SensorConstructor), CatalogError> {
        let name = normalize(type_name)?;
        match self.constructors.get(&name) {
            Some(ctor) => Ok((name, *ctor)),
            None => Err(CatalogError::UnknownSensorType {
                name: type_name.to_string(),
                available: self.type_names().collect::<Vec<_>>().join(", "),
            }),
        }
    }
}

/// Creates sensors from a catalog, numbering them per factory.
pub struct SensorFactory {
    catalog: Arc<SensorCatalog>,
    next_seq: AtomicU64,
}

impl SensorFactory {
    pub fn new(catalog: Arc<SensorCatalog>) -> Self {
        Self {
            catalog,
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn catalog(&self) -> &SensorCatalog {
        &self.catalog
    }

    pub fn create(
        &self,
        type_name: &str,
        config: &SensorConfig,
    ) -> Result<Arc<dyn Sensor>, CatalogError> {
        let (name, constructor) = self.catalog.lookup(type_name)?;
        config.validate()?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = SensorId::new(format!("{}-{:04}", name, seq));
        debug!(sensor = %id, "Sensor created.");
        Ok(constructor(id, config))
    }

    /// Build `count` calibrated sensors, cycling through the registered types.
    ///
    /// Seeded configs get a distinct seed per sensor so the fleet does not move
    /// in lockstep.
    pub fn build_fleet(
        &self,
        count: usize,
        config: &SensorConfig,
    ) -> Result<Vec<Arc<dyn Sensor>>, CatalogError> {
        let types: Vec<String> = self.catalog.type_names().map(str::to_string).collect();
        if types.is_empty() {
            return Err(CatalogError::EmptyCatalog);
        }
        config.validate()?;

        let mut fleet = Vec::with_capacity(count);
        for i in 0..count {
            let per_sensor = SensorConfig {
                seed: config.seed.map(|s| s.wrapping_add(i as u64)),
                ..config.clone()
            };
            let sensor = self.create(&types[i % types.len()], &per_sensor)?;
            sensor.calibrate();
            fleet.push(sensor);
        }
        Ok(fleet)
    }
}
