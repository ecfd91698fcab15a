use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{Owner, Property, PropertyDetails, PropertyFilters, PropertyImage, PropertyTrace};
use crate::persistence::{
    OwnerRepository, PropertyImageRepository, PropertyRepository, PropertyTraceRepository,
    StoreError, StoreResult, TransactionError, UnitOfWork, UnitOfWorkFactory,
};

// ============================================================================
// Scripted Unit of Work (tests only)
// ============================================================================
//
// Answers from a fixed script, records every call in order and fails the
// steps it is told to fail. Clones share the same script and call log, so a
// test keeps one clone to inspect what a handler did with another.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Begin,
    Commit,
    Rollback,
    Save,
    GetProperty,
    GetOwner,
    UpdateProperty,
    CreateProperty,
    CreateTrace,
    CreateImage,
    ListProperties,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Begin,
    Commit,
    Rollback,
    Save,
    GetProperty(Uuid),
    UpdateProperty(Property),
    CreateProperty(Property),
    PropertyExists(Uuid),
    CodeExists(String, Option<Uuid>),
    ListProperties(PropertyFilters),
    OwnerExists(Uuid),
    GetOwner(Uuid),
    CreateOwner(Owner),
    CreateImage(PropertyImage),
    CreateTrace(PropertyTrace),
    ListTraces(Uuid),
}

#[derive(Debug, Default, Clone)]
pub struct Script {
    pub property: Option<Property>,
    pub owner: Option<Owner>,
    pub listing: Vec<PropertyDetails>,
    pub traces: Vec<PropertyTrace>,
    pub property_exists: bool,
    pub owner_exists: bool,
    pub code_exists: bool,
    pub failures: HashMap<Step, String>,
}

impl Script {
    pub fn failing(mut self, step: Step, message: &str) -> Self {
        self.failures.insert(step, message.to_string());
        self
    }
}

#[derive(Default)]
struct Recorder {
    calls: Vec<Call>,
    open: bool,
}

#[derive(Clone)]
pub struct ScriptedUnitOfWork {
    script: Arc<Script>,
    recorder: Arc<Mutex<Recorder>>,
}

impl ScriptedUnitOfWork {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            recorder: Arc::new(Mutex::new(Recorder::default())),
        }
    }

    pub fn factory(&self) -> Arc<dyn UnitOfWorkFactory> {
        Arc::new(self.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.recorder.lock().unwrap().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    pub fn is_open(&self) -> bool {
        self.recorder.lock().unwrap().open
    }

    fn record(&self, call: Call) {
        self.recorder.lock().unwrap().calls.push(call);
    }

    fn step(&self, step: Step) -> StoreResult<()> {
        match self.script.failures.get(&step) {
            Some(message) => Err(StoreError::Constraint(message.clone())),
            None => Ok(()),
        }
    }

    /// The error a scripted failure of `step` produces
    pub fn error_for(message: &str) -> String {
        StoreError::Constraint(message.to_string()).to_string()
    }
}

impl UnitOfWorkFactory for ScriptedUnitOfWork {
    fn create(&self) -> Box<dyn UnitOfWork> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl UnitOfWork for ScriptedUnitOfWork {
    fn properties(&self) -> &dyn PropertyRepository {
        self
    }

    fn owners(&self) -> &dyn OwnerRepository {
        self
    }

    fn property_images(&self) -> &dyn PropertyImageRepository {
        self
    }

    fn property_traces(&self) -> &dyn PropertyTraceRepository {
        self
    }

    async fn save_changes(&self, cancel: &CancellationToken) -> StoreResult<usize> {
        self.record(Call::Save);
        crate::persistence::ensure_active(cancel)?;
        self.step(Step::Save)?;
        Ok(1)
    }

    async fn begin_transaction(&self, _cancel: &CancellationToken) -> StoreResult<()> {
        self.record(Call::Begin);
        self.step(Step::Begin)?;
        let mut recorder = self.recorder.lock().unwrap();
        if recorder.open {
            return Err(TransactionError::AlreadyOpen.into());
        }
        recorder.open = true;
        Ok(())
    }

    async fn commit_transaction(&self, _cancel: &CancellationToken) -> StoreResult<()> {
        self.record(Call::Commit);
        let was_open = std::mem::replace(&mut self.recorder.lock().unwrap().open, false);
        if !was_open {
            return Err(TransactionError::NotOpen("commit").into());
        }
        self.step(Step::Commit)
    }

    async fn rollback_transaction(&self, _cancel: &CancellationToken) -> StoreResult<()> {
        self.record(Call::Rollback);
        let was_open = std::mem::replace(&mut self.recorder.lock().unwrap().open, false);
        if !was_open {
            return Err(TransactionError::NotOpen("rollback").into());
        }
        self.step(Step::Rollback)
    }
}

#[async_trait]
impl PropertyRepository for ScriptedUnitOfWork {
    async fn get_with_filters(
        &self,
        filters: &PropertyFilters,
        _cancel: &CancellationToken,
    ) -> StoreResult<Vec<PropertyDetails>> {
        self.record(Call::ListProperties(filters.clone()));
        self.step(Step::ListProperties)?;
        Ok(self.script.listing.clone())
    }

    async fn create(&self, property: Property, _cancel: &CancellationToken) -> StoreResult<Property> {
        self.record(Call::CreateProperty(property.clone()));
        self.step(Step::CreateProperty)?;
        Ok(property)
    }

    async fn get_by_id(&self, id: Uuid, cancel: &CancellationToken) -> StoreResult<Property> {
        self.record(Call::GetProperty(id));
        crate::persistence::ensure_active(cancel)?;
        self.step(Step::GetProperty)?;
        self.script
            .property
            .clone()
            .filter(|p| p.id == id)
            .ok_or_else(|| StoreError::not_found("Property", id))
    }

    async fn update(&self, property: &Property, _cancel: &CancellationToken) -> StoreResult<()> {
        self.record(Call::UpdateProperty(property.clone()));
        self.step(Step::UpdateProperty)
    }

    async fn exists(&self, id: Uuid, _cancel: &CancellationToken) -> StoreResult<bool> {
        self.record(Call::PropertyExists(id));
        Ok(self.script.property_exists)
    }

    async fn code_internal_exists(
        &self,
        code: &str,
        exclude_id: Option<Uuid>,
        _cancel: &CancellationToken,
    ) -> StoreResult<bool> {
        self.record(Call::CodeExists(code.to_string(), exclude_id));
        Ok(self.script.code_exists)
    }
}

#[async_trait]
impl OwnerRepository for ScriptedUnitOfWork {
    async fn exists(&self, id: Uuid, _cancel: &CancellationToken) -> StoreResult<bool> {
        self.record(Call::OwnerExists(id));
        Ok(self.script.owner_exists)
    }

    async fn get_by_id(&self, id: Uuid, _cancel: &CancellationToken) -> StoreResult<Owner> {
        self.record(Call::GetOwner(id));
        self.step(Step::GetOwner)?;
        self.script
            .owner
            .clone()
            .filter(|o| o.id == id)
            .ok_or_else(|| StoreError::not_found("Owner", id))
    }

    async fn create(&self, owner: Owner, _cancel: &CancellationToken) -> StoreResult<Owner> {
        self.record(Call::CreateOwner(owner.clone()));
        Ok(owner)
    }
}

#[async_trait]
impl PropertyImageRepository for ScriptedUnitOfWork {
    async fn create(&self, image: PropertyImage, _cancel: &CancellationToken) -> StoreResult<PropertyImage> {
        self.record(Call::CreateImage(image.clone()));
        self.step(Step::CreateImage)?;
        Ok(image)
    }
}

#[async_trait]
impl PropertyTraceRepository for ScriptedUnitOfWork {
    async fn create(&self, trace: PropertyTrace, _cancel: &CancellationToken) -> StoreResult<PropertyTrace> {
        self.record(Call::CreateTrace(trace.clone()));
        self.step(Step::CreateTrace)?;
        Ok(trace)
    }

    async fn list_for_property(
        &self,
        property_id: Uuid,
        _cancel: &CancellationToken,
    ) -> StoreResult<Vec<PropertyTrace>> {
        self.record(Call::ListTraces(property_id));
        Ok(self.script.traces.clone())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn owner() -> Owner {
    Owner::new(
        "John Smith",
        "123 Main Street, Miami, FL 33101",
        NaiveDate::from_ymd_opt(1980, 5, 15).unwrap(),
    )
}

pub fn property(owner: &Owner, price: i64) -> Property {
    Property::new(
        "Luxury Apartment Downtown",
        "100 Biscayne Blvd, Miami, FL 33132",
        Decimal::from(price),
        "MIA001",
        2020,
        owner.id,
    )
}

pub fn traces(calls: &[Call]) -> Vec<PropertyTrace> {
    calls
        .iter()
        .filter_map(|call| match call {
            Call::CreateTrace(trace) => Some(trace.clone()),
            _ => None,
        })
        .collect()
}
