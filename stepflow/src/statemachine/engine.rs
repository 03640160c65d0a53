//! The state machine engine.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::capability::{ListenerHandler, StateReader, TransitionHandler, TransitionTrigger};
use super::definition::{StateMachineDefinition, Transition, TransitionTable};
use super::instance::{StateMachineInstance, TransitionEvent};
use crate::cancellation::CancellationToken;
use crate::context::Data;
use crate::errors::{StepflowError, TransitionError};
use crate::services::ServiceRegistry;

/// Entity slot. `None` until the entity's first successful transition or seed.
type Slot = Arc<Mutex<Option<StateMachineInstance>>>;

/// Tracks per-entity state for one machine definition.
///
/// Each entity has its own lock, so transitions on different entities run
/// in parallel while transitions on the same entity are serialized over the
/// whole read-check-write sequence, handlers included.
pub struct StateMachineEngine {
    name: String,
    definition: StateMachineDefinition,
    table: TransitionTable,
    slots: DashMap<String, Slot>,
    handlers: RwLock<Vec<Arc<dyn TransitionHandler>>>,
}

impl StateMachineEngine {
    /// Creates an engine after validating the definition.
    pub fn new(
        name: impl Into<String>,
        definition: StateMachineDefinition,
    ) -> Result<Self, TransitionError> {
        definition.validate()?;
        Ok(Self {
            name: name.into(),
            table: TransitionTable::compile(&definition),
            definition,
            slots: DashMap::new(),
            handlers: RwLock::new(Vec::new()),
        })
    }

    /// Returns the engine's service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the machine definition.
    #[must_use]
    pub fn definition(&self) -> &StateMachineDefinition {
        &self.definition
    }

    /// Registers the engine in `services` under its name.
    ///
    /// The engine is reachable as itself and through the
    /// [`TransitionTrigger`] and [`StateReader`] capabilities.
    pub fn register(self: &Arc<Self>, services: &ServiceRegistry) {
        services.provide::<Self>(self.name.clone(), Arc::clone(self));
        let trigger = Arc::clone(self) as Arc<dyn TransitionTrigger>;
        let reader = Arc::clone(self) as Arc<dyn StateReader>;
        services.provide::<dyn TransitionTrigger>(self.name.clone(), trigger);
        services.provide::<dyn StateReader>(self.name.clone(), reader);
    }

    /// Adds a handler that runs before every transition is committed.
    ///
    /// Handlers run in registration order while the entity is locked, so they
    /// must not call back into the engine for the same entity. The first
    /// error vetoes the transition.
    pub fn add_transition_handler(&self, handler: Arc<dyn TransitionHandler>) {
        self.handlers.write().push(handler);
    }

    /// Adds a closure that observes every transition.
    pub fn add_transition_listener<F>(&self, listener: F)
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        self.add_transition_handler(Arc::new(ListenerHandler::new(listener)));
    }

    /// Provisions an instance at the initial state.
    pub async fn create_instance(
        &self,
        entity_id: &str,
        data: Data,
    ) -> Result<StateMachineInstance, TransitionError> {
        let initial = self.definition.initial_state.clone();
        self.seed_instance(entity_id, &initial, data).await
    }

    /// Provisions an instance at an explicit state.
    pub async fn seed_instance(
        &self,
        entity_id: &str,
        state: &str,
        data: Data,
    ) -> Result<StateMachineInstance, TransitionError> {
        let Some(seed_state) = self.definition.find_state(state) else {
            return Err(TransitionError::UnknownState {
                machine: self.name.clone(),
                state: state.to_string(),
            });
        };

        let slot = self.slot(entity_id);
        let mut guard = slot.lock().await;
        if guard.is_some() {
            return Err(TransitionError::InstanceExists {
                machine: self.name.clone(),
                entity_id: entity_id.to_string(),
            });
        }

        let mut instance = StateMachineInstance::new(&self.name, entity_id, state, data);
        instance.completed = seed_state.is_final;
        debug!(machine = %self.name, entity_id = %entity_id, state = %state, "Instance seeded");
        *guard = Some(instance.clone());
        Ok(instance)
    }

    /// Returns a snapshot of the instance for `entity_id`.
    ///
    /// Never creates an instance.
    pub async fn get_instance(&self, entity_id: &str) -> Result<StateMachineInstance, TransitionError> {
        let slot = self.slots.get(entity_id).map(|entry| Arc::clone(entry.value()));
        let instance = match slot {
            Some(slot) => slot.lock().await.clone(),
            None => None,
        };
        instance.ok_or_else(|| TransitionError::InstanceNotFound {
            machine: self.name.clone(),
            entity_id: entity_id.to_string(),
        })
    }

    /// Fires `event` on `entity_id`.
    ///
    /// An entity without an instance is treated as being in the initial
    /// state. Its instance is created only if the transition succeeds, so a
    /// rejected first event leaves nothing behind. A rejected event never
    /// changes the current state. `cancel` is handed to every handler.
    pub async fn trigger_transition(
        &self,
        cancel: &CancellationToken,
        entity_id: &str,
        event: &str,
        data: Data,
    ) -> Result<StateMachineInstance, TransitionError> {
        let slot = self.slot(entity_id);
        let mut guard = slot.lock().await;
        let result = self.apply_event(cancel, &mut guard, entity_id, event, data).await;
        let exists = guard.is_some();
        drop(guard);
        drop(slot);

        if !exists {
            self.prune(entity_id);
        }

        if let Err(err) = &result {
            warn!(machine = %self.name, entity_id = %entity_id, event = %event, error = %err, "Transition rejected");
        }
        result
    }

    /// Returns snapshots of every instance, sorted by entity id.
    pub async fn instances(&self) -> Vec<StateMachineInstance> {
        let slots: Vec<Slot> = self.slots.iter().map(|entry| Arc::clone(entry.value())).collect();
        let mut instances = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(instance) = slot.lock().await.clone() {
                instances.push(instance);
            }
        }
        instances.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        instances
    }

    /// Returns the number of instances.
    pub async fn instance_count(&self) -> usize {
        self.instances().await.len()
    }

    /// Returns the events `entity_id` currently accepts, sorted.
    ///
    /// An entity without an instance reports the events of the initial state.
    pub async fn available_events(&self, entity_id: &str) -> Vec<String> {
        let state = match self.get_instance(entity_id).await {
            Ok(instance) => instance.current_state,
            Err(_) => self.definition.initial_state.clone(),
        };
        self.table.events_from(&state)
    }

    fn slot(&self, entity_id: &str) -> Slot {
        Arc::clone(
            self.slots
                .entry(entity_id.to_string())
                .or_insert_with(Slot::default)
                .value(),
        )
    }

    fn prune(&self, entity_id: &str) {
        self.slots.remove_if(entity_id, |_, slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|guard| guard.is_none())
        });
    }

    async fn apply_event(
        &self,
        cancel: &CancellationToken,
        slot: &mut Option<StateMachineInstance>,
        entity_id: &str,
        event: &str,
        data: Data,
    ) -> Result<StateMachineInstance, TransitionError> {
        let from = slot
            .as_ref()
            .map_or(self.definition.initial_state.as_str(), |i| i.current_state.as_str())
            .to_string();
        let Some(rule) = self.table.get(&from, event).cloned() else {
            return Err(TransitionError::InvalidTransition {
                machine: self.name.clone(),
                entity_id: entity_id.to_string(),
                state: from,
                event: event.to_string(),
            });
        };

        self.commit(cancel, slot, entity_id, &rule, data).await?;

        // Automatic transitions chain from the new state and stop before
        // re-entering a state already entered by this call.
        let mut entered = HashSet::from([from, rule.to.clone()]);
        while let Some(current) = slot.as_ref() {
            if current.completed {
                break;
            }
            let Some(auto) = self.table.automatic_from(&current.current_state).cloned() else {
                break;
            };
            if entered.contains(&auto.to) {
                debug!(machine = %self.name, entity_id = %entity_id, event = %auto.name, to = %auto.to, "Automatic transition skipped, state already entered");
                break;
            }
            let carried = current.data.clone();
            if let Err(err) = self.commit(cancel, slot, entity_id, &auto, carried).await {
                warn!(machine = %self.name, entity_id = %entity_id, event = %auto.name, error = %err, "Automatic transition rejected");
                break;
            }
            entered.insert(auto.to);
        }

        slot.clone().ok_or_else(|| TransitionError::InstanceNotFound {
            machine: self.name.clone(),
            entity_id: entity_id.to_string(),
        })
    }

    async fn commit(
        &self,
        cancel: &CancellationToken,
        slot: &mut Option<StateMachineInstance>,
        entity_id: &str,
        rule: &Transition,
        data: Data,
    ) -> Result<(), TransitionError> {
        let record = TransitionEvent {
            machine: self.name.clone(),
            entity_id: entity_id.to_string(),
            event: rule.name.clone(),
            from: rule.from.clone(),
            to: rule.to.clone(),
            data,
            at: Utc::now(),
        };

        let handlers: Vec<Arc<dyn TransitionHandler>> = self.handlers.read().clone();
        for handler in handlers {
            handler
                .handle_transition(cancel, &record)
                .await
                .map_err(|e| TransitionError::HandlerRejected {
                    entity_id: entity_id.to_string(),
                    event: rule.name.clone(),
                    reason: e.to_string(),
                })?;
        }

        let (is_final, is_error) = self
            .definition
            .find_state(&rule.to)
            .map_or((false, false), |s| (s.is_final, s.is_error));
        let instance = slot.get_or_insert_with(|| {
            StateMachineInstance::new(&self.name, entity_id, &rule.from, Data::new())
        });
        instance.apply(record, is_final, is_error);

        debug!(
            machine = %self.name,
            entity_id = %entity_id,
            event = %rule.name,
            from = %rule.from,
            to = %rule.to,
            "Transition applied"
        );
        Ok(())
    }
}

impl std::fmt::Debug for StateMachineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachineEngine")
            .field("name", &self.name)
            .field("initial_state", &self.definition.initial_state)
            .field("entities", &self.slots.len())
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

#[async_trait]
impl TransitionTrigger for StateMachineEngine {
    async fn trigger_transition(
        &self,
        cancel: &CancellationToken,
        entity_id: &str,
        event: &str,
        data: Data,
    ) -> Result<StateMachineInstance, StepflowError> {
        StateMachineEngine::trigger_transition(self, cancel, entity_id, event, data)
            .await
            .map_err(StepflowError::from)
    }
}

#[async_trait]
impl StateReader for StateMachineEngine {
    async fn get_instance(&self, entity_id: &str) -> Result<StateMachineInstance, StepflowError> {
        StateMachineEngine::get_instance(self, entity_id)
            .await
            .map_err(StepflowError::from)
    }
}
