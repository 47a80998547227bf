use std::{collections::HashMap, sync::RwLock};

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zkpass_common::{Criteria, CriteriaOp, EventId, Organizer, FIELD_COUNT};

use crate::{
    store::{KvStore, WriteBatch},
    tree::decode_u64,
    RegistryError,
};

const EVENT_PREFIX: &[u8] = b"event/";
const EVENT_SEQ_KEY: &[u8] = b"meta/event_seq";

/// An admission-gated event. Criteria are fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub organizer: Organizer,
    pub criteria: Criteria,
    pub name: String,
    pub info: EventInfo,
    pub sequence: u64,
}

/// Free-form metadata attached to an event, kept verbatim.
///
/// The expected shape is a JSON object with optional `loc`, `desc` and `url`
/// strings; see [`EventInfo::details`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventInfo(String);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDetails {
    pub loc: Option<String>,
    pub desc: Option<String>,
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedDetails {
    pub details: EventDetails,
    /// Set when the blob was present but not a valid details object; the
    /// details are then empty.
    pub warning: Option<String>,
}

impl EventInfo {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn from_details(details: &EventDetails) -> Result<Self, RegistryError> {
        Ok(Self(serde_json::to_string(details).map_err(|err| {
            RegistryError::MalformedCriteria(format!("unencodable event details: {err}"))
        })?))
    }

    pub fn raw(&self) -> &str {
        &self.0
    }

    pub fn details(&self) -> ParsedDetails {
        if self.0.trim().is_empty() {
            return ParsedDetails {
                details: EventDetails::default(),
                warning: None,
            };
        }
        match serde_json::from_str::<EventDetails>(&self.0) {
            Ok(details) => ParsedDetails {
                details,
                warning: None,
            },
            Err(err) => {
                warn!(error = %err, "event info is not a details object, using empty details");
                ParsedDetails {
                    details: EventDetails::default(),
                    warning: Some(format!("unparseable event info: {err}")),
                }
            }
        }
    }
}

struct EventsState {
    ordered: Vec<Event>,
    by_id: HashMap<EventId, usize>,
    next_seq: u64,
}

/// Event criteria and metadata, one isolated entry per event.
pub struct EventCriteriaStore {
    store: KvStore,
    state: RwLock<EventsState>,
}

impl EventCriteriaStore {
    pub fn load(store: KvStore) -> Result<Self, RegistryError> {
        let mut ordered = store
            .scan_prefix(EVENT_PREFIX)?
            .into_iter()
            .map(|(_, raw)| serde_json::from_slice::<Event>(&raw))
            .collect::<Result<Vec<_>, _>>()?;
        ordered.sort_by_key(|event| event.sequence);
        let by_id = ordered
            .iter()
            .enumerate()
            .map(|(pos, event)| (event.id, pos))
            .collect();
        let next_seq = match store.get(EVENT_SEQ_KEY)? {
            Some(raw) => decode_u64(&raw)?,
            None => 0,
        };
        Ok(Self {
            store,
            state: RwLock::new(EventsState {
                ordered,
                by_id,
                next_seq,
            }),
        })
    }

    pub fn create(
        &self,
        organizer: Organizer,
        field_index: u64,
        op_code: u64,
        value: Fr,
        name: &str,
        info: EventInfo,
    ) -> Result<Event, RegistryError> {
        let op = CriteriaOp::try_from(op_code)
            .map_err(|err| RegistryError::MalformedCriteria(err.to_string()))?;
        let criteria = Criteria::new(field_index, op, value);
        if !criteria.targets_known_field() {
            return Err(RegistryError::MalformedCriteria(format!(
                "field index {field_index} out of range, records carry {FIELD_COUNT} fields"
            )));
        }

        let mut state = self.state.write().map_err(|_| poisoned())?;
        let sequence = state.next_seq;
        let id = EventId::derive(&organizer, sequence);
        if state.by_id.contains_key(&id) {
            return Err(RegistryError::Store(format!("event id collision for {id}")));
        }
        let event = Event {
            id,
            organizer,
            criteria,
            name: name.to_string(),
            info,
            sequence,
        };

        let mut batch = WriteBatch::default();
        batch.put(event_key(&id), serde_json::to_vec(&event)?);
        batch.put(EVENT_SEQ_KEY, (sequence + 1).to_be_bytes().to_vec());
        self.store.apply(batch)?;

        state.next_seq = sequence + 1;
        let pos = state.ordered.len();
        state.ordered.push(event.clone());
        state.by_id.insert(id, pos);
        info!(event = %id, %organizer, criteria = %event.criteria, "event created");
        Ok(event)
    }

    pub fn get(&self, id: &EventId) -> Result<Option<Event>, RegistryError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.by_id.get(id).map(|&pos| state.ordered[pos].clone()))
    }

    /// All events in creation order.
    pub fn all(&self) -> Result<Vec<Event>, RegistryError> {
        Ok(self.state.read().map_err(|_| poisoned())?.ordered.clone())
    }

    pub fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.state.read().map_err(|_| poisoned())?.ordered.len())
    }
}

fn event_key(id: &EventId) -> Vec<u8> {
    let mut key = EVENT_PREFIX.to_vec();
    key.extend_from_slice(id.as_bytes());
    key
}

fn poisoned() -> RegistryError {
    RegistryError::Store("event store lock poisoned".into())
}
