use glam::Vec3;
use serde::{Deserialize, Serialize};
use worldspace_common::Mod;

use crate::host::Host;
use crate::ingest::{IngestError, Ingested};
use crate::runtime::WorldRuntime;

/// Requests sibling components send to the runtime. One JSON object per
/// event, tagged by `event`:
///
/// ```json
/// {"event": "addMod", "mod": {"name": "crate", "type": "generic"}, "position": [0, 4, 0]}
/// {"event": "executeModScript", "mod": {"name": "s", "type": "script"}, "script": "addCube();"}
/// {"event": "clearWorld"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum InboundEvent {
    AddMod {
        #[serde(rename = "mod")]
        descriptor: Mod,
        #[serde(default)]
        position: Option<Vec3>,
    },
    ExecuteModScript {
        #[serde(rename = "mod")]
        descriptor: Mod,
        #[serde(default)]
        script: Option<String>,
        #[serde(default)]
        position: Option<Vec3>,
    },
    ClearWorld,
}

impl InboundEvent {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Ingested(Ingested),
    Cleared { removed: usize },
}

impl<H: Host> WorldRuntime<H> {
    pub fn handle_event(&mut self, event: InboundEvent) -> Result<EventOutcome, IngestError> {
        match event {
            InboundEvent::AddMod {
                descriptor,
                position,
            } => {
                let m = match position {
                    Some(p) => descriptor.at(p),
                    None => descriptor,
                };
                self.add_mod(m).map(EventOutcome::Ingested)
            }
            InboundEvent::ExecuteModScript {
                descriptor,
                script,
                position,
            } => self
                .execute_mod_script(descriptor, script, position)
                .map(EventOutcome::Ingested),
            InboundEvent::ClearWorld => Ok(EventOutcome::Cleared {
                removed: self.clear_world(),
            }),
        }
    }
}
