//! Read-only liveness/lag snapshot of the store and every projection.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use common::GlobalPosition;
use event_store::{EventStore, EventStoreError};

use crate::updater::UpdatableProjection;

#[derive(Debug, Serialize)]
pub struct EventStoreStatus {
    pub position: GlobalPosition,
}

#[derive(Debug, Serialize)]
pub struct ProjectionStatus {
    pub position: GlobalPosition,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub event_store: EventStoreStatus,
    pub projections: BTreeMap<String, ProjectionStatus>,
}

impl SystemStatus {
    pub async fn build(
        store: &dyn EventStore,
        projections: &[Arc<dyn UpdatableProjection>],
    ) -> Result<SystemStatus, EventStoreError> {
        let mut snapshot = BTreeMap::new();
        for projection in projections {
            snapshot.insert(
                projection.name().to_string(),
                ProjectionStatus {
                    position: projection.position(),
                },
            );
        }
        // the store position must be read after the projection positions, or
        // else a projection could appear to be ahead of the store
        let position = store.current_position().await?;
        Ok(SystemStatus {
            event_store: EventStoreStatus { position },
            projections: snapshot,
        })
    }
}
