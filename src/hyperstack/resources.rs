//! Instance, snapshot, and image calls.

use tracing::debug;

use super::types::{
    CreateImageBody, CreateInstanceBody, CreateSnapshotBody, ImageData, InstanceData,
    InstancesData, SnapshotData,
};
use super::{HyperstackBackend, HyperstackError};
use crate::backend::{
    BackendFuture, ImageHandle, InstanceHandle, InstanceRequest, ResourceBackend, SnapshotHandle,
};

fn instance_path(id: u64) -> String {
    format!("/core/virtual-machines/{id}")
}

impl ResourceBackend for HyperstackBackend {
    type Error = HyperstackError;

    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            let body = CreateInstanceBody::from(request);
            let data: InstancesData = self.post("/core/virtual-machines", &body).await?;
            let instance = data.instances.into_iter().next().ok_or_else(|| {
                HyperstackError::MissingInstance {
                    name: request.name.clone(),
                }
            })?;
            Ok(InstanceHandle::from(instance))
        })
    }

    fn get_instance(&self, id: u64) -> BackendFuture<'_, InstanceHandle, Self::Error> {
        Box::pin(async move {
            let data: InstanceData = self.get(&instance_path(id)).await?;
            Ok(InstanceHandle::from(data.instance))
        })
    }

    fn delete_instance(&self, id: u64) -> BackendFuture<'_, (), Self::Error> {
        Box::pin(async move {
            self.delete(&instance_path(id)).await?;
            debug!(instance_id = id, "Instance deletion accepted");
            Ok(())
        })
    }

    fn create_snapshot<'a>(
        &'a self,
        instance_id: u64,
        name: &'a str,
    ) -> BackendFuture<'a, SnapshotHandle, Self::Error> {
        Box::pin(async move {
            let body = CreateSnapshotBody {
                name,
                description: format!("Snapshot of VM {instance_id} for image building"),
            };
            let path = format!("{}/snapshots", instance_path(instance_id));
            let data: SnapshotData = self.post(&path, &body).await?;
            Ok(SnapshotHandle::from(data.snapshot))
        })
    }

    fn get_snapshot(&self, id: u64) -> BackendFuture<'_, SnapshotHandle, Self::Error> {
        Box::pin(async move {
            let data: SnapshotData = self.get(&format!("/core/snapshots/{id}")).await?;
            Ok(SnapshotHandle::from(data.snapshot))
        })
    }

    fn create_image<'a>(
        &'a self,
        snapshot_id: u64,
        name: &'a str,
        labels: &'a [String],
    ) -> BackendFuture<'a, ImageHandle, Self::Error> {
        Box::pin(async move {
            let body = CreateImageBody { name, labels };
            let path = format!("/core/snapshots/{snapshot_id}/image");
            let data: ImageData = self.post(&path, &body).await?;
            Ok(ImageHandle::from(data.image))
        })
    }
}
