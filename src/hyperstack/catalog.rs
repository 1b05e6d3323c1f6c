//! Catalog listings. Images and flavors arrive grouped and are flattened.

use super::types::{EnvironmentsData, FlavorsData, ImagesData, KeypairsData, RegionsData};
use super::{HyperstackBackend, HyperstackError};
use crate::backend::BackendFuture;
use crate::catalog::{Catalog, CatalogImage, Environment, Flavor, Keypair, Region};

impl Catalog for HyperstackBackend {
    type Error = HyperstackError;

    fn list_images(&self) -> BackendFuture<'_, Vec<CatalogImage>, Self::Error> {
        Box::pin(async move {
            let data: ImagesData = self.get("/core/images").await?;
            Ok(data
                .images
                .into_iter()
                .flat_map(|group| group.images)
                .map(CatalogImage::from)
                .collect())
        })
    }

    fn list_regions(&self) -> BackendFuture<'_, Vec<Region>, Self::Error> {
        Box::pin(async move {
            let data: RegionsData = self.get("/core/regions").await?;
            Ok(data.regions.into_iter().map(Region::from).collect())
        })
    }

    fn list_flavors(&self) -> BackendFuture<'_, Vec<Flavor>, Self::Error> {
        Box::pin(async move {
            let data: FlavorsData = self.get("/core/flavors").await?;
            Ok(data
                .data
                .into_iter()
                .flat_map(|group| group.flavors)
                .map(Flavor::from)
                .collect())
        })
    }

    fn list_keypairs(&self) -> BackendFuture<'_, Vec<Keypair>, Self::Error> {
        Box::pin(async move {
            let data: KeypairsData = self.get("/core/keypairs").await?;
            Ok(data.keypairs.into_iter().map(Keypair::from).collect())
        })
    }

    fn list_environments(&self) -> BackendFuture<'_, Vec<Environment>, Self::Error> {
        Box::pin(async move {
            let data: EnvironmentsData = self.get("/core/environments").await?;
            Ok(data.environments.into_iter().map(Environment::from).collect())
        })
    }
}
