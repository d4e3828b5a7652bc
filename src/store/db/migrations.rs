pub mod cache_entry;
pub mod refresh_request;

use sea_orm_migration::prelude::*;

pub struct Migrator;

impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(cache_entry::Migration), Box::new(refresh_request::Migration)]
    }
}
