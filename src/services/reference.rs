//! Read-only lookups of suppliers, customers, products and storages.
//!
//! Soft-deleted rows answer as Not Found. Every lookup takes any
//! [`ConnectionTrait`] so workflows can read through their open transaction.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::entities::{customer, product, storage, supplier};
use crate::errors::ServiceError;

pub struct ReferenceLookup;

impl ReferenceLookup {
    pub async fn supplier_in<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
    ) -> Result<supplier::Model, ServiceError> {
        supplier::Entity::find_by_id(id)
            .filter(supplier::Column::DeletedAt.is_null())
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Supplier", id))
    }

    pub async fn supplier_by_name_in<C: ConnectionTrait>(
        conn: &C,
        name: &str,
    ) -> Result<supplier::Model, ServiceError> {
        supplier::Entity::find()
            .filter(supplier::Column::Name.eq(name))
            .filter(supplier::Column::DeletedAt.is_null())
            .order_by_asc(supplier::Column::CreatedAt)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Supplier", name))
    }

    pub async fn customer_in<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
    ) -> Result<customer::Model, ServiceError> {
        customer::Entity::find_by_id(id)
            .filter(customer::Column::DeletedAt.is_null())
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer", id))
    }

    pub async fn customer_by_name_in<C: ConnectionTrait>(
        conn: &C,
        name: &str,
    ) -> Result<customer::Model, ServiceError> {
        customer::Entity::find()
            .filter(customer::Column::Name.eq(name))
            .filter(customer::Column::DeletedAt.is_null())
            .order_by_asc(customer::Column::CreatedAt)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer", name))
    }

    pub async fn product_in<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .filter(product::Column::DeletedAt.is_null())
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    pub async fn product_by_name_in<C: ConnectionTrait>(
        conn: &C,
        name: &str,
    ) -> Result<product::Model, ServiceError> {
        product::Entity::find()
            .filter(product::Column::Name.eq(name))
            .filter(product::Column::DeletedAt.is_null())
            .order_by_asc(product::Column::CreatedAt)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", name))
    }

    pub async fn storage_in<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
    ) -> Result<storage::Model, ServiceError> {
        storage::Entity::find_by_id(id)
            .filter(storage::Column::DeletedAt.is_null())
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Storage", id))
    }

    pub async fn storage_by_name_in<C: ConnectionTrait>(
        conn: &C,
        name: &str,
    ) -> Result<storage::Model, ServiceError> {
        storage::Entity::find()
            .filter(storage::Column::Name.eq(name))
            .filter(storage::Column::DeletedAt.is_null())
            .order_by_asc(storage::Column::CreatedAt)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Storage", name))
    }
}
