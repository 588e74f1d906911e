// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that builds
//! the PostgreSQL repositories and unit of work. The schema under
//! `cortex/migrations/` is applied with [`Database::migrate`] at startup.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;

use crate::domain::repository::{Repositories, UnitOfWork};
use crate::infrastructure::repositories::{postgres, PostgresUnitOfWork};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(connection_string: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to apply database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn repositories(&self) -> Repositories {
        postgres::repositories(self.pool.clone())
    }

    pub fn unit_of_work(&self) -> Arc<dyn UnitOfWork> {
        Arc::new(PostgresUnitOfWork::new(self.pool.clone()))
    }
}
