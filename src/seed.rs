use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{Owner, Property};
use crate::persistence::{StoreResult, UnitOfWork, UnitOfWorkFactory};

// ============================================================================
// Demo Data
// ============================================================================
//
// Three owners with one property each. Ids are fixed, so seeding twice is a
// no-op for rows that already exist.
//
// ============================================================================

pub const SEED_OWNER_IDS: [Uuid; 3] = [
    Uuid::from_u128(0x0000_0001_0000_4000_8000_0000_0000_0001),
    Uuid::from_u128(0x0000_0001_0000_4000_8000_0000_0000_0002),
    Uuid::from_u128(0x0000_0001_0000_4000_8000_0000_0000_0003),
];

pub const SEED_PROPERTY_IDS: [Uuid; 3] = [
    Uuid::from_u128(0x0000_0002_0000_4000_8000_0000_0000_0001),
    Uuid::from_u128(0x0000_0002_0000_4000_8000_0000_0000_0002),
    Uuid::from_u128(0x0000_0002_0000_4000_8000_0000_0000_0003),
];

fn owners() -> Vec<Owner> {
    let rows = [
        ("John Smith", "123 Main Street, Miami, FL 33101", (1980, 5, 15)),
        ("Sarah Johnson", "456 Oak Avenue, New York, NY 10001", (1975, 11, 22)),
        ("Michael Brown", "789 Pine Road, Los Angeles, CA 90210", (1990, 3, 8)),
    ];

    rows.iter()
        .zip(SEED_OWNER_IDS)
        .filter_map(|((name, address, (y, m, d)), id)| {
            NaiveDate::from_ymd_opt(*y, *m, *d).map(|born| Owner::new(*name, *address, born).with_id(id))
        })
        .collect()
}

fn properties() -> Vec<Property> {
    let rows = [
        ("Luxury Apartment Downtown", "100 Biscayne Blvd, Miami, FL 33132", 750_000, "MIA001", 2020),
        ("Modern Condo Manhattan", "350 Fifth Avenue, New York, NY 10118", 1_250_000, "NYC001", 2018),
        ("Beverly Hills Villa", "9500 Wilshire Blvd, Beverly Hills, CA 90212", 3_500_000, "LA001", 2015),
    ];

    rows.iter()
        .zip(SEED_PROPERTY_IDS.iter().zip(SEED_OWNER_IDS))
        .map(|((name, address, price, code, year), (id, owner_id))| {
            let mut property = Property::new(*name, *address, Decimal::from(*price), *code, *year, owner_id);
            property.id = *id;
            property
        })
        .collect()
}

/// Insert the demo owners and properties that are missing.
/// Returns how many rows were written.
pub async fn seed_demo_data(units: &dyn UnitOfWorkFactory, cancel: &CancellationToken) -> StoreResult<usize> {
    let uow = units.create();
    uow.begin_transaction(cancel).await?;

    match stage(uow.as_ref(), cancel).await {
        Ok(written) => {
            uow.commit_transaction(cancel).await?;
            if written > 0 {
                tracing::info!(rows = written, "🌱 Demo data seeded");
            } else {
                tracing::debug!("Demo data already present");
            }
            Ok(written)
        }
        Err(e) => {
            if let Err(rollback) = uow.rollback_transaction(cancel).await {
                tracing::error!(error = %rollback, "Seed rollback failed");
            }
            Err(e)
        }
    }
}

async fn stage(uow: &dyn UnitOfWork, cancel: &CancellationToken) -> StoreResult<usize> {
    for owner in owners() {
        if !uow.owners().exists(owner.id, cancel).await? {
            uow.owners().create(owner, cancel).await?;
        }
    }
    for property in properties() {
        if !uow.properties().exists(property.id, cancel).await?
            && !uow.properties().code_internal_exists(&property.code_internal, None, cancel).await?
        {
            uow.properties().create(property, cancel).await?;
        }
    }
    uow.save_changes(cancel).await
}
