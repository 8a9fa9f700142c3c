//! Inventory ledger: the only code path that writes product stock.

use common::ProductId;
use domain::Product;
use store::{Store, StoreTx};

use crate::error::{MarketplaceError, Result};

/// Outcome of returning units to inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Stock was incremented to `stock`.
    Restored { stock: u32 },
    /// The product no longer exists; nothing was written.
    ProductGone,
}

/// Atomic check-and-decrement / compensating increment over product stock.
///
/// The `*_in` methods run inside a caller-owned unit of work; the row stays
/// locked until that unit of work ends. `reserve` and `release` open and
/// commit their own.
#[derive(Clone)]
pub struct InventoryLedger<S> {
    store: S,
}

impl<S: Store> InventoryLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Decrements stock by `quantity` and returns the product as locked,
    /// with its new stock.
    ///
    /// Status is checked before stock: an inactive product is
    /// `ProductUnavailable` whatever its count.
    #[tracing::instrument(skip(tx))]
    pub async fn reserve_in<T: StoreTx>(
        tx: &mut T,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Product> {
        let mut product = tx
            .product_for_update(product_id)
            .await?
            .ok_or_else(|| MarketplaceError::not_found("Product", product_id))?;

        if !product.is_active() {
            return Err(MarketplaceError::ProductUnavailable(product_id));
        }
        if product.stock < quantity {
            tracing::info!(available = product.stock, "insufficient stock");
            return Err(MarketplaceError::InsufficientStock {
                product_id,
                requested: quantity,
                available: product.stock,
            });
        }

        product.stock -= quantity;
        tx.write_stock(product_id, product.stock).await?;
        Ok(product)
    }

    /// Adds `quantity` back to stock.
    ///
    /// Callers guarantee a given order's units are released at most once.
    /// A product deleted from the catalog is skipped with a warning.
    #[tracing::instrument(skip(tx))]
    pub async fn release_in<T: StoreTx>(
        tx: &mut T,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Release> {
        let Some(product) = tx.product_for_update(product_id).await? else {
            tracing::warn!("product no longer in catalog, stock not restored");
            metrics::counter!("stock_release_skipped_total").increment(1);
            return Ok(Release::ProductGone);
        };

        let stock = product.stock.saturating_add(quantity);
        tx.write_stock(product_id, stock).await?;
        metrics::counter!("stock_released_units_total").increment(u64::from(quantity));
        Ok(Release::Restored { stock })
    }

    /// Reserves in a unit of work of its own.
    pub async fn reserve(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        let product = Self::reserve_in(&mut tx, product_id, quantity).await?;
        tx.commit().await?;
        Ok(product)
    }

    /// Releases in a unit of work of its own.
    pub async fn release(&self, product_id: ProductId, quantity: u32) -> Result<Release> {
        let mut tx = self.store.begin().await?;
        let outcome = Self::release_in(&mut tx, product_id, quantity).await?;
        tx.commit().await?;
        Ok(outcome)
    }
}
