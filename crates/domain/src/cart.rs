//! Shopping carts.
//!
//! A cart holds live references to products. Prices are never stored on a
//! line; totals are recomputed from the catalog each time a cart is viewed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{CartItemId, ProductId, SessionId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Money, Product};

/// Errors raised by cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Quantity was zero, negative, or above [`MAX_LINE_QUANTITY`].
    #[error("Invalid quantity: {quantity} (must be between 1 and {MAX_LINE_QUANTITY})")]
    InvalidQuantity { quantity: i64 },

    /// The line does not exist in this cart.
    #[error("Cart item not found: {0}")]
    ItemNotFound(CartItemId),
}

/// Who a cart belongs to. A cart has exactly one owner kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CartOwner {
    /// Persistent cart of an authenticated user.
    User(UserId),
    /// Transient cart of an anonymous session.
    Session(SessionId),
}

impl std::fmt::Display for CartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartOwner::User(id) => write!(f, "user:{id}"),
            CartOwner::Session(id) => write!(f, "session:{id}"),
        }
    }
}

/// A (product, quantity) line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

/// Largest quantity a single cart line may hold. Matches the `INTEGER`
/// column the Postgres backend stores it in.
pub const MAX_LINE_QUANTITY: u32 = i32::MAX as u32;

/// Validates a requested quantity.
pub fn validate_quantity(quantity: i64) -> Result<u32, CartError> {
    match u32::try_from(quantity) {
        Ok(q) if (1..=MAX_LINE_QUANTITY).contains(&q) => Ok(q),
        _ => Err(CartError::InvalidQuantity { quantity }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    owner: CartOwner,
    lines: Vec<CartLine>,
    updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(owner: CartOwner) -> Self {
        Self {
            owner,
            lines: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Rebuilds a cart from persisted lines.
    pub fn restore(owner: CartOwner, lines: Vec<CartLine>, updated_at: DateTime<Utc>) -> Self {
        Self {
            owner,
            lines,
            updated_at,
        }
    }

    pub fn owner(&self) -> CartOwner {
        self.owner
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, item_id: CartItemId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.id == item_id)
    }

    pub fn line_for_product(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Sum of quantities over all lines.
    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Distinct products referenced by the cart.
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.lines.iter().map(|l| l.product_id).collect()
    }

    /// Adds units of a product.
    ///
    /// If the product already has a line, its quantity grows instead of a
    /// second line being created. Returns the id of the affected line.
    pub fn add(&mut self, product_id: ProductId, quantity: i64) -> Result<CartItemId, CartError> {
        let quantity = validate_quantity(quantity)?;

        let id = if let Some(existing) = self.lines.iter_mut().find(|l| l.product_id == product_id)
        {
            let merged = i64::from(existing.quantity) + i64::from(quantity);
            existing.quantity = validate_quantity(merged)?;
            existing.id
        } else {
            let line = CartLine {
                id: CartItemId::new(),
                product_id,
                quantity,
                added_at: Utc::now(),
            };
            let id = line.id;
            self.lines.push(line);
            id
        };

        self.touch();
        Ok(id)
    }

    /// Sets the quantity of an existing line. Removal goes through [`Cart::remove`].
    pub fn update_quantity(&mut self, item_id: CartItemId, quantity: i64) -> Result<(), CartError> {
        let quantity = validate_quantity(quantity)?;
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.id == item_id)
            .ok_or(CartError::ItemNotFound(item_id))?;
        line.quantity = quantity;
        self.touch();
        Ok(())
    }

    pub fn remove(&mut self, item_id: CartItemId) -> Result<CartLine, CartError> {
        let index = self
            .lines
            .iter()
            .position(|l| l.id == item_id)
            .ok_or(CartError::ItemNotFound(item_id))?;
        let line = self.lines.remove(index);
        self.touch();
        Ok(line)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.touch();
    }

    /// Empties the cart, handing back its lines.
    pub fn take_lines(&mut self) -> Vec<CartLine> {
        self.touch();
        std::mem::take(&mut self.lines)
    }

    /// Computes the derived view of the cart against current catalog data.
    ///
    /// Lines whose product has left the catalog are listed as unavailable and
    /// contribute nothing to the total.
    pub fn summarize(&self, products: &HashMap<ProductId, Product>) -> CartSummary {
        let items: Vec<CartLineView> = self
            .lines
            .iter()
            .map(|line| match products.get(&line.product_id) {
                Some(product) => CartLineView {
                    item_id: line.id,
                    product_id: line.product_id,
                    name: Some(product.name.clone()),
                    unit_price: Some(product.price),
                    quantity: line.quantity,
                    line_total: product.price.multiply(line.quantity),
                    available: product.can_fulfil(line.quantity),
                },
                None => CartLineView {
                    item_id: line.id,
                    product_id: line.product_id,
                    name: None,
                    unit_price: None,
                    quantity: line.quantity,
                    line_total: Money::zero(),
                    available: false,
                },
            })
            .collect();

        let total = items.iter().map(|i| i.line_total).sum();
        CartSummary {
            items,
            total,
            count: self.total_quantity(),
        }
    }

    /// Lists every line that would keep the cart from being checked out.
    pub fn problems(&self, products: &HashMap<ProductId, Product>) -> Vec<LineProblem> {
        self.lines
            .iter()
            .filter_map(|line| {
                let kind = match products.get(&line.product_id) {
                    None => LineProblemKind::ProductMissing,
                    Some(p) if !p.is_active() => LineProblemKind::ProductUnavailable,
                    Some(p) if p.stock < line.quantity => LineProblemKind::InsufficientStock {
                        requested: line.quantity,
                        available: p.stock,
                    },
                    Some(_) => return None,
                };
                Some(LineProblem {
                    item_id: line.id,
                    product_id: line.product_id,
                    kind,
                })
            })
            .collect()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One line of a [`CartSummary`], priced at the live catalog price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineView {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub name: Option<String>,
    pub unit_price: Option<Money>,
    pub quantity: u32,
    pub line_total: Money,
    pub available: bool,
}

/// Read model shared by persistent and session carts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub items: Vec<CartLineView>,
    pub total: Money,
    pub count: u64,
}

impl CartSummary {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: Money::zero(),
            count: 0,
        }
    }
}

/// Why a line cannot currently be checked out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineProblemKind {
    ProductMissing,
    ProductUnavailable,
    InsufficientStock { requested: u32, available: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineProblem {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    #[serde(flatten)]
    pub kind: LineProblemKind,
}

impl std::fmt::Display for LineProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            LineProblemKind::ProductMissing => {
                write!(f, "product {} is no longer listed", self.product_id)
            }
            LineProblemKind::ProductUnavailable => {
                write!(f, "product {} is not available", self.product_id)
            }
            LineProblemKind::InsufficientStock {
                requested,
                available,
            } => write!(
                f,
                "product {}: requested {requested}, only {available} left in stock",
                self.product_id
            ),
        }
    }
}
