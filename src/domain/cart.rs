use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::money::Money;

// ============================================================================
// Cart - per-customer (book, quantity, price-at-add) lines
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("Quantity must be at least 1 (got {0})")]
    InvalidQuantity(i32),

    #[error("Book {0} is not in the cart")]
    ItemNotFound(Uuid),

    #[error("Cart total overflows")]
    TotalOverflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub book_id: Uuid,
    pub quantity: i32,
    pub unit_price: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cart {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn empty(id: Uuid, customer_id: Uuid) -> Self {
        Self {
            id,
            customer_id,
            items: Vec::new(),
        }
    }

    /// Add a book. Adding a book already in the cart increases its quantity
    /// and keeps the original price-at-add.
    pub fn add(&mut self, book_id: Uuid, quantity: i32, unit_price: Money) -> Result<(), CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(quantity));
        }

        match self.items.iter_mut().find(|item| item.book_id == book_id) {
            Some(item) => {
                item.quantity = item
                    .quantity
                    .checked_add(quantity)
                    .ok_or(CartError::InvalidQuantity(quantity))?;
            }
            None => self.items.push(CartItem {
                book_id,
                quantity,
                unit_price,
            }),
        }
        Ok(())
    }

    /// Set a line's quantity; zero removes the line.
    pub fn set_quantity(&mut self, book_id: Uuid, quantity: i32) -> Result<(), CartError> {
        if quantity < 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        if quantity == 0 {
            return self.remove(book_id);
        }

        let item = self
            .items
            .iter_mut()
            .find(|item| item.book_id == book_id)
            .ok_or(CartError::ItemNotFound(book_id))?;
        item.quantity = quantity;
        Ok(())
    }

    pub fn remove(&mut self, book_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|item| item.book_id != book_id);
        if self.items.len() == before {
            return Err(CartError::ItemNotFound(book_id));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Fold a guest cart into this one, summing quantities for shared books.
    pub fn merge(&mut self, guest_items: Vec<CartItem>) -> Result<(), CartError> {
        for item in guest_items {
            self.add(item.book_id, item.quantity, item.unit_price)?;
        }
        Ok(())
    }

    pub fn total(&self) -> Result<Money, CartError> {
        let subtotals = self
            .items
            .iter()
            .map(|item| item.unit_price.checked_times(item.quantity).ok_or(CartError::TotalOverflow))
            .collect::<Result<Vec<_>, _>>()?;
        Money::checked_sum(subtotals).ok_or(CartError::TotalOverflow)
    }

    pub fn item_count(&self) -> i64 {
        self.items.iter().map(|item| i64::from(item.quantity)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart() -> Cart {
        Cart::empty(Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_add_merges_same_book_and_keeps_first_price() {
        let mut cart = cart();
        let book = Uuid::new_v4();
        cart.add(book, 1, Money::from_cents(20_000)).unwrap();
        cart.add(book, 2, Money::from_cents(25_000)).unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(cart.items[0].unit_price, Money::from_cents(20_000));
    }

    #[test]
    fn test_add_rejects_non_positive_quantity() {
        let mut cart = cart();
        assert!(matches!(
            cart.add(Uuid::new_v4(), 0, Money::from_cents(1)),
            Err(CartError::InvalidQuantity(0))
        ));
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = cart();
        let book = Uuid::new_v4();
        cart.add(book, 4, Money::from_cents(100)).unwrap();
        cart.set_quantity(book, 2).unwrap();
        assert_eq!(cart.items[0].quantity, 2);

        cart.set_quantity(book, 0).unwrap();
        assert!(cart.items.is_empty());
    }

    #[test]
    fn test_remove_missing_book() {
        let mut cart = cart();
        let missing = Uuid::new_v4();
        assert!(matches!(cart.remove(missing), Err(CartError::ItemNotFound(id)) if id == missing));
    }

    #[test]
    fn test_merge_guest_items() {
        let mut cart = cart();
        let shared = Uuid::new_v4();
        let guest_only = Uuid::new_v4();
        cart.add(shared, 1, Money::from_cents(500)).unwrap();

        cart.merge(vec![
            CartItem { book_id: shared, quantity: 2, unit_price: Money::from_cents(500) },
            CartItem { book_id: guest_only, quantity: 1, unit_price: Money::from_cents(300) },
        ])
        .unwrap();

        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.total().unwrap(), Money::from_cents(500 * 3 + 300));
    }

    #[test]
    fn test_total_of_empty_cart_is_zero() {
        assert_eq!(cart().total().unwrap(), Money::ZERO);
    }
}
