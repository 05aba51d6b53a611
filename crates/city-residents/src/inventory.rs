//! Inventory bookkeeping: ordered stacks with merge-on-add semantics.
//!
//! The inventory is an ordered list of stacks. Plain consumables merge
//! into an existing stack of the same kind; wearing items (sleeping bags)
//! always get their own stack so each carries its own `remaining_uses`.
//! Every entry keeps `quantity >= 1` -- stacks that would reach zero are
//! removed outright.

use city_types::{InventoryEntry, ItemKind};

use crate::error::ResidentError;

/// Add `quantity` units of `item`, merging into an existing stack when
/// the item does not wear out.
pub fn add_item(inventory: &mut Vec<InventoryEntry>, item: ItemKind, quantity: u32) {
    if quantity == 0 {
        return;
    }
    if item.initial_uses().is_none() {
        if let Some(stack) = inventory.iter_mut().find(|e| e.item == item) {
            stack.quantity = stack.quantity.saturating_add(quantity);
            return;
        }
    }
    inventory.push(InventoryEntry::new(item, quantity));
}

/// Total units of `item` across all stacks.
pub fn count_item(inventory: &[InventoryEntry], item: ItemKind) -> u32 {
    inventory
        .iter()
        .filter(|e| e.item == item)
        .fold(0_u32, |acc, e| acc.saturating_add(e.quantity))
}

/// Remove `quantity` units of `item`, consuming stacks front to back.
///
/// # Errors
///
/// Returns [`ResidentError::InsufficientItems`] without mutating when the
/// inventory holds fewer than `quantity` units.
pub fn remove_item(
    inventory: &mut Vec<InventoryEntry>,
    item: ItemKind,
    quantity: u32,
) -> Result<(), ResidentError> {
    let available = count_item(inventory, item);
    if available < quantity {
        return Err(ResidentError::InsufficientItems {
            item,
            requested: quantity,
            available,
        });
    }

    let mut remaining = quantity;
    inventory.retain_mut(|entry| {
        if remaining == 0 || entry.item != item {
            return true;
        }
        if entry.quantity > remaining {
            entry.quantity = entry.quantity.saturating_sub(remaining);
            remaining = 0;
            true
        } else {
            remaining = remaining.saturating_sub(entry.quantity);
            false
        }
    });

    Ok(())
}

/// The first item in inventory order that restores hunger, if any.
pub fn first_edible(inventory: &[InventoryEntry]) -> Option<ItemKind> {
    inventory
        .iter()
        .map(|e| e.item)
        .find(|item| item.hunger_restore() > 0.0)
}

/// The first item in inventory order that restores thirst, if any.
pub fn first_drinkable(inventory: &[InventoryEntry]) -> Option<ItemKind> {
    inventory
        .iter()
        .map(|e| e.item)
        .find(|item| item.thirst_restore() > 0.0)
}

/// Whether a wearing item of this kind with uses left is present.
pub fn has_usable(inventory: &[InventoryEntry], item: ItemKind) -> bool {
    inventory
        .iter()
        .any(|e| e.item == item && e.remaining_uses.is_none_or(|u| u > 0))
}

/// Spend one use of a wearing item. The stack is removed when its last
/// use is spent on its last unit.
///
/// # Errors
///
/// Returns [`ResidentError::ItemNotFound`] when no usable stack exists.
pub fn spend_use(
    inventory: &mut Vec<InventoryEntry>,
    item: ItemKind,
) -> Result<(), ResidentError> {
    let position = inventory
        .iter()
        .position(|e| e.item == item && e.remaining_uses.is_none_or(|u| u > 0))
        .ok_or(ResidentError::ItemNotFound(item))?;

    let Some(entry) = inventory.get_mut(position) else {
        return Err(ResidentError::ItemNotFound(item));
    };

    match entry.remaining_uses {
        None => Ok(()),
        Some(uses) => {
            let left = uses.saturating_sub(1);
            if left == 0 {
                if entry.quantity > 1 {
                    entry.quantity = entry.quantity.saturating_sub(1);
                    entry.remaining_uses = item.initial_uses();
                } else {
                    inventory.remove(position);
                }
            } else {
                entry.remaining_uses = Some(left);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn consumables_merge_into_one_stack() {
        let mut inv = Vec::new();
        add_item(&mut inv, ItemKind::Bread, 2);
        add_item(&mut inv, ItemKind::Bread, 3);
        assert_eq!(inv.len(), 1);
        assert_eq!(count_item(&inv, ItemKind::Bread), 5);
    }

    #[test]
    fn wearing_items_stack_separately() {
        let mut inv = Vec::new();
        add_item(&mut inv, ItemKind::SleepingBag, 1);
        add_item(&mut inv, ItemKind::SleepingBag, 1);
        assert_eq!(inv.len(), 2);
    }

    #[test]
    fn remove_is_all_or_nothing() {
        let mut inv = Vec::new();
        add_item(&mut inv, ItemKind::Water, 2);
        let result = remove_item(&mut inv, ItemKind::Water, 3);
        assert!(result.is_err());
        assert_eq!(count_item(&inv, ItemKind::Water), 2);

        let result = remove_item(&mut inv, ItemKind::Water, 2);
        assert!(result.is_ok());
        assert!(inv.is_empty());
    }

    #[test]
    fn remove_spans_stacks() {
        let mut inv = Vec::new();
        add_item(&mut inv, ItemKind::SleepingBag, 1);
        add_item(&mut inv, ItemKind::SleepingBag, 1);
        let result = remove_item(&mut inv, ItemKind::SleepingBag, 2);
        assert!(result.is_ok());
        assert!(inv.is_empty());
    }

    #[test]
    fn edible_and_drinkable_lookup() {
        let mut inv = Vec::new();
        add_item(&mut inv, ItemKind::Water, 1);
        add_item(&mut inv, ItemKind::Berries, 1);
        assert_eq!(first_edible(&inv), Some(ItemKind::Berries));
        assert_eq!(first_drinkable(&inv), Some(ItemKind::Water));
    }

    #[test]
    fn no_quantity_zero_entries_survive() {
        let mut inv = Vec::new();
        add_item(&mut inv, ItemKind::Coffee, 1);
        let _ = remove_item(&mut inv, ItemKind::Coffee, 1);
        assert!(inv.iter().all(|e| e.quantity >= 1));
        assert!(inv.is_empty());
    }

    #[test]
    fn spend_use_wears_out_the_bag() {
        let mut inv = Vec::new();
        add_item(&mut inv, ItemKind::SleepingBag, 1);
        for _ in 0..19 {
            let result = spend_use(&mut inv, ItemKind::SleepingBag);
            assert!(result.is_ok());
        }
        assert!(has_usable(&inv, ItemKind::SleepingBag));
        let result = spend_use(&mut inv, ItemKind::SleepingBag);
        assert!(result.is_ok());
        assert!(inv.is_empty());
        assert!(!has_usable(&inv, ItemKind::SleepingBag));
    }

    #[test]
    fn spend_use_on_missing_item_fails() {
        let mut inv = Vec::new();
        let result = spend_use(&mut inv, ItemKind::SleepingBag);
        assert!(matches!(result, Err(ResidentError::ItemNotFound(_))));
    }
}
